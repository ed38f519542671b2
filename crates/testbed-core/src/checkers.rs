//! Comparison checkers used with [`TestContext::check_that`].
//!
//! A checker inspects an obtained value and explains any mismatch. Checkers
//! report through the context, so a failed check never aborts the test.
//!
//! [`TestContext::check_that`]: crate::TestContext::check_that

use crate::context::panic_message;
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, SystemTime};

/// A named check over values of type `T`.
pub trait Checker<T: ?Sized> {
    /// Name used in failure messages.
    fn name(&self) -> &'static str;

    /// Returns `Err` with an explanation if `obtained` does not satisfy the check.
    fn check(&self, obtained: &T) -> Result<(), String>;
}

/// Compiles `pattern` anchored at both ends.
fn anchored(pattern: &str) -> Result<Regex, String> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|err| format!("invalid pattern {:?}: {}", pattern, err))
}

/// Multiset equality: same values with the same multiplicity, any order.
#[derive(Debug, Clone)]
pub struct SameContents<T>(pub Vec<T>);

impl<T: Eq + Hash + Debug> SameContents<T> {
    fn compare(&self, obtained: &[T]) -> Result<(), String> {
        let mut counts: HashMap<&T, i64> = HashMap::new();
        for value in obtained {
            *counts.entry(value).or_default() += 1;
        }
        for value in &self.0 {
            *counts.entry(value).or_default() -= 1;
        }

        let mut extra: Vec<&T> = Vec::new();
        let mut missing: Vec<&T> = Vec::new();
        for (value, count) in counts {
            for _ in 0..count.unsigned_abs() {
                if count > 0 {
                    extra.push(value);
                } else {
                    missing.push(value);
                }
            }
        }

        if extra.is_empty() && missing.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "obtained {:?}, expected {:?} (unexpected: {:?}, missing: {:?})",
                obtained, self.0, extra, missing
            ))
        }
    }
}

impl<T: Eq + Hash + Debug> Checker<[T]> for SameContents<T> {
    fn name(&self) -> &'static str {
        "SameContents"
    }

    fn check(&self, obtained: &[T]) -> Result<(), String> {
        self.compare(obtained)
    }
}

impl<T: Eq + Hash + Debug> Checker<Vec<T>> for SameContents<T> {
    fn name(&self) -> &'static str {
        "SameContents"
    }

    fn check(&self, obtained: &Vec<T>) -> Result<(), String> {
        self.compare(obtained)
    }
}

/// The obtained string starts with the given prefix.
#[derive(Debug, Clone)]
pub struct HasPrefix(pub String);

impl<S: AsRef<str> + ?Sized> Checker<S> for HasPrefix {
    fn name(&self) -> &'static str {
        "HasPrefix"
    }

    fn check(&self, obtained: &S) -> Result<(), String> {
        let obtained = obtained.as_ref();
        if obtained.starts_with(&self.0) {
            Ok(())
        } else {
            Err(format!("{:?} does not start with {:?}", obtained, self.0))
        }
    }
}

/// The obtained string ends with the given suffix.
#[derive(Debug, Clone)]
pub struct HasSuffix(pub String);

impl<S: AsRef<str> + ?Sized> Checker<S> for HasSuffix {
    fn name(&self) -> &'static str {
        "HasSuffix"
    }

    fn check(&self, obtained: &S) -> Result<(), String> {
        let obtained = obtained.as_ref();
        if obtained.ends_with(&self.0) {
            Ok(())
        } else {
            Err(format!("{:?} does not end with {:?}", obtained, self.0))
        }
    }
}

/// The obtained string contains the given substring.
#[derive(Debug, Clone)]
pub struct Contains(pub String);

impl<S: AsRef<str> + ?Sized> Checker<S> for Contains {
    fn name(&self) -> &'static str {
        "Contains"
    }

    fn check(&self, obtained: &S) -> Result<(), String> {
        let obtained = obtained.as_ref();
        if obtained.contains(&self.0) {
            Ok(())
        } else {
            Err(format!("{:?} does not contain {:?}", obtained, self.0))
        }
    }
}

/// Obtained bytes decode as JSON equal to the expected value.
///
/// The expected value is re-encoded through JSON before comparison, so
/// structs compare against their serialized form.
#[derive(Debug, Clone)]
pub struct JsonEquals {
    expected: Result<serde_json::Value, String>,
}

impl JsonEquals {
    pub fn new<T: Serialize + ?Sized>(expected: &T) -> Self {
        Self {
            expected: serde_json::to_value(expected)
                .map_err(|err| format!("cannot marshal expected contents: {}", err)),
        }
    }
}

impl<B: AsRef<[u8]> + ?Sized> Checker<B> for JsonEquals {
    fn name(&self) -> &'static str {
        "JsonEquals"
    }

    fn check(&self, obtained: &B) -> Result<(), String> {
        let expected = self.expected.as_ref().map_err(Clone::clone)?;
        let raw = obtained.as_ref();
        let obtained: serde_json::Value = serde_json::from_slice(raw).map_err(|err| {
            format!(
                "cannot unmarshal obtained contents: {}; {:?}",
                err,
                String::from_utf8_lossy(raw)
            )
        })?;
        if &obtained == expected {
            Ok(())
        } else {
            Err(format!("obtained {}, expected {}", obtained, expected))
        }
    }
}

/// Obtained bytes decode as YAML equal to the expected value.
#[derive(Debug, Clone)]
pub struct YamlEquals {
    expected: Result<serde_yaml::Value, String>,
}

impl YamlEquals {
    pub fn new<T: Serialize + ?Sized>(expected: &T) -> Self {
        Self {
            expected: serde_yaml::to_value(expected)
                .map_err(|err| format!("cannot marshal expected contents: {}", err)),
        }
    }
}

impl<B: AsRef<[u8]> + ?Sized> Checker<B> for YamlEquals {
    fn name(&self) -> &'static str {
        "YamlEquals"
    }

    fn check(&self, obtained: &B) -> Result<(), String> {
        let expected = self.expected.as_ref().map_err(Clone::clone)?;
        let raw = obtained.as_ref();
        let obtained: serde_yaml::Value = serde_yaml::from_slice(raw).map_err(|err| {
            format!(
                "cannot unmarshal obtained contents: {}; {:?}",
                err,
                String::from_utf8_lossy(raw)
            )
        })?;
        if &obtained == expected {
            Ok(())
        } else {
            Err(format!("obtained {:?}, expected {:?}", obtained, expected))
        }
    }
}

/// Accepts any value. Useful as a [`MultiChecker`] override.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ignore;

impl<T: ?Sized> Checker<T> for Ignore {
    fn name(&self) -> &'static str {
        "Ignore"
    }

    fn check(&self, _obtained: &T) -> Result<(), String> {
        Ok(())
    }
}

/// Override run at a path: receives the obtained and expected subtrees.
type PathCheck = Box<dyn Fn(&Value, &Value) -> Result<(), String>>;

/// Deep equality over the JSON form of a value, with per-path overrides.
///
/// Paths start empty at the root. Object members append `.name` and array
/// elements append `[index]`, so `.items[1].id` names the `id` of the
/// second item. An override replaces equality for its whole subtree.
/// Exact paths win over patterns; patterns are tried in insertion order.
///
/// ```
/// use serde_json::json;
/// use testbed_core::{Checker, Ignore, MultiChecker};
///
/// let checker = MultiChecker::new(&json!({"id": 1, "created": "2024-01-01"}))
///     .add(".created", Ignore);
/// assert!(checker.check(&json!({"id": 1, "created": "2031-05-05"})).is_ok());
/// assert!(checker.check(&json!({"id": 2, "created": "2024-01-01"})).is_err());
/// ```
pub struct MultiChecker {
    expected: Result<Value, String>,
    checks: HashMap<String, PathCheck>,
    regex_checks: Vec<(Result<Regex, String>, PathCheck)>,
}

impl Debug for MultiChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiChecker")
            .field("expected", &self.expected)
            .field("paths", &self.checks.keys().collect::<Vec<_>>())
            .field("patterns", &self.regex_checks.len())
            .finish()
    }
}

fn boxed<C: Checker<Value> + 'static>(checker: C) -> PathCheck {
    Box::new(move |obtained: &Value, _: &Value| {
        checker
            .check(obtained)
            .map_err(|err| format!("{} check failed: {}", checker.name(), err))
    })
}

impl MultiChecker {
    pub fn new<T: Serialize + ?Sized>(expected: &T) -> Self {
        Self {
            expected: serde_json::to_value(expected)
                .map_err(|err| format!("cannot marshal expected contents: {}", err)),
            checks: HashMap::new(),
            regex_checks: Vec::new(),
        }
    }

    /// Checks the subtree at `path` with `checker` instead of equality.
    #[must_use]
    pub fn add<C: Checker<Value> + 'static>(mut self, path: &str, checker: C) -> Self {
        self.checks.insert(path.to_string(), boxed(checker));
        self
    }

    /// Checks the subtree at `path` with `check(obtained, expected)`.
    #[must_use]
    pub fn add_expected(
        mut self,
        path: &str,
        check: impl Fn(&Value, &Value) -> Result<(), String> + 'static,
    ) -> Self {
        self.checks.insert(path.to_string(), Box::new(check));
        self
    }

    /// Checks every subtree whose path fully matches `pattern` with `checker`.
    #[must_use]
    pub fn add_regex<C: Checker<Value> + 'static>(mut self, pattern: &str, checker: C) -> Self {
        self.regex_checks.push((anchored(pattern), boxed(checker)));
        self
    }

    fn lookup(&self, path: &str) -> Result<Option<&PathCheck>, String> {
        if let Some(check) = self.checks.get(path) {
            return Ok(Some(check));
        }
        for (pattern, check) in &self.regex_checks {
            if pattern.as_ref().map_err(Clone::clone)?.is_match(path) {
                return Ok(Some(check));
            }
        }
        Ok(None)
    }

    fn compare(&self, path: &str, obtained: &Value, expected: &Value) -> Result<(), String> {
        let at = if path.is_empty() { "top level" } else { path };
        if let Some(check) = self.lookup(path)? {
            return check(obtained, expected).map_err(|err| format!("mismatch at {}: {}", at, err));
        }
        match (obtained, expected) {
            (Value::Array(got), Value::Array(want)) => {
                if got.len() != want.len() {
                    return Err(format!(
                        "mismatch at {}: length mismatch, {} vs {}; obtained {}; expected {}",
                        at,
                        got.len(),
                        want.len(),
                        obtained,
                        expected
                    ));
                }
                for (i, (g, w)) in got.iter().zip(want).enumerate() {
                    self.compare(&format!("{}[{}]", path, i), g, w)?;
                }
                Ok(())
            }
            (Value::Object(got), Value::Object(want)) => {
                for (key, w) in want {
                    match got.get(key) {
                        Some(g) => self.compare(&format!("{}.{}", path, key), g, w)?,
                        None => return Err(format!("mismatch at {}: member {:?} is missing", at, key)),
                    }
                }
                if let Some(key) = got.keys().find(|key| !want.contains_key(*key)) {
                    return Err(format!("mismatch at {}: unexpected member {:?}", at, key));
                }
                Ok(())
            }
            _ if obtained == expected => Ok(()),
            _ => Err(format!(
                "mismatch at {}: obtained {}, expected {}",
                at, obtained, expected
            )),
        }
    }
}

impl<T: Serialize + ?Sized> Checker<T> for MultiChecker {
    fn name(&self) -> &'static str {
        "MultiChecker"
    }

    fn check(&self, obtained: &T) -> Result<(), String> {
        let expected = self.expected.as_ref().map_err(Clone::clone)?;
        let obtained = serde_json::to_value(obtained)
            .map_err(|err| format!("cannot marshal obtained contents: {}", err))?;
        self.compare("", &obtained, expected)
    }
}

/// The obtained error's message matches an anchored regular expression.
#[derive(Debug, Clone)]
pub struct ErrorMatches {
    pattern: Result<Regex, String>,
}

impl ErrorMatches {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: anchored(pattern),
        }
    }
}

impl<E: Display + ?Sized> Checker<E> for ErrorMatches {
    fn name(&self) -> &'static str {
        "ErrorMatches"
    }

    fn check(&self, obtained: &E) -> Result<(), String> {
        let pattern = self.pattern.as_ref().map_err(Clone::clone)?;
        let message = obtained.to_string();
        if pattern.is_match(&message) {
            Ok(())
        } else {
            Err(format!("error {:?} does not match {:?}", message, pattern.as_str()))
        }
    }
}

/// The obtained error, or any error in its `source()` chain, equals the
/// target.
///
/// Links are compared by downcasting to `T`, so wrapped errors of other
/// types are skipped rather than rejected.
#[derive(Debug, Clone)]
pub struct ErrorIs<T>(pub T);

impl<T, E> Checker<E> for ErrorIs<T>
where
    T: Error + PartialEq + 'static,
    E: Error + 'static,
{
    fn name(&self) -> &'static str {
        "ErrorIs"
    }

    fn check(&self, obtained: &E) -> Result<(), String> {
        let mut link: Option<&(dyn Error + 'static)> = Some(obtained);
        while let Some(err) = link {
            if err.downcast_ref::<T>() == Some(&self.0) {
                return Ok(());
            }
            link = err.source();
        }
        Err(format!("error {:?} is not {:?}", obtained.to_string(), self.0.to_string()))
    }
}

/// A closure panics with a message matching an anchored regular expression.
///
/// Closures that mutate their environment are `FnOnce`/`FnMut`, so this is
/// driven through [`PanicMatches::check_fn`] or
/// [`TestContext::check_panics`](crate::TestContext::check_panics) rather
/// than the `Checker` trait.
#[derive(Debug, Clone)]
pub struct PanicMatches {
    pattern: Result<Regex, String>,
}

impl PanicMatches {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: anchored(pattern),
        }
    }

    /// Runs `f` and checks the panic it raises.
    pub fn check_fn<F: FnOnce()>(&self, f: F) -> Result<(), String> {
        let pattern = self.pattern.as_ref().map_err(Clone::clone)?;
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(()) => Err("function did not panic".to_string()),
            Err(payload) => {
                let message = panic_message(&*payload);
                if pattern.is_match(&message) {
                    Ok(())
                } else {
                    Err(format!(
                        "panic message {:?} does not match {:?}",
                        message,
                        pattern.as_str()
                    ))
                }
            }
        }
    }
}

/// The obtained time lies within an inclusive range.
///
/// The bounds are swapped if given in reverse order.
#[derive(Debug, Clone, Copy)]
pub struct TimeBetween {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeBetween {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    fn compare(&self, when: DateTime<Utc>) -> Result<(), String> {
        if when < self.start {
            return Err(format!(
                "obtained time {} is before start time {}",
                when, self.start
            ));
        }
        if when > self.end {
            return Err(format!("obtained time {} is after end time {}", when, self.end));
        }
        Ok(())
    }
}

/// The obtained time is strictly after the wanted time.
#[derive(Debug, Clone, Copy)]
pub struct After(pub DateTime<Utc>);

/// The obtained time is strictly before the wanted time.
#[derive(Debug, Clone, Copy)]
pub struct Before(pub DateTime<Utc>);

/// The obtained time is within one second of the wanted time, either side.
#[derive(Debug, Clone, Copy)]
pub struct Almost(pub DateTime<Utc>);

impl After {
    fn compare(&self, when: DateTime<Utc>) -> Result<(), String> {
        if when > self.0 {
            Ok(())
        } else {
            Err(format!("obtained time {} is not after {}", when, self.0))
        }
    }
}

impl Before {
    fn compare(&self, when: DateTime<Utc>) -> Result<(), String> {
        if when < self.0 {
            Ok(())
        } else {
            Err(format!("obtained time {} is not before {}", when, self.0))
        }
    }
}

impl Almost {
    fn compare(&self, when: DateTime<Utc>) -> Result<(), String> {
        if (when - self.0).abs() <= TimeDelta::seconds(1) {
            Ok(())
        } else {
            Err(format!("obtained time {} is not within 1s of {}", when, self.0))
        }
    }
}

/// Implements `Checker` for both `DateTime<Utc>` and `SystemTime` on top
/// of an inherent `compare`.
macro_rules! time_checker {
    ($($ty:ident),+) => {$(
        impl Checker<DateTime<Utc>> for $ty {
            fn name(&self) -> &'static str {
                stringify!($ty)
            }

            fn check(&self, obtained: &DateTime<Utc>) -> Result<(), String> {
                self.compare(*obtained)
            }
        }

        impl Checker<SystemTime> for $ty {
            fn name(&self) -> &'static str {
                stringify!($ty)
            }

            fn check(&self, obtained: &SystemTime) -> Result<(), String> {
                self.compare(DateTime::<Utc>::from(*obtained))
            }
        }
    )+};
}

time_checker!(TimeBetween, After, Before, Almost);

/// The obtained duration is strictly shorter than the limit.
#[derive(Debug, Clone, Copy)]
pub struct DurationLessThan(pub Duration);

impl Checker<Duration> for DurationLessThan {
    fn name(&self) -> &'static str {
        "DurationLessThan"
    }

    fn check(&self, obtained: &Duration) -> Result<(), String> {
        if *obtained < self.0 {
            Ok(())
        } else {
            Err(format!("{:?} is not less than {:?}", obtained, self.0))
        }
    }
}
