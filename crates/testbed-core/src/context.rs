//! Test context: the failure-reporting handle passed to every test.
//!
//! Checks on a `TestContext` never abort the test. Failures accumulate with
//! the caller's source location and are surfaced together when the context
//! is finished, so one run can report several mismatches.

use crate::checkers::{Checker, PanicMatches};
use std::any::Any;
use std::fmt;
use std::panic::Location;
use tracing::{debug, warn};

/// A single non-fatal failure recorded against a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// What went wrong.
    pub message: String,

    /// `file:line:column` of the check that failed.
    pub location: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Per-test handle for recording failures, log output and skips.
///
/// Failures must be consumed, either by [`TestContext::finish`] or
/// [`TestContext::take_failures`]. Dropping a context that still holds
/// failures panics unless the thread is already panicking.
#[derive(Debug)]
pub struct TestContext {
    name: String,
    failures: Vec<Failure>,
    output: Vec<String>,
    skipped: Option<String>,
    finished: bool,
}

impl TestContext {
    /// Creates a context for the named test.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failures: Vec::new(),
            output: Vec::new(),
            skipped: None,
            finished: false,
        }
    }

    /// Returns the test name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records a failure at the caller's location.
    #[track_caller]
    pub fn fail(&mut self, message: impl Into<String>) {
        let failure = Failure {
            message: message.into(),
            location: Location::caller().to_string(),
        };
        warn!(test = %self.name, location = %failure.location, "{}", failure.message);
        self.failures.push(failure);
    }

    /// Records a failure unless `condition` holds. Returns `condition`.
    #[track_caller]
    pub fn check(&mut self, condition: bool, message: impl Into<String>) -> bool {
        if !condition {
            self.fail(message);
        }
        condition
    }

    /// Checks that `obtained` equals `expected`.
    #[track_caller]
    pub fn check_eq<T>(&mut self, obtained: &T, expected: &T) -> bool
    where
        T: PartialEq + fmt::Debug + ?Sized,
    {
        if obtained == expected {
            return true;
        }
        self.fail(format!(
            "values differ\n  obtained: {:?}\n  expected: {:?}",
            obtained, expected
        ));
        false
    }

    /// Runs `checker` against `obtained`.
    #[track_caller]
    pub fn check_that<T, C>(&mut self, obtained: &T, checker: C) -> bool
    where
        T: ?Sized,
        C: Checker<T>,
    {
        match checker.check(obtained) {
            Ok(()) => true,
            Err(reason) => {
                self.fail(format!("{} check failed: {}", checker.name(), reason));
                false
            }
        }
    }

    /// Checks that `f` panics with a message matching `pattern`.
    ///
    /// The pattern is anchored at both ends.
    #[track_caller]
    pub fn check_panics<F: FnOnce()>(&mut self, f: F, pattern: &str) -> bool {
        match PanicMatches::new(pattern).check_fn(f) {
            Ok(()) => true,
            Err(reason) => {
                self.fail(format!("PanicMatches check failed: {}", reason));
                false
            }
        }
    }

    /// Appends a line to the test's output.
    pub fn log(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    /// Returns the output lines logged so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Takes the logged output lines.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Marks the test as skipped.
    pub fn skip(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(test = %self.name, reason = %reason, "Skipping test");
        self.skipped = Some(reason);
    }

    /// Returns the skip reason, if the test was skipped.
    pub fn skipped(&self) -> Option<&str> {
        self.skipped.as_deref()
    }

    /// Returns true if any failure was recorded.
    pub fn failed(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns the failures recorded so far.
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Takes the recorded failures, leaving the context clean.
    pub fn take_failures(&mut self) -> Vec<Failure> {
        std::mem::take(&mut self.failures)
    }

    /// Ends the test, panicking with every recorded failure.
    pub fn finish(mut self) {
        self.finished = true;
        if !self.failures.is_empty() {
            panic!("{}", self.summary());
        }
    }

    fn summary(&self) -> String {
        let mut summary = format!(
            "test {} failed with {} failure(s):",
            self.name,
            self.failures.len()
        );
        for failure in &self.failures {
            summary.push_str("\n  ");
            summary.push_str(&failure.to_string());
        }
        if !self.output.is_empty() {
            summary.push_str("\noutput:");
            for line in &self.output {
                summary.push_str("\n  ");
                summary.push_str(line);
            }
        }
        summary
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if !self.finished && !self.failures.is_empty() && !std::thread::panicking() {
            panic!("{}", self.summary());
        }
    }
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_records_failure_and_continues() {
        let mut c = TestContext::new("check");

        assert!(c.check(true, "never recorded"));
        assert!(!c.check(false, "first"));
        assert!(!c.check(1 + 1 == 3, "second"));

        let failures = c.take_failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].message, "first");
        assert_eq!(failures[1].message, "second");
    }

    #[test]
    fn test_failure_location_points_at_caller() {
        let mut c = TestContext::new("location");
        c.fail("here");

        let failures = c.take_failures();
        assert!(failures[0].location.contains("context.rs"));
    }

    #[test]
    fn test_check_eq_reports_both_values() {
        let mut c = TestContext::new("eq");
        assert!(c.check_eq(&vec![1, 2], &vec![1, 2]));
        assert!(!c.check_eq("left", "right"));

        let failures = c.take_failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("\"left\""));
        assert!(failures[0].message.contains("\"right\""));
    }

    #[test]
    fn test_finish_panics_with_all_failures() {
        let result = std::panic::catch_unwind(|| {
            let mut c = TestContext::new("finish");
            c.fail("one");
            c.fail("two");
            c.finish();
        });

        let payload = result.unwrap_err();
        let message = panic_message(&*payload);
        assert!(message.contains("2 failure(s)"));
        assert!(message.contains("one"));
        assert!(message.contains("two"));
    }

    #[test]
    fn test_finish_without_failures_is_silent() {
        let mut c = TestContext::new("clean");
        c.log("some output");
        c.finish();
    }

    #[test]
    fn test_drop_with_unreported_failures_panics() {
        let result = std::panic::catch_unwind(|| {
            let mut c = TestContext::new("dropped");
            c.fail("lost?");
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_skip_and_output() {
        let mut c = TestContext::new("skip");
        assert!(c.skipped().is_none());
        c.log("line");
        c.skip("no matching tags");

        assert_eq!(c.skipped(), Some("no matching tags"));
        assert_eq!(c.output(), ["line".to_string()]);
        assert!(!c.failed());
    }

    #[test]
    fn test_check_panics() {
        let mut c = TestContext::new("panics");
        assert!(c.check_panics(|| panic!("boom 42"), r"boom \d+"));
        assert!(!c.check_panics(|| {}, "boom"));

        let failures = c.take_failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("did not panic"));
    }
}
