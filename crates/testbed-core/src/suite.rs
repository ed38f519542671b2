//! Suite lifecycle hooks and a runner that drives them.

use crate::context::panic_message;
use crate::{Failure, TagFilter, TestContext};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Lifecycle hooks delivered by a [`SuiteRunner`].
///
/// For each suite the runner delivers `set_up_suite`, then
/// `set_up_test`/`tear_down_test` around every test body, then
/// `tear_down_suite`. Suite types that embed a `CleanupSuite` forward each
/// hook to it.
pub trait Suite {
    fn set_up_suite(&mut self, _c: &mut TestContext) {}

    fn tear_down_suite(&mut self, _c: &mut TestContext) {}

    fn set_up_test(&mut self, _c: &mut TestContext) {}

    fn tear_down_test(&mut self, _c: &mut TestContext) {}
}

type TestBody<S> = Box<dyn Fn(&mut S, &mut TestContext)>;

struct TestCase<S> {
    name: String,
    tags: Vec<String>,
    body: TestBody<S>,
}

/// How a single test ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed(Vec<Failure>),
    Skipped(String),
}

/// Result of one test in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub name: String,
    pub outcome: TestOutcome,
    /// Lines logged to the test's context.
    pub output: Vec<String>,
}

/// Results of a whole suite run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub suite: String,
    pub results: Vec<TestResult>,
    /// Failures reported by suite-level hooks and cleanups.
    pub suite_failures: Vec<Failure>,
}

impl RunReport {
    /// Returns the result for the named test.
    pub fn result(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn passed_count(&self) -> usize {
        self.count(|o| matches!(o, TestOutcome::Passed))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, TestOutcome::Failed(_)))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, TestOutcome::Skipped(_)))
    }

    fn count(&self, pred: impl Fn(&TestOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Returns true if no test and no suite hook failed.
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0 && self.suite_failures.is_empty()
    }

    /// Panics with every failure if the run was not a success.
    #[track_caller]
    pub fn assert_passed(&self) {
        if !self.is_success() {
            panic!("{}", self);
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "suite {}: {} passed, {} failed, {} skipped",
            self.suite,
            self.passed_count(),
            self.failed_count(),
            self.skipped_count()
        )?;
        for failure in &self.suite_failures {
            write!(f, "\n  [suite] {}", failure)?;
        }
        for result in &self.results {
            if let TestOutcome::Failed(failures) = &result.outcome {
                for failure in failures {
                    write!(f, "\n  [{}] {}", result.name, failure)?;
                }
            }
        }
        Ok(())
    }
}

/// Runs named test bodies against a suite value.
///
/// ```
/// use testbed_core::{CleanupSuite, SuiteRunner};
///
/// let report = SuiteRunner::<CleanupSuite>::new("arith")
///     .test("adds", |_, c| {
///         c.check_eq(&(1 + 1), &2);
///     })
///     .run(&mut CleanupSuite::new());
/// report.assert_passed();
/// ```
pub struct SuiteRunner<S> {
    name: String,
    filter: TagFilter,
    tests: Vec<TestCase<S>>,
}

impl<S> fmt::Debug for SuiteRunner<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteRunner")
            .field("name", &self.name)
            .field("filter", &self.filter)
            .field("tests", &self.tests.iter().map(|t| &t.name).collect::<Vec<_>>())
            .finish()
    }
}

impl<S: Suite> SuiteRunner<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter: TagFilter::default(),
            tests: Vec::new(),
        }
    }

    /// Sets the filter deciding which tagged tests run.
    pub fn with_filter(mut self, filter: TagFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Adds an untagged test. Untagged tests always run.
    pub fn test(
        self,
        name: impl Into<String>,
        body: impl Fn(&mut S, &mut TestContext) + 'static,
    ) -> Self {
        self.tagged_test(name, &[], body)
    }

    /// Adds a test that runs only if one of `tags` passes the filter.
    pub fn tagged_test(
        mut self,
        name: impl Into<String>,
        tags: &[&str],
        body: impl Fn(&mut S, &mut TestContext) + 'static,
    ) -> Self {
        self.tests.push(TestCase {
            name: name.into(),
            tags: tags.iter().map(ToString::to_string).collect(),
            body: Box::new(body),
        });
        self
    }

    /// Runs every selected test against `suite`.
    ///
    /// A panicking test body is recorded as a failure of that test. A
    /// panicking lifecycle hook propagates, after `tear_down_suite` has
    /// been delivered so suite-scoped restores still run.
    pub fn run(&self, suite: &mut S) -> RunReport {
        debug!(suite = %self.name, tests = self.tests.len(), "Running suite");
        let mut report = RunReport {
            suite: self.name.clone(),
            ..RunReport::default()
        };

        let state = (suite, TestContext::new(format!("{}::suite", self.name)));
        let mut state = scopeguard::guard_on_unwind(state, |(suite, mut sc)| {
            warn!(suite = %sc.name(), "Lifecycle hook panicked; tearing down suite");
            suite.tear_down_suite(&mut sc);
        });

        {
            let (suite, sc) = &mut *state;
            suite.set_up_suite(sc);
            for case in &self.tests {
                report.results.push(self.run_test(case, suite));
            }
        }

        let (suite, mut sc) = scopeguard::ScopeGuard::into_inner(state);
        suite.tear_down_suite(&mut sc);
        report.suite_failures = sc.take_failures();
        sc.finish();

        debug!(
            suite = %report.suite,
            passed = report.passed_count(),
            failed = report.failed_count(),
            skipped = report.skipped_count(),
            "Suite finished"
        );
        report
    }

    fn run_test(&self, case: &TestCase<S>, suite: &mut S) -> TestResult {
        let mut c = TestContext::new(case.name.clone());

        let tags: Vec<&str> = case.tags.iter().map(String::as_str).collect();
        if !tags.is_empty() && self.filter.require_tag(&mut c, &tags) {
            let reason = c.skipped().unwrap_or_default().to_string();
            c.finish();
            return TestResult {
                name: case.name.clone(),
                outcome: TestOutcome::Skipped(reason),
                output: Vec::new(),
            };
        }

        debug!(test = %case.name, "Starting test");
        suite.set_up_test(&mut c);
        let result = panic::catch_unwind(AssertUnwindSafe(|| (case.body)(suite, &mut c)));
        if let Err(payload) = result {
            c.fail(format!("test panicked: {}", panic_message(&*payload)));
        }
        suite.tear_down_test(&mut c);

        let output = c.take_output();
        let failures = c.take_failures();
        let outcome = if !failures.is_empty() {
            TestOutcome::Failed(failures)
        } else if let Some(reason) = c.skipped() {
            TestOutcome::Skipped(reason.to_string())
        } else {
            TestOutcome::Passed
        };
        c.finish();

        debug!(test = %case.name, outcome = ?outcome, "Finished test");
        TestResult {
            name: case.name.clone(),
            outcome,
            output,
        }
    }
}
