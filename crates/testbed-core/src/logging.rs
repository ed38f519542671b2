//! Log capture for suites.
//!
//! `LoggingSuite` routes `tracing` events emitted during a suite or test
//! into an in-memory buffer and attaches the captured lines to the test's
//! output when the scope ends.

use crate::config::DEFAULT_LOG_FILTER;
use crate::{CleanupSuite, Suite, TestContext, TestbedConfig};
use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// In-memory sink for formatted log lines. Clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything captured so far.
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Returns the captured lines.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(ToString::to_string).collect()
    }

    pub fn clear(&self) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Writer handed to the formatter for each event.
#[derive(Debug)]
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// A [`CleanupSuite`] that also captures log output.
///
/// At suite start and at each test start a thread-local subscriber is
/// installed that writes into a fresh [`LogCapture`]. The subscriber is
/// removed by a cleanup registered at the same scope, which also copies
/// the captured lines into the context's output.
#[derive(Debug)]
pub struct LoggingSuite {
    cleanup: CleanupSuite,
    filter: String,
    suite_capture: Option<LogCapture>,
    test_capture: Option<LogCapture>,
}

impl Default for LoggingSuite {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingSuite {
    pub fn new() -> Self {
        Self::with_filter(DEFAULT_LOG_FILTER)
    }

    /// Captures events selected by an `EnvFilter` directive.
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            cleanup: CleanupSuite::new(),
            filter: filter.into(),
            suite_capture: None,
            test_capture: None,
        }
    }

    pub fn from_config(config: &TestbedConfig) -> Self {
        Self::with_filter(config.logging.clone())
    }

    /// Lines captured in the current test, or in the suite outside a test.
    pub fn log_output(&self) -> Vec<String> {
        self.test_capture
            .as_ref()
            .or(self.suite_capture.as_ref())
            .map(LogCapture::lines)
            .unwrap_or_default()
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|e| {
            warn!(filter = %self.filter, error = %e, "Invalid log filter, using default");
            EnvFilter::new(DEFAULT_LOG_FILTER)
        })
    }

    fn install(&mut self) -> LogCapture {
        let capture = LogCapture::new();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .without_time()
            .with_env_filter(self.env_filter())
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);

        let captured = capture.clone();
        self.cleanup.add_cleanup(move |c| {
            drop(guard);
            for line in captured.lines() {
                c.log(line);
            }
        });
        capture
    }
}

impl Deref for LoggingSuite {
    type Target = CleanupSuite;

    fn deref(&self) -> &CleanupSuite {
        &self.cleanup
    }
}

impl DerefMut for LoggingSuite {
    fn deref_mut(&mut self) -> &mut CleanupSuite {
        &mut self.cleanup
    }
}

impl Suite for LoggingSuite {
    fn set_up_suite(&mut self, c: &mut TestContext) {
        self.cleanup.set_up_suite(c);
        self.suite_capture = Some(self.install());
    }

    fn tear_down_suite(&mut self, c: &mut TestContext) {
        self.test_capture = None;
        self.cleanup.tear_down_suite(c);
        self.suite_capture = None;
    }

    fn set_up_test(&mut self, c: &mut TestContext) {
        self.cleanup.set_up_test(c);
        self.test_capture = Some(self.install());
    }

    fn tear_down_test(&mut self, c: &mut TestContext) {
        self.cleanup.tear_down_test(c);
        self.test_capture = None;
    }
}
