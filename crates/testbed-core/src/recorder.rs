//! Call recorder backing stub, mock and fake test doubles.
//!
//! A `CallRecorder` logs every call made on a test double, in order, and
//! hands out programmed errors in the same order the calls arrive. It is a
//! cheap shared handle: facades representing different interfaces clone the
//! same recorder so their calls interleave into one chronological history.
//!
//! # Example
//!
//! ```
//! use testbed_core::{CallRecorder, TestContext};
//! use testbed_proto::{Receiver, StubError, args};
//!
//! struct StubConn {
//!     recorder: CallRecorder,
//!     receiver: Receiver,
//! }
//!
//! impl StubConn {
//!     fn send(&self, request: &str) -> Result<(), StubError> {
//!         self.recorder.record_method_call(&self.receiver, "Send", args![request]);
//!         self.recorder.next_error()
//!     }
//! }
//!
//! let recorder = CallRecorder::new();
//! let conn = StubConn { recorder: recorder.clone(), receiver: Receiver::of::<StubConn>() };
//! recorder.set_errors([Ok(()), Err(StubError::new("<failure>"))]);
//!
//! assert!(conn.send("ping").is_ok());
//! assert!(conn.send("pong").is_err());
//!
//! let mut c = TestContext::new("doc");
//! recorder.check_call(&mut c, 1, "Send", args!["pong"]);
//! recorder.check_call_names(&mut c, &["Send", "Send"]);
//! c.finish();
//! ```

use crate::TestContext;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use testbed_proto::{Arg, Call, Receiver, StubError};
use tracing::trace;

/// How an expected call treats the receiver of the recorded call.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ReceiverMatch {
    /// The receiver is not checked.
    #[default]
    Any,
    /// The call must have been recorded without a receiver.
    Free,
    /// The call must have been recorded on this receiver.
    Is(Receiver),
}

/// A call a test expects to find in a recorder's history.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedCall {
    pub name: String,
    pub args: Vec<Arg>,
    pub receiver: ReceiverMatch,
}

impl ExpectedCall {
    /// Expects a call by name and arguments, with any receiver.
    pub fn new(name: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            name: name.into(),
            args,
            receiver: ReceiverMatch::Any,
        }
    }

    /// Requires the call to have been made on `receiver`.
    pub fn on(mut self, receiver: &Receiver) -> Self {
        self.receiver = ReceiverMatch::Is(receiver.clone());
        self
    }

    /// Requires the call to have been made without a receiver.
    pub fn free(mut self) -> Self {
        self.receiver = ReceiverMatch::Free;
        self
    }

    /// Describes how `call` differs from this expectation, if it does.
    fn mismatch(&self, call: &Call) -> Option<String> {
        let mut problems = Vec::new();
        if call.name != self.name {
            problems.push(format!("name {:?}, expected {:?}", call.name, self.name));
        }
        if call.args != self.args {
            problems.push(format!("args {:?}, expected {:?}", call.args, self.args));
        }
        match (&self.receiver, &call.receiver) {
            (ReceiverMatch::Any, _) | (ReceiverMatch::Free, None) => {}
            (ReceiverMatch::Free, Some(actual)) => {
                problems.push(format!("receiver {}, expected none", actual));
            }
            (ReceiverMatch::Is(expected), actual) if actual.as_ref() != Some(expected) => {
                let actual = actual
                    .as_ref()
                    .map_or_else(|| "none".to_string(), ToString::to_string);
                problems.push(format!("receiver {}, expected {}", actual, expected));
            }
            (ReceiverMatch::Is(_), _) => {}
        }
        if problems.is_empty() {
            None
        } else {
            Some(problems.join("; "))
        }
    }
}

impl From<Call> for ExpectedCall {
    /// Expects exactly this call, receiver included.
    fn from(call: Call) -> Self {
        let receiver = match call.receiver {
            Some(receiver) => ReceiverMatch::Is(receiver),
            None => ReceiverMatch::Free,
        };
        Self {
            name: call.name,
            args: call.args,
            receiver,
        }
    }
}

#[derive(Debug)]
struct RecorderState<E> {
    /// Calls in the order they were made.
    calls: Vec<Call>,
    /// Programmed results, consumed from the front.
    pending: VecDeque<Result<(), E>>,
    /// Returned once `pending` is exhausted.
    default_error: Option<E>,
}

impl<E> Default for RecorderState<E> {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            pending: VecDeque::new(),
            default_error: None,
        }
    }
}

/// Records calls on test doubles and dispenses programmed errors.
///
/// Cloning a recorder yields another handle to the same history.
pub struct CallRecorder<E = StubError> {
    state: Arc<Mutex<RecorderState<E>>>,
}

impl<E> Clone for CallRecorder<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<E> Default for CallRecorder<E> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState::default())),
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for CallRecorder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("CallRecorder")
            .field("calls", &state.calls)
            .field("pending", &state.pending)
            .field("default_error", &state.default_error)
            .finish()
    }
}

impl<E> CallRecorder<E> {
    /// Creates an empty recorder with no programmed errors.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RecorderState<E>> {
        // History stays readable after a test double panicked mid-call.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, call: Call) {
        trace!(call = %call, "Recorded call");
        self.state().calls.push(call);
    }

    /// Records a free-function call.
    pub fn add_call(&self, name: impl Into<String>, args: Vec<Arg>) {
        self.push(Call::new(name, args));
    }

    /// Records a method call made on `receiver`.
    pub fn record_method_call(&self, receiver: &Receiver, name: impl Into<String>, args: Vec<Arg>) {
        self.push(Call::method(receiver.clone(), name, args));
    }

    /// Replaces the programmed results.
    ///
    /// Each call to [`next_error`](Self::next_error) consumes one entry;
    /// `Ok(())` entries let calls succeed before a later one fails.
    pub fn set_errors(&self, errors: impl IntoIterator<Item = Result<(), E>>) {
        self.state().pending = errors.into_iter().collect();
    }

    /// Sets the error returned once the programmed results run out.
    pub fn set_default_error(&self, error: Option<E>) {
        self.state().default_error = error;
    }

    /// Returns a snapshot of the recorded calls.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Returns the recorded call names, in order.
    pub fn call_names(&self) -> Vec<String> {
        self.state().calls.iter().map(|c| c.name.clone()).collect()
    }

    /// Returns the receiver of each recorded call, in order.
    pub fn receivers(&self) -> Vec<Option<Receiver>> {
        self.state().calls.iter().map(|c| c.receiver.clone()).collect()
    }

    /// Returns the number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Clears the history, the programmed results and the default error.
    pub fn reset(&self) {
        *self.state() = RecorderState::default();
    }

    /// Checks that the recorded names match `expected`, ignoring arguments
    /// and receivers.
    #[track_caller]
    pub fn check_call_names(&self, c: &mut TestContext, expected: &[&str]) -> bool {
        let names = self.call_names();
        if names.iter().map(String::as_str).eq(expected.iter().copied()) {
            return true;
        }
        c.fail(format!(
            "call names differ\n  obtained: {:?}\n  expected: {:?}",
            names, expected
        ));
        false
    }

    /// Checks the full history against `expected`.
    ///
    /// The name sequence is compared first so that a wrong call order or
    /// count is reported on its own. When the names agree, each call that
    /// differs in arguments or receiver is reported separately.
    #[track_caller]
    pub fn check_calls(&self, c: &mut TestContext, expected: &[ExpectedCall]) -> bool {
        let expected_names: Vec<&str> = expected.iter().map(|e| e.name.as_str()).collect();
        if !self.check_call_names(c, &expected_names) {
            return false;
        }

        let calls = self.calls();
        let mut ok = true;
        for (index, (call, want)) in calls.iter().zip(expected).enumerate() {
            if let Some(problem) = want.mismatch(call) {
                c.fail(format!("call {} ({}) differs: {}", index, call, problem));
                ok = false;
            }
        }
        ok
    }

    /// Checks the call at `index` by name and arguments. The receiver is not
    /// checked. An out-of-range index is reported as a failure.
    #[track_caller]
    pub fn check_call(
        &self,
        c: &mut TestContext,
        index: usize,
        name: &str,
        args: Vec<Arg>,
    ) -> bool {
        let calls = self.calls();
        let Some(call) = calls.get(index) else {
            c.fail(format!(
                "call index {} out of range: {} call(s) recorded",
                index,
                calls.len()
            ));
            return false;
        };
        match ExpectedCall::new(name, args).mismatch(call) {
            None => true,
            Some(problem) => {
                c.fail(format!("call {} ({}) differs: {}", index, call, problem));
                false
            }
        }
    }
}

impl<E: Clone> CallRecorder<E> {
    /// Returns the result programmed for the current call.
    ///
    /// Pops the front of the programmed results, or returns the default
    /// error (`Ok(())` when none was set) once they run out. Call exactly
    /// once per recorded call that returns an error.
    pub fn next_error(&self) -> Result<(), E> {
        let mut state = self.state();
        if let Some(next) = state.pending.pop_front() {
            return next;
        }
        match &state.default_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Returns the programmed results not yet consumed.
    pub fn pending_errors(&self) -> Vec<Result<(), E>> {
        self.state().pending.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testbed_proto::args;

    fn failure(message: &str) -> StubError {
        StubError::new(message)
    }

    struct FacadeA {
        recorder: CallRecorder,
        receiver: Receiver,
    }

    impl FacadeA {
        fn a_method(&self, a: i32, b: i32, c: i32) -> Result<(), StubError> {
            self.recorder
                .record_method_call(&self.receiver, "aMethod", args![a, b, c]);
            self.recorder.next_error()
        }

        fn other_method(&self, values: &[&str]) -> Result<(), StubError> {
            self.recorder
                .record_method_call(&self.receiver, "otherMethod", args![values.to_vec()]);
            self.recorder.next_error()
        }
    }

    struct FacadeB {
        recorder: CallRecorder,
        receiver: Receiver,
    }

    impl FacadeB {
        fn a_method(&self) -> Result<(), StubError> {
            self.recorder.record_method_call(&self.receiver, "aMethod", args![]);
            self.recorder.next_error()
        }

        fn a_func(&self, value: &str) -> Result<(), StubError> {
            self.recorder.add_call("aFunc", args![value]);
            self.recorder.next_error()
        }
    }

    fn facades(recorder: &CallRecorder) -> (FacadeA, FacadeB) {
        (
            FacadeA {
                recorder: recorder.clone(),
                receiver: Receiver::of::<FacadeA>(),
            },
            FacadeB {
                recorder: recorder.clone(),
                receiver: Receiver::of::<FacadeB>(),
            },
        )
    }

    #[test]
    fn test_next_error_sequence() {
        let recorder = CallRecorder::new();
        recorder.set_errors([Err(failure("<failure 1>")), Err(failure("<failure 2>"))]);

        assert_eq!(recorder.next_error(), Err(failure("<failure 1>")));
        assert_eq!(recorder.next_error(), Err(failure("<failure 2>")));
    }

    #[test]
    fn test_next_error_pops() {
        let recorder = CallRecorder::new();
        recorder.set_errors([Err(failure("<failure 1>")), Err(failure("<failure 2>"))]);

        let _ = recorder.next_error();

        assert_eq!(recorder.pending_errors(), vec![Err(failure("<failure 2>"))]);
    }

    #[test]
    fn test_next_error_empty_is_ok() {
        let recorder: CallRecorder = CallRecorder::new();
        assert_eq!(recorder.next_error(), Ok(()));
        assert_eq!(recorder.next_error(), Ok(()));
    }

    #[test]
    fn test_next_error_default() {
        let recorder = CallRecorder::new();
        recorder.set_default_error(Some(failure("<failure>")));

        assert_eq!(recorder.next_error(), Err(failure("<failure>")));
        assert_eq!(recorder.next_error(), Err(failure("<failure>")));
    }

    #[test]
    fn test_next_error_placeholder_overrides_default() {
        let recorder = CallRecorder::new();
        recorder.set_default_error(Some(failure("<failure>")));
        recorder.set_errors([Ok(())]);

        assert_eq!(recorder.next_error(), Ok(()));
        assert_eq!(recorder.next_error(), Err(failure("<failure>")));
    }

    #[test]
    fn test_next_error_skip() {
        let recorder = CallRecorder::new();
        recorder.set_errors([Ok(()), Ok(()), Err(failure("<failure>"))]);

        assert_eq!(recorder.next_error(), Ok(()));
        assert_eq!(recorder.next_error(), Ok(()));
        assert_eq!(recorder.next_error(), Err(failure("<failure>")));
        assert_eq!(recorder.next_error(), Ok(()));
    }

    #[test]
    fn test_set_errors_replaces_queue() {
        let recorder = CallRecorder::new();
        recorder.set_errors([Err(failure("old")), Err(failure("older"))]);
        recorder.set_errors([Err(failure("new"))]);

        assert_eq!(recorder.pending_errors(), vec![Err(failure("new"))]);
    }

    #[test]
    fn test_shared_recorder_interleaves_facades() {
        let recorder = CallRecorder::new();
        recorder.set_errors([Err(failure("<failure 1>")), Ok(()), Ok(()), Err(failure("<failure 2>"))]);
        let (a, b) = facades(&recorder);

        let err1 = a.a_method(1, 2, 3);
        let err2 = a.other_method(&["spam"]);
        let err3 = b.a_method();
        let err4 = b.a_func("eggs");

        assert_eq!(err1, Err(failure("<failure 1>")));
        assert_eq!(err2, Ok(()));
        assert_eq!(err3, Ok(()));
        assert_eq!(err4, Err(failure("<failure 2>")));

        let mut c = TestContext::new("interleave");
        assert!(recorder.check_calls(
            &mut c,
            &[
                ExpectedCall::new("aMethod", args![1, 2, 3]).on(&a.receiver),
                ExpectedCall::new("otherMethod", args![vec!["spam"]]).on(&a.receiver),
                ExpectedCall::new("aMethod", args![]).on(&b.receiver),
                ExpectedCall::new("aFunc", args!["eggs"]).free(),
            ],
        ));
        assert_eq!(
            recorder.receivers(),
            vec![
                Some(a.receiver.clone()),
                Some(a.receiver.clone()),
                Some(b.receiver.clone()),
                None,
            ]
        );
        c.finish();
    }

    #[test]
    fn test_add_call_preserves_order_and_args() {
        let recorder: CallRecorder = CallRecorder::new();
        recorder.add_call("first", args![1]);
        recorder.add_call("second", args!["x", true]);
        recorder.add_call("first", args![]);

        let calls = recorder.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], Call::new("first", args![1]));
        assert_eq!(calls[1], Call::new("second", args!["x", true]));
        assert_eq!(calls[2], Call::new("first", args![]));
    }

    #[test]
    fn test_check_calls_reports_name_mismatch_once() {
        let recorder: CallRecorder = CallRecorder::new();
        recorder.add_call("Open", args!["a"]);
        recorder.add_call("Close", args![]);

        let mut c = TestContext::new("names");
        assert!(!recorder.check_calls(
            &mut c,
            &[
                ExpectedCall::new("Close", args![]),
                ExpectedCall::new("Open", args!["a"]),
            ],
        ));

        let failures = c.take_failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.starts_with("call names differ"));
    }

    #[test]
    fn test_check_calls_reports_each_argument_mismatch() {
        let recorder: CallRecorder = CallRecorder::new();
        recorder.add_call("Send", args!["a"]);
        recorder.add_call("Send", args!["b"]);
        recorder.add_call("Send", args!["c"]);

        let mut c = TestContext::new("args");
        assert!(!recorder.check_calls(
            &mut c,
            &[
                ExpectedCall::new("Send", args!["x"]),
                ExpectedCall::new("Send", args!["b"]),
                ExpectedCall::new("Send", args!["y"]),
            ],
        ));

        let failures = c.take_failures();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].message.starts_with("call 0"));
        assert!(failures[1].message.starts_with("call 2"));
    }

    #[test]
    fn test_check_calls_receiver_policy() {
        let recorder: CallRecorder = CallRecorder::new();
        let receiver = Receiver::new("conn");
        let other = Receiver::new("conn");
        recorder.record_method_call(&receiver, "Close", args![]);

        let mut c = TestContext::new("receivers");
        assert!(recorder.check_calls(&mut c, &[ExpectedCall::new("Close", args![])]));
        assert!(recorder.check_calls(&mut c, &[ExpectedCall::new("Close", args![]).on(&receiver)]));
        assert!(!recorder.check_calls(&mut c, &[ExpectedCall::new("Close", args![]).on(&other)]));
        assert!(!recorder.check_calls(&mut c, &[ExpectedCall::new("Close", args![]).free()]));
        assert!(recorder.check_calls(
            &mut c,
            &[ExpectedCall::from(Call::method(receiver.clone(), "Close", args![]))],
        ));

        assert_eq!(c.take_failures().len(), 2);
    }

    #[test]
    fn test_check_call() {
        let recorder: CallRecorder = CallRecorder::new();
        recorder.add_call("Send", args!["payload", 3]);

        let mut c = TestContext::new("check_call");
        assert!(recorder.check_call(&mut c, 0, "Send", args!["payload", 3]));
        assert!(!recorder.check_call(&mut c, 0, "Send", args!["payload", 4]));

        let failures = c.take_failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("args"));
    }

    #[test]
    fn test_check_call_out_of_range_does_not_panic() {
        let recorder: CallRecorder = CallRecorder::new();
        recorder.add_call("Send", args![]);

        let mut c = TestContext::new("range");
        assert!(!recorder.check_call(&mut c, 5, "Send", args![]));

        let failures = c.take_failures();
        assert_eq!(
            failures[0].message,
            "call index 5 out of range: 1 call(s) recorded"
        );
    }

    #[test]
    fn test_check_call_names() {
        let recorder: CallRecorder = CallRecorder::new();
        recorder.add_call("Open", args![]);
        recorder.add_call("Close", args![]);

        let mut c = TestContext::new("names");
        assert!(recorder.check_call_names(&mut c, &["Open", "Close"]));
        assert!(!recorder.check_call_names(&mut c, &["Open"]));
        assert_eq!(c.take_failures().len(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let recorder = CallRecorder::new();
        recorder.add_call("Open", args![]);
        recorder.set_errors([Err(failure("x"))]);
        recorder.set_default_error(Some(failure("y")));

        recorder.reset();

        assert_eq!(recorder.call_count(), 0);
        assert!(recorder.pending_errors().is_empty());
        assert_eq!(recorder.next_error(), Ok(()));
    }

    #[test]
    fn test_custom_error_type() {
        #[derive(Debug, Clone, PartialEq)]
        enum ConnError {
            Timeout,
        }

        let recorder: CallRecorder<ConnError> = CallRecorder::new();
        recorder.set_errors([Ok(()), Err(ConnError::Timeout)]);

        assert_eq!(recorder.next_error(), Ok(()));
        assert_eq!(recorder.next_error(), Err(ConnError::Timeout));
    }
}
