//! # testbed
//!
//! Test-support toolkit: call-recording test doubles, two-scope cleanup
//! stacks, value and environment patching, and suite lifecycle helpers.
//!
//! This crate re-exports [`testbed_proto`] and [`testbed_core`] so tests
//! depend on a single crate.
//!
//! ```
//! use testbed::{CallRecorder, CleanupSuite, StubError, Suite, TestContext, args};
//!
//! let recorder = CallRecorder::new();
//! recorder.set_errors([Err(StubError::new("refused"))]);
//!
//! let mut suite = CleanupSuite::new();
//! let mut c = TestContext::new("connect");
//! suite.set_up_suite(&mut c);
//! suite.set_up_test(&mut c);
//!
//! recorder.add_call("Dial", args!["db:5432"]);
//! assert!(recorder.next_error().is_err());
//! recorder.check_call(&mut c, 0, "Dial", args!["db:5432"]);
//!
//! suite.tear_down_test(&mut c);
//! suite.tear_down_suite(&mut c);
//! c.finish();
//! ```

pub use testbed_core::*;
pub use testbed_proto::*;
