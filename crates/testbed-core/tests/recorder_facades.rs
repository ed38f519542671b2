//! Shared-recorder scenarios with several facade types.
//!
//! A code path under test talks to two collaborators, a connection and a
//! blob store. Both are replaced by facades forwarding to one recorder so
//! the relative order of their calls can be checked.

use testbed_core::{CallRecorder, ExpectedCall, JsonEquals, TestContext};
use testbed_proto::{Arg, Receiver, StubError, args};

trait Conn {
    fn send(&self, request: &str, attempt: u32) -> Result<(), StubError>;
    fn close(&self) -> Result<(), StubError>;
}

trait BlobStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), StubError>;
}

struct StubConn {
    recorder: CallRecorder,
    receiver: Receiver,
}

impl Conn for StubConn {
    fn send(&self, request: &str, attempt: u32) -> Result<(), StubError> {
        self.recorder
            .record_method_call(&self.receiver, "Send", args![request, attempt]);
        self.recorder.next_error()
    }

    fn close(&self) -> Result<(), StubError> {
        self.recorder.record_method_call(&self.receiver, "Close", args![]);
        self.recorder.next_error()
    }
}

struct StubStore {
    recorder: CallRecorder,
    receiver: Receiver,
}

impl BlobStore for StubStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), StubError> {
        self.recorder
            .record_method_call(&self.receiver, "Put", args![key, data]);
        self.recorder.next_error()
    }
}

/// Code under test: sends with retries, stores the payload, then closes.
fn upload(conn: &dyn Conn, store: &dyn BlobStore, payload: &[u8]) -> Result<u32, StubError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match conn.send("upload", attempt) {
            Ok(()) => break,
            Err(err) if attempt >= 3 => return Err(err),
            Err(_) => {}
        }
    }
    store.put("payload", payload)?;
    conn.close()?;
    Ok(attempt)
}

fn doubles() -> (CallRecorder, StubConn, StubStore) {
    let recorder = CallRecorder::new();
    let conn = StubConn {
        recorder: recorder.clone(),
        receiver: Receiver::of::<StubConn>(),
    };
    let store = StubStore {
        recorder: recorder.clone(),
        receiver: Receiver::of::<StubStore>(),
    };
    (recorder, conn, store)
}

#[test]
fn test_retry_then_success() {
    let (recorder, conn, store) = doubles();
    recorder.set_errors([Err(StubError::new("busy")), Err(StubError::new("busy"))]);

    let attempts = upload(&conn, &store, b"data").unwrap();
    assert_eq!(attempts, 3);

    let mut c = TestContext::new("retry");
    recorder.check_call_names(&mut c, &["Send", "Send", "Send", "Put", "Close"]);
    recorder.check_calls(
        &mut c,
        &[
            ExpectedCall::new("Send", args!["upload", 1u32]).on(&conn.receiver),
            ExpectedCall::new("Send", args!["upload", 2u32]).on(&conn.receiver),
            ExpectedCall::new("Send", args!["upload", 3u32]).on(&conn.receiver),
            ExpectedCall::new("Put", args!["payload", Arg::bytes("data")]).on(&store.receiver),
            ExpectedCall::new("Close", args![]).on(&conn.receiver),
        ],
    );
    c.finish();
}

#[test]
fn test_give_up_after_three_attempts() {
    let (recorder, conn, store) = doubles();
    recorder.set_default_error(Some(StubError::new("down")));

    let err = upload(&conn, &store, b"data").unwrap_err();
    assert_eq!(err, StubError::new("down"));

    let mut c = TestContext::new("give_up");
    recorder.check_call_names(&mut c, &["Send", "Send", "Send"]);
    c.finish();
}

#[test]
fn test_store_failure_skips_close() {
    let (recorder, conn, store) = doubles();
    recorder.set_errors([Ok(()), Err(StubError::new("quota exceeded"))]);

    let err = upload(&conn, &store, b"data").unwrap_err();
    assert_eq!(err.message(), "quota exceeded");

    let mut c = TestContext::new("store_failure");
    recorder.check_call(&mut c, 1, "Put", args!["payload", Arg::bytes("data")]);
    recorder.check_call_names(&mut c, &["Send", "Put"]);
    c.finish();
}

#[test]
fn test_free_and_method_calls_interleave() {
    let recorder: CallRecorder = CallRecorder::new();
    let facade = Receiver::new("FacadeA");

    recorder.record_method_call(&facade, "Method", args![1, 2, 3]);
    recorder.add_call("Func", args!["x"]);
    recorder.record_method_call(&facade, "Other", args!["y"]);

    let mut c = TestContext::new("interleave");
    assert!(recorder.check_call_names(&mut c, &["Method", "Func", "Other"]));
    c.finish();

    let receivers = recorder.receivers();
    assert_eq!(receivers[0].as_ref(), Some(&facade));
    assert_eq!(receivers[1], None);
    assert_eq!(receivers[2].as_ref(), Some(&facade));
}

#[test]
fn test_history_dumps_as_json() {
    let recorder: CallRecorder = CallRecorder::new();
    recorder.add_call("Put", args!["k", 7]);

    let args: Vec<Vec<Arg>> = recorder.calls().into_iter().map(|call| call.args).collect();
    let json = serde_json::to_string(&args).unwrap();

    let mut c = TestContext::new("json");
    c.check_that(
        json.as_str(),
        JsonEquals::new(&serde_json::json!([[
            {"kind": "str", "value": "k"},
            {"kind": "int", "value": 7}
        ]])),
    );
    c.finish();
}

#[test]
fn test_mismatches_accumulate() {
    let (recorder, conn, store) = doubles();
    upload(&conn, &store, b"data").unwrap();

    let mut c = TestContext::new("accumulate");
    let ok = recorder.check_calls(
        &mut c,
        &[
            ExpectedCall::new("Send", args!["download", 1u32]),
            ExpectedCall::new("Put", args!["payload", Arg::bytes("data")]).on(&conn.receiver),
            ExpectedCall::new("Close", args![]).free(),
        ],
    );

    assert!(!ok);
    assert_eq!(c.take_failures().len(), 3);
}
