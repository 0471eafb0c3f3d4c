use {
    super::*,
    crate::router::Router,
    exchange_rpc::rpc::{Error, RequestSet},
    serde_json::{json, Value},
    std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

#[derive(Debug, PartialEq)]
enum WriteEvent {
    Error(Value),
    Unbatched(Value),
    Batched(Value),
}

#[derive(Default)]
struct RecordingWriter {
    events: Vec<WriteEvent>,
    fail_batched_writes: bool,
    fail_close: bool,
    closed: usize,
}

#[async_trait]
impl ResponseWriter for RecordingWriter {
    async fn write_error(&mut self, response: &ErrorResponse) -> Result<(), BoxError> {
        self.events
            .push(WriteEvent::Error(serde_json::to_value(response).unwrap()));
        Ok(())
    }

    async fn write_unbatched(&mut self, response: &Response) -> Result<(), BoxError> {
        self.events
            .push(WriteEvent::Unbatched(serde_json::to_value(response).unwrap()));
        Ok(())
    }

    async fn write_batched(&mut self, response: &Response) -> Result<(), BoxError> {
        if self.fail_batched_writes {
            return Err("writer failed".into());
        }

        self.events
            .push(WriteEvent::Batched(serde_json::to_value(response).unwrap()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BoxError> {
        self.closed += 1;

        if self.fail_close {
            return Err("close failed".into());
        }

        Ok(())
    }
}

struct StubReader(Option<Result<RequestSet, ReadError>>);

impl StubReader {
    fn set(payload: &[u8]) -> Self {
        Self(Some(Ok(RequestSet::from_slice(payload).unwrap())))
    }
}

#[async_trait]
impl RequestSetReader for StubReader {
    async fn read(&mut self, _ctx: &Context) -> Result<RequestSet, ReadError> {
        self.0.take().expect("read called more than once")
    }
}

struct Fixture {
    calls: Arc<AtomicUsize>,
    notifications: Arc<AtomicUsize>,
    slow_cancelled: Arc<AtomicBool>,
}

fn fixture_router() -> (Exchange<Router>, Fixture) {
    let fixture = Fixture {
        calls: Arc::new(AtomicUsize::new(0)),
        notifications: Arc::new(AtomicUsize::new(0)),
        slow_cancelled: Arc::new(AtomicBool::new(false)),
    };

    let calls = Arc::clone(&fixture.calls);
    let notifications = Arc::clone(&fixture.notifications);
    let slow_cancelled = Arc::clone(&fixture.slow_cancelled);

    let router = Router::builder()
        .with_route("echo", move |_ctx: Context, params: Value| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(params)
            }
        })
        .with_route("log", move |_ctx: Context, _params: Value| {
            let notifications = Arc::clone(&notifications);
            async move {
                notifications.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            }
        })
        .with_route("slow", move |ctx: Context, _params: Value| {
            let slow_cancelled = Arc::clone(&slow_cancelled);
            async move {
                ctx.cancelled().await;
                slow_cancelled.store(true, Ordering::SeqCst);
                Ok::<_, BoxError>("late")
            }
        })
        .build();

    (Exchange::new(router), fixture)
}

#[tokio::test]
async fn single_call_success() {
    let (engine, fixture) = fixture_router();
    let mut reader =
        StubReader::set(br#"{"jsonrpc":"2.0","id":123,"method":"echo","params":[1,2,3]}"#);
    let mut writer = RecordingWriter::default();

    engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap();

    assert_eq!(writer.events, vec![WriteEvent::Unbatched(
        json!({"jsonrpc":"2.0","id":123,"result":[1,2,3]})
    )]);
    assert_eq!(writer.closed, 1);
    assert_eq!(fixture.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn notifications_are_dispatched_but_never_written() {
    let (engine, fixture) = fixture_router();
    let mut reader = StubReader::set(br#"{"jsonrpc":"2.0","method":"log","params":{}}"#);
    let mut writer = RecordingWriter::default();

    engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap();

    assert!(writer.events.is_empty());
    assert_eq!(writer.closed, 1);
    assert_eq!(fixture.notifications.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn null_id_is_a_call_and_echoed_back() {
    let (engine, _fixture) = fixture_router();
    let mut reader = StubReader::set(br#"{"jsonrpc":"2.0","id":null,"method":"echo","params":[]}"#);
    let mut writer = RecordingWriter::default();

    engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap();

    assert_eq!(writer.events, vec![WriteEvent::Unbatched(
        json!({"jsonrpc":"2.0","id":null,"result":[]})
    )]);
}

#[tokio::test]
async fn batch_dispatches_concurrently_and_writes_calls_only() {
    let (engine, fixture) = fixture_router();
    let mut reader = StubReader::set(
        br#"[
            {"jsonrpc":"2.0","id":1,"method":"echo","params":[1]},
            {"jsonrpc":"2.0","id":2,"method":"echo","params":[2]},
            {"jsonrpc":"2.0","method":"log","params":{}}
        ]"#,
    );
    let mut writer = RecordingWriter::default();

    engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap();

    assert_eq!(fixture.calls.load(Ordering::SeqCst), 2);
    assert_eq!(fixture.notifications.load(Ordering::SeqCst), 1);
    assert_eq!(writer.closed, 1);

    // Batch responses arrive in completion order; pair them by ID.
    let mut written: Vec<Value> = writer
        .events
        .iter()
        .map(|event| match event {
            WriteEvent::Batched(value) => value.clone(),
            other => panic!("unexpected write: {other:?}"),
        })
        .collect();
    written.sort_by_key(|value| value.get("id").and_then(Value::as_i64));

    assert_eq!(written, vec![
        json!({"jsonrpc":"2.0","id":1,"result":[1]}),
        json!({"jsonrpc":"2.0","id":2,"result":[2]}),
    ]);
}

#[tokio::test]
async fn batch_of_one_uses_the_batched_write_path() {
    let (engine, _fixture) = fixture_router();
    let mut reader = StubReader::set(br#"[{"jsonrpc":"2.0","id":1,"method":"echo","params":[7]}]"#);
    let mut writer = RecordingWriter::default();

    engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap();

    assert_eq!(writer.events, vec![WriteEvent::Batched(
        json!({"jsonrpc":"2.0","id":1,"result":[7]})
    )]);
}

#[tokio::test]
async fn batch_write_failure_cancels_and_drains() {
    let (engine, fixture) = fixture_router();

    // "slow" blocks until the exchange context is cancelled, which only
    // happens once the write of the "echo" response has failed.
    let mut reader = StubReader::set(
        br#"[
            {"jsonrpc":"2.0","id":1,"method":"echo","params":[1]},
            {"jsonrpc":"2.0","id":2,"method":"slow","params":{}}
        ]"#,
    );
    let mut writer = RecordingWriter {
        fail_batched_writes: true,
        ..Default::default()
    };

    let err = engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Write(_)));
    assert!(writer.events.is_empty());
    assert_eq!(writer.closed, 1);
    assert!(fixture.slow_cancelled.load(Ordering::SeqCst));
}

#[tokio::test]
async fn outer_cancellation_does_not_stop_writes() {
    let (engine, _fixture) = fixture_router();

    let ctx = Context::new();
    ctx.cancel();

    // "slow" returns as soon as it observes the cancellation; its response
    // is still written because write failures, not caller cancellation,
    // stop the batch.
    let mut reader = StubReader::set(br#"[{"jsonrpc":"2.0","id":1,"method":"slow","params":{}}]"#);
    let mut writer = RecordingWriter::default();

    engine.exchange(&ctx, &mut reader, &mut writer).await.unwrap();

    assert_eq!(writer.events, vec![WriteEvent::Batched(
        json!({"jsonrpc":"2.0","id":1,"result":"late"})
    )]);
}

#[tokio::test]
async fn parse_failure_is_reported_to_the_client() {
    let (engine, fixture) = fixture_router();

    let cause = serde_json::from_slice::<Value>(b"}").unwrap_err();
    let mut reader = StubReader(Some(Err(ReadError::Rpc(Error::parse(cause)))));
    let mut writer = RecordingWriter::default();

    engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap();

    assert_eq!(writer.events, vec![WriteEvent::Error(
        json!({"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"parse error"}})
    )]);
    assert_eq!(writer.closed, 1);
    assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_batches_are_rejected_without_dispatch() {
    let (engine, fixture) = fixture_router();

    let mut reader = StubReader(Some(Ok(RequestSet {
        requests: vec![],
        is_batch: true,
    })));
    let mut writer = RecordingWriter::default();

    engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap();

    assert_eq!(writer.events, vec![WriteEvent::Error(json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": {"code": -32600, "message": "batches must contain at least one request"},
    }))]);
    assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.notifications.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_reads_produce_no_output() {
    let (engine, _fixture) = fixture_router();

    let mut reader = StubReader(Some(Err(ReadError::Cancelled)));
    let mut writer = RecordingWriter::default();

    let err = engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Cancelled));
    assert!(writer.events.is_empty());
    assert_eq!(writer.closed, 1);
}

#[tokio::test]
async fn reader_io_failures_notify_the_client_and_surface() {
    let (engine, _fixture) = fixture_router();

    let mut reader = StubReader(Some(Err(ReadError::Io("connection reset".into()))));
    let mut writer = RecordingWriter::default();

    let err = engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "unable to read JSON-RPC request: connection reset"
    );
    assert_eq!(writer.events, vec![WriteEvent::Error(json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": {"code": -32603, "message": "unable to read JSON-RPC request"},
    }))]);
    assert_eq!(writer.closed, 1);
}

#[tokio::test]
async fn close_errors_surface_only_without_a_more_specific_error() {
    let (engine, _fixture) = fixture_router();

    let mut reader = StubReader::set(br#"{"jsonrpc":"2.0","method":"log","params":{}}"#);
    let mut writer = RecordingWriter {
        fail_close: true,
        ..Default::default()
    };

    let err = engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Close(_)));
    assert_eq!(writer.closed, 1);
}

#[tokio::test]
async fn write_errors_are_preferred_over_close_errors() {
    let (engine, _fixture) = fixture_router();

    let mut reader = StubReader::set(
        br#"[
            {"jsonrpc":"2.0","id":1,"method":"echo","params":[1]},
            {"jsonrpc":"2.0","id":2,"method":"echo","params":[2]}
        ]"#,
    );
    let mut writer = RecordingWriter {
        fail_batched_writes: true,
        fail_close: true,
        ..Default::default()
    };

    let err = engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Write(_)));
    assert_eq!(writer.closed, 1);
}

#[tokio::test]
async fn invalid_requests_in_a_batch_fail_the_whole_set() {
    let (engine, fixture) = fixture_router();

    let mut reader = StubReader::set(
        br#"[
            {"jsonrpc":"2.0","id":1,"method":"echo","params":[]},
            {"jsonrpc":"2.0","id":{},"method":"echo","params":[]}
        ]"#,
    );
    let mut writer = RecordingWriter::default();

    engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap();

    assert_eq!(writer.events, vec![WriteEvent::Error(json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": {
            "code": -32600,
            "message": "request ID must be a JSON string, number or null",
        },
    }))]);
    assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
}
