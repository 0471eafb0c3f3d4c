use {
    async_trait::async_trait,
    jsonrpc_exchange::{
        rpc::rpc::{
            params::Params, BoxError, ErrorCode, ErrorResponse, RequestSet, Response, ResponseSet,
        },
        server::{Context, Exchange, ReadError, RequestSetReader, ResponseWriter, Router},
    },
    serde::Deserialize,
    serde_json::Value,
};

struct PayloadReader(Option<Vec<u8>>);

#[async_trait]
impl RequestSetReader for PayloadReader {
    async fn read(&mut self, _ctx: &Context) -> Result<RequestSet, ReadError> {
        let payload = self.0.take().expect("single-shot reader");

        RequestSet::from_slice(&payload).map_err(ReadError::from)
    }
}

/// Collects the response body the way an HTTP transport would frame it:
/// batched writes accumulate into a JSON array closed on `close`.
#[derive(Default)]
struct BufferWriter {
    body: String,
    batched: bool,
    closed: bool,
}

#[async_trait]
impl ResponseWriter for BufferWriter {
    async fn write_error(&mut self, response: &ErrorResponse) -> Result<(), BoxError> {
        self.body.push_str(&serde_json::to_string(response)?);
        Ok(())
    }

    async fn write_unbatched(&mut self, response: &Response) -> Result<(), BoxError> {
        self.body.push_str(&serde_json::to_string(response)?);
        Ok(())
    }

    async fn write_batched(&mut self, response: &Response) -> Result<(), BoxError> {
        self.body.push(if self.batched { ',' } else { '[' });
        self.batched = true;
        self.body.push_str(&serde_json::to_string(response)?);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BoxError> {
        if self.batched {
            self.body.push(']');
        }

        self.closed = true;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SubtractParams {
    minuend: i64,
    subtrahend: i64,
}

impl Params for SubtractParams {}

fn subtract_router() -> Router {
    Router::builder()
        .with_route("subtract", |_ctx: Context, params: SubtractParams| async move {
            Ok::<_, BoxError>(params.minuend - params.subtrahend)
        })
        .build()
}

#[tokio::test]
async fn single_call_end_to_end() {
    let engine = Exchange::new(subtract_router());
    let mut reader = PayloadReader(Some(
        br#"{"jsonrpc":"2.0","id":2,"method":"subtract","params":{"minuend":42,"subtrahend":23}}"#
            .to_vec(),
    ));
    let mut writer = BufferWriter::default();

    engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap();

    assert!(writer.closed);

    let set = ResponseSet::from_slice(writer.body.as_bytes()).unwrap();

    assert!(!set.is_batch);
    set.validate().unwrap();

    let result = set
        .responses
        .into_iter()
        .next()
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(result.get(), "19");
}

#[tokio::test]
async fn batch_end_to_end() {
    let engine = Exchange::new(subtract_router());
    let mut reader = PayloadReader(Some(
        br#"[
            {"jsonrpc":"2.0","id":"a","method":"subtract","params":{"minuend":10,"subtrahend":3}},
            {"jsonrpc":"2.0","id":"b","method":"subtract","params":{"minuend":3,"subtrahend":10}},
            {"jsonrpc":"2.0","method":"notify_hello","params":[7]}
        ]"#
        .to_vec(),
    ));
    let mut writer = BufferWriter::default();

    engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap();

    let set = ResponseSet::from_slice(writer.body.as_bytes()).unwrap();

    assert!(set.is_batch);
    set.validate().unwrap();
    assert_eq!(set.responses.len(), 2);

    // Responses arrive in completion order; pair them up by ID.
    let mut results: Vec<(String, i64)> = set
        .responses
        .into_iter()
        .map(|response| {
            let id: String = serde_json::from_str(response.request_id().get()).unwrap();
            let result: i64 =
                serde_json::from_str(response.into_result().unwrap().get()).unwrap();

            (id, result)
        })
        .collect();
    results.sort();

    assert_eq!(results, vec![("a".to_owned(), 7), ("b".to_owned(), -7)]);
}

#[tokio::test]
async fn parse_failure_end_to_end() {
    let engine = Exchange::new(subtract_router());
    let mut reader = PayloadReader(Some(b"{".to_vec()));
    let mut writer = BufferWriter::default();

    engine
        .exchange(&Context::new(), &mut reader, &mut writer)
        .await
        .unwrap();

    let body: Value = serde_json::from_str(&writer.body).unwrap();

    assert_eq!(body.get("id"), Some(&Value::Null));

    let set = ResponseSet::from_slice(writer.body.as_bytes()).unwrap();
    let err = set
        .responses
        .into_iter()
        .next()
        .unwrap()
        .into_result()
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::PARSE_ERROR);
    assert!(!err.is_server_side());
    assert_eq!(err.message_or_description(), "parse error");
}
