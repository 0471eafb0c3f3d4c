//! The crate exports the JSON-RPC 2.0 message types exchanged between
//! clients and servers, together with the batch-aware set parsers and the
//! server/client-side validation rules.

use {
    crate::serde_helpers::{null_raw_value, raw_fragment, raw_json_eq},
    serde::{Deserialize, Serialize},
    serde_json::value::RawValue,
    std::sync::Arc,
};

pub mod error;
pub mod params;


pub use error::{BoxError, Cancellation, Error, ErrorCode};

/// Version of the JSON-RPC protocol that we're implementing.
pub const JSON_RPC_VERSION_STR: &str = "2.0";

pub static JSON_RPC_VERSION: once_cell::sync::Lazy<Arc<str>> =
    once_cell::sync::Lazy::new(|| Arc::from(JSON_RPC_VERSION_STR));

/// Parsed form of a request or response ID.
///
/// The wire keeps IDs as raw fragments so that well-formed requests can be
/// represented before they are valid; this enum is what a fragment must
/// narrow to during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(serde_json::Number),
    Null,
}

/// Data structure representing a JSON-RPC request.
///
/// The `id` and `params` fields are kept as raw JSON fragments: the parser
/// only establishes that the envelope is well-formed, and
/// [`validate_server_side`](Request::validate_server_side) establishes that
/// it is valid. An absent `id` makes the request a notification; an `id` of
/// literal `null` does not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    /// The JSON-RPC version. Must be exactly `"2.0"`.
    pub jsonrpc: Arc<str>,

    /// Raw request ID fragment. `None` when the field is absent from the
    /// wire, which marks the request as a notification.
    #[serde(
        default,
        deserialize_with = "raw_fragment::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Box<RawValue>>,

    /// The name of the method to invoke. Fully permissive: empty names,
    /// whitespace and non-printable bytes are all allowed.
    pub method: String,

    /// Raw parameters fragment. When present it must be an array, an object
    /// or `null`; anything beyond that shape check is the handler's job.
    #[serde(
        default,
        deserialize_with = "raw_fragment::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub params: Option<Box<RawValue>>,
}

impl Request {
    /// Creates a new call with the given ID.
    pub fn new(id: Box<RawValue>, method: impl Into<String>, params: Option<Box<RawValue>>) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.clone(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Creates a new notification.
    pub fn notification(method: impl Into<String>, params: Option<Box<RawValue>>) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.clone(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// A request without an `id` field is a notification and must never
    /// receive a response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Returns the raw request ID, substituting `null` when absent.
    ///
    /// This is the ID a response to this request must carry; callers are
    /// expected to check [`is_notification`](Self::is_notification) first.
    pub fn response_id(&self) -> Box<RawValue> {
        self.id.clone().unwrap_or_else(null_raw_value)
    }

    /// Validates the request for use on a server.
    pub fn validate_server_side(&self) -> Result<(), Error> {
        self.validate(true)
    }

    /// Validates the request for use on a client. Identical in content to
    /// the server-side validation, but failures are tagged as locally
    /// generated so callers can tell them apart from server-received errors.
    pub fn validate_client_side(&self) -> Result<(), Error> {
        self.validate(false)
    }

    fn validate(&self, server_side: bool) -> Result<(), Error> {
        let result = self.validate_inner();

        if server_side {
            result
        } else {
            result.map_err(Error::into_client_side)
        }
    }

    fn validate_inner(&self) -> Result<(), Error> {
        if self.jsonrpc.as_ref() != JSON_RPC_VERSION_STR {
            return Err(Error::invalid_request(r#"request version must be "2.0""#));
        }

        if let Some(id) = self.id.as_deref() {
            validate_id(id, "request ID must be a JSON string, number or null")?;
        }

        if let Some(params) = self.params.as_deref() {
            let fragment = params.get().trim();

            if !fragment.is_empty() && fragment != "null" {
                match fragment.as_bytes().first() {
                    Some(b'{') | Some(b'[') => {}
                    _ => {
                        return Err(Error::invalid_parameters(
                            "parameters must be an array, an object, or null",
                        ))
                    }
                }
            }
        }

        Ok(())
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.jsonrpc == other.jsonrpc
            && self.method == other.method
            && raw_json_eq(self.id.as_deref(), other.id.as_deref())
            && raw_json_eq(self.params.as_deref(), other.params.as_deref())
    }
}

fn validate_id(id: &RawValue, message: &str) -> Result<(), Error> {
    // Distinguish a malformed fragment (a parse failure) from a well-formed
    // one of the wrong kind (an invalid request).
    let value = serde_json::from_str::<serde_json::Value>(id.get()).map_err(Error::parse)?;

    match serde_json::from_value::<RequestId>(value) {
        Ok(_) => Ok(()),
        Err(_) => Err(Error::invalid_request(message)),
    }
}

/// An ordered set of requests read from a transport in one exchange.
///
/// A batch of one is deliberately distinct from a single request: the
/// distinction is established by the first byte on the wire and preserved
/// end-to-end so that responses use the matching framing.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSet {
    pub requests: Vec<Request>,
    pub is_batch: bool,
}

impl RequestSet {
    /// Parses a request set from a byte payload.
    ///
    /// Skips leading JSON whitespace and peeks the first byte: `[` makes the
    /// set a batch, anything else a single request. An unrecoverable parse
    /// failure yields a [`ParseError`](ErrorCode::PARSE_ERROR) wrapping the
    /// underlying cause. The produced requests are well-formed but not yet
    /// validated.
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        if first_non_whitespace(data) == Some(b'[') {
            let requests = serde_json::from_slice(data).map_err(Error::parse)?;

            Ok(Self {
                requests,
                is_batch: true,
            })
        } else {
            let request = serde_json::from_slice(data).map_err(Error::parse)?;

            Ok(Self {
                requests: vec![request],
                is_batch: false,
            })
        }
    }

    /// Validates the set shape and every request for use on a server.
    ///
    /// The first failure is returned. Validation is idempotent and has no
    /// side effects.
    pub fn validate_server_side(&self) -> Result<(), Error> {
        self.validate(true)
    }

    /// Client-side counterpart of [`validate_server_side`](Self::validate_server_side).
    pub fn validate_client_side(&self) -> Result<(), Error> {
        self.validate(false)
    }

    fn validate(&self, server_side: bool) -> Result<(), Error> {
        let result = self.validate_inner(server_side);

        if server_side {
            result
        } else {
            result.map_err(Error::into_client_side)
        }
    }

    fn validate_inner(&self, server_side: bool) -> Result<(), Error> {
        if self.is_batch {
            if self.requests.is_empty() {
                return Err(Error::invalid_request(
                    "batches must contain at least one request",
                ));
            }
        } else if self.requests.len() != 1 {
            return Err(Error::invalid_request(
                "non-batch request sets must contain exactly one request",
            ));
        }

        for request in &self.requests {
            request.validate(server_side)?;
        }

        Ok(())
    }
}

/// Data structure representing a successful JSON-RPC response.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    /// The JSON-RPC version.
    pub jsonrpc: Arc<str>,

    /// ID of the request this response corresponds to. Never absent; `null`
    /// when the originating request carried a `null` ID.
    #[serde(rename = "id")]
    pub request_id: Box<RawValue>,

    /// The raw result fragment. Always present, possibly literal `null`.
    pub result: Box<RawValue>,
}

impl SuccessResponse {
    /// Create a new instance.
    pub fn new(request_id: Box<RawValue>, result: Box<RawValue>) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.clone(),
            request_id,
            result,
        }
    }

    /// Validates the response parameters.
    pub fn validate(&self) -> Result<(), Error> {
        validate_response_envelope(&self.jsonrpc, &self.request_id)
    }
}

impl PartialEq for SuccessResponse {
    fn eq(&self, other: &Self) -> bool {
        self.jsonrpc == other.jsonrpc
            && raw_json_eq(Some(&self.request_id), Some(&other.request_id))
            && raw_json_eq(Some(&self.result), Some(&other.result))
    }
}

/// Data structure representing a JSON-RPC error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// The JSON-RPC version.
    pub jsonrpc: Arc<str>,

    /// ID of the request this response corresponds to.
    #[serde(rename = "id")]
    pub request_id: Box<RawValue>,

    /// The client-visible error details.
    pub error: ErrorInfo,

    /// The internal cause of the failure, kept for logging. Never
    /// transmitted to the client.
    #[serde(skip)]
    pub server_error: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ErrorResponse {
    /// Create a new instance.
    pub fn new(request_id: Box<RawValue>, error: ErrorInfo) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.clone(),
            request_id,
            error,
            server_error: None,
        }
    }

    /// Validates the response parameters.
    pub fn validate(&self) -> Result<(), Error> {
        validate_response_envelope(&self.jsonrpc, &self.request_id)
    }
}

impl PartialEq for ErrorResponse {
    fn eq(&self, other: &Self) -> bool {
        self.jsonrpc == other.jsonrpc
            && raw_json_eq(Some(&self.request_id), Some(&other.request_id))
            && self.error == other.error
    }
}

/// Data structure representing the `error` member of an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code.
    pub code: ErrorCode,

    /// Error message.
    pub message: String,

    /// Error data, if any.
    #[serde(
        default,
        deserialize_with = "raw_fragment::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Box<RawValue>>,
}

impl PartialEq for ErrorInfo {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.message == other.message
            && raw_json_eq(self.data.as_deref(), other.data.as_deref())
    }
}

/// Enum representing a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    /// A response with a result.
    Success(SuccessResponse),

    /// A response for a failed request.
    Error(ErrorResponse),
}

impl Response {
    /// Returns the ID of the request this response corresponds to.
    pub fn request_id(&self) -> &RawValue {
        match self {
            Self::Success(response) => &response.request_id,
            Self::Error(response) => &response.request_id,
        }
    }

    /// Validates the response parameters.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Self::Success(response) => response.validate(),
            Self::Error(response) => response.validate(),
        }
    }

    /// Narrows the response to its result, converting a received error into
    /// a client-side [`Error`] value.
    pub fn into_result(self) -> Result<Box<RawValue>, Error> {
        match self {
            Self::Success(response) => Ok(response.result),
            Self::Error(response) => Err(Error::client_side(&response.error)),
        }
    }
}

// The wire form is a discriminated union: a response object carries either
// `result` or `error`. Decoding goes through a flat struct holding both as
// optionals, then narrows by the presence of `error`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireResponse {
    jsonrpc: Arc<str>,
    id: Box<RawValue>,
    #[serde(default, deserialize_with = "raw_fragment::optional")]
    result: Option<Box<RawValue>>,
    #[serde(default)]
    error: Option<ErrorInfo>,
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = WireResponse::deserialize(deserializer)?;

        match (wire.error, wire.result) {
            (Some(error), _) => Ok(Self::Error(ErrorResponse {
                jsonrpc: wire.jsonrpc,
                request_id: wire.id,
                error,
                server_error: None,
            })),
            (None, Some(result)) => Ok(Self::Success(SuccessResponse {
                jsonrpc: wire.jsonrpc,
                request_id: wire.id,
                result,
            })),
            (None, None) => Err(serde::de::Error::custom(
                "response must contain either a result or an error",
            )),
        }
    }
}

fn validate_response_envelope(jsonrpc: &Arc<str>, request_id: &RawValue) -> Result<(), Error> {
    if jsonrpc.as_ref() != JSON_RPC_VERSION_STR {
        return Err(Error::invalid_request(r#"response version must be "2.0""#));
    }

    validate_id(request_id, "response ID must be a JSON string, number or null")
}

/// An ordered set of responses, the client-side dual of [`RequestSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSet {
    pub responses: Vec<Response>,
    pub is_batch: bool,
}

impl ResponseSet {
    /// Parses a response set from a byte payload, using the same first-byte
    /// batch disambiguation as [`RequestSet::from_slice`].
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        if first_non_whitespace(data) == Some(b'[') {
            let responses = serde_json::from_slice(data).map_err(Error::parse)?;

            Ok(Self {
                responses,
                is_batch: true,
            })
        } else {
            let response = serde_json::from_slice(data).map_err(Error::parse)?;

            Ok(Self {
                responses: vec![response],
                is_batch: false,
            })
        }
    }

    /// Validates the set shape and every response it contains. Failures are
    /// tagged as locally generated, as this runs on the client.
    pub fn validate(&self) -> Result<(), Error> {
        self.validate_inner().map_err(Error::into_client_side)
    }

    fn validate_inner(&self) -> Result<(), Error> {
        if self.is_batch {
            if self.responses.is_empty() {
                return Err(Error::invalid_request(
                    "batches must contain at least one response",
                ));
            }
        } else if self.responses.len() != 1 {
            return Err(Error::invalid_request(
                "non-batch response sets must contain exactly one response",
            ));
        }

        for response in &self.responses {
            response.validate()?;
        }

        Ok(())
    }
}

fn first_non_whitespace(data: &[u8]) -> Option<u8> {
    data.iter()
        .copied()
        .find(|byte| !matches!(byte, b' ' | b'\t' | b'\n' | b'\r'))
}
