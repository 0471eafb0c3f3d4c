//! The JSON-RPC error taxonomy: error codes, the server-side [`Error`]
//! value, and the rules for turning arbitrary failures into error
//! responses.

use {
    super::{ErrorInfo, ErrorResponse},
    once_cell::sync::OnceCell,
    serde::{Deserialize, Serialize},
    serde_json::value::RawValue,
    std::{fmt, sync::Arc},
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const RESERVED_MIN: i32 = -32768;
const RESERVED_MAX: i32 = -32000;

/// A JSON-RPC error code.
///
/// Codes between `-32768` and `-32000` inclusive are reserved by the
/// JSON-RPC specification; application-defined codes live outside that
/// range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(i32);

impl ErrorCode {
    pub const PARSE_ERROR: Self = Self(-32700);
    pub const INVALID_REQUEST: Self = Self(-32600);
    pub const METHOD_NOT_FOUND: Self = Self(-32601);
    pub const INVALID_PARAMETERS: Self = Self(-32602);
    pub const INTERNAL_ERROR: Self = Self(-32603);

    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    pub const fn value(self) -> i32 {
        self.0
    }

    /// Whether the code is within the range reserved by the JSON-RPC
    /// specification. Both bounds are inclusive.
    pub const fn is_reserved(self) -> bool {
        self.0 >= RESERVED_MIN && self.0 <= RESERVED_MAX
    }

    /// Whether the code is one of the five errors predefined by the
    /// JSON-RPC specification.
    pub const fn is_predefined(self) -> bool {
        matches!(self.0, -32700 | -32600 | -32601 | -32602 | -32603)
    }

    /// A fixed human-readable description of the code.
    pub const fn description(self) -> &'static str {
        match self.0 {
            -32700 => "parse error",
            -32600 => "invalid request",
            -32601 => "method not found",
            -32602 => "invalid parameters",
            -32603 => "internal server error",
            code if code >= RESERVED_MIN && code <= RESERVED_MAX => "undefined reserved error",
            _ => "unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A cooperative cancellation failure.
///
/// Handlers that abort because the exchange context was cancelled or their
/// deadline expired return this error. Unlike other non-native handler
/// errors its message IS disclosed to the client, since it reflects a
/// timeout condition the client can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Cancellation {
    #[error("call cancelled")]
    Cancelled,

    #[error("call deadline exceeded")]
    DeadlineExceeded,
}

/// User-supplied data attached to an [`Error`], marshaled at most once.
///
/// The marshal is deferred until the data is first rendered into a
/// response; the result is cached so concurrent reads observe a single,
/// consistent outcome.
pub struct ErrorData {
    marshal: Box<dyn Fn() -> serde_json::Result<Box<RawValue>> + Send + Sync>,
    cached: OnceCell<Result<Box<RawValue>, Arc<serde_json::Error>>>,
}

impl ErrorData {
    /// Captures a value to be marshaled on first access.
    pub fn lazy<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self {
            marshal: Box::new(move || serde_json::value::to_raw_value(&value)),
            cached: OnceCell::new(),
        }
    }

    /// Wraps an already-marshaled fragment.
    pub fn serialized(raw: Box<RawValue>) -> Self {
        Self {
            marshal: Box::new(move || Ok(raw.clone())),
            cached: OnceCell::new(),
        }
    }

    /// Returns the marshaled fragment, marshaling on first call.
    pub fn get(&self) -> Result<&RawValue, Arc<serde_json::Error>> {
        match self.cached.get_or_init(|| (self.marshal)().map_err(Arc::new)) {
            Ok(raw) => Ok(raw),
            Err(err) => Err(Arc::clone(err)),
        }
    }
}

impl fmt::Debug for ErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorData")
            .field("marshaled", &self.cached.get())
            .finish()
    }
}

/// A JSON-RPC error as constructed inside a server for delivery to a
/// client.
///
/// An `Error` carries the wire-visible code, message and data, plus a
/// server-side causal error that is never transmitted. Options mutate the
/// value only during construction.
#[derive(Debug)]
pub struct Error {
    code: ErrorCode,
    message: Option<String>,
    data: Option<ErrorData>,
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
    server_side: bool,
}

impl Error {
    /// Creates an error with an application-defined code.
    ///
    /// # Panics
    ///
    /// Panics if `code` is within the reserved range; reserved codes may
    /// only be produced via [`with_reserved_code`](Self::with_reserved_code).
    pub fn new(code: ErrorCode) -> Self {
        assert!(
            !code.is_reserved(),
            "error code {} is reserved by the JSON-RPC specification, use Error::with_reserved_code()",
            code.value(),
        );

        Self::unchecked(code)
    }

    /// Creates an error with a code from the reserved range. Intended for
    /// framework-level use; handlers should use [`new`](Self::new).
    ///
    /// # Panics
    ///
    /// Panics if `code` is outside the reserved range.
    pub fn with_reserved_code(code: ErrorCode) -> Self {
        assert!(
            code.is_reserved(),
            "error code {} is not reserved by the JSON-RPC specification, use Error::new()",
            code.value(),
        );

        Self::unchecked(code)
    }

    fn unchecked(code: ErrorCode) -> Self {
        Self {
            code,
            message: None,
            data: None,
            cause: None,
            server_side: true,
        }
    }

    /// Reconstructs an error received in a server's error response.
    ///
    /// The result is tagged as client-side and is not re-sendable: building
    /// a response from it degrades to an internal error like any other
    /// opaque failure.
    pub fn client_side(info: &ErrorInfo) -> Self {
        Self {
            code: info.code,
            message: Some(info.message.clone()),
            data: info.data.clone().map(ErrorData::serialized),
            cause: None,
            server_side: false,
        }
    }

    /// Sets the client-visible message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches data to be marshaled when the error is first rendered.
    pub fn with_data<T>(mut self, value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.data = Some(ErrorData::lazy(value));
        self
    }

    /// Attaches an already-marshaled data fragment.
    pub fn with_serialized_data(mut self, raw: Box<RawValue>) -> Self {
        self.data = Some(ErrorData::serialized(raw));
        self
    }

    /// Attaches the causal error. The cause is kept server-side and never
    /// transmitted.
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(Arc::from(cause.into()));
        self
    }

    pub(crate) fn into_client_side(mut self) -> Self {
        self.server_side = false;
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn data(&self) -> Option<&ErrorData> {
        self.data.as_ref()
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync)> {
        self.cause.as_deref()
    }

    /// Whether this error was constructed inside a server for delivery to a
    /// client, as opposed to reconstructed from a received error response.
    pub fn is_server_side(&self) -> bool {
        self.server_side
    }

    /// The client-visible message: the explicit message when set, the code
    /// description otherwise.
    pub fn message_or_description(&self) -> &str {
        match self.message.as_deref() {
            Some(message) if !message.is_empty() => message,
            _ => self.code.description(),
        }
    }

    /// A parse failure wrapping the underlying cause.
    pub fn parse(cause: impl Into<BoxError>) -> Self {
        Self::with_reserved_code(ErrorCode::PARSE_ERROR).with_cause(cause)
    }

    /// An invalid-request failure with the given message.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with_reserved_code(ErrorCode::INVALID_REQUEST).with_message(message)
    }

    /// An invalid-parameters failure with the given message.
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::with_reserved_code(ErrorCode::INVALID_PARAMETERS).with_message(message)
    }

    /// An invalid-parameters failure wrapping the underlying cause. The
    /// cause is kept server-side; the client sees the code description.
    pub fn invalid_parameters_cause(cause: impl Into<BoxError>) -> Self {
        Self::with_reserved_code(ErrorCode::INVALID_PARAMETERS).with_cause(cause)
    }

    /// The error produced when no route exists for the requested method.
    pub fn method_not_found() -> Self {
        Self::with_reserved_code(ErrorCode::METHOD_NOT_FOUND)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code.value();
        let description = self.code.description();

        match self.message.as_deref() {
            None => write!(f, "[{code}] {description}"),
            Some(message) if message.is_empty() || message == description => {
                write!(f, "[{code}] {description}")
            }
            Some(message) if self.code.is_predefined() => {
                write!(f, "[{code}] {description}: {message}")
            }
            Some(message) => write!(f, "[{code}] {message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl ErrorResponse {
    /// Builds an error response from an arbitrary error.
    ///
    /// Native server-side [`Error`] values transfer their code, message and
    /// data to the client verbatim. [`Cancellation`] failures become
    /// internal errors whose message is disclosed. Anything else becomes a
    /// generic internal error; the original is preserved in
    /// [`server_error`](ErrorResponse::server_error) for logging but never
    /// transmitted.
    pub fn from_error(request_id: Box<RawValue>, err: BoxError) -> Self {
        if let Some(native) = err.downcast_ref::<Error>() {
            if native.is_server_side() {
                return Self::from_native(request_id, native);
            }
        }

        if err.is::<Cancellation>() {
            return Self::new(request_id, ErrorInfo {
                code: ErrorCode::INTERNAL_ERROR,
                message: err.to_string(),
                data: None,
            });
        }

        let mut response = Self::new(request_id, ErrorInfo {
            code: ErrorCode::INTERNAL_ERROR,
            message: ErrorCode::INTERNAL_ERROR.description().to_owned(),
            data: None,
        });
        response.server_error = Some(Arc::from(err));
        response
    }

    fn from_native(request_id: Box<RawValue>, err: &Error) -> Self {
        let data = match err.data() {
            None => None,
            Some(data) => match data.get() {
                Ok(raw) => Some(raw.to_owned()),
                Err(marshal_err) => {
                    let mut response = Self::new(request_id, ErrorInfo {
                        code: ErrorCode::INTERNAL_ERROR,
                        message: ErrorCode::INTERNAL_ERROR.description().to_owned(),
                        data: None,
                    });
                    response.server_error = Some(marshal_err);
                    return response;
                }
            },
        };

        Self::new(request_id, ErrorInfo {
            code: err.code(),
            message: err.message_or_description().to_owned(),
            data,
        })
    }
}
