//! Contracts at the transport boundary.
//!
//! Concrete transports (HTTP, WebSocket, stdio) implement these traits and
//! choose their own framing: an HTTP transport would write an opening `[`
//! on the first batched write and a closing `]` on close, and map reserved
//! error codes onto status codes. The core only specifies the contracts.

use {
    crate::context::Context,
    async_trait::async_trait,
    exchange_rpc::rpc::{BoxError, Error, ErrorResponse, RequestSet, Response},
};

/// Reasons a [`RequestSetReader`] can fail.
///
/// The three variants are deliberately distinct at the signature level: the
/// engine does not write anything for a cancelled read, reports a wire-level
/// parse failure to the client, and surfaces any other failure as an I/O
/// error after a best-effort client notification.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The caller's context was cancelled while the reader was blocked.
    #[error("exchange cancelled")]
    Cancelled,

    /// The payload was read but is not a well-formed JSON-RPC request set.
    #[error(transparent)]
    Rpc(#[from] Error),

    /// Any other transport-level failure.
    #[error(transparent)]
    Io(BoxError),
}

/// Produces one [`RequestSet`] per exchange.
#[async_trait]
pub trait RequestSetReader: Send {
    async fn read(&mut self, ctx: &Context) -> Result<RequestSet, ReadError>;
}

/// Consumes the responses of one exchange.
///
/// The engine serializes all calls: writes never overlap, and
/// [`close`](ResponseWriter::close) is called exactly once per exchange,
/// after all write attempts, on every exit path.
#[async_trait]
pub trait ResponseWriter: Send {
    /// Writes the response to an envelope-level failure (a request set that
    /// could not be parsed or validated).
    async fn write_error(&mut self, response: &ErrorResponse) -> Result<(), BoxError>;

    /// Writes the response of a non-batch exchange.
    async fn write_unbatched(&mut self, response: &Response) -> Result<(), BoxError>;

    /// Writes one response of a batch exchange.
    async fn write_batched(&mut self, response: &Response) -> Result<(), BoxError>;

    /// Releases the writer.
    async fn close(&mut self) -> Result<(), BoxError>;
}
