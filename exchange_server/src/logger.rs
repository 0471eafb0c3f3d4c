//! Structured events emitted by the exchange engine.

use {
    crate::context::Context,
    exchange_rpc::rpc::{BoxError, ErrorResponse, Request, Response},
};

/// Receives the structured events of an exchange.
///
/// The engine never formats anything itself; it hands the logger whole
/// requests and responses and lets the implementation decide what to
/// render. Trace context is expected to travel ambiently (e.g. through the
/// current `tracing` span).
pub trait ExchangeLogger: Send + Sync {
    /// A request-set-level failure was reported to the client.
    fn log_error(&self, ctx: &Context, response: &ErrorResponse);

    /// A write call failed.
    fn log_writer_error(&self, ctx: &Context, error: &BoxError);

    /// A notification was dispatched.
    fn log_notification(&self, ctx: &Context, request: &Request);

    /// A call was dispatched and produced a response.
    fn log_call(&self, ctx: &Context, request: &Request, response: &Response);
}

/// Quotes and escapes a method name for logging.
///
/// Method names are fully permissive on the wire, so anything rendering
/// them must neutralize non-printable bytes.
pub(crate) fn quote_method(method: &str) -> String {
    format!("{method:?}")
}

fn param_size(request: &Request) -> usize {
    request.params.as_deref().map_or(0, |params| params.get().len())
}

/// [`ExchangeLogger`] implementation used when no logger is supplied,
/// emitting `tracing` events under the `exchange` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExchangeLogger;

impl ExchangeLogger for DefaultExchangeLogger {
    fn log_error(&self, _ctx: &Context, response: &ErrorResponse) {
        let error = &response.error;

        match &response.server_error {
            Some(cause) => tracing::error!(
                target: "exchange",
                code = error.code.value(),
                description = error.code.description(),
                message = %error.message,
                server_error = %cause,
                "exchange failed",
            ),
            None => tracing::error!(
                target: "exchange",
                code = error.code.value(),
                description = error.code.description(),
                message = %error.message,
                "exchange failed",
            ),
        }
    }

    fn log_writer_error(&self, _ctx: &Context, error: &BoxError) {
        tracing::error!(
            target: "exchange",
            error = %error,
            "unable to write JSON-RPC response",
        );
    }

    fn log_notification(&self, _ctx: &Context, request: &Request) {
        tracing::info!(
            target: "exchange",
            method = %quote_method(&request.method),
            param_size = param_size(request),
            "notified",
        );
    }

    fn log_call(&self, _ctx: &Context, request: &Request, response: &Response) {
        match response {
            Response::Success(response) => tracing::info!(
                target: "exchange",
                method = %quote_method(&request.method),
                param_size = param_size(request),
                result_size = response.result.get().len(),
                "called",
            ),
            Response::Error(response) => {
                let error = &response.error;

                match &response.server_error {
                    Some(cause) => tracing::warn!(
                        target: "exchange",
                        method = %quote_method(&request.method),
                        param_size = param_size(request),
                        code = error.code.value(),
                        description = error.code.description(),
                        message = %error.message,
                        server_error = %cause,
                        "call failed",
                    ),
                    None => tracing::warn!(
                        target: "exchange",
                        method = %quote_method(&request.method),
                        param_size = param_size(request),
                        code = error.code.value(),
                        description = error.code.description(),
                        message = %error.message,
                        "call failed",
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::quote_method;

    #[test]
    fn quote_method_escapes_non_printable_bytes() {
        assert_eq!(quote_method("echo"), r#""echo""#);
        assert_eq!(quote_method("a\u{0}b"), r#""a\0b""#);
        assert_eq!(quote_method("line\nbreak"), r#""line\nbreak""#);
    }
}
