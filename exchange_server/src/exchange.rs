//! The exchange engine: reads one request set, validates it, dispatches
//! every request, and streams the responses back through the writer.

use {
    crate::{
        context::Context,
        logger::{DefaultExchangeLogger, ExchangeLogger},
        transport::{ReadError, RequestSetReader, ResponseWriter},
    },
    async_trait::async_trait,
    exchange_rpc::{
        rpc::{BoxError, ErrorCode, ErrorInfo, ErrorResponse, Request, Response},
        serde_helpers::null_raw_value,
    },
    futures_util::{stream::FuturesUnordered, StreamExt},
    std::sync::Arc,
};

#[cfg(test)]
mod tests;

/// Maps a single request to its response.
///
/// The router is the canonical implementation, but anything that can answer
/// a call and absorb a notification can drive an exchange. Implementations
/// are responsible for echoing the originating request's ID on every
/// response they produce.
#[async_trait]
pub trait Exchanger: Send + Sync {
    /// Handles a request that expects a response.
    async fn call(&self, ctx: Context, request: Request) -> Response;

    /// Handles a request that must not receive a response.
    async fn notify(&self, ctx: Context, request: Request);
}

/// The engine's summarized failure.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The caller's context was cancelled before a request set was read.
    #[error("exchange cancelled")]
    Cancelled,

    /// The reader failed below the JSON-RPC layer. The client was notified
    /// on a best-effort basis before this was returned.
    #[error("unable to read JSON-RPC request: {0}")]
    Read(Arc<dyn std::error::Error + Send + Sync>),

    /// A write failed. For batches this also cancelled the exchange
    /// context.
    #[error("unable to write JSON-RPC response: {0}")]
    Write(BoxError),

    /// Closing the writer failed and no more specific error was captured.
    #[error("unable to close the response writer: {0}")]
    Close(BoxError),
}

/// Drives exchanges between a transport and an [`Exchanger`].
///
/// One `Exchange` is constructed per server and shared; each call to
/// [`exchange`](Exchange::exchange) consumes exactly one request set from
/// the reader and drains all of its responses through the writer.
pub struct Exchange<E, L = DefaultExchangeLogger> {
    exchanger: Arc<E>,
    logger: L,
}

impl<E> Exchange<E>
where
    E: Exchanger + 'static,
{
    /// Creates a new engine with the default `tracing`-backed logger.
    pub fn new(exchanger: E) -> Self {
        Self {
            exchanger: Arc::new(exchanger),
            logger: DefaultExchangeLogger,
        }
    }
}

impl<E, L> Exchange<E, L>
where
    E: Exchanger + 'static,
    L: ExchangeLogger,
{
    /// Replaces the logger.
    pub fn with_logger<L2>(self, logger: L2) -> Exchange<E, L2>
    where
        L2: ExchangeLogger,
    {
        Exchange {
            exchanger: self.exchanger,
            logger,
        }
    }

    /// Performs one exchange.
    ///
    /// The writer is closed on every exit path; the close error is surfaced
    /// only when nothing more specific was captured first.
    pub async fn exchange<R, W>(
        &self,
        ctx: &Context,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<(), ExchangeError>
    where
        R: RequestSetReader,
        W: ResponseWriter,
    {
        let result = self.exchange_inner(ctx, reader, writer).await;

        match (result, writer.close().await) {
            (Ok(()), Err(err)) => Err(ExchangeError::Close(err)),
            (result, _) => result,
        }
    }

    async fn exchange_inner<R, W>(
        &self,
        ctx: &Context,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<(), ExchangeError>
    where
        R: RequestSetReader,
        W: ResponseWriter,
    {
        let set = match reader.read(ctx).await {
            Ok(set) => set,
            Err(ReadError::Cancelled) => return Err(ExchangeError::Cancelled),
            Err(ReadError::Rpc(err)) => {
                let response = ErrorResponse::from_error(null_raw_value(), Box::new(err));
                return self.write_set_error(ctx, writer, response).await;
            }
            Err(ReadError::Io(err)) => {
                let cause: Arc<dyn std::error::Error + Send + Sync> = Arc::from(err);

                let mut response = ErrorResponse::new(null_raw_value(), ErrorInfo {
                    code: ErrorCode::INTERNAL_ERROR,
                    message: "unable to read JSON-RPC request".to_owned(),
                    data: None,
                });
                response.server_error = Some(Arc::clone(&cause));

                self.logger.log_error(ctx, &response);

                // Best-effort client notification; the reader failure is
                // what the caller gets back.
                if let Err(write_err) = writer.write_error(&response).await {
                    self.logger.log_writer_error(ctx, &write_err);
                }

                return Err(ExchangeError::Read(cause));
            }
        };

        if let Err(err) = set.validate_server_side() {
            let response = ErrorResponse::from_error(null_raw_value(), Box::new(err));
            return self.write_set_error(ctx, writer, response).await;
        }

        let is_batch = set.is_batch;
        let mut requests = set.requests;

        if is_batch && requests.len() > 1 {
            self.exchange_batch(ctx, requests, writer).await
        } else if let Some(request) = requests.pop() {
            self.exchange_single(ctx, request, writer, is_batch).await
        } else {
            // Unreachable: validation rejects empty sets.
            Ok(())
        }
    }

    async fn write_set_error<W>(
        &self,
        ctx: &Context,
        writer: &mut W,
        response: ErrorResponse,
    ) -> Result<(), ExchangeError>
    where
        W: ResponseWriter,
    {
        self.logger.log_error(ctx, &response);

        match writer.write_error(&response).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.logger.log_writer_error(ctx, &err);
                Err(ExchangeError::Write(err))
            }
        }
    }

    /// Dispatches the sole request of a non-batch set or a batch of one.
    ///
    /// A batch of one skips the concurrent path, but still writes through
    /// the batched write so the on-wire framing stays an array.
    async fn exchange_single<W>(
        &self,
        ctx: &Context,
        request: Request,
        writer: &mut W,
        batched: bool,
    ) -> Result<(), ExchangeError>
    where
        W: ResponseWriter,
    {
        if request.is_notification() {
            let logged = request.clone();
            self.exchanger.notify(ctx.clone(), request).await;
            self.logger.log_notification(ctx, &logged);

            return Ok(());
        }

        let logged = request.clone();
        let response = self.exchanger.call(ctx.clone(), request).await;
        self.logger.log_call(ctx, &logged, &response);

        let written = if batched {
            writer.write_batched(&response).await
        } else {
            writer.write_unbatched(&response).await
        };

        if let Err(err) = written {
            self.logger.log_writer_error(ctx, &err);
            return Err(ExchangeError::Write(err));
        }

        Ok(())
    }

    /// Dispatches a batch of more than one request concurrently.
    ///
    /// Every request runs in its own task; the drain loop below is the
    /// single serialization point for the writer, consuming responses in
    /// task-completion order. The first write failure stops further writes
    /// and cancels the child context, but the engine still awaits every
    /// task before returning.
    async fn exchange_batch<W>(
        &self,
        ctx: &Context,
        requests: Vec<Request>,
        writer: &mut W,
    ) -> Result<(), ExchangeError>
    where
        W: ResponseWriter,
    {
        let child = ctx.child();
        let mut tasks = FuturesUnordered::new();

        for request in requests {
            let exchanger = Arc::clone(&self.exchanger);
            let task_ctx = child.clone();
            let logged = request.clone();

            let handle = tokio::spawn(async move {
                if request.is_notification() {
                    exchanger.notify(task_ctx, request).await;
                    None
                } else {
                    Some(exchanger.call(task_ctx, request).await)
                }
            });

            tasks.push(async move { (logged, handle.await) });
        }

        let mut ok = true;
        let mut write_error = None;

        while let Some((request, joined)) = tasks.next().await {
            let response = match joined {
                Ok(response) => response,
                // A panicked handler still owes its caller a response.
                Err(join_err) if !request.is_notification() => {
                    let mut response = ErrorResponse::new(request.response_id(), ErrorInfo {
                        code: ErrorCode::INTERNAL_ERROR,
                        message: ErrorCode::INTERNAL_ERROR.description().to_owned(),
                        data: None,
                    });
                    response.server_error = Some(Arc::new(join_err));

                    Some(Response::Error(response))
                }
                Err(_) => None,
            };

            match response {
                None => self.logger.log_notification(ctx, &request),
                Some(response) => {
                    self.logger.log_call(ctx, &request, &response);

                    if ok {
                        if let Err(err) = writer.write_batched(&response).await {
                            self.logger.log_writer_error(ctx, &err);
                            child.cancel();
                            ok = false;
                            write_error = Some(err);
                        }
                    }
                }
            }
        }

        match write_error {
            None => Ok(()),
            Some(err) => Err(ExchangeError::Write(err)),
        }
    }
}
