//! Typed dispatch: maps method names onto user handlers and adapts their
//! parameter and result shapes to the untyped request/response stream.

use {
    crate::{context::Context, exchange::Exchanger, logger::quote_method},
    async_trait::async_trait,
    exchange_rpc::rpc::{
        params::{unmarshal_params, Params, UnmarshalOptions},
        BoxError, Cancellation, Error, ErrorResponse, Request, Response, SuccessResponse,
    },
    exchange_rpc::serde_helpers::null_raw_value,
    futures_util::future::BoxFuture,
    serde::Serialize,
    serde_json::value::RawValue,
    std::{collections::HashMap, future::Future, sync::Arc},
};


type UntypedResult = Result<Option<Box<RawValue>>, BoxError>;

/// The uniform shape every route is adapted into: a handler of raw
/// requests producing an optional raw result (`None` marshals as `null`).
pub type UntypedHandler =
    Arc<dyn Fn(Context, Request) -> BoxFuture<'static, UntypedResult> + Send + Sync>;

/// An [`Exchanger`] that dispatches requests by method name.
///
/// The route table is immutable once built, so a `Router` can be shared
/// across concurrent exchanges without synchronization.
pub struct Router {
    routes: HashMap<String, UntypedHandler>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder {
            routes: HashMap::new(),
            options: UnmarshalOptions::default(),
        }
    }
}

#[async_trait]
impl Exchanger for Router {
    async fn call(&self, ctx: Context, request: Request) -> Response {
        let request_id = request.response_id();

        let Some(handler) = self.routes.get(&request.method) else {
            return Response::Error(ErrorResponse::from_error(
                request_id,
                Box::new(Error::method_not_found()),
            ));
        };

        match handler(ctx, request).await {
            Ok(Some(result)) => Response::Success(SuccessResponse::new(request_id, result)),
            Ok(None) => Response::Success(SuccessResponse::new(request_id, null_raw_value())),
            Err(err) => Response::Error(ErrorResponse::from_error(
                request_id,
                reclassify_deadline(err),
            )),
        }
    }

    async fn notify(&self, ctx: Context, request: Request) {
        // An unrouted notification is dropped: no response is possible.
        let Some(handler) = self.routes.get(&request.method) else {
            return;
        };

        let method = quote_method(&request.method);

        if let Err(err) = handler(ctx, request).await {
            tracing::error!(
                target: "exchange",
                method = %method,
                error = %err,
                "notification handler failed",
            );
        }
    }
}

// Handlers that bound their own work with tokio timeouts produce `Elapsed`
// errors, which carry the same meaning as an expired deadline.
fn reclassify_deadline(err: BoxError) -> BoxError {
    if err.is::<tokio::time::error::Elapsed>() {
        Box::new(Cancellation::DeadlineExceeded)
    } else {
        err
    }
}

/// Builds a [`Router`].
///
/// Registering two routes for the same method name is a programming error
/// and fails fast with a panic.
pub struct RouterBuilder {
    routes: HashMap<String, RouteSpec>,
    options: UnmarshalOptions,
}

struct RouteSpec {
    make: Box<dyn FnOnce(UnmarshalOptions) -> UntypedHandler + Send>,
}

impl RouterBuilder {
    /// Adds a typed route. Parameters are decoded with the builder-wide
    /// [`UnmarshalOptions`].
    pub fn with_route<P, R, E, F, Fut>(self, method: impl Into<String>, handler: F) -> Self
    where
        P: Params + Send + 'static,
        R: Serialize + Send + 'static,
        E: Into<BoxError> + Send + 'static,
        F: Fn(Context, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        self.insert(method.into(), RouteSpec {
            make: Box::new(move |options| typed_route(handler, options)),
        })
    }

    /// Adds a typed route with its own decode options, overriding the
    /// builder-wide ones.
    pub fn with_route_options<P, R, E, F, Fut>(
        self,
        method: impl Into<String>,
        handler: F,
        options: UnmarshalOptions,
    ) -> Self
    where
        P: Params + Send + 'static,
        R: Serialize + Send + 'static,
        E: Into<BoxError> + Send + 'static,
        F: Fn(Context, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        self.insert(method.into(), RouteSpec {
            make: Box::new(move |_| typed_route(handler, options)),
        })
    }

    /// Adds a route that receives the raw [`Request`] and produces an
    /// optional raw result.
    pub fn with_untyped_route<F, Fut>(self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = UntypedResult> + Send + 'static,
    {
        let handler = Arc::new(handler);

        self.insert(method.into(), RouteSpec {
            make: Box::new(move |_| {
                Arc::new(move |ctx, request| {
                    let handler = Arc::clone(&handler);
                    let future: BoxFuture<'static, UntypedResult> =
                        Box::pin(async move { handler(ctx, request).await });

                    future
                })
            }),
        })
    }

    /// Relaxes strict parameter decoding for every typed route that does
    /// not carry its own options.
    pub fn allow_unknown_fields(mut self, allow: bool) -> Self {
        self.options.allow_unknown_fields = allow;
        self
    }

    pub fn build(self) -> Router {
        let options = self.options;

        Router {
            routes: self
                .routes
                .into_iter()
                .map(|(method, spec)| (method, (spec.make)(options)))
                .collect(),
        }
    }

    fn insert(mut self, method: String, spec: RouteSpec) -> Self {
        if self.routes.contains_key(&method) {
            panic!("a route for method {method:?} is already registered");
        }

        self.routes.insert(method, spec);
        self
    }
}

fn typed_route<P, R, E, F, Fut>(handler: F, options: UnmarshalOptions) -> UntypedHandler
where
    P: Params + Send + 'static,
    R: Serialize + Send + 'static,
    E: Into<BoxError> + Send + 'static,
    F: Fn(Context, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let handler = Arc::new(handler);

    Arc::new(move |ctx, request| {
        let handler = Arc::clone(&handler);

        let future: BoxFuture<'static, UntypedResult> = Box::pin(async move {
            let params = unmarshal_params::<P>(&request, &options)?;
            let result = handler(ctx, params).await.map_err(Into::into)?;
            let raw = serde_json::value::to_raw_value(&result)?;

            Ok(Some(raw))
        });

        future
    })
}
