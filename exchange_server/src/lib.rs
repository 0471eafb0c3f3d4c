//! Server-side half of the JSON-RPC 2.0 toolkit: the typed router, the
//! exchange engine that drives one request set from a transport reader to a
//! transport writer, and the contracts both sit on.

pub use {
    context::Context,
    exchange::{Exchange, ExchangeError, Exchanger},
    logger::{DefaultExchangeLogger, ExchangeLogger},
    router::{Router, RouterBuilder},
    transport::{ReadError, RequestSetReader, ResponseWriter},
};

pub mod context;
pub mod exchange;
pub mod logger;
pub mod router;
pub mod transport;
