//! Transport-agnostic JSON-RPC 2.0 server toolkit.
//!
//! The heavy lifting lives in the member crates: [`exchange_rpc`] holds the
//! wire-level data model, and [`exchange_server`] holds the router and the
//! exchange engine. This crate only re-exports them behind feature flags.

#[cfg(feature = "rpc")]
pub use exchange_rpc as rpc;
#[cfg(feature = "server")]
pub use exchange_server as server;
