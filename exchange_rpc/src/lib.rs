//! This crate provides the JSON-RPC 2.0 wire-level data model shared by
//! servers and clients: requests, responses, the error taxonomy, and the
//! batch-aware set parsers.

pub mod rpc;
pub mod serde_helpers;
