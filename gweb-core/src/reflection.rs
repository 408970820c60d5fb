//! # Server Reflection
//!
//! This module contains the logic necessary to interact with the gRPC Server Reflection Protocol
//! over gRPC-Web.
//!
//! It enables the client to query a server for its own Protobuf schema at runtime, allowing
//! `gweb` to function without a local descriptor set. The reflection messages are read with the
//! schema-free [`crate::wire`] walker, see [`extract`].
pub mod client;
pub mod extract;
