//! # gweb Core
//!
//! `gweb-core` is the library powering the `gweb` CLI. It calls gRPC services over the
//! gRPC-Web protocol without compile-time knowledge of their Protobuf schema.
//!
//! ## Key Components
//!
//! * **[`wire`]:** A schema-free walker over the Protobuf tagged-field encoding.
//! * **[`grpc_web`]:** The gRPC-Web frame codec, protocol headers and the HTTP
//!   [`Transport`](grpc_web::transport::Transport).
//! * **[`reflection`]:** Server reflection over gRPC-Web, read with the wire walker rather than
//!   generated bindings.
//! * **[`descriptor`]:** The [`DescriptorSource`](descriptor::DescriptorSource) abstraction,
//!   backed by local descriptor sets or by reflection.
//! * **[`client`]:** [`GrpcWebClient`](client::GrpcWebClient), which ties the above together
//!   to perform JSON in, JSON out calls.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost` and `prost-reflect` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod client;
pub mod descriptor;
pub mod grpc_web;
pub mod json;
pub mod reflection;
pub mod wire;

// Re-exports
pub use prost;
pub use prost_reflect;

/// Type alias for the standard boxed error used in generic bounds.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
