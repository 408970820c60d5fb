//! # gRPC-Web
//!
//! The gRPC-Web protocol carries gRPC messages over plain HTTP requests, so it can cross
//! proxies and browsers that cannot speak HTTP/2 trailers.
//!
//! * [`codec`]: the length-prefixed frame envelope and trailer parsing.
//! * [`headers`]: header names and header value helpers.
//! * [`transport`]: the [`transport::Transport`] seam and its HTTP implementation.
pub mod codec;
pub mod headers;
pub mod transport;
