//! # gRPC-Web Client
//!
//! [`GrpcWebClient`] performs dynamic calls: the method is resolved through a
//! [`DescriptorSource`], the JSON body is validated and encoded against the method's input
//! type, and every reply is decoded against its output type.
//!
//! The client is generic over both the [`Transport`] and the [`DescriptorSource`], so the same
//! code runs against a local descriptor set or server reflection.
//!
//! ```rust,no_run
//! use gweb_core::client::{DynamicRequest, GrpcWebClient};
//! use gweb_core::descriptor::ReflectionSource;
//! use gweb_core::grpc_web::transport::{HttpTransport, TransportOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new("http://localhost:8080", TransportOptions::default())?;
//! let client = GrpcWebClient::new(&transport, ReflectionSource::new(&transport));
//!
//! let body = serde_json::json!({"message": "hi"});
//! let request = DynamicRequest::from_path("echo.EchoService/Echo", body)?;
//! let response = client.dynamic(request).await?;
//! # Ok(())
//! # }
//! ```
mod types;

pub use types::*;

use crate::{
    BoxError,
    descriptor::{DescriptorSource, SourceError},
    grpc_web::transport::{CallRequest, Transport, TransportError},
    json::{JsonCodec, JsonCodecError},
};
use bytes::Bytes;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::convert::Infallible;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DynamicCallError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(
        "Method '{0}' uses client or bidirectional streaming, which gRPC-Web does not support"
    )]
    UnsupportedStreaming(String),

    #[error(transparent)]
    Json(#[from] JsonCodecError),

    #[error("gRPC-Web request failed: '{0}'")]
    Transport(#[from] TransportError),

    #[error("Message handler failed: '{0}'")]
    Handler(#[source] BoxError),
}

/// A dynamic gRPC-Web client.
#[derive(Debug, Clone)]
pub struct GrpcWebClient<T, D> {
    transport: T,
    source: D,
}

impl<T, D> GrpcWebClient<T, D>
where
    T: Transport,
    D: DescriptorSource,
{
    pub fn new(transport: T, source: D) -> Self {
        Self { transport, source }
    }

    /// The descriptor source used to resolve methods.
    pub fn source(&self) -> &D {
        &self.source
    }

    /// Executes a unary or server-streaming call and collects every reply.
    ///
    /// A non-OK gRPC status is not an error here: it is reported in
    /// [`DynamicResponse::status`].
    pub async fn dynamic(
        &self,
        request: DynamicRequest,
    ) -> Result<DynamicResponse, DynamicCallError> {
        self.dynamic_streaming(request, |_| Ok::<_, Infallible>(()))
            .await
    }

    /// Like [`Self::dynamic`], but hands each reply to `on_message` as soon as it is decoded.
    ///
    /// Replies are delivered in arrival order. If `on_message` fails the call is aborted and
    /// its error is returned as [`DynamicCallError::Handler`].
    pub async fn dynamic_streaming<F, E>(
        &self,
        request: DynamicRequest,
        on_message: F,
    ) -> Result<DynamicResponse, DynamicCallError>
    where
        F: FnMut(&DynamicMessage) -> Result<(), E>,
        E: Into<BoxError>,
    {
        let method = self
            .source
            .find_method(&request.service, &request.method)
            .await?;

        self.invoke(method, request.body, request.headers, on_message)
            .await
    }

    /// Calls an already resolved method.
    pub async fn invoke<F, E>(
        &self,
        method: MethodDescriptor,
        body: serde_json::Value,
        headers: Vec<(String, String)>,
        mut on_message: F,
    ) -> Result<DynamicResponse, DynamicCallError>
    where
        F: FnMut(&DynamicMessage) -> Result<(), E>,
        E: Into<BoxError>,
    {
        if method.is_client_streaming() {
            return Err(DynamicCallError::UnsupportedStreaming(
                method.full_name().to_string(),
            ));
        }

        let codec = JsonCodec::new(method.input(), method.output());
        let message = codec.encode(body)?;

        debug!(method = method.full_name(), "Calling method");

        let service = method.parent_service();
        let call =
            CallRequest::new(service.full_name(), method.name(), message).with_headers(headers);

        let mut messages = Vec::new();

        let result = self
            .transport
            .server_streaming(call, |payload: &Bytes| -> Result<(), BoxError> {
                let message = codec.decode(payload)?;

                if let Err(err) = on_message(&message) {
                    return Err(err.into());
                }

                messages.push(message);
                Ok(())
            })
            .await;

        let response = match result {
            Ok(response) => response,
            Err(TransportError::Callback(err)) => {
                return Err(match err.downcast::<JsonCodecError>() {
                    Ok(err) => DynamicCallError::Json(*err),
                    Err(err) => DynamicCallError::Handler(err),
                });
            }
            Err(err) => return Err(err.into()),
        };

        Ok(DynamicResponse {
            method,
            messages,
            trailers: response.trailers,
            status: response.status,
        })
    }
}
