use crate::{
    descriptor::{SourceError, parse_service_method},
    grpc_web::codec::Status,
    json::{JsonCodecError, JsonOptions, to_json},
};
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::collections::HashMap;

/// A request object encapsulating all necessary information to perform a dynamic call.
#[derive(Debug, Clone)]
pub struct DynamicRequest {
    /// The JSON body of the request, an Object `{}`.
    pub body: serde_json::Value,
    /// Custom headers to attach to the request.
    pub headers: Vec<(String, String)>,
    /// The fully qualified name of the service (e.g., `my.package.Service`).
    pub service: String,
    /// The name of the method to call (e.g., `SayHello`).
    pub method: String,
}

impl DynamicRequest {
    /// Builds a request for a `package.Service/Method` path.
    pub fn from_path(path: &str, body: serde_json::Value) -> Result<Self, SourceError> {
        let (service, method) = parse_service_method(path)?;

        Ok(Self {
            body,
            headers: Vec::new(),
            service: service.to_string(),
            method: method.to_string(),
        })
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

/// The result of a dynamic call that reached the server.
#[derive(Debug, Clone)]
pub struct DynamicResponse {
    /// The method that was called.
    pub method: MethodDescriptor,
    /// Decoded replies, in arrival order.
    pub messages: Vec<DynamicMessage>,
    pub trailers: HashMap<String, String>,
    pub status: Status,
}

impl DynamicResponse {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    pub fn to_json(&self, options: JsonOptions) -> Result<Vec<serde_json::Value>, JsonCodecError> {
        self.messages.iter().map(|m| to_json(m, options)).collect()
    }
}
