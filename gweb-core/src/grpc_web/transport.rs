//! # gRPC-Web Transport
//!
//! The [`Transport`] trait is the seam between the protocol layer and the HTTP client.
//! It takes an already-encoded request message and returns the decoded response frames.
//!
//! [`HttpTransport`] is the production implementation on top of `reqwest`:
//!
//! * **Path**: the request is POSTed to `{base_url}/{service}/{method}`.
//! * **Body**: a single data frame produced by the frame codec.
//! * **Response**: the body is decoded frame by frame while it is still streaming in, so
//!   server-streaming messages reach the caller as soon as they arrive.
//!
//! Only unary and server-streaming exchanges are supported.
use super::codec::{
    DecodedResponse, FrameError, FrameKind, GrpcWebCodec, Status, DEFAULT_MAX_MESSAGE_SIZE,
    encode_message,
};
use super::headers::{
    CONTENT_TYPE_GRPC_WEB, DEFAULT_USER_AGENT, GRPC_TIMEOUT, X_GRPC_WEB, X_USER_AGENT,
    grpc_timeout, status_from_headers,
};
use crate::BoxError;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use http::{
    HeaderMap, HeaderName, HeaderValue, StatusCode,
    header::{ACCEPT, CONTENT_TYPE, InvalidHeaderName, InvalidHeaderValue},
};
use std::{collections::HashMap, convert::Infallible, net::SocketAddr, pin::pin, time::Duration};
use tokio_util::{codec::FramedRead, io::StreamReader};
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to build the HTTP client: '{0}'")]
    Build(#[source] reqwest::Error),

    #[error("Invalid TLS material: '{0}'")]
    Tls(#[source] reqwest::Error),

    #[error("Invalid header key '{key}': '{source}'")]
    InvalidHeaderName {
        key: String,
        source: InvalidHeaderName,
    },

    #[error("Invalid header value for key '{key}': '{source}'")]
    InvalidHeaderValue {
        key: String,
        source: InvalidHeaderValue,
    },

    #[error("Request failed: '{0}'")]
    Request(#[source] reqwest::Error),

    #[error("HTTP error: {0}")]
    HttpStatus(StatusCode),

    #[error("Failed to decode response: '{0}'")]
    Frame(#[from] FrameError),

    #[error("Message handler failed: '{0}'")]
    Callback(#[source] BoxError),
}

/// A single call: the target method and its already-serialized request message.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub service: String,
    pub method: String,
    pub message: Bytes,
    /// Extra headers for this call only.
    pub headers: Vec<(String, String)>,
}

impl CallRequest {
    pub fn new(service: impl Into<String>, method: impl Into<String>, message: Bytes) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            message,
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

/// The outcome of a call that reached the server.
///
/// A non-OK `status` is not a transport error: the server answered, and it is up to the
/// caller to decide what to do with it.
#[derive(Debug, Clone)]
pub struct CallResponse {
    pub messages: Vec<Bytes>,
    pub trailers: HashMap<String, String>,
    pub status: Status,
    pub http_status: StatusCode,
    pub headers: HeaderMap,
}

impl CallResponse {
    /// Builds a response from the decoded body and the HTTP response head.
    ///
    /// When the body carried no trailer frame the status is taken from the response headers
    /// (trailers-only responses), and defaults to OK otherwise.
    pub fn new(decoded: DecodedResponse, http_status: StatusCode, headers: HeaderMap) -> Self {
        let status = decoded
            .status
            .or_else(|| status_from_headers(&headers))
            .unwrap_or_default();

        Self {
            messages: decoded.messages,
            trailers: decoded.trailers,
            status,
            http_status,
            headers,
        }
    }
}

/// Sends encoded gRPC-Web requests and returns the decoded responses.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Performs a call, invoking `on_message` for each data frame in arrival order.
    ///
    /// `on_message` runs before the next frame is decoded. If it fails, decoding stops and
    /// the error is returned as [`TransportError::Callback`].
    async fn server_streaming<F, E>(
        &self,
        request: CallRequest,
        on_message: F,
    ) -> Result<CallResponse, TransportError>
    where
        F: FnMut(&Bytes) -> Result<(), E>,
        E: Into<BoxError>;

    /// Performs a call and collects every message.
    async fn unary(&self, request: CallRequest) -> Result<CallResponse, TransportError> {
        self.server_streaming(request, |_| Ok::<_, Infallible>(()))
            .await
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    async fn server_streaming<F, E>(
        &self,
        request: CallRequest,
        on_message: F,
    ) -> Result<CallResponse, TransportError>
    where
        F: FnMut(&Bytes) -> Result<(), E>,
        E: Into<BoxError>,
    {
        (**self).server_streaming(request, on_message).await
    }
}

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Total time allowed for a call, also advertised to the server as `grpc-timeout`.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Per-frame payload limit for responses.
    pub max_message_size: usize,
    /// Accept invalid TLS certificates.
    pub insecure: bool,
    /// Extra PEM encoded root certificate.
    pub ca_certificate: Option<Vec<u8>>,
    /// PEM encoded client certificate followed by its private key.
    pub identity: Option<Vec<u8>>,
    /// Pin a host name to a socket address.
    pub resolve: Option<(String, SocketAddr)>,
    /// Headers sent with every call.
    pub headers: Vec<(String, String)>,
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            insecure: false,
            ca_certificate: None,
            identity: None,
            resolve: None,
            headers: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// A [`Transport`] that speaks gRPC-Web over HTTP using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    options: TransportOptions,
}

impl HttpTransport {
    /// Creates a transport for the server at `base_url` (e.g. `https://api.example.com`).
    pub fn new(base_url: &str, options: TransportOptions) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .danger_accept_invalid_certs(options.insecure);

        if let Some(pem) = &options.ca_certificate {
            let cert = reqwest::Certificate::from_pem(pem).map_err(TransportError::Tls)?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(pem) = &options.identity {
            let identity = reqwest::Identity::from_pem(pem).map_err(TransportError::Tls)?;
            builder = builder.identity(identity);
        }

        if let Some((host, addr)) = &options.resolve {
            builder = builder.resolve(host, *addr);
        }

        let client = builder.build().map_err(TransportError::Build)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            options,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_headers(&self, extra: &[(String, String)]) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_GRPC_WEB));
        headers.insert(ACCEPT, HeaderValue::from_static(CONTENT_TYPE_GRPC_WEB));
        headers.insert(X_GRPC_WEB, HeaderValue::from_static("1"));
        let timeout = grpc_timeout(self.options.timeout);
        headers.insert(GRPC_TIMEOUT, header_value(GRPC_TIMEOUT, &timeout)?);
        headers.insert(X_USER_AGENT, header_value(X_USER_AGENT, &self.options.user_agent)?);

        // Per-call headers override the transport wide ones.
        for (key, value) in self.options.headers.iter().chain(extra) {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|source| {
                TransportError::InvalidHeaderName {
                    key: key.clone(),
                    source,
                }
            })?;
            headers.insert(name, header_value(key, value)?);
        }

        Ok(headers)
    }
}

fn header_value(key: &str, value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|source| TransportError::InvalidHeaderValue {
        key: key.to_string(),
        source,
    })
}

impl Transport for HttpTransport {
    async fn server_streaming<F, E>(
        &self,
        request: CallRequest,
        mut on_message: F,
    ) -> Result<CallResponse, TransportError>
    where
        F: FnMut(&Bytes) -> Result<(), E>,
        E: Into<BoxError>,
    {
        let url = format!("{}/{}/{}", self.base_url, request.service, request.method);
        let headers = self.request_headers(&request.headers)?;
        let body = encode_message(&request.message)?;

        debug!(%url, bytes = request.message.len(), "Sending gRPC-Web request");
        trace!(?headers, "Request headers");

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(TransportError::Request)?;

        let http_status = response.status();
        let response_headers = response.headers().clone();

        debug!(%http_status, "Received gRPC-Web response");
        trace!(headers = ?response_headers, "Response headers");

        if http_status != StatusCode::OK {
            return match status_from_headers(&response_headers) {
                Some(status) => Ok(CallResponse {
                    messages: Vec::new(),
                    trailers: HashMap::new(),
                    status,
                    http_status,
                    headers: response_headers,
                }),
                None => Err(TransportError::HttpStatus(http_status)),
            };
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let mut frames = pin!(FramedRead::new(
            StreamReader::new(body),
            GrpcWebCodec::new(self.options.max_message_size),
        ));

        let mut decoded = DecodedResponse::default();

        while let Some(frame) = frames.next().await {
            let frame = frame?;

            if frame.kind == FrameKind::Data {
                on_message(&frame.payload).map_err(|e| TransportError::Callback(e.into()))?;
            }

            decoded.push(frame);
        }

        Ok(CallResponse::new(decoded, http_status, response_headers))
    }
}
