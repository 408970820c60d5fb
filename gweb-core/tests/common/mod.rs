//! Shared fixtures: an in-memory echo schema and a fake gRPC-Web server that answers both the
//! echo service and the reflection service without any network.
#![allow(dead_code)]

use bytes::Bytes;
use gweb_core::{
    BoxError,
    grpc_web::{
        codec::{DecodedResponse, Status},
        transport::{CallRequest, CallResponse, Transport, TransportError},
    },
};
use http::{HeaderMap, StatusCode};
use prost::Message;
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MethodDescriptorProto, ServiceDescriptorProto,
    field_descriptor_proto::{Label, Type},
};
use std::{collections::HashMap, sync::Mutex};

pub const V1ALPHA: &str = "grpc.reflection.v1alpha.ServerReflection";
pub const V1: &str = "grpc.reflection.v1.ServerReflection";

fn field(
    name: &str,
    json_name: &str,
    number: i32,
    ty: Type,
    type_name: Option<&str>,
) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        json_name: Some(json_name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        type_name: type_name.map(str::to_string),
        ..Default::default()
    }
}

fn method(name: &str, client_streaming: bool, server_streaming: bool) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(".echo.EchoRequest".to_string()),
        output_type: Some(".echo.EchoResponse".to_string()),
        client_streaming: Some(client_streaming),
        server_streaming: Some(server_streaming),
        ..Default::default()
    }
}

/// `common.proto`: imported by `echo.proto`.
pub fn common_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("common.proto".to_string()),
        package: Some("common".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![DescriptorProto {
            name: Some("Meta".to_string()),
            field: vec![field("request_id", "requestId", 1, Type::String, None)],
            ..Default::default()
        }],
        enum_type: vec![EnumDescriptorProto {
            name: Some("Level".to_string()),
            value: vec![
                EnumValueDescriptorProto {
                    name: Some("LEVEL_UNSPECIFIED".to_string()),
                    number: Some(0),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("LEVEL_HIGH".to_string()),
                    number: Some(1),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// `echo.proto`: the `echo.EchoService` and `echo.Admin` services.
pub fn echo_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("echo.proto".to_string()),
        package: Some("echo".to_string()),
        dependency: vec!["common.proto".to_string()],
        syntax: Some("proto3".to_string()),
        message_type: vec![
            DescriptorProto {
                name: Some("EchoRequest".to_string()),
                field: vec![
                    field("message", "message", 1, Type::String, None),
                    field("repeat", "repeat", 2, Type::Int32, None),
                    field("meta", "meta", 3, Type::Message, Some(".common.Meta")),
                ],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("EchoResponse".to_string()),
                field: vec![
                    field("message", "message", 1, Type::String, None),
                    field("index", "index", 2, Type::Int32, None),
                    field("level", "level", 3, Type::Enum, Some(".common.Level")),
                    field("request_id", "requestId", 4, Type::String, None),
                ],
                ..Default::default()
            },
        ],
        service: vec![
            ServiceDescriptorProto {
                name: Some("EchoService".to_string()),
                method: vec![
                    method("Echo", false, false),
                    method("StreamEcho", false, true),
                    method("Collect", true, false),
                    method("Fail", false, false),
                ],
                ..Default::default()
            },
            ServiceDescriptorProto {
                name: Some("Admin".to_string()),
                method: vec![method("Ping", false, false)],
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

pub fn echo_descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![common_file(), echo_file()],
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Meta {
    #[prost(string, tag = "1")]
    pub request_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct EchoRequest {
    #[prost(string, tag = "1")]
    pub message: String,
    #[prost(int32, tag = "2")]
    pub repeat: i32,
    #[prost(message, optional, tag = "3")]
    pub meta: Option<Meta>,
}

#[derive(Clone, PartialEq, Message)]
pub struct EchoResponse {
    #[prost(string, tag = "1")]
    pub message: String,
    #[prost(int32, tag = "2")]
    pub index: i32,
    #[prost(int32, tag = "3")]
    pub level: i32,
    #[prost(string, tag = "4")]
    pub request_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ServerReflectionRequest {
    #[prost(string, tag = "1")]
    pub host: String,
    #[prost(oneof = "MessageRequest", tags = "3, 4, 7")]
    pub message_request: Option<MessageRequest>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum MessageRequest {
    #[prost(string, tag = "3")]
    FileByFilename(String),
    #[prost(string, tag = "4")]
    FileContainingSymbol(String),
    #[prost(string, tag = "7")]
    ListServices(String),
}

#[derive(Clone, PartialEq, Message)]
pub struct ServerReflectionResponse {
    #[prost(oneof = "MessageResponse", tags = "4, 6, 7")]
    pub message_response: Option<MessageResponse>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum MessageResponse {
    #[prost(message, tag = "4")]
    FileDescriptorResponse(FileDescriptorResponse),
    #[prost(message, tag = "6")]
    ListServicesResponse(ListServiceResponse),
    #[prost(message, tag = "7")]
    ErrorResponse(ErrorResponse),
}

#[derive(Clone, PartialEq, Message)]
pub struct FileDescriptorResponse {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub file_descriptor_proto: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListServiceResponse {
    #[prost(message, repeated, tag = "1")]
    pub service: Vec<ServiceResponse>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ServiceResponse {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ErrorResponse {
    #[prost(int32, tag = "1")]
    pub error_code: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

/// Which reflection services the fake server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reflection {
    Both,
    V1Only,
    None,
}

/// An in-memory server for the echo schema.
///
/// Every call is recorded as `service/method` so tests can check which requests were sent.
/// `file_containing_symbol` answers with the defining file only, the imports have to be
/// requested by filename.
pub struct FakeServer {
    reflection: Reflection,
    services: Vec<String>,
    files: HashMap<String, FileDescriptorProto>,
    calls: Mutex<Vec<String>>,
    reflection_requests: Mutex<Vec<MessageRequest>>,
}

impl FakeServer {
    pub fn new(reflection: Reflection) -> Self {
        let files = echo_descriptor_set()
            .file
            .into_iter()
            .map(|fd| (fd.name().to_string(), fd))
            .collect();

        Self {
            reflection,
            services: vec![
                "echo.EchoService".to_string(),
                V1ALPHA.to_string(),
                V1.to_string(),
                "echo.Admin".to_string(),
            ],
            files,
            calls: Mutex::new(Vec::new()),
            reflection_requests: Mutex::new(Vec::new()),
        }
    }

    /// Stops serving `filename`, requests for it get a `NOT_FOUND` error response.
    pub fn without_file(mut self, filename: &str) -> Self {
        self.files.remove(filename);
        self
    }

    /// The `service/method` paths called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// The reflection requests that reached a reflection service, in order.
    pub fn reflection_requests(&self) -> Vec<MessageRequest> {
        self.reflection_requests.lock().unwrap().clone()
    }

    fn handle(&self, request: &CallRequest) -> (Vec<Bytes>, Status) {
        match request.service.as_str() {
            V1ALPHA if self.reflection == Reflection::Both => self.reflect(&request.message),
            V1 if self.reflection != Reflection::None => self.reflect(&request.message),
            "echo.EchoService" => self.echo(&request.method, &request.message),
            _ => (Vec::new(), status(12, "unknown service")),
        }
    }

    fn reflect(&self, message: &[u8]) -> (Vec<Bytes>, Status) {
        let request = ServerReflectionRequest::decode(message).unwrap();
        let message_request = request.message_request.unwrap();

        self.reflection_requests
            .lock()
            .unwrap()
            .push(message_request.clone());

        let response = match message_request {
            MessageRequest::ListServices(_) => {
                MessageResponse::ListServicesResponse(ListServiceResponse {
                    service: self
                        .services
                        .iter()
                        .map(|name| ServiceResponse { name: name.clone() })
                        .collect(),
                })
            }
            MessageRequest::FileByFilename(name) => self.file_response(self.files.get(&name)),
            MessageRequest::FileContainingSymbol(symbol) => {
                let file = self.files.values().find(|fd| defines(fd, &symbol));
                self.file_response(file)
            }
        };

        let response = ServerReflectionResponse {
            message_response: Some(response),
        };

        (vec![response.encode_to_vec().into()], Status::default())
    }

    fn file_response(&self, file: Option<&FileDescriptorProto>) -> MessageResponse {
        match file {
            Some(fd) => MessageResponse::FileDescriptorResponse(FileDescriptorResponse {
                file_descriptor_proto: vec![fd.encode_to_vec()],
            }),
            None => MessageResponse::ErrorResponse(ErrorResponse {
                error_code: 5,
                error_message: "not found".to_string(),
            }),
        }
    }

    fn echo(&self, method: &str, message: &[u8]) -> (Vec<Bytes>, Status) {
        let request = EchoRequest::decode(message).unwrap();
        let request_id = request.meta.map(|m| m.request_id).unwrap_or_default();

        let reply = |index: i32| -> Bytes {
            EchoResponse {
                message: request.message.clone(),
                index,
                level: 1,
                request_id: request_id.clone(),
            }
            .encode_to_vec()
            .into()
        };

        match method {
            "Echo" => (vec![reply(0)], Status::default()),
            "StreamEcho" => ((0..request.repeat).map(reply).collect(), Status::default()),
            "Fail" => (Vec::new(), status(5, "nope")),
            _ => (Vec::new(), status(12, "unknown method")),
        }
    }
}

fn status(code: i32, message: &str) -> Status {
    Status {
        code,
        message: message.to_string(),
    }
}

/// Whether `fd` defines `symbol` as a service, message, enum or method.
fn defines(fd: &FileDescriptorProto, symbol: &str) -> bool {
    let Some(local) = symbol
        .strip_prefix(fd.package())
        .and_then(|rest| rest.strip_prefix('.'))
    else {
        return false;
    };

    fd.message_type.iter().any(|m| m.name() == local)
        || fd.enum_type.iter().any(|e| e.name() == local)
        || fd.service.iter().any(|s| {
            s.name() == local
                || s.method
                    .iter()
                    .any(|m| format!("{}.{}", s.name(), m.name()) == local)
        })
}

impl Transport for FakeServer {
    async fn server_streaming<F, E>(
        &self,
        request: CallRequest,
        mut on_message: F,
    ) -> Result<CallResponse, TransportError>
    where
        F: FnMut(&Bytes) -> Result<(), E>,
        E: Into<BoxError>,
    {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}/{}", request.service, request.method));

        let (messages, status) = self.handle(&request);

        for message in &messages {
            on_message(message).map_err(|e| TransportError::Callback(e.into()))?;
        }

        let decoded = DecodedResponse {
            messages,
            trailers: HashMap::new(),
            status: Some(status),
        };

        Ok(CallResponse::new(decoded, StatusCode::OK, HeaderMap::new()))
    }
}
