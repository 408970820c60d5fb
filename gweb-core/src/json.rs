//! # JSON <-> Protobuf transcoding
//!
//! Bridges `serde_json::Value` and the Protobuf binary format using `prost_reflect`, so calls
//! can be made without generated Rust structs.
//!
//! * **Encoding (JSON -> Proto)**: the JSON is checked against the input `MessageDescriptor`
//!   while it is deserialized into a `DynamicMessage`. Unknown fields are ignored.
//! * **Decoding (Proto -> JSON)**: the bytes are decoded into a `DynamicMessage` with the output
//!   `MessageDescriptor`, which can then be rendered as JSON.
use bytes::Bytes;
use prost::Message;
use prost_reflect::{DeserializeOptions, DynamicMessage, MessageDescriptor, SerializeOptions};

#[derive(Debug, thiserror::Error)]
pub enum JsonCodecError {
    #[error("JSON structure does not match Protobuf schema: '{0}'")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Failed to decode Protobuf bytes: '{0}'")]
    Decode(#[from] prost::DecodeError),

    #[error("Failed to map message to JSON: '{0}'")]
    Serialize(#[source] serde_json::Error),
}

/// How decoded messages are rendered as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOptions {
    /// Include fields set to their default value.
    pub emit_defaults: bool,
    /// Use the field names from the schema instead of lowerCamelCase.
    pub use_proto_names: bool,
}

/// Transcodes the request and response messages of one method.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    request: MessageDescriptor,
    response: MessageDescriptor,
}

impl JsonCodec {
    pub fn new(request: MessageDescriptor, response: MessageDescriptor) -> Self {
        Self { request, response }
    }

    /// Validates `body` against the request schema and encodes it.
    pub fn encode(&self, body: serde_json::Value) -> Result<Bytes, JsonCodecError> {
        let options = DeserializeOptions::new().deny_unknown_fields(false);

        let message = DynamicMessage::deserialize_with_options(self.request.clone(), body, &options)
            .map_err(JsonCodecError::InvalidJson)?;

        Ok(message.encode_to_vec().into())
    }

    /// Decodes a response payload.
    pub fn decode(&self, payload: &[u8]) -> Result<DynamicMessage, JsonCodecError> {
        Ok(DynamicMessage::decode(self.response.clone(), payload)?)
    }
}

/// Renders any dynamic message as JSON.
pub fn to_json(
    message: &DynamicMessage,
    options: JsonOptions,
) -> Result<serde_json::Value, JsonCodecError> {
    let options = SerializeOptions::new()
        .skip_default_fields(!options.emit_defaults)
        .use_proto_field_name(options.use_proto_names);

    message
        .serialize_with_options(serde_json::value::Serializer, &options)
        .map_err(JsonCodecError::Serialize)
}
