//! # Reflection Response Extractor
//!
//! Hand-built requests and narrow response extractors for `ServerReflectionInfo`.
//!
//! Only the handful of fields the client needs are read, straight off the
//! [`FieldReader`], so no compiled schema of the reflection protocol is required.
//! Unknown fields, and known fields with an unexpected wire type, are skipped.
//!
//! Field numbers used:
//!
//! | Message | Field | Number |
//! |---|---|---|
//! | request | `file_by_filename` | 3 |
//! | request | `file_containing_symbol` | 4 |
//! | request | `list_services` | 7 |
//! | response | `file_descriptor_response` | 4 |
//! | response | `list_services_response` | 6 |
//! | response | `error_response` | 7 |
//! | `FileDescriptorResponse` | `file_descriptor_proto` | 1 |
//! | `ListServiceResponse` | `service` | 1 |
//! | `ServiceResponse` | `name` | 1 |
//! | `ErrorResponse` | `error_code` / `error_message` | 1 / 2 |
use crate::wire::{FieldReader, WireError, put_bytes_field};
use bytes::{Bytes, BytesMut};
use tracing::debug;

mod request_field {
    pub const FILE_BY_FILENAME: u32 = 3;
    pub const FILE_CONTAINING_SYMBOL: u32 = 4;
    pub const LIST_SERVICES: u32 = 7;
}

mod response_field {
    pub const FILE_DESCRIPTOR_RESPONSE: u32 = 4;
    pub const LIST_SERVICES_RESPONSE: u32 = 6;
    pub const ERROR_RESPONSE: u32 = 7;

    pub const FILE_DESCRIPTOR_PROTO: u32 = 1;
    pub const SERVICE: u32 = 1;
    pub const SERVICE_NAME: u32 = 1;
    pub const ERROR_CODE: u32 = 1;
    pub const ERROR_MESSAGE: u32 = 2;
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Malformed reflection response: '{0}'")]
    Wire(#[from] WireError),

    #[error("Server returned reflection error code {code}: {message}")]
    Server { code: i32, message: String },

    #[error("No file descriptors in reflection response")]
    NoDescriptors,
}

/// An in-band `error_response`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: i32,
    pub message: String,
}

impl From<ErrorResponse> for ExtractError {
    fn from(err: ErrorResponse) -> Self {
        ExtractError::Server {
            code: err.code,
            message: err.message,
        }
    }
}

pub fn list_services_request() -> Bytes {
    single_field_request(request_field::LIST_SERVICES, "")
}

pub fn file_containing_symbol_request(symbol: &str) -> Bytes {
    single_field_request(request_field::FILE_CONTAINING_SYMBOL, symbol)
}

pub fn file_by_filename_request(filename: &str) -> Bytes {
    single_field_request(request_field::FILE_BY_FILENAME, filename)
}

fn single_field_request(field: u32, value: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(value.len() + 6);
    put_bytes_field(field, value.as_bytes(), &mut buf);
    buf.freeze()
}

/// Looks for an `error_response` in a reflection response.
///
/// A malformed tail inside the error message is ignored: whatever was decoded before
/// it is still reported.
pub fn extract_error(response: &[u8]) -> Result<Option<ErrorResponse>, WireError> {
    for field in FieldReader::new(response) {
        let field = field?;

        if field.number != response_field::ERROR_RESPONSE {
            continue;
        }

        let Some(nested) = field.as_bytes() else {
            continue;
        };

        let mut error = ErrorResponse::default();

        for inner in FieldReader::new(nested).map_while(Result::ok) {
            match inner.number {
                response_field::ERROR_CODE => {
                    if let Some(code) = inner.as_varint() {
                        error.code = code as i32;
                    }
                }
                response_field::ERROR_MESSAGE => {
                    if let Some(message) = inner.as_bytes() {
                        error.message = String::from_utf8_lossy(message).into_owned();
                    }
                }
                _ => {}
            }
        }

        return Ok(Some(error));
    }

    Ok(None)
}

fn ensure_no_error(response: &[u8]) -> Result<(), ExtractError> {
    match extract_error(response)? {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Extracts service names from a `list_services_response`, in encounter order.
///
/// Service entries that cannot be decoded, or that carry no name, are skipped.
pub fn extract_service_names(response: &[u8]) -> Result<Vec<String>, ExtractError> {
    ensure_no_error(response)?;

    let mut names = Vec::new();

    for field in FieldReader::new(response) {
        let field = field?;

        if field.number != response_field::LIST_SERVICES_RESPONSE {
            continue;
        }

        let Some(list) = field.as_bytes() else {
            continue;
        };

        for entry in FieldReader::new(list) {
            let entry = entry?;

            if entry.number != response_field::SERVICE {
                continue;
            }

            let Some(service) = entry.as_bytes() else {
                continue;
            };

            match service_name(service) {
                Ok(Some(name)) => names.push(name),
                Ok(None) => debug!("Skipping service entry without a name"),
                Err(err) => debug!(%err, "Skipping malformed service entry"),
            }
        }
    }

    Ok(names)
}

fn service_name(service: &[u8]) -> Result<Option<String>, WireError> {
    for field in FieldReader::new(service) {
        let field = field?;

        if field.number == response_field::SERVICE_NAME
            && let Some(name) = field.as_str()
        {
            return Ok(Some(name.to_string()));
        }
    }

    Ok(None)
}

/// Extracts the serialized `FileDescriptorProto`s of a `file_descriptor_response`.
///
/// An empty answer is an error: a reflection server never legitimately returns one.
pub fn extract_file_descriptors(response: &[u8]) -> Result<Vec<&[u8]>, ExtractError> {
    ensure_no_error(response)?;

    let mut descriptors = Vec::new();

    for field in FieldReader::new(response) {
        let field = field?;

        if field.number != response_field::FILE_DESCRIPTOR_RESPONSE {
            continue;
        }

        let Some(nested) = field.as_bytes() else {
            continue;
        };

        for inner in FieldReader::new(nested) {
            let inner = inner?;

            if inner.number == response_field::FILE_DESCRIPTOR_PROTO
                && let Some(bytes) = inner.as_bytes()
            {
                descriptors.push(bytes);
            }
        }
    }

    if descriptors.is_empty() {
        return Err(ExtractError::NoDescriptors);
    }

    Ok(descriptors)
}
