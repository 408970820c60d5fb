//! # Reflection Client
//!
//! A client for `grpc.reflection.v1alpha` and `grpc.reflection.v1` over gRPC-Web.
//!
//! gRPC-Web cannot carry the bidirectional stream the reflection protocol is designed around,
//! so every reflection request is sent as its own call with a single request message, and the
//! first reply message is read.
//!
//! Each call is first sent to the `v1alpha` service and, if that fails, sent once more to the
//! `v1` service. The second failure is returned as is. Errors reported in-band by the
//! reflection service (`error_response`) are answers, not failures, and are never retried.
//!
//! When resolving a symbol, the client inspects the imports of every returned file and requests
//! the missing ones by filename until the whole schema tree is known.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)
use super::extract::{
    ExtractError, extract_file_descriptors, extract_service_names, file_by_filename_request,
    file_containing_symbol_request, list_services_request,
};
use crate::grpc_web::transport::{CallRequest, Transport, TransportError};
use bytes::Bytes;
use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

pub const REFLECTION_METHOD: &str = "ServerReflectionInfo";

#[derive(Debug, thiserror::Error)]
pub enum ReflectionError {
    #[error("Reflection request failed: '{0}'")]
    Transport(#[from] TransportError),

    #[error("Reflection call failed with status {code}: {message}")]
    Status { code: i32, message: String },

    #[error("No response from reflection service")]
    EmptyResponse,

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Failed to decode FileDescriptorProto: '{0}'")]
    Decode(#[from] prost::DecodeError),

    #[error("Failed to fetch imported file '{filename}': {source}")]
    MissingDependency {
        filename: String,
        #[source]
        source: Box<ReflectionError>,
    },
}

/// The reflection service versions, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionVersion {
    V1Alpha,
    V1,
}

impl ReflectionVersion {
    pub fn service_name(self) -> &'static str {
        match self {
            ReflectionVersion::V1Alpha => "grpc.reflection.v1alpha.ServerReflection",
            ReflectionVersion::V1 => "grpc.reflection.v1.ServerReflection",
        }
    }

    pub fn alternate(self) -> Self {
        match self {
            ReflectionVersion::V1Alpha => ReflectionVersion::V1,
            ReflectionVersion::V1 => ReflectionVersion::V1Alpha,
        }
    }
}

/// A stateless reflection client: every lookup is a new round trip.
#[derive(Debug, Clone)]
pub struct ReflectionClient<T> {
    transport: T,
}

impl<T: Transport> ReflectionClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Lists all services exposed by the server, in the order the server sent them.
    pub async fn list_services(&self) -> Result<Vec<String>, ReflectionError> {
        let response = self.invoke(list_services_request()).await?;

        Ok(extract_service_names(&response)?)
    }

    /// Asks the reflection service for the file containing `symbol` (e.g. `my.package.MyService`)
    /// and every file it transitively imports.
    pub async fn file_descriptors_by_symbol(
        &self,
        symbol: &str,
    ) -> Result<Vec<FileDescriptorProto>, ReflectionError> {
        let mut collected = HashMap::new();
        let mut requested = HashSet::new();
        let mut pending = VecDeque::new();

        let response = self.invoke(file_containing_symbol_request(symbol)).await?;
        collect_descriptors(&response, &mut collected, &mut requested, &mut pending)?;

        while let Some(filename) = pending.pop_front() {
            if collected.contains_key(&filename) {
                continue;
            }

            debug!(%filename, "Fetching missing dependency");

            let fetched = self
                .fetch_dependency(&filename, &mut collected, &mut requested, &mut pending)
                .await;

            if let Err(source) = fetched {
                return Err(ReflectionError::MissingDependency {
                    filename,
                    source: Box::new(source),
                });
            }
        }

        Ok(collected.into_values().collect())
    }

    async fn fetch_dependency(
        &self,
        filename: &str,
        collected: &mut HashMap<String, FileDescriptorProto>,
        requested: &mut HashSet<String>,
        pending: &mut VecDeque<String>,
    ) -> Result<(), ReflectionError> {
        let response = self.invoke(file_by_filename_request(filename)).await?;
        collect_descriptors(&response, collected, requested, pending)
    }

    /// Same as [`Self::file_descriptors_by_symbol`], packed into a `FileDescriptorSet`.
    pub async fn file_descriptor_set_by_symbol(
        &self,
        symbol: &str,
    ) -> Result<FileDescriptorSet, ReflectionError> {
        let file = self.file_descriptors_by_symbol(symbol).await?;

        Ok(FileDescriptorSet { file })
    }

    /// Sends one reflection request, falling back to the alternate service version once.
    async fn invoke(&self, message: Bytes) -> Result<Bytes, ReflectionError> {
        let primary = ReflectionVersion::V1Alpha;

        match self.invoke_version(primary, message.clone()).await {
            Ok(response) => Ok(response),
            Err(err) => {
                let fallback = primary.alternate();

                debug!(
                    %err,
                    fallback = fallback.service_name(),
                    "Reflection call failed, retrying with the alternate service"
                );

                self.invoke_version(fallback, message).await
            }
        }
    }

    async fn invoke_version(
        &self,
        version: ReflectionVersion,
        message: Bytes,
    ) -> Result<Bytes, ReflectionError> {
        let request = CallRequest::new(version.service_name(), REFLECTION_METHOD, message);
        let response = self.transport.unary(request).await?;

        if !response.status.is_ok() {
            return Err(ReflectionError::Status {
                code: response.status.code,
                message: response.status.message,
            });
        }

        response
            .messages
            .into_iter()
            .next()
            .ok_or(ReflectionError::EmptyResponse)
    }
}

fn collect_descriptors(
    response: &[u8],
    collected: &mut HashMap<String, FileDescriptorProto>,
    requested: &mut HashSet<String>,
    pending: &mut VecDeque<String>,
) -> Result<(), ReflectionError> {
    for raw in extract_file_descriptors(response)? {
        let fd = FileDescriptorProto::decode(raw)?;

        let Some(name) = fd.name.clone() else {
            continue;
        };

        if collected.contains_key(&name) {
            continue;
        }

        for dep in &fd.dependency {
            if !collected.contains_key(dep) && requested.insert(dep.clone()) {
                pending.push_back(dep.clone());
            }
        }

        collected.insert(name, fd);
    }

    Ok(())
}
