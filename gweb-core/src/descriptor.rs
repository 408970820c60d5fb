//! # Descriptor Sources
//!
//! A [`DescriptorSource`] answers schema questions (which services exist, what a method looks
//! like) regardless of where the schema comes from:
//!
//! * [`FileSource`]: a registry built once from local `FileDescriptorSet`s.
//! * [`ReflectionSource`]: asks the server through the reflection protocol on every lookup.
//!
//! [`parse_service_method`] splits a `package.Service/Method` path into the two names needed
//! to dispatch a call.
mod file;
mod reflection;

pub use file::FileSource;
pub use reflection::ReflectionSource;

use crate::reflection::client::ReflectionError;
use prost::Message;
use prost_reflect::{
    DescriptorError, DescriptorPool, EnumDescriptor, MessageDescriptor, MethodDescriptor,
    ServiceDescriptor,
};
use prost_types::FileDescriptorSet;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Symbol '{0}' not found")]
    SymbolNotFound(String),

    #[error("Service '{0}' not found")]
    ServiceNotFound(String),

    #[error("Method '{method}' not found in service '{service}'")]
    MethodNotFound { service: String, method: String },

    #[error("Invalid method path '{0}', expected 'package.Service/Method'")]
    InvalidMethodPath(String),

    #[error("Failed to build descriptor pool: '{0}'")]
    Descriptor(#[from] DescriptorError),

    #[error("Failed to decode file descriptor set: '{0}'")]
    Decode(#[from] prost::DecodeError),

    #[error("Failed to read '{}': '{source}'", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Reflection(#[from] ReflectionError),
}

impl SourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SourceError::SymbolNotFound(_)
                | SourceError::ServiceNotFound(_)
                | SourceError::MethodNotFound { .. }
        )
    }
}

/// A generic wrapper for the descriptors a symbol can resolve to.
#[derive(Debug, Clone)]
pub enum Descriptor {
    ServiceDescriptor(ServiceDescriptor),
    MethodDescriptor(MethodDescriptor),
    MessageDescriptor(MessageDescriptor),
    EnumDescriptor(EnumDescriptor),
}

impl Descriptor {
    /// Returns the name (e.g.,`MyMessage`) of the inner descriptor
    pub fn name(&self) -> &str {
        match self {
            Descriptor::ServiceDescriptor(v) => v.name(),
            Descriptor::MethodDescriptor(v) => v.name(),
            Descriptor::MessageDescriptor(v) => v.name(),
            Descriptor::EnumDescriptor(v) => v.name(),
        }
    }

    /// Returns the full_name (e.g.,`my.package.v1.MyMessage`) of the inner descriptor
    pub fn full_name(&self) -> &str {
        match self {
            Descriptor::ServiceDescriptor(v) => v.full_name(),
            Descriptor::MethodDescriptor(v) => v.full_name(),
            Descriptor::MessageDescriptor(v) => v.full_name(),
            Descriptor::EnumDescriptor(v) => v.full_name(),
        }
    }

    pub fn service_descriptor(&self) -> Option<&ServiceDescriptor> {
        match self {
            Descriptor::ServiceDescriptor(d) => Some(d),
            _ => None,
        }
    }

    pub fn method_descriptor(&self) -> Option<&MethodDescriptor> {
        match self {
            Descriptor::MethodDescriptor(d) => Some(d),
            _ => None,
        }
    }

    pub fn message_descriptor(&self) -> Option<&MessageDescriptor> {
        match self {
            Descriptor::MessageDescriptor(d) => Some(d),
            _ => None,
        }
    }

    pub fn enum_descriptor(&self) -> Option<&EnumDescriptor> {
        match self {
            Descriptor::EnumDescriptor(d) => Some(d),
            _ => None,
        }
    }
}

/// Uniform schema lookups, backed by local files or by server reflection.
#[allow(async_fn_in_trait)]
pub trait DescriptorSource {
    /// Resolves a fully qualified service, method, message or enum name.
    async fn find_symbol(&self, name: &str) -> Result<Descriptor, SourceError>;

    /// Lists the fully qualified names of the available services, sorted.
    async fn list_services(&self) -> Result<Vec<String>, SourceError>;

    async fn find_service(&self, name: &str) -> Result<ServiceDescriptor, SourceError>;

    async fn find_method(
        &self,
        service: &str,
        method: &str,
    ) -> Result<MethodDescriptor, SourceError>;
}

impl<S: DescriptorSource + ?Sized> DescriptorSource for &S {
    async fn find_symbol(&self, name: &str) -> Result<Descriptor, SourceError> {
        (**self).find_symbol(name).await
    }

    async fn list_services(&self) -> Result<Vec<String>, SourceError> {
        (**self).list_services().await
    }

    async fn find_service(&self, name: &str) -> Result<ServiceDescriptor, SourceError> {
        (**self).find_service(name).await
    }

    async fn find_method(
        &self,
        service: &str,
        method: &str,
    ) -> Result<MethodDescriptor, SourceError> {
        (**self).find_method(service, method).await
    }
}

/// Splits `package.Service/Method` into `("package.Service", "Method")`.
///
/// The path must contain exactly one `/`. Neither side is checked for emptiness, so `"/"`
/// yields two empty names.
pub fn parse_service_method(path: &str) -> Result<(&str, &str), SourceError> {
    let mut parts = path.split('/');

    match (parts.next(), parts.next(), parts.next()) {
        (Some(service), Some(method), None) => Ok((service, method)),
        _ => Err(SourceError::InvalidMethodPath(path.to_string())),
    }
}

/// Reads a binary `FileDescriptorSet` (as produced by `protoc --descriptor_set_out`).
pub fn load_descriptor_set(path: impl AsRef<Path>) -> Result<FileDescriptorSet, SourceError> {
    let path = path.as_ref();

    let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(FileDescriptorSet::decode(bytes.as_slice())?)
}

/// Resolves `name` as a service, message, enum or `Service.Method` symbol of `pool`.
pub(crate) fn lookup_symbol(pool: &DescriptorPool, name: &str) -> Option<Descriptor> {
    if let Some(service) = pool.get_service_by_name(name) {
        return Some(Descriptor::ServiceDescriptor(service));
    }

    if let Some(message) = pool.get_message_by_name(name) {
        return Some(Descriptor::MessageDescriptor(message));
    }

    if let Some(enum_desc) = pool.get_enum_by_name(name) {
        return Some(Descriptor::EnumDescriptor(enum_desc));
    }

    let (service, method) = name.rsplit_once('.')?;

    lookup_method(&pool.get_service_by_name(service)?, method).map(Descriptor::MethodDescriptor)
}

pub(crate) fn lookup_method(service: &ServiceDescriptor, method: &str) -> Option<MethodDescriptor> {
    service.methods().find(|m| m.name() == method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::{
        DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FileDescriptorProto,
        MethodDescriptorProto, ServiceDescriptorProto,
    };

    fn pool() -> DescriptorPool {
        let file = FileDescriptorProto {
            name: Some("shop.proto".to_string()),
            package: Some("shop".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Item".to_string()),
                ..Default::default()
            }],
            enum_type: vec![EnumDescriptorProto {
                name: Some("Kind".to_string()),
                value: vec![EnumValueDescriptorProto {
                    name: Some("KIND_UNSPECIFIED".to_string()),
                    number: Some(0),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            service: vec![ServiceDescriptorProto {
                name: Some("Store".to_string()),
                method: vec![MethodDescriptorProto {
                    name: Some("Get".to_string()),
                    input_type: Some(".shop.Item".to_string()),
                    output_type: Some(".shop.Item".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![file] }).unwrap()
    }

    #[test]
    fn test_parse_service_method() {
        assert_eq!(
            parse_service_method("pkg.Svc/Method").unwrap(),
            ("pkg.Svc", "Method")
        );
    }

    #[test]
    fn test_parse_bare_slash_yields_empty_names() {
        assert_eq!(parse_service_method("/").unwrap(), ("", ""));
    }

    #[test]
    fn test_parse_service_method_errors() {
        assert!(matches!(
            parse_service_method("pkg.Svc.Method"),
            Err(SourceError::InvalidMethodPath(_))
        ));
        assert!(matches!(
            parse_service_method("a/b/c"),
            Err(SourceError::InvalidMethodPath(_))
        ));
        assert!(parse_service_method("").is_err());
    }

    #[test]
    fn test_lookup_symbol_kinds() {
        let pool = pool();

        assert!(matches!(
            lookup_symbol(&pool, "shop.Store"),
            Some(Descriptor::ServiceDescriptor(_))
        ));
        assert!(matches!(
            lookup_symbol(&pool, "shop.Item"),
            Some(Descriptor::MessageDescriptor(_))
        ));
        assert!(matches!(
            lookup_symbol(&pool, "shop.Kind"),
            Some(Descriptor::EnumDescriptor(_))
        ));

        let method = lookup_symbol(&pool, "shop.Store.Get").unwrap();
        assert_eq!(method.full_name(), "shop.Store.Get");
        assert!(method.method_descriptor().is_some());

        assert!(lookup_symbol(&pool, "shop.Store.Put").is_none());
        assert!(lookup_symbol(&pool, "Missing").is_none());
    }

    #[test]
    fn test_load_descriptor_set_missing_file() {
        let err = load_descriptor_set("/definitely/not/here.bin").unwrap_err();

        assert!(matches!(err, SourceError::Io { .. }));
    }
}
