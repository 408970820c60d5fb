//! The descriptor source picked from the command line.
use gweb_core::{
    descriptor::{Descriptor, DescriptorSource, FileSource, ReflectionSource, SourceError},
    grpc_web::transport::HttpTransport,
    prost_reflect::{MethodDescriptor, ServiceDescriptor},
};

pub enum Source<'a> {
    File(FileSource),
    Reflection(ReflectionSource<&'a HttpTransport>),
}

impl DescriptorSource for Source<'_> {
    async fn find_symbol(&self, name: &str) -> Result<Descriptor, SourceError> {
        match self {
            Source::File(source) => source.find_symbol(name).await,
            Source::Reflection(source) => source.find_symbol(name).await,
        }
    }

    async fn list_services(&self) -> Result<Vec<String>, SourceError> {
        match self {
            Source::File(source) => source.list_services().await,
            Source::Reflection(source) => source.list_services().await,
        }
    }

    async fn find_service(&self, name: &str) -> Result<ServiceDescriptor, SourceError> {
        match self {
            Source::File(source) => source.find_service(name).await,
            Source::Reflection(source) => source.find_service(name).await,
        }
    }

    async fn find_method(
        &self,
        service: &str,
        method: &str,
    ) -> Result<MethodDescriptor, SourceError> {
        match self {
            Source::File(source) => source.find_method(service, method).await,
            Source::Reflection(source) => source.find_method(service, method).await,
        }
    }
}
