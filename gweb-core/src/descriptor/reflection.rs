use super::{Descriptor, DescriptorSource, SourceError, lookup_method, lookup_symbol};
use crate::grpc_web::transport::Transport;
use crate::reflection::{
    client::{ReflectionClient, ReflectionError},
    extract::ExtractError,
};
use prost_reflect::{DescriptorPool, MethodDescriptor, ServiceDescriptor};
use tonic::Code;

const REFLECTION_PACKAGE_PREFIX: &str = "grpc.reflection.";

/// A [`DescriptorSource`] backed by the server's reflection service.
///
/// Nothing is cached: every lookup fetches the file containing the symbol and its imports,
/// and builds a throwaway registry from them.
#[derive(Debug, Clone)]
pub struct ReflectionSource<T> {
    client: ReflectionClient<T>,
}

impl<T: Transport> ReflectionSource<T> {
    pub fn new(transport: T) -> Self {
        Self {
            client: ReflectionClient::new(transport),
        }
    }

    async fn pool_for(
        &self,
        symbol: &str,
        not_found: impl FnOnce() -> SourceError,
    ) -> Result<DescriptorPool, SourceError> {
        let fd_set = match self.client.file_descriptor_set_by_symbol(symbol).await {
            Ok(fd_set) => fd_set,
            Err(ReflectionError::Extract(ExtractError::Server { code, .. }))
                if code == Code::NotFound as i32 =>
            {
                return Err(not_found());
            }
            Err(err) => return Err(err.into()),
        };

        Ok(DescriptorPool::from_file_descriptor_set(fd_set)?)
    }
}

impl<T: Transport> DescriptorSource for ReflectionSource<T> {
    async fn find_symbol(&self, name: &str) -> Result<Descriptor, SourceError> {
        let not_found = || SourceError::SymbolNotFound(name.to_string());

        let pool = self.pool_for(name, not_found).await?;

        lookup_symbol(&pool, name).ok_or_else(not_found)
    }

    /// Lists the user facing services, without the reflection service itself.
    async fn list_services(&self) -> Result<Vec<String>, SourceError> {
        let mut services: Vec<String> = self
            .client
            .list_services()
            .await?
            .into_iter()
            .filter(|name| !name.starts_with(REFLECTION_PACKAGE_PREFIX))
            .collect();

        services.sort();

        Ok(services)
    }

    async fn find_service(&self, name: &str) -> Result<ServiceDescriptor, SourceError> {
        let not_found = || SourceError::ServiceNotFound(name.to_string());

        let pool = self.pool_for(name, not_found).await?;

        pool.get_service_by_name(name).ok_or_else(not_found)
    }

    async fn find_method(
        &self,
        service: &str,
        method: &str,
    ) -> Result<MethodDescriptor, SourceError> {
        let service = self.find_service(service).await?;

        lookup_method(&service, method).ok_or_else(|| SourceError::MethodNotFound {
            service: service.full_name().to_string(),
            method: method.to_string(),
        })
    }
}
