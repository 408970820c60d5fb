use super::{Descriptor, DescriptorSource, SourceError, lookup_method, lookup_symbol};
use prost_reflect::{DescriptorPool, MethodDescriptor, ServiceDescriptor};
use prost_types::FileDescriptorSet;
use std::collections::{BTreeMap, HashSet};

/// A [`DescriptorSource`] over descriptors loaded up front.
///
/// The registry is built once and never changes, so lookups are plain map reads.
#[derive(Debug, Clone)]
pub struct FileSource {
    pool: DescriptorPool,
    services: BTreeMap<String, ServiceDescriptor>,
}

impl FileSource {
    pub fn new(pool: DescriptorPool) -> Self {
        let services = pool
            .services()
            .map(|service| (service.full_name().to_string(), service))
            .collect();

        Self { pool, services }
    }

    /// Builds a source from an encoded `FileDescriptorSet`.
    pub fn decode(bytes: &[u8]) -> Result<Self, SourceError> {
        Ok(Self::new(DescriptorPool::decode(bytes)?))
    }

    /// Builds a source from one or more descriptor sets.
    ///
    /// Files appearing in several sets (a shared import, typically) are kept once.
    pub fn from_file_descriptor_sets(
        sets: impl IntoIterator<Item = FileDescriptorSet>,
    ) -> Result<Self, SourceError> {
        let mut seen = HashSet::new();

        let file = sets
            .into_iter()
            .flat_map(|set| set.file)
            .filter(|fd| seen.insert(fd.name.clone()))
            .collect();

        let pool = DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file })?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    fn service(&self, name: &str) -> Result<&ServiceDescriptor, SourceError> {
        self.services
            .get(name)
            .ok_or_else(|| SourceError::ServiceNotFound(name.to_string()))
    }
}

impl DescriptorSource for FileSource {
    async fn find_symbol(&self, name: &str) -> Result<Descriptor, SourceError> {
        lookup_symbol(&self.pool, name).ok_or_else(|| SourceError::SymbolNotFound(name.to_string()))
    }

    async fn list_services(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.services.keys().cloned().collect())
    }

    async fn find_service(&self, name: &str) -> Result<ServiceDescriptor, SourceError> {
        self.service(name).cloned()
    }

    async fn find_method(
        &self,
        service: &str,
        method: &str,
    ) -> Result<MethodDescriptor, SourceError> {
        lookup_method(self.service(service)?, method).ok_or_else(|| SourceError::MethodNotFound {
            service: service.to_string(),
            method: method.to_string(),
        })
    }
}
