//! Provider and data source registry
//!
//! Resource types resolve to providers by name prefix: `local_file` is
//! served by the provider registered as `local`; a type with no underscore
//! (`null`) resolves to the provider of the same name.

use crate::error::{ProviderError, Result};
use crate::local::LocalProvider;
use crate::null::NullProvider;
use crate::provider::{DataSource, Provider};
use crate::sources::{EnvDataSource, FileDataSource};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of pluggable backends
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn Provider>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `local` and `null` providers and the
    /// `env` and `file` data sources
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocalProvider));
        registry.register(Arc::new(NullProvider::default()));
        registry.register_data(Arc::new(EnvDataSource));
        registry.register_data(Arc::new(FileDataSource));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        log::debug!("registering provider `{}`", provider.name());
        self.providers.insert(provider.name(), provider);
    }

    pub fn register_data(&mut self, source: Arc<dyn DataSource>) {
        log::debug!("registering data source `{}`", source.name());
        self.data_sources.insert(source.name(), source);
    }

    /// Provider serving a resource type
    pub fn provider_for(&self, resource_type: &str) -> Result<&Arc<dyn Provider>> {
        lookup(&self.providers, resource_type)
            .ok_or_else(|| ProviderError::UnknownType(resource_type.to_string()))
    }

    /// Data source serving a data type
    pub fn data_source_for(&self, data_type: &str) -> Result<&Arc<dyn DataSource>> {
        lookup(&self.data_sources, data_type)
            .ok_or_else(|| ProviderError::UnknownType(data_type.to_string()))
    }
}

fn lookup<'a, T: ?Sized>(
    map: &'a BTreeMap<&'static str, Arc<T>>,
    type_name: &str,
) -> Option<&'a Arc<T>> {
    if let Some(found) = map.get(type_name) {
        return Some(found);
    }
    let prefix = type_name.split('_').next().unwrap_or(type_name);
    map.get(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_by_prefix() {
        let registry = ProviderRegistry::with_builtins();
        assert_eq!(registry.provider_for("local_file").unwrap().name(), "local");
        assert_eq!(registry.provider_for("null").unwrap().name(), "null");
        assert!(registry.provider_for("aws_instance").is_err());
    }

    #[test]
    fn resolves_data_sources() {
        let registry = ProviderRegistry::with_builtins();
        assert_eq!(registry.data_source_for("env").unwrap().name(), "env");
        assert!(registry.data_source_for("http").is_err());
    }
}
