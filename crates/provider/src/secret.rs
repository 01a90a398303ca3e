//! Secret store boundary
//!
//! Secret values are fetched by (name, version) at plan/apply time and are
//! never written into declaration documents. They may end up in state,
//! which is therefore sensitive. The caching wrapper guarantees one fetch
//! per (name, version) per planning cycle, so every reference within a run
//! sees the same value.

use crate::error::{ProviderError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// External secret store addressed by name and version
pub trait SecretStore: Send + Sync {
    fn fetch(&self, name: &str, version: &str) -> Result<Value>;
}

/// Secret store backed by `CONVERGE_SECRET_<NAME>` environment variables
///
/// Names are upcased and dashes become underscores. Only the `latest`
/// version exists.
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn fetch(&self, name: &str, version: &str) -> Result<Value> {
        if version != "latest" {
            return Err(ProviderError::SecretUnavailable {
                name: name.to_string(),
                version: version.to_string(),
                message: "environment store only provides the `latest` version".to_string(),
            });
        }
        let var = format!(
            "CONVERGE_SECRET_{}",
            name.to_uppercase().replace('-', "_")
        );
        std::env::var(&var)
            .map(Value::String)
            .map_err(|_| ProviderError::SecretUnavailable {
                name: name.to_string(),
                version: version.to_string(),
                message: format!("{var} is not set"),
            })
    }
}

/// Per-cycle cache: each (name, version) is fetched at most once
pub struct CachedSecrets<'a> {
    inner: &'a dyn SecretStore,
    cache: Mutex<HashMap<(String, String), Value>>,
}

impl<'a> CachedSecrets<'a> {
    pub fn new(inner: &'a dyn SecretStore) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl SecretStore for CachedSecrets<'_> {
    fn fetch(&self, name: &str, version: &str) -> Result<Value> {
        let key = (name.to_string(), version.to_string());
        if let Some(hit) = self.cache.lock().map_or(None, |c| c.get(&key).cloned()) {
            return Ok(hit);
        }
        let value = self.inner.fetch(name, version)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, value.clone());
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        fetches: AtomicUsize,
    }

    impl SecretStore for CountingStore {
        fn fetch(&self, name: &str, _version: &str) -> Result<Value> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Value::String(format!("value-of-{name}")))
        }
    }

    #[test]
    fn cache_fetches_once_per_name_version() {
        let store = CountingStore {
            fetches: AtomicUsize::new(0),
        };
        let cached = CachedSecrets::new(&store);

        for _ in 0..3 {
            cached.fetch("token", "latest").unwrap();
        }
        cached.fetch("token", "2").unwrap();

        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    }
}
