//! Built-in `local` provider
//!
//! Manages plain files on the local filesystem. Useful on its own for
//! generated configuration, and as the reference implementation of the
//! provider contract.

use crate::error::{ProviderError, Result};
use crate::provider::{AttrMap, Provider, Realized};
use crate::schema::{require_str, AttrSpec, Schema};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

static LOCAL_FILE_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new([
        // Moving a file is a replace, not an in-place update.
        ("path", AttrSpec::required_immutable()),
        ("content", AttrSpec::optional_mutable()),
        ("checksum", AttrSpec::computed()),
    ])
});

/// Provider for the `local_file` resource type
pub struct LocalProvider;

const LOCAL_FILE: &str = "local_file";

impl LocalProvider {
    fn realize(path: &str, content: &str) -> Realized {
        let mut attrs = AttrMap::new();
        attrs.insert("path".to_string(), Value::String(path.to_string()));
        attrs.insert("content".to_string(), Value::String(content.to_string()));
        attrs.insert(
            "checksum".to_string(),
            Value::String(blake3::hash(content.as_bytes()).to_hex().to_string()),
        );
        Realized {
            provider_id: path.to_string(),
            attrs,
        }
    }

    fn content_of(attrs: &AttrMap) -> &str {
        attrs.get("content").and_then(Value::as_str).unwrap_or("")
    }
}

impl Provider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn schema(&self, resource_type: &str) -> Result<&Schema> {
        if resource_type == LOCAL_FILE {
            Ok(&LOCAL_FILE_SCHEMA)
        } else {
            Err(ProviderError::UnknownType(resource_type.to_string()))
        }
    }

    fn create(&self, resource_type: &str, attrs: &AttrMap) -> Result<Realized> {
        let path = require_str(attrs, resource_type, "path")?;
        let content = Self::content_of(attrs);
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ProviderError::from_io(&e, &format!("create {path}")))?;
        }
        fs::write(path, content)
            .map_err(|e| ProviderError::from_io(&e, &format!("write {path}")))?;
        log::debug!("local_file: created {path}");
        Ok(Self::realize(path, content))
    }

    fn read(
        &self,
        _resource_type: &str,
        provider_id: &str,
        _prior: &AttrMap,
    ) -> Result<Option<Realized>> {
        match fs::read_to_string(provider_id) {
            Ok(content) => Ok(Some(Self::realize(provider_id, &content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProviderError::from_io(&e, &format!("read {provider_id}"))),
        }
    }

    fn update(&self, _resource_type: &str, provider_id: &str, attrs: &AttrMap) -> Result<Realized> {
        let content = Self::content_of(attrs);
        fs::write(provider_id, content)
            .map_err(|e| ProviderError::from_io(&e, &format!("write {provider_id}")))?;
        log::debug!("local_file: updated {provider_id}");
        Ok(Self::realize(provider_id, content))
    }

    fn delete(&self, _resource_type: &str, provider_id: &str) -> Result<()> {
        match fs::remove_file(provider_id) {
            Ok(()) => {
                log::debug!("local_file: deleted {provider_id}");
                Ok(())
            }
            // Already gone; deletion is idempotent.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProviderError::from_io(&e, &format!("delete {provider_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(path: &str, content: &str) -> AttrMap {
        let mut map = AttrMap::new();
        map.insert("path".to_string(), Value::String(path.to_string()));
        map.insert("content".to_string(), Value::String(content.to_string()));
        map
    }

    #[test]
    fn create_read_update_delete_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/greeting.txt");
        let path = path.to_str().unwrap();
        let provider = LocalProvider;

        let realized = provider.create(LOCAL_FILE, &attrs(path, "hello")).unwrap();
        assert_eq!(realized.provider_id, path);
        assert_eq!(realized.attrs["content"], Value::String("hello".into()));
        assert_eq!(fs::read_to_string(path).unwrap(), "hello");

        let read = provider
            .read(LOCAL_FILE, path, &AttrMap::new())
            .unwrap()
            .unwrap();
        assert_eq!(read.attrs["checksum"], realized.attrs["checksum"]);

        let updated = provider.update(LOCAL_FILE, path, &attrs(path, "bye")).unwrap();
        assert_ne!(updated.attrs["checksum"], realized.attrs["checksum"]);

        provider.delete(LOCAL_FILE, path).unwrap();
        assert!(provider.read(LOCAL_FILE, path, &AttrMap::new()).unwrap().is_none());
        // Idempotent delete
        provider.delete(LOCAL_FILE, path).unwrap();
    }

    #[test]
    fn missing_path_is_invalid_argument() {
        let provider = LocalProvider;
        let err = provider.create(LOCAL_FILE, &AttrMap::new()).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument { .. }));
    }
}
