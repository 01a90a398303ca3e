//! Built-in `null` provider
//!
//! A `null` resource has no external footprint: it exists purely as a graph
//! node for sequencing. Its immutable `triggers` map forces a replace when
//! any trigger value changes.

use crate::error::{ProviderError, Result};
use crate::provider::{AttrMap, Provider, Realized};
use crate::schema::{AttrSpec, Schema};
use serde_json::Value;
use std::sync::LazyLock;

static NULL_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new([
        ("triggers", AttrSpec::optional_immutable()),
        ("id", AttrSpec::computed()),
    ])
});

/// Provider for the `null` resource type
#[derive(Default)]
pub struct NullProvider;

impl NullProvider {
    fn realize(attrs: &AttrMap) -> Realized {
        let triggers = attrs.get("triggers").cloned().unwrap_or(Value::Null);
        let id = blake3::hash(triggers.to_string().as_bytes())
            .to_hex()
            .to_string();
        let mut out = AttrMap::new();
        out.insert("triggers".to_string(), triggers);
        out.insert("id".to_string(), Value::String(id.clone()));
        Realized {
            provider_id: id,
            attrs: out,
        }
    }
}

impl Provider for NullProvider {
    fn name(&self) -> &'static str {
        "null"
    }

    fn schema(&self, resource_type: &str) -> Result<&Schema> {
        if resource_type == "null" {
            Ok(&NULL_SCHEMA)
        } else {
            Err(ProviderError::UnknownType(resource_type.to_string()))
        }
    }

    fn create(&self, _resource_type: &str, attrs: &AttrMap) -> Result<Realized> {
        Ok(Self::realize(attrs))
    }

    fn read(
        &self,
        _resource_type: &str,
        provider_id: &str,
        prior: &AttrMap,
    ) -> Result<Option<Realized>> {
        // Nothing external to observe: the record is the resource.
        Ok(Some(Realized {
            provider_id: provider_id.to_string(),
            attrs: prior.clone(),
        }))
    }

    fn update(&self, resource_type: &str, _provider_id: &str, _attrs: &AttrMap) -> Result<Realized> {
        // Every declared attribute is immutable; the planner must replace.
        Err(ProviderError::InvalidArgument {
            resource_type: resource_type.to_string(),
            message: "null resources cannot be updated in place".to_string(),
        })
    }

    fn delete(&self, _resource_type: &str, _provider_id: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_tracks_triggers() {
        let provider = NullProvider;
        let mut attrs = AttrMap::new();
        let a = provider.create("null", &attrs).unwrap();

        attrs.insert("triggers".to_string(), serde_json::json!({ "rev": "1" }));
        let b = provider.create("null", &attrs).unwrap();
        assert_ne!(a.provider_id, b.provider_id);

        let b2 = provider.create("null", &attrs).unwrap();
        assert_eq!(b.provider_id, b2.provider_id);
    }

    #[test]
    fn read_echoes_prior_state() {
        let provider = NullProvider;
        let realized = provider.create("null", &AttrMap::new()).unwrap();
        let read = provider
            .read("null", &realized.provider_id, &realized.attrs)
            .unwrap()
            .unwrap();
        assert_eq!(read, realized);
    }
}
