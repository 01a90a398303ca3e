//! Attribute schemas
//!
//! Every resource type declares, per attribute, whether it is required,
//! whether it can change in place, and whether the provider computes it.
//! The planner uses mutability to choose between `Update` and `Replace`.

use crate::error::{ProviderError, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Classification of one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrSpec {
    /// Must be present in the declaration
    pub required: bool,
    /// Changing it can be applied in place; immutable changes force replace
    pub mutable: bool,
    /// Assigned by the provider, never declared
    pub computed: bool,
}

impl AttrSpec {
    pub const fn required_immutable() -> Self {
        Self {
            required: true,
            mutable: false,
            computed: false,
        }
    }

    pub const fn optional_mutable() -> Self {
        Self {
            required: false,
            mutable: true,
            computed: false,
        }
    }

    pub const fn optional_immutable() -> Self {
        Self {
            required: false,
            mutable: false,
            computed: false,
        }
    }

    pub const fn computed() -> Self {
        Self {
            required: false,
            mutable: false,
            computed: true,
        }
    }
}

/// Schema for one resource type
#[derive(Debug, Clone)]
pub struct Schema {
    attrs: BTreeMap<&'static str, AttrSpec>,
}

impl Schema {
    pub fn new(attrs: impl IntoIterator<Item = (&'static str, AttrSpec)>) -> Self {
        Self {
            attrs: attrs.into_iter().collect(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&AttrSpec> {
        self.attrs.get(name)
    }

    /// Names of attributes the document may declare (non-computed)
    pub fn declared_attrs(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attrs
            .iter()
            .filter(|(_, spec)| !spec.computed)
            .map(|(name, _)| *name)
    }

    /// Validate declared attribute names against the schema
    ///
    /// Rejects unknown and computed attributes, and missing required ones.
    /// Runs before any side effect.
    pub fn validate_keys<'a>(
        &self,
        resource_type: &str,
        declared: impl Iterator<Item = &'a String>,
    ) -> Result<()> {
        let invalid = |message: String| ProviderError::InvalidArgument {
            resource_type: resource_type.to_string(),
            message,
        };
        let mut present = BTreeMap::new();
        for key in declared {
            match self.attrs.get(key.as_str()) {
                None => return Err(invalid(format!("unknown attribute `{key}`"))),
                Some(spec) if spec.computed => {
                    return Err(invalid(format!("attribute `{key}` is computed and cannot be set")));
                }
                Some(_) => {
                    present.insert(key.clone(), ());
                }
            }
        }
        for (name, spec) in &self.attrs {
            if spec.required && !present.contains_key(*name) {
                return Err(invalid(format!("missing required attribute `{name}`")));
            }
        }
        Ok(())
    }

    /// Whether a change to `attr` can be applied in place
    pub fn is_mutable(&self, attr: &str) -> bool {
        self.attrs.get(attr).is_some_and(|s| s.mutable)
    }
}

/// Helper for providers: pull a required string attribute out of a map
pub fn require_str<'a>(
    attrs: &'a BTreeMap<String, Value>,
    resource_type: &str,
    name: &str,
) -> Result<&'a str> {
    attrs
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::InvalidArgument {
            resource_type: resource_type.to_string(),
            message: format!("attribute `{name}` must be a string"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new([
            ("path", AttrSpec::required_immutable()),
            ("content", AttrSpec::optional_mutable()),
            ("checksum", AttrSpec::computed()),
        ])
    }

    #[test]
    fn accepts_valid_keys() {
        let keys = vec!["path".to_string(), "content".to_string()];
        schema().validate_keys("local_file", keys.iter()).unwrap();
    }

    #[test]
    fn rejects_unknown_and_computed() {
        let unknown = vec!["path".to_string(), "mode".to_string()];
        assert!(schema().validate_keys("local_file", unknown.iter()).is_err());

        let computed = vec!["path".to_string(), "checksum".to_string()];
        assert!(schema().validate_keys("local_file", computed.iter()).is_err());
    }

    #[test]
    fn rejects_missing_required() {
        let keys = vec!["content".to_string()];
        let err = schema()
            .validate_keys("local_file", keys.iter())
            .unwrap_err();
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn mutability() {
        let s = schema();
        assert!(s.is_mutable("content"));
        assert!(!s.is_mutable("path"));
        assert!(!s.is_mutable("unknown"));
    }
}
