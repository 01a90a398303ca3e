//! Built-in data sources
//!
//! Data sources are read-only queries evaluated once per planning cycle.

use crate::error::{ProviderError, Result};
use crate::provider::{AttrMap, DataSource};
use crate::schema::require_str;
use serde_json::Value;
use std::fs;

/// `data.env.<name>`: read an environment variable
///
/// Arguments: `name` (required), `default` (optional). With no default, an
/// unset variable is a fatal error.
pub struct EnvDataSource;

impl DataSource for EnvDataSource {
    fn name(&self) -> &'static str {
        "env"
    }

    fn read(&self, data_type: &str, args: &AttrMap) -> Result<AttrMap> {
        let name = require_str(args, data_type, "name")?;
        let value = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => match args.get("default").and_then(Value::as_str) {
                Some(default) => default.to_string(),
                None => {
                    return Err(ProviderError::Fatal(format!(
                        "environment variable `{name}` is not set"
                    )));
                }
            },
        };
        let mut out = AttrMap::new();
        out.insert("name".to_string(), Value::String(name.to_string()));
        out.insert("value".to_string(), Value::String(value));
        Ok(out)
    }
}

/// `data.file.<name>`: read a file's content and checksum
pub struct FileDataSource;

impl DataSource for FileDataSource {
    fn name(&self) -> &'static str {
        "file"
    }

    fn read(&self, data_type: &str, args: &AttrMap) -> Result<AttrMap> {
        let path = require_str(args, data_type, "path")?;
        let content = fs::read_to_string(path)
            .map_err(|e| ProviderError::from_io(&e, &format!("read {path}")))?;
        let mut out = AttrMap::new();
        out.insert("path".to_string(), Value::String(path.to_string()));
        out.insert(
            "checksum".to_string(),
            Value::String(blake3::hash(content.as_bytes()).to_hex().to_string()),
        );
        out.insert("content".to_string(), Value::String(content));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_default_applies_when_unset() {
        let mut args = AttrMap::new();
        args.insert(
            "name".to_string(),
            Value::String("CONVERGE_TEST_UNSET_VAR".to_string()),
        );
        assert!(EnvDataSource.read("env", &args).is_err());

        args.insert("default".to_string(), Value::String("fallback".to_string()));
        let out = EnvDataSource.read("env", &args).unwrap();
        assert_eq!(out["value"], Value::String("fallback".into()));
    }

    #[test]
    fn file_source_reads_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        fs::write(&path, "payload").unwrap();

        let mut args = AttrMap::new();
        args.insert(
            "path".to_string(),
            Value::String(path.to_str().unwrap().to_string()),
        );
        let out = FileDataSource.read("file", &args).unwrap();
        assert_eq!(out["content"], Value::String("payload".into()));
        assert_eq!(out["checksum"].as_str().unwrap().len(), 64);
    }
}
