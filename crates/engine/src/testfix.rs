//! Scripted in-memory provider for engine tests
//!
//! Behavior is driven by attributes: `fail` makes the named verb return
//! a fatal error, `flaky_creates` makes the first N create attempts return
//! a transient error, `delay_ms` makes create sleep before doing anything.
//! Every provider call is logged so tests can assert on ordering and call
//! counts.

use converge_provider::{
    AttrMap, AttrSpec, DataSource, Provider, ProviderError, Realized, Schema, SecretStore,
    require_str,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

static TEST_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new([
        ("name", AttrSpec::required_immutable()),
        ("payload", AttrSpec::optional_mutable()),
        ("fail", AttrSpec::optional_mutable()),
        ("flaky_creates", AttrSpec::optional_mutable()),
        ("delay_ms", AttrSpec::optional_mutable()),
        ("id", AttrSpec::computed()),
    ])
});

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, AttrMap>,
    log: Vec<String>,
    create_attempts: BTreeMap<String, u64>,
}

/// Provider for the `test` resource type
#[derive(Default)]
pub struct TestProvider {
    inner: Mutex<Inner>,
}

impl TestProvider {
    fn realize(name: &str, attrs: &AttrMap) -> Realized {
        let mut out = attrs.clone();
        out.insert("id".to_string(), Value::String(format!("test-{name}")));
        Realized {
            provider_id: format!("test-{name}"),
            attrs: out,
        }
    }

    fn check_fail(attrs: &AttrMap, verb: &str) -> Result<(), ProviderError> {
        if attrs.get("fail").and_then(Value::as_str) == Some(verb) {
            return Err(ProviderError::Fatal(format!("scripted {verb} failure")));
        }
        Ok(())
    }

    /// Calls made so far, as `"<verb> <id-or-name>"` lines
    pub fn log(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn calls(&self, verb: &str) -> usize {
        self.log()
            .iter()
            .filter(|l| l.starts_with(verb))
            .count()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .objects
            .contains_key(&format!("test-{name}"))
    }

    pub fn attr(&self, name: &str, key: &str) -> Option<Value> {
        self.inner
            .lock()
            .unwrap()
            .objects
            .get(&format!("test-{name}"))
            .and_then(|attrs| attrs.get(key))
            .cloned()
    }

    /// Simulate out-of-band modification
    pub fn tamper(&self, name: &str, key: &str, value: Value) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(attrs) = inner.objects.get_mut(&format!("test-{name}")) {
            attrs.insert(key.to_string(), value);
        }
    }

    /// Simulate out-of-band deletion
    pub fn vanish(&self, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .objects
            .remove(&format!("test-{name}"));
    }
}

impl Provider for TestProvider {
    fn name(&self) -> &'static str {
        "test"
    }

    fn schema(&self, resource_type: &str) -> Result<&Schema, ProviderError> {
        if resource_type == "test" {
            Ok(&TEST_SCHEMA)
        } else {
            Err(ProviderError::UnknownType(resource_type.to_string()))
        }
    }

    fn create(&self, resource_type: &str, attrs: &AttrMap) -> Result<Realized, ProviderError> {
        let name = require_str(attrs, resource_type, "name")?;
        // Sleep outside the lock so slow creates do not serialize the wave.
        if let Some(ms) = attrs.get("delay_ms").and_then(Value::as_u64) {
            std::thread::sleep(Duration::from_millis(ms));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(format!("create {name}"));
        Self::check_fail(attrs, "create")?;

        let flaky = attrs
            .get("flaky_creates")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let attempts = inner.create_attempts.entry(name.to_string()).or_insert(0);
        *attempts += 1;
        if *attempts <= flaky {
            return Err(ProviderError::Retryable(format!(
                "scripted transient failure {attempts} of {flaky}"
            )));
        }

        let realized = Self::realize(name, attrs);
        if inner.objects.contains_key(&realized.provider_id) {
            return Err(ProviderError::Fatal(format!("{name} already exists")));
        }
        inner
            .objects
            .insert(realized.provider_id.clone(), realized.attrs.clone());
        Ok(realized)
    }

    fn read(
        &self,
        _resource_type: &str,
        provider_id: &str,
        _prior: &AttrMap,
    ) -> Result<Option<Realized>, ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(format!("read {provider_id}"));
        Ok(inner.objects.get(provider_id).map(|attrs| Realized {
            provider_id: provider_id.to_string(),
            attrs: attrs.clone(),
        }))
    }

    fn update(
        &self,
        resource_type: &str,
        provider_id: &str,
        attrs: &AttrMap,
    ) -> Result<Realized, ProviderError> {
        let name = require_str(attrs, resource_type, "name")?;
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(format!("update {provider_id}"));
        Self::check_fail(attrs, "update")?;
        if !inner.objects.contains_key(provider_id) {
            return Err(ProviderError::NotFound(provider_id.to_string()));
        }
        let realized = Self::realize(name, attrs);
        inner
            .objects
            .insert(provider_id.to_string(), realized.attrs.clone());
        Ok(realized)
    }

    fn delete(&self, _resource_type: &str, provider_id: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(format!("delete {provider_id}"));
        if let Some(attrs) = inner.objects.get(provider_id) {
            Self::check_fail(attrs, "delete")?;
        }
        inner.objects.remove(provider_id);
        Ok(())
    }
}

/// Data source returning its arguments back, prefixed
pub struct EchoDataSource;

impl DataSource for EchoDataSource {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn read(&self, _data_type: &str, args: &AttrMap) -> Result<AttrMap, ProviderError> {
        Ok(args
            .iter()
            .map(|(k, v)| {
                let out = match v {
                    Value::String(s) => Value::String(format!("echo:{s}")),
                    other => other.clone(),
                };
                (k.clone(), out)
            })
            .collect())
    }
}

/// Secret store over a fixed map, counting fetches
#[derive(Default)]
pub struct MapSecrets {
    values: BTreeMap<String, Value>,
    pub fetches: Mutex<u64>,
}

impl MapSecrets {
    pub fn with(name: &str, value: &str) -> Self {
        let mut values = BTreeMap::new();
        values.insert(name.to_string(), Value::String(value.to_string()));
        Self {
            values,
            fetches: Mutex::new(0),
        }
    }
}

impl SecretStore for MapSecrets {
    fn fetch(&self, name: &str, version: &str) -> Result<Value, ProviderError> {
        *self.fetches.lock().unwrap() += 1;
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::SecretUnavailable {
                name: name.to_string(),
                version: version.to_string(),
                message: "not in fixture".to_string(),
            })
    }
}
