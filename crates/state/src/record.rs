//! State records
//!
//! The state document is the diff baseline: a versioned map from node
//! address to the last-applied attribute values and provider-assigned
//! identifier. Records carry their dependencies so destroys of removed
//! nodes can still be ordered after their dependents are gone.

use chrono::{DateTime, Utc};
use converge_document::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Current state format version
pub const STATE_VERSION: u32 = 1;

/// Last-applied state of one resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateRecord {
    pub address: Address,
    /// Provider-assigned identifier
    pub provider_id: String,
    /// Full realized attribute map (declared values plus computed outputs).
    /// May contain secret-derived values; the state file is sensitive.
    pub attrs: BTreeMap<String, Value>,
    /// Resource addresses this record depended on when applied
    #[serde(default)]
    pub depends_on: Vec<Address>,
    /// Destroy guard captured from the declaration's lifecycle
    #[serde(default)]
    pub prevent_destroy: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// The persisted state document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    pub version: u32,
    /// Monotonic write counter, bumped on every save
    pub serial: u64,
    #[serde(default)]
    pub resources: BTreeMap<Address, StateRecord>,
    pub last_updated: DateTime<Utc>,
}

impl StateDocument {
    pub fn get(&self, address: &Address) -> Option<&StateRecord> {
        self.resources.get(address)
    }

    /// Insert or overwrite a record
    pub fn put(&mut self, record: StateRecord) {
        self.resources.insert(record.address.clone(), record);
    }

    /// Remove a record, returning it if present
    pub fn remove(&mut self, address: &Address) -> Option<StateRecord> {
        self.resources.remove(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.resources.contains_key(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> + '_ {
        self.resources.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> StateRecord {
        StateRecord {
            address: Address::resource("null", name),
            provider_id: format!("id-{name}"),
            attrs: BTreeMap::new(),
            depends_on: Vec::new(),
            prevent_destroy: false,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn put_get_remove() {
        let mut state = StateDocument::default();
        state.put(record("a"));
        let addr = Address::resource("null", "a");
        assert!(state.contains(&addr));
        assert_eq!(state.get(&addr).unwrap().provider_id, "id-a");
        assert!(state.remove(&addr).is_some());
        assert!(state.is_empty());
    }

    #[test]
    fn roundtrips_through_json() {
        let mut state = StateDocument::default();
        let mut rec = record("a");
        rec.attrs
            .insert("content".to_string(), Value::String("x".into()));
        rec.depends_on.push(Address::resource("null", "b"));
        state.put(rec);

        let json = serde_json::to_string_pretty(&state).unwrap();
        // Addresses serialize as plain string keys
        assert!(json.contains("\"resource.null.a\""));

        let back: StateDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.resources, state.resources);
    }
}
