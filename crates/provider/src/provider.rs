//! The provider CRUD contract
//!
//! A provider is a pluggable backend implementing create/read/update/delete
//! for one resource family, plus a schema classifying each attribute as
//! mutable or immutable. The engine never talks to external systems except
//! through this trait.

use crate::error::Result;
use crate::schema::Schema;
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute map exchanged across the provider boundary
pub type AttrMap = BTreeMap<String, Value>;

/// A realized resource: the provider-assigned identifier plus the full
/// attribute map (declared values and computed outputs)
#[derive(Debug, Clone, PartialEq)]
pub struct Realized {
    pub provider_id: String,
    pub attrs: AttrMap,
}

/// CRUD contract for one resource family
///
/// Implementations must be safe to call from the executor's worker pool.
pub trait Provider: Send + Sync {
    /// Provider name; resource types resolve to it by prefix
    /// (`local_file` -> `local`)
    fn name(&self) -> &'static str;

    /// Schema for a resource type, or `UnknownType`
    fn schema(&self, resource_type: &str) -> Result<&Schema>;

    /// Create the resource; returns the realized identity and attributes
    fn create(&self, resource_type: &str, attrs: &AttrMap) -> Result<Realized>;

    /// Read the live resource; `Ok(None)` means it no longer exists.
    ///
    /// `prior` is the last-recorded attribute map, for providers whose
    /// resources have no independently readable external state.
    fn read(&self, resource_type: &str, provider_id: &str, prior: &AttrMap)
    -> Result<Option<Realized>>;

    /// Update mutable attributes in place
    fn update(&self, resource_type: &str, provider_id: &str, attrs: &AttrMap) -> Result<Realized>;

    /// Delete the resource; deleting an already-absent resource succeeds
    fn delete(&self, resource_type: &str, provider_id: &str) -> Result<()>;
}

/// A read-only query against an external system
///
/// Re-evaluated each planning cycle; results are never persisted as owned
/// state.
pub trait DataSource: Send + Sync {
    /// Data source name; data types resolve to it by prefix
    fn name(&self) -> &'static str;

    /// Execute the query
    fn read(&self, data_type: &str, args: &AttrMap) -> Result<AttrMap>;
}
