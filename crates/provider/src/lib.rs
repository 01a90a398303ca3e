//! # converge-provider
//!
//! The pluggable provider boundary: the CRUD contract resources are
//! reconciled through, per-attribute schemas (mutable vs immutable, the
//! planner's update/replace decision), read-only data sources, and the
//! secret store boundary with per-cycle caching.
//!
//! Built-ins: the `local` provider (plain files), the `null` provider
//! (pure graph nodes), and the `env`/`file` data sources.

pub mod error;
pub mod local;
pub mod null;
pub mod provider;
pub mod registry;
pub mod schema;
pub mod secret;
pub mod sources;

pub use error::{ProviderError, Result};
pub use local::LocalProvider;
pub use null::NullProvider;
pub use provider::{AttrMap, DataSource, Provider, Realized};
pub use registry::ProviderRegistry;
pub use schema::{require_str, AttrSpec, Schema};
pub use secret::{CachedSecrets, EnvSecretStore, SecretStore};
pub use sources::{EnvDataSource, FileDataSource};
