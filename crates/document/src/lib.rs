//! # converge-document
//!
//! The declaration document model: node addresses, attribute templates and
//! expressions, and the TOML loader.
//!
//! A document is a set of named declarations. Resource nodes describe
//! desired provider-side state; data nodes are read-only queries
//! re-evaluated each planning cycle. String attributes may interpolate
//! references to other nodes' attributes and call built-in functions
//! (file reads, hashing, encoding, secret fetches).

pub mod address;
pub mod error;
pub mod expr;
pub mod loader;
pub mod node;
pub mod value;

pub use address::{Address, AttrRef, NodeKind};
pub use error::{EvalError, ParseError};
pub use expr::{EvalContext, Expr, Func, Resolver, Segment, Template};
pub use loader::{load_dir, PROJECT_CONFIG_FILE};
pub use node::{DataNode, Document, Lifecycle, RawValue, ResourceNode};
pub use value::{interpolate, toml_to_json, Resolved};
