//! Node addresses
//!
//! Every declaration is identified by an address of the form
//! `resource.<type>.<name>` or `data.<type>.<name>`. Addresses are the keys
//! of the dependency graph and of the state document, so they carry `Ord`
//! and serialize as plain strings.

use crate::error::ParseError;
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Whether a node owns a resource or performs a read-only query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    /// Owned, persisted in state, reconciled by a provider
    Resource,
    /// Read-only query, re-evaluated each planning cycle
    Data,
}

impl NodeKind {
    fn keyword(self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Data => "data",
        }
    }
}

/// Identity of a single declaration: kind, provider-qualified type, local name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub kind: NodeKind,
    pub type_name: String,
    pub name: String,
}

impl Address {
    /// Build a resource address
    pub fn resource(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Resource,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Build a data address
    pub fn data(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Data,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    pub fn is_resource(&self) -> bool {
        self.kind == NodeKind::Resource
    }

    pub fn is_data(&self) -> bool {
        self.kind == NodeKind::Data
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.kind.keyword(), self.type_name, self.name)
    }
}

/// Check a type or name identifier: `[a-z][a-z0-9_]*`
pub fn valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |msg: &str| ParseError::BadAddress(s.to_string(), msg.to_string());
        let parts: Vec<&str> = s.split('.').collect();
        let [kind, type_name, name] = parts.as_slice() else {
            return Err(bad("expected `resource.<type>.<name>` or `data.<type>.<name>`"));
        };
        let kind = match *kind {
            "resource" => NodeKind::Resource,
            "data" => NodeKind::Data,
            other => return Err(bad(&format!("unknown kind `{other}`"))),
        };
        if !valid_ident(type_name) {
            return Err(bad(&format!("invalid type `{type_name}`")));
        }
        if !valid_ident(name) {
            return Err(bad(&format!("invalid name `{name}`")));
        }
        Ok(Self {
            kind,
            type_name: (*type_name).to_string(),
            name: (*name).to_string(),
        })
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A reference to one attribute of another node, e.g.
/// `resource.local_file.greeting.content`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttrRef {
    pub address: Address,
    pub attr: String,
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.address, self.attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_resource_address() {
        let addr: Address = "resource.local_file.greeting".parse().unwrap();
        assert_eq!(addr.kind, NodeKind::Resource);
        assert_eq!(addr.type_name, "local_file");
        assert_eq!(addr.name, "greeting");
        assert_eq!(addr.to_string(), "resource.local_file.greeting");
    }

    #[test]
    fn parse_data_address() {
        let addr: Address = "data.env.user".parse().unwrap();
        assert!(addr.is_data());
    }

    #[test]
    fn reject_bad_addresses() {
        assert!("local_file.greeting".parse::<Address>().is_err());
        assert!("resource.Local_File.x".parse::<Address>().is_err());
        assert!("resource.file.9name".parse::<Address>().is_err());
        assert!("output.file.name".parse::<Address>().is_err());
        assert!("resource.file".parse::<Address>().is_err());
    }

    #[test]
    fn address_serializes_as_string() {
        let addr = Address::resource("null", "anchor");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"resource.null.anchor\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn address_ordering_is_deterministic() {
        let mut addrs = vec![
            Address::resource("null", "b"),
            Address::data("env", "user"),
            Address::resource("local_file", "a"),
        ];
        addrs.sort();
        assert!(addrs[0].is_resource());
        assert_eq!(addrs[0].type_name, "local_file");
        assert!(addrs[2].is_data());
    }
}
