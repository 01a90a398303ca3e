//! Document loader
//!
//! Loads every `*.toml` file in the document directory (minus the project
//! config `converge.toml`), in lexicographic file order, and merges them
//! into a single [`Document`]. Declarations use two top-level tables:
//!
//! ```toml
//! [resource.local_file.greeting]
//! path = "/tmp/greeting.txt"
//! content = "hello ${data.env.user.value}"
//! depends_on = ["resource.null.anchor"]
//!
//! [resource.local_file.greeting.lifecycle]
//! prevent_destroy = true
//!
//! [data.env.user]
//! name = "USER"
//! ```

use crate::address::{valid_ident, Address, NodeKind};
use crate::error::{ParseError, Result};
use crate::expr::{Template, TemplateError};
use crate::node::{DataNode, Document, Lifecycle, RawValue, ResourceNode};
use crate::value::toml_to_json;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// File name reserved for project configuration, never parsed as a document
pub const PROJECT_CONFIG_FILE: &str = "converge.toml";

/// Load a document from a directory of declaration files
pub fn load_dir(dir: &Path) -> Result<Document> {
    if !dir.is_dir() {
        return Err(ParseError::DirNotFound(dir.to_path_buf()));
    }
    let mut files = declaration_files(dir)?;
    files.sort();

    let mut document = Document::empty(dir);
    let mut seen: BTreeSet<Address> = BTreeSet::new();
    for path in files {
        let content = fs::read_to_string(&path).map_err(|source| ParseError::Io {
            path: path.clone(),
            source,
        })?;
        load_str(&content, &path, &mut document, &mut seen)?;
    }
    Ok(document)
}

/// Parse a single declaration file's content into an existing document
///
/// Exposed separately so tests can parse from strings.
pub fn load_str(
    content: &str,
    path: &Path,
    document: &mut Document,
    seen: &mut BTreeSet<Address>,
) -> Result<()> {
    let table: toml::Table = toml::from_str(content).map_err(|source| ParseError::Toml {
        path: path.to_path_buf(),
        source,
    })?;

    for (top_key, value) in table {
        let kind = match top_key.as_str() {
            "resource" => NodeKind::Resource,
            "data" => NodeKind::Data,
            other => {
                return Err(ParseError::BadAddress(
                    other.to_string(),
                    "top-level tables must be `resource` or `data`".to_string(),
                ));
            }
        };
        let toml::Value::Table(types) = value else {
            return Err(ParseError::NotATable(top_key));
        };
        for (type_name, names) in types {
            if !valid_ident(&type_name) {
                return Err(ParseError::BadAddress(
                    type_name.clone(),
                    "invalid type identifier".to_string(),
                ));
            }
            let toml::Value::Table(names) = names else {
                return Err(ParseError::NotATable(type_name));
            };
            for (name, body) in names {
                if !valid_ident(&name) {
                    return Err(ParseError::BadAddress(
                        name.clone(),
                        "invalid name identifier".to_string(),
                    ));
                }
                let address = Address {
                    kind,
                    type_name: type_name.clone(),
                    name,
                };
                if !seen.insert(address.clone()) {
                    return Err(ParseError::DuplicateAddress(address.to_string()));
                }
                let toml::Value::Table(body) = body else {
                    return Err(ParseError::NotATable(address.to_string()));
                };
                parse_node(address, body, document)?;
            }
        }
    }
    Ok(())
}

fn parse_node(address: Address, body: toml::Table, document: &mut Document) -> Result<()> {
    let mut attrs: BTreeMap<String, RawValue> = BTreeMap::new();
    let mut depends_on = Vec::new();
    let mut lifecycle = Lifecycle::default();

    for (key, value) in body {
        match key.as_str() {
            "depends_on" => depends_on = parse_depends_on(&address, value)?,
            "lifecycle" if address.is_resource() => {
                lifecycle = parse_lifecycle(&address, value)?;
            }
            _ => {
                let raw = parse_raw_value(&address, &key, value)?;
                attrs.insert(key, raw);
            }
        }
    }

    match address.kind {
        NodeKind::Resource => {
            let sensitive = attrs
                .iter()
                .filter(|(_, v)| v.uses_secret())
                .map(|(k, _)| k.clone())
                .collect();
            document.resources.push(ResourceNode {
                address,
                attrs,
                depends_on,
                lifecycle,
                sensitive,
            });
        }
        NodeKind::Data => document.data.push(DataNode {
            address,
            attrs,
            depends_on,
        }),
    }
    Ok(())
}

fn parse_depends_on(address: &Address, value: toml::Value) -> Result<Vec<Address>> {
    let bad = |message: String| ParseError::BadDependsOn {
        address: address.to_string(),
        message,
    };
    let toml::Value::Array(items) = value else {
        return Err(bad("expected an array of addresses".to_string()));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let toml::Value::String(s) = item else {
            return Err(bad("entries must be strings".to_string()));
        };
        let dep: Address = s.parse().map_err(|e: ParseError| bad(e.to_string()))?;
        out.push(dep);
    }
    Ok(out)
}

fn parse_lifecycle(address: &Address, value: toml::Value) -> Result<Lifecycle> {
    let bad = |message: String| ParseError::BadLifecycle {
        address: address.to_string(),
        message,
    };
    let toml::Value::Table(table) = value else {
        return Err(bad("expected a table".to_string()));
    };
    let mut lifecycle = Lifecycle::default();
    for (key, value) in table {
        let toml::Value::Boolean(flag) = value else {
            return Err(bad(format!("`{key}` must be a boolean")));
        };
        match key.as_str() {
            "prevent_destroy" => lifecycle.prevent_destroy = flag,
            "create_before_destroy" => lifecycle.create_before_destroy = flag,
            other => return Err(bad(format!("unknown key `{other}`"))),
        }
    }
    Ok(lifecycle)
}

fn parse_raw_value(address: &Address, attr: &str, value: toml::Value) -> Result<RawValue> {
    Ok(match value {
        toml::Value::String(s) => {
            let template = Template::parse(&s).map_err(|e| match e {
                TemplateError::Syntax(message) => ParseError::BadExpression {
                    address: address.to_string(),
                    attr: attr.to_string(),
                    message,
                },
                TemplateError::UnknownFunction(function) => ParseError::UnknownFunction {
                    address: address.to_string(),
                    attr: attr.to_string(),
                    function,
                },
            })?;
            RawValue::Template(template)
        }
        toml::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(parse_raw_value(address, attr, item)?);
            }
            RawValue::List(out)
        }
        toml::Value::Table(table) => {
            let mut out = BTreeMap::new();
            for (k, v) in table {
                let raw = parse_raw_value(address, attr, v)?;
                out.insert(k, raw);
            }
            RawValue::Map(out)
        }
        scalar => RawValue::Literal(toml_to_json(scalar)),
    })
}

fn declaration_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| ParseError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ParseError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "toml")
            && path.file_name().is_some_and(|n| n != PROJECT_CONFIG_FILE)
            && path.is_file()
        {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Document> {
        let mut doc = Document::empty(".");
        let mut seen = BTreeSet::new();
        load_str(content, Path::new("test.toml"), &mut doc, &mut seen)?;
        Ok(doc)
    }

    #[test]
    fn parses_resources_and_data() {
        let doc = parse(
            r#"
            [resource.local_file.greeting]
            path = "/tmp/x"
            content = "hi ${data.env.user.value}"

            [data.env.user]
            name = "USER"
            "#,
        )
        .unwrap();
        assert_eq!(doc.resources.len(), 1);
        assert_eq!(doc.data.len(), 1);
        let node = &doc.resources[0];
        assert_eq!(node.address.to_string(), "resource.local_file.greeting");
        assert_eq!(node.references().len(), 1);
    }

    #[test]
    fn depends_on_and_lifecycle() {
        let doc = parse(
            r#"
            [resource.null.anchor]

            [resource.local_file.out]
            path = "/tmp/out"
            depends_on = ["resource.null.anchor"]
            lifecycle = { prevent_destroy = true }
            "#,
        )
        .unwrap();
        let out = doc
            .resource(&Address::resource("local_file", "out"))
            .unwrap();
        assert_eq!(out.depends_on, vec![Address::resource("null", "anchor")]);
        assert!(out.lifecycle.prevent_destroy);
        assert!(!out.lifecycle.create_before_destroy);
    }

    #[test]
    fn secret_attrs_are_sensitive() {
        let doc = parse(
            r#"
            [resource.local_file.creds]
            path = "/tmp/creds"
            content = '${secret("registry-token")}'
            "#,
        )
        .unwrap();
        assert!(doc.resources[0].sensitive.contains("content"));
        assert!(!doc.resources[0].sensitive.contains("path"));
    }

    #[test]
    fn duplicate_address_rejected() {
        let err = parse(
            r#"
            [resource.null.a]
            [resource.null.b]
            "#,
        );
        assert!(err.is_ok());

        let mut doc = Document::empty(".");
        let mut seen = BTreeSet::new();
        load_str("[resource.null.a]", Path::new("a.toml"), &mut doc, &mut seen).unwrap();
        let err = load_str("[resource.null.a]", Path::new("b.toml"), &mut doc, &mut seen);
        assert!(matches!(err, Err(ParseError::DuplicateAddress(_))));
    }

    #[test]
    fn bad_expression_names_attr() {
        let err = parse(
            r#"
            [resource.null.a]
            triggers = "${resource.null}"
            "#,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("resource.null.a"));
        assert!(msg.contains("triggers"));
    }

    #[test]
    fn unknown_top_level_table_rejected() {
        assert!(parse("[module.x.y]\n").is_err());
    }

    #[test]
    fn loads_directory_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.toml"), "[resource.null.two]\n").unwrap();
        fs::write(dir.path().join("a.toml"), "[resource.null.one]\n").unwrap();
        fs::write(dir.path().join("converge.toml"), "jobs = 2\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let doc = load_dir(dir.path()).unwrap();
        assert_eq!(doc.resources.len(), 2);
        assert_eq!(doc.resources[0].address.name, "one");
        assert_eq!(doc.resources[1].address.name, "two");
    }
}
