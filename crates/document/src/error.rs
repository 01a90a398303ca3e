//! Error types for document loading and evaluation

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading or parsing a declaration document
///
/// Every variant is raised before any side effect occurs: a document that
/// fails to parse never reaches planning.
#[derive(Error, Debug)]
pub enum ParseError {
    /// IO error reading a declaration file
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document directory does not exist
    #[error("document directory does not exist: {}", .0.display())]
    DirNotFound(PathBuf),

    /// TOML syntax error
    #[error("invalid TOML in {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Malformed node address
    #[error("invalid address `{0}`: {1}")]
    BadAddress(String, String),

    /// Two declarations share the same address
    #[error("duplicate declaration of {0}")]
    DuplicateAddress(String),

    /// A declaration body was not a table
    #[error("{0}: declaration body must be a table")]
    NotATable(String),

    /// Template or expression syntax error
    #[error("{address}.{attr}: {message}")]
    BadExpression {
        address: String,
        attr: String,
        message: String,
    },

    /// Unknown expression function
    #[error("{address}.{attr}: unknown function `{function}`")]
    UnknownFunction {
        address: String,
        attr: String,
        function: String,
    },

    /// `depends_on` entry was not a valid resource address
    #[error("{address}: depends_on entries must be resource addresses: {message}")]
    BadDependsOn { address: String, message: String },

    /// `lifecycle` table contained an unexpected key or value
    #[error("{address}: invalid lifecycle block: {message}")]
    BadLifecycle { address: String, message: String },
}

/// Errors produced while evaluating templates at plan/apply time
#[derive(Error, Debug)]
pub enum EvalError {
    /// `file()` could not read its argument
    #[error("file({}): {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `base64decode()` received invalid input
    #[error("base64decode: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded bytes were not valid UTF-8
    #[error("base64decode: output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A function argument had the wrong type or count
    #[error("{function}: {message}")]
    BadArgument { function: String, message: String },

    /// A referenced attribute could not be resolved
    #[error("cannot resolve {0}: {1}")]
    UnresolvedRef(String, String),

    /// Secret fetch failed
    #[error("secret `{name}` (version {version}): {message}")]
    SecretFetch {
        name: String,
        version: String,
        message: String,
    },

    /// A non-string value was interpolated into a mixed template
    #[error("cannot interpolate a {0} value into a string template")]
    NonStringInterpolation(&'static str),
}

/// Result alias for parse operations
pub type Result<T> = std::result::Result<T, ParseError>;
