//! Error types and result definitions for configuration operations.

use std::io;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error raised by configuration operations.
///
/// Every failure is reported at the point of violation. A mutation that
/// returns an error before touching the document leaves both the declaration
/// and the content nodes unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// A required key, name or value was absent or empty.
    #[error("argument `{0}` is required")]
    ArgumentRequired(&'static str),

    /// A name contains characters that cannot appear in an element name.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// A custom section, group or loaded entry reuses an existing name.
    #[error("the key {0:?} already exists")]
    DuplicateKey(String),

    /// A section was requested as a kind it does not have.
    #[error("invalid type for {name:?}: expected {expected}, found {found}")]
    InvalidType {
        /// Name of the section or property.
        name: String,
        /// Kind the caller asked for.
        expected: String,
        /// Kind actually stored.
        found: String,
    },

    /// A dictionary value carries a type tag that is not recognized.
    #[error("unrecognized value type tag {0:?}")]
    InvalidTypeKind(String),

    /// A value kind cannot be stored in a typed dictionary.
    #[error("unsupported value type: {0}")]
    UnsupportedType(String),

    /// Text could not be parsed into the expected representation.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A connection entry has no provider or an unmapped one.
    #[error("provider not found: {0:?}")]
    ProviderNotFound(Option<String>),

    /// Underlying storage I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The document text is not well-formed XML.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Options text could not be deserialized.
    #[error("failed to parse options: {0}")]
    Options(#[from] toml::de::Error),
}

impl Error {
    /// Builds a [`Error::MalformedInput`] from any displayable message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }
}
