//! Library options.
//!
//! Options are usually kept in a `confman.toml` file next to the document:
//!
//! ```toml
//! auto_save = true
//! backup = false
//! indent = 4
//! ```
//!
//! Every field is optional.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a [`Configuration`](crate::Configuration) persists itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Save the whole document after every mutation.
    pub auto_save: bool,
    /// Copy an existing file to `<stem>.bk-<unix-secs>.<ext>` before
    /// overwriting it.
    pub backup: bool,
    /// Indentation width of the written document.
    pub indent: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            auto_save: false,
            backup: false,
            indent: 2,
        }
    }
}

impl Options {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        debug!("options loaded from {}", path.display());
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_defaults() {
        let opts = Options::from_toml_str("").unwrap();
        assert_eq!(opts, Options::default());
        assert_eq!(opts.indent, 2);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confman.toml");
        fs::write(&path, "auto_save = true\nindent = 4\n").unwrap();

        let opts = Options::load(&path).unwrap();
        assert!(opts.auto_save);
        assert!(!opts.backup);
        assert_eq!(opts.indent, 4);
    }

    #[test]
    fn test_invalid_options() {
        assert!(matches!(
            Options::from_toml_str("indent = \"wide\""),
            Err(Error::Options(_))
        ));
        assert!(matches!(
            Options::load("/nonexistent/confman.toml"),
            Err(Error::Io(_))
        ));
    }
}
