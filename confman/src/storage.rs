//! Persistence of the configuration document.
//!
//! A [`Storage`] loads the raw document text and stores the serialized
//! document. [`FileStorage`] is the file-backed implementation used by
//! [`Configuration::open`](crate::Configuration::open).

use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::{error::Result, xml::XmlTree};

/// XML declaration written in front of persisted documents.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Backing store of a configuration document.
pub trait Storage {
    /// Loads the raw document text.
    ///
    /// Returns `None` when the source is absent or empty.
    fn load(&self) -> Result<Option<String>>;

    /// Stores the complete serialized document.
    fn store(&mut self, xml: &str) -> Result<()>;

    /// Human-readable location, used in log messages.
    fn describe(&self) -> String {
        "<storage>".to_string()
    }
}

/// File-backed storage with optional timestamped backups.
///
/// A backup is taken at most once per `FileStorage`, on its first store, so
/// it holds the file as it was before this storage touched it.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    backup: bool,
    stored: bool,
}

impl FileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            backup: false,
            stored: false,
        }
    }

    /// Copies an existing file to a timestamped sibling before overwriting it.
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_existing(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let ext = self
            .path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("config");
        let backup_path = self.path.with_extension(format!("bk-{secs}.{ext}"));
        fs::copy(&self.path, &backup_path)?;
        debug!("backup written to {}", backup_path.display());
        Ok(())
    }
}

impl Storage for FileStorage {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        if content.is_empty() {
            return Ok(None);
        }
        Ok(Some(content))
    }

    fn store(&mut self, xml: &str) -> Result<()> {
        if self.backup && !self.stored {
            self.backup_existing()?;
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, xml)?;
        self.stored = true;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Save policy shared by every registry of one document.
pub(crate) struct SavePolicy {
    pub auto_save: bool,
    pub indent: usize,
    pub storage: Option<Box<dyn Storage>>,
}

impl SavePolicy {
    /// Serializes the document with its declaration.
    pub fn render(&self, tree: &XmlTree) -> String {
        format!("{XML_DECLARATION}\n{}", tree.to_xml(tree.root(), self.indent))
    }

    /// Writes the document to the associated storage, if any.
    pub fn save(&mut self, tree: &XmlTree) -> Result<()> {
        let xml = self.render(tree);
        match self.storage.as_mut() {
            Some(storage) => {
                debug!("saving configuration to {}", storage.describe());
                storage.store(&xml)
            }
            None => {
                trace!("no storage associated, save skipped");
                Ok(())
            }
        }
    }
}

/// Mutable access to the document tree plus its save policy.
///
/// Every mutating operation goes through a `Ctx` and ends with
/// [`Ctx::commit`], the single place auto-save happens.
pub(crate) struct Ctx<'a> {
    pub tree: &'a mut XmlTree,
    policy: &'a mut SavePolicy,
}

impl<'a> Ctx<'a> {
    pub fn new(tree: &'a mut XmlTree, policy: &'a mut SavePolicy) -> Self {
        Self { tree, policy }
    }

    pub fn reborrow(&mut self) -> Ctx<'_> {
        Ctx {
            tree: &mut *self.tree,
            policy: &mut *self.policy,
        }
    }

    pub fn indent(&self) -> usize {
        self.policy.indent
    }

    /// Persists the document when auto-save is enabled.
    pub fn commit(&mut self) -> Result<()> {
        if self.policy.auto_save {
            self.policy.save(self.tree)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.config");
        let storage = FileStorage::new(&path);
        assert!(storage.load().unwrap().is_none());

        fs::write(&path, "").unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_file_storage_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.config");
        fs::write(&path, "<configuration />").unwrap();
        let mut storage = FileStorage::new(&path).with_backup(true);

        storage.store("<configuration><b /></configuration>").unwrap();
        storage.store("<configuration><a /></configuration>").unwrap();

        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".bk-"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read_to_string(backups[0].path()).unwrap(),
            "<configuration />"
        );
        assert_eq!(
            storage.load().unwrap().as_deref(),
            Some("<configuration><a /></configuration>")
        );
    }

    #[test]
    fn test_first_store_without_file_skips_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.config");
        let mut storage = FileStorage::new(&path).with_backup(true);

        storage.store("<configuration />").unwrap();
        storage.store("<configuration><a /></configuration>").unwrap();
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_commit_respects_auto_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.config");
        let mut tree = XmlTree::new("configuration");
        let mut policy = SavePolicy {
            auto_save: false,
            indent: 2,
            storage: Some(Box::new(FileStorage::new(&path))),
        };

        Ctx::new(&mut tree, &mut policy).commit().unwrap();
        assert!(!path.exists());

        policy.auto_save = true;
        Ctx::new(&mut tree, &mut policy).commit().unwrap();
        let saved = fs::read_to_string(&path).unwrap();
        assert_eq!(saved, format!("{XML_DECLARATION}\n<configuration />"));
    }
}
