//! The document facade.

use std::{
    fmt,
    hash::{Hash, Hasher},
    io::{Read, Write},
    ops::Deref,
    path::Path,
};

use crate::{
    error::Result,
    options::Options,
    properties::{ConnectionValue, Properties, PropertiesMut},
    section::{
        GroupRegistry, GroupRegistryMut, SectionRegistry, SectionRegistryMut,
        registry::ensure_disjoint,
    },
    storage::{Ctx, FileStorage, SavePolicy, Storage},
    xml::{NodeId, XmlTree},
};

const ROOT: &str = "configuration";
const APP_SETTINGS: &str = "appSettings";
const CONNECTION_STRINGS: &str = "connectionStrings";
const CONFIG_SECTIONS: &str = "configSections";

/// Element names of the top-level regions, in document order.
pub(crate) const REGIONS: [&str; 3] = [CONFIG_SECTIONS, APP_SETTINGS, CONNECTION_STRINGS];

/// Top-level sections and groups declared in `configSections`.
#[derive(Debug, Clone)]
pub struct ConfigSections {
    sections: SectionRegistry,
    groups: GroupRegistry,
}

impl ConfigSections {
    pub fn sections(&self) -> &SectionRegistry {
        &self.sections
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }
}

/// Mutable view over [`ConfigSections`].
pub struct ConfigSectionsMut<'a> {
    ctx: Ctx<'a>,
    inner: &'a mut ConfigSections,
}

impl<'a> ConfigSectionsMut<'a> {
    pub fn sections_mut(&mut self) -> SectionRegistryMut<'_> {
        SectionRegistryMut::new(self.ctx.reborrow(), &mut self.inner.sections)
    }

    pub fn groups_mut(&mut self) -> GroupRegistryMut<'_> {
        GroupRegistryMut::new(self.ctx.reborrow(), &mut self.inner.groups)
    }

    pub fn into_sections(self) -> SectionRegistryMut<'a> {
        SectionRegistryMut::new(self.ctx, &mut self.inner.sections)
    }

    pub fn into_groups(self) -> GroupRegistryMut<'a> {
        GroupRegistryMut::new(self.ctx, &mut self.inner.groups)
    }
}

impl Deref for ConfigSectionsMut<'_> {
    type Target = ConfigSections;

    fn deref(&self) -> &ConfigSections {
        self.inner
    }
}

/// An in-memory configuration document.
///
/// The three top-level regions are located, or created, on first access.
/// With auto-save enabled every mutating call writes the whole document to
/// the associated [`Storage`] before returning. A document without storage
/// never saves.
///
/// ```no_run
/// use confman::Configuration;
///
/// let mut config = Configuration::open("app.config")?;
/// config.set_auto_save(true);
/// config.app_settings()?.insert("theme", "dark")?;
/// config
///     .config_sections()?
///     .sections_mut()
///     .get_or_add_dictionary("limits")?
///     .insert("retries", 3i32)?;
/// # Ok::<(), confman::Error>(())
/// ```
pub struct Configuration {
    tree: XmlTree,
    policy: SavePolicy,
    app_settings: Option<Properties<String>>,
    connection_strings: Option<Properties<ConnectionValue>>,
    config_sections: Option<ConfigSections>,
}

impl Configuration {
    /// Creates an empty document without storage.
    pub fn new() -> Self {
        Self::from_tree(XmlTree::new(ROOT), Options::default(), None)
    }

    /// Parses a document without storage. Blank text yields an empty document.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self::from_tree(
            Self::parse_tree(Some(text))?,
            Options::default(),
            None,
        ))
    }

    /// Reads a whole document from `reader`. An empty stream yields an empty
    /// document.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::parse(&text)
    }

    /// Opens the file at `path`, or starts an empty document when the file is
    /// missing or empty. Saves go back to `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &Options::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: &Options) -> Result<Self> {
        let storage = FileStorage::new(path).with_backup(options.backup);
        Self::with_storage(storage, options)
    }

    /// Loads the document from `storage` and saves back to it.
    pub fn with_storage<S: Storage + 'static>(storage: S, options: &Options) -> Result<Self> {
        let text = storage.load()?;
        debug!("loading configuration from {}", storage.describe());
        let tree = Self::parse_tree(text.as_deref())?;
        Ok(Self::from_tree(
            tree,
            options.clone(),
            Some(Box::new(storage)),
        ))
    }

    fn parse_tree(text: Option<&str>) -> Result<XmlTree> {
        match text.filter(|t| !t.trim().is_empty()) {
            Some(text) => XmlTree::parse(text),
            None => Ok(XmlTree::new(ROOT)),
        }
    }

    fn from_tree(tree: XmlTree, options: Options, storage: Option<Box<dyn Storage>>) -> Self {
        Self {
            tree,
            policy: SavePolicy {
                auto_save: options.auto_save,
                indent: options.indent,
                storage,
            },
            app_settings: None,
            connection_strings: None,
            config_sections: None,
        }
    }

    pub fn auto_save(&self) -> bool {
        self.policy.auto_save
    }

    pub fn set_auto_save(&mut self, auto_save: bool) {
        self.policy.auto_save = auto_save;
    }

    /// Finds the region `name`, or creates it right after the closest
    /// existing region that precedes it.
    fn region(&mut self, name: &str) -> NodeId {
        let root = self.tree.root();
        if let Some(node) = self.tree.child_element(root, name) {
            return node;
        }
        debug!("creating <{name}> region");
        let node = self.tree.create_element(name);
        let anchor = REGIONS
            .iter()
            .take_while(|region| **region != name)
            .filter_map(|region| self.tree.child_element(root, region))
            .last();
        match anchor {
            Some(anchor) => self.tree.insert_after(anchor, node),
            None => self.tree.prepend_child(root, node),
        }
        node
    }

    /// The `appSettings` key/value region.
    pub fn app_settings(&mut self) -> Result<PropertiesMut<'_, String>> {
        let props = match self.app_settings.take() {
            Some(props) => props,
            None => {
                let node = self.region(APP_SETTINGS);
                Properties::load(&self.tree, node)?
            }
        };
        let props = self.app_settings.insert(props);
        Ok(PropertiesMut::new(
            Ctx::new(&mut self.tree, &mut self.policy),
            props,
        ))
    }

    /// The `connectionStrings` region.
    pub fn connection_strings(&mut self) -> Result<PropertiesMut<'_, ConnectionValue>> {
        let props = match self.connection_strings.take() {
            Some(props) => props,
            None => {
                let node = self.region(CONNECTION_STRINGS);
                Properties::load(&self.tree, node)?
            }
        };
        let props = self.connection_strings.insert(props);
        Ok(PropertiesMut::new(
            Ctx::new(&mut self.tree, &mut self.policy),
            props,
        ))
    }

    /// The sections and groups declared in `configSections`.
    pub fn config_sections(&mut self) -> Result<ConfigSectionsMut<'_>> {
        let inner = match self.config_sections.take() {
            Some(inner) => inner,
            None => {
                let decls = self.region(CONFIG_SECTIONS);
                let root = self.tree.root();
                let indent = self.policy.indent;
                let sections = SectionRegistry::load(&mut self.tree, decls, root, indent)?;
                let groups = GroupRegistry::load(&mut self.tree, decls, root, indent)?;
                ensure_disjoint(&sections, &groups)?;
                ConfigSections { sections, groups }
            }
        };
        let inner = self.config_sections.insert(inner);
        Ok(ConfigSectionsMut {
            ctx: Ctx::new(&mut self.tree, &mut self.policy),
            inner,
        })
    }

    /// Writes the document to its storage. Without storage this does nothing.
    pub fn save(&mut self) -> Result<()> {
        self.policy.save(&self.tree)
    }

    /// Writes the document to `path`, leaving the associated storage as is.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        FileStorage::new(path).store(&self.policy.render(&self.tree))
    }

    pub fn save_to_writer<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(self.policy.render(&self.tree).as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Serializes the document without the XML declaration.
    pub fn to_xml_string(&self) -> String {
        self.tree.to_xml(self.tree.root(), self.policy.indent)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml_string())
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("auto_save", &self.policy.auto_save)
            .field(
                "storage",
                &self.policy.storage.as_ref().map(|s| s.describe()),
            )
            .finish_non_exhaustive()
    }
}

/// Documents are equal when their node structures are.
impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.tree == other.tree
    }
}

impl Eq for Configuration {}

impl Hash for Configuration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tree.hash(state);
    }
}
