//! Declared configuration sections and section groups.
//!
//! Every section is a pair of nodes: a `<section name=".." type=".." />`
//! declaration under `configSections` (or a `sectionGroup`), and a content
//! element named after the section under the matching content parent. The
//! registries keep both handles in one record and update them together.

use std::{collections::HashMap, fmt};

use crate::{
    error::{Error, Result},
    properties::{Attributes, AttributesMut, Properties, PropertiesMut},
    storage::Ctx,
    value::TypedValue,
    xml::{NodeId, XmlTree, validate_name},
};

/// Named groups of sections.
pub mod group;

/// Registry of the sections directly under one parent.
pub mod registry;

pub use group::{Group, GroupMut, GroupRegistry, GroupRegistryMut};
pub use registry::{SectionRegistry, SectionRegistryMut};

/// Standard section kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    /// Attributes on the content element.
    SingleTag,
    /// `<add key value />` rows with string values.
    NameValue,
    /// `<add key value type />` rows with typed values.
    Dictionary,
}

const KIND_TYPE_NAMES: [(SectionKind, &str); 3] = [
    (SectionKind::SingleTag, "System.Configuration.SingleTagSectionHandler"),
    (SectionKind::NameValue, "System.Configuration.NameValueSectionHandler"),
    (SectionKind::Dictionary, "System.Configuration.DictionarySectionHandler"),
];

impl SectionKind {
    /// Canonical handler type name written into declarations.
    pub fn type_name(self) -> &'static str {
        match self {
            SectionKind::SingleTag => KIND_TYPE_NAMES[0].1,
            SectionKind::NameValue => KIND_TYPE_NAMES[1].1,
            SectionKind::Dictionary => KIND_TYPE_NAMES[2].1,
        }
    }

    /// Recognizes a declared type name.
    ///
    /// Accepts the canonical names and their `"<name>, System"`
    /// assembly-qualified spelling; anything else is a custom type.
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        let (class, assembly) = match type_name.split_once(',') {
            Some((class, assembly)) => (class.trim(), Some(assembly.trim())),
            None => (type_name.trim(), None),
        };
        if assembly.is_some_and(|a| a != "System") {
            return None;
        }
        KIND_TYPE_NAMES
            .iter()
            .find(|(_, name)| *name == class)
            .map(|(kind, _)| *kind)
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionKind::SingleTag => "SingleTag",
            SectionKind::NameValue => "NameValue",
            SectionKind::Dictionary => "Dictionary",
        };
        f.write_str(name)
    }
}

/// Opaque section content that the registry does not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection {
    type_name: String,
    raw: String,
}

impl CustomSection {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Content of the section as text or markup.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// A loaded section.
#[derive(Debug, Clone)]
pub enum Section {
    SingleTag(Attributes),
    NameValue(Properties<String>),
    Dictionary(Properties<TypedValue>),
    Custom(CustomSection),
}

impl Section {
    pub(crate) fn load(
        tree: &XmlTree,
        content: NodeId,
        type_name: &str,
        indent: usize,
    ) -> Result<Self> {
        let section = match SectionKind::from_type_name(type_name) {
            Some(SectionKind::SingleTag) => Section::SingleTag(Attributes::load(tree, content)),
            Some(SectionKind::NameValue) => Section::NameValue(Properties::load(tree, content)?),
            Some(SectionKind::Dictionary) => Section::Dictionary(Properties::load(tree, content)?),
            None => {
                let raw = match tree.text(content) {
                    Some(text) => text.to_string(),
                    None => tree.inner_xml(content, indent),
                };
                Section::Custom(CustomSection {
                    type_name: type_name.to_string(),
                    raw,
                })
            }
        };
        Ok(section)
    }

    pub(crate) fn custom(type_name: &str, raw: &str) -> Self {
        Section::Custom(CustomSection {
            type_name: type_name.to_string(),
            raw: raw.to_string(),
        })
    }

    /// Builds an empty section of `kind` on a fresh content element.
    pub(crate) fn empty(content: NodeId, kind: SectionKind) -> Self {
        match kind {
            SectionKind::SingleTag => Section::SingleTag(Attributes::empty(content)),
            SectionKind::NameValue => Section::NameValue(Properties::empty(content)),
            SectionKind::Dictionary => Section::Dictionary(Properties::empty(content)),
        }
    }

    /// Standard kind, `None` for custom sections.
    pub fn kind(&self) -> Option<SectionKind> {
        match self {
            Section::SingleTag(_) => Some(SectionKind::SingleTag),
            Section::NameValue(_) => Some(SectionKind::NameValue),
            Section::Dictionary(_) => Some(SectionKind::Dictionary),
            Section::Custom(_) => None,
        }
    }

    /// Type name as it appears in the declaration.
    pub fn type_name(&self) -> &str {
        match self {
            Section::Custom(custom) => custom.type_name(),
            other => other
                .kind()
                .map(SectionKind::type_name)
                .unwrap_or_default(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Section::SingleTag(attrs) => attrs.len(),
            Section::NameValue(props) => props.len(),
            Section::Dictionary(props) => props.len(),
            Section::Custom(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_single_tag(&self) -> Option<&Attributes> {
        match self {
            Section::SingleTag(attrs) => Some(attrs),
            _ => None,
        }
    }

    pub fn as_name_value(&self) -> Option<&Properties<String>> {
        match self {
            Section::NameValue(props) => Some(props),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&Properties<TypedValue>> {
        match self {
            Section::Dictionary(props) => Some(props),
            _ => None,
        }
    }

    pub fn as_custom(&self) -> Option<&CustomSection> {
        match self {
            Section::Custom(custom) => Some(custom),
            _ => None,
        }
    }

    /// Copies the entries out of a standard section.
    ///
    /// Custom sections have no entries to copy and fail with
    /// [`Error::UnsupportedType`].
    pub fn to_values(&self) -> Result<SectionValues> {
        match self {
            Section::SingleTag(attrs) => Ok(SectionValues::SingleTag(attrs.to_map())),
            Section::NameValue(props) => Ok(SectionValues::NameValue(
                props
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            )),
            Section::Dictionary(props) => Ok(SectionValues::Dictionary(props.to_map())),
            Section::Custom(custom) => Err(Error::UnsupportedType(custom.type_name.clone())),
        }
    }
}

/// Detached entries of a standard section.
///
/// Used to create or replace a whole section with
/// [`SectionRegistryMut::add_or_update`].
#[derive(Debug, Clone, PartialEq)]
pub enum SectionValues {
    SingleTag(HashMap<String, String>),
    NameValue(Vec<(String, String)>),
    Dictionary(HashMap<String, TypedValue>),
}

impl SectionValues {
    pub fn kind(&self) -> SectionKind {
        match self {
            SectionValues::SingleTag(_) => SectionKind::SingleTag,
            SectionValues::NameValue(_) => SectionKind::NameValue,
            SectionValues::Dictionary(_) => SectionKind::Dictionary,
        }
    }

    /// Checks every key before anything is written.
    pub(crate) fn validate(&self) -> Result<()> {
        fn non_empty<'k>(mut keys: impl Iterator<Item = &'k String>) -> Result<()> {
            if keys.any(|k| k.is_empty()) {
                return Err(Error::ArgumentRequired("key"));
            }
            Ok(())
        }
        match self {
            SectionValues::SingleTag(map) => map.keys().try_for_each(|k| validate_name(k)),
            SectionValues::NameValue(rows) => non_empty(rows.iter().map(|(k, _)| k)),
            SectionValues::Dictionary(map) => non_empty(map.keys()),
        }
    }

    /// Writes the entries onto `content`, replacing whatever it held.
    pub(crate) fn write(self, tree: &mut XmlTree, content: NodeId) -> Result<Section> {
        let section = match self {
            SectionValues::SingleTag(map) => {
                Section::SingleTag(Attributes::rebuild(tree, content, map)?)
            }
            SectionValues::NameValue(rows) => {
                Section::NameValue(Properties::rebuild(tree, content, rows))
            }
            SectionValues::Dictionary(map) => {
                Section::Dictionary(Properties::rebuild(tree, content, map))
            }
        };
        Ok(section)
    }
}

/// Mutable view over one section of a registry.
pub struct SectionMut<'a> {
    name: String,
    view: SectionView<'a>,
}

enum SectionView<'a> {
    SingleTag(AttributesMut<'a>),
    NameValue(PropertiesMut<'a, String>),
    Dictionary(PropertiesMut<'a, TypedValue>),
    Custom(&'a CustomSection),
}

impl<'a> SectionMut<'a> {
    pub(crate) fn new(name: &str, ctx: Ctx<'a>, section: &'a mut Section) -> Self {
        let view = match section {
            Section::SingleTag(attrs) => SectionView::SingleTag(AttributesMut::new(ctx, attrs)),
            Section::NameValue(props) => SectionView::NameValue(PropertiesMut::new(ctx, props)),
            Section::Dictionary(props) => SectionView::Dictionary(PropertiesMut::new(ctx, props)),
            Section::Custom(custom) => SectionView::Custom(custom),
        };
        Self {
            name: name.to_string(),
            view,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Option<SectionKind> {
        match &self.view {
            SectionView::SingleTag(_) => Some(SectionKind::SingleTag),
            SectionView::NameValue(_) => Some(SectionKind::NameValue),
            SectionView::Dictionary(_) => Some(SectionKind::Dictionary),
            SectionView::Custom(_) => None,
        }
    }

    fn mismatch(&self, expected: SectionKind) -> Error {
        let found = match &self.view {
            SectionView::Custom(custom) => custom.type_name().to_string(),
            _ => self.kind().map(|k| k.to_string()).unwrap_or_default(),
        };
        Error::InvalidType {
            name: self.name.clone(),
            expected: expected.to_string(),
            found,
        }
    }

    pub fn into_single_tag(self) -> Result<AttributesMut<'a>> {
        match self.view {
            SectionView::SingleTag(attrs) => Ok(attrs),
            _ => Err(self.mismatch(SectionKind::SingleTag)),
        }
    }

    pub fn into_name_value(self) -> Result<PropertiesMut<'a, String>> {
        match self.view {
            SectionView::NameValue(props) => Ok(props),
            _ => Err(self.mismatch(SectionKind::NameValue)),
        }
    }

    pub fn into_dictionary(self) -> Result<PropertiesMut<'a, TypedValue>> {
        match self.view {
            SectionView::Dictionary(props) => Ok(props),
            _ => Err(self.mismatch(SectionKind::Dictionary)),
        }
    }

    pub fn as_custom(&self) -> Option<&CustomSection> {
        match &self.view {
            SectionView::Custom(custom) => Some(custom),
            _ => None,
        }
    }
}
