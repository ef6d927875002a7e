use std::{
    collections::{HashMap, hash_map::Entry},
    ops::Deref,
};

use crate::{
    config::REGIONS,
    error::{Error, Result},
    properties::{Attributes, AttributesMut, Properties, PropertiesMut},
    section::{CustomSection, GroupRegistry, Section, SectionKind, SectionMut, SectionValues},
    storage::Ctx,
    value::TypedValue,
    xml::{NodeId, XmlTree, validate_name},
};

/// Element name of a section declaration.
pub(crate) const SECTION_TAG: &str = "section";

#[derive(Debug, Clone)]
struct SectionRecord {
    declaration: NodeId,
    content: NodeId,
    section: Section,
}

/// Sections declared under one declarations parent.
#[derive(Debug, Clone)]
pub struct SectionRegistry {
    declarations: NodeId,
    contents: NodeId,
    records: HashMap<String, SectionRecord>,
}

impl SectionRegistry {
    /// Indexes every `<section>` declaration under `declarations`.
    ///
    /// A declaration without a content element gets an empty one appended
    /// to `contents`.
    pub(crate) fn load(
        tree: &mut XmlTree,
        declarations: NodeId,
        contents: NodeId,
        indent: usize,
    ) -> Result<Self> {
        let nodes: Vec<NodeId> = tree.child_elements(declarations, SECTION_TAG).collect();
        let mut records = HashMap::with_capacity(nodes.len());
        for declaration in nodes {
            let name = tree
                .attribute(declaration, "name")
                .ok_or_else(|| Error::malformed("<section> declaration without `name`"))?
                .to_string();
            validate_name(&name)?;
            if records.contains_key(&name) || is_region(tree, contents, &name) {
                return Err(Error::DuplicateKey(name));
            }
            let type_name = tree
                .attribute(declaration, "type")
                .unwrap_or_default()
                .to_string();
            let content = match tree.child_element(contents, &name) {
                Some(content) => content,
                None => {
                    debug!("section `{name}` has no content element, creating one");
                    let content = tree.create_element(&name);
                    tree.append_child(contents, content);
                    content
                }
            };
            let section = Section::load(tree, content, &type_name, indent)?;
            trace!("loaded section `{name}` of type `{type_name}`");
            records.insert(
                name,
                SectionRecord {
                    declaration,
                    content,
                    section,
                },
            );
        }
        Ok(Self {
            declarations,
            contents,
            records,
        })
    }

    pub(crate) fn empty(declarations: NodeId, contents: NodeId) -> Self {
        Self {
            declarations,
            contents,
            records: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Section> {
        self.records.get(name).map(|r| &r.section)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.records
            .iter()
            .map(|(name, r)| (name.as_str(), &r.section))
    }

    pub fn try_get_single_tag(&self, name: &str) -> Option<&Attributes> {
        self.get(name).and_then(Section::as_single_tag)
    }

    pub fn try_get_name_value(&self, name: &str) -> Option<&Properties<String>> {
        self.get(name).and_then(Section::as_name_value)
    }

    pub fn try_get_dictionary(&self, name: &str) -> Option<&Properties<TypedValue>> {
        self.get(name).and_then(Section::as_dictionary)
    }

    pub fn try_get_custom(&self, name: &str) -> Option<&CustomSection> {
        self.get(name).and_then(Section::as_custom)
    }
}

/// Mutable view over a [`SectionRegistry`].
pub struct SectionRegistryMut<'a> {
    ctx: Ctx<'a>,
    reg: &'a mut SectionRegistry,
}

impl<'a> SectionRegistryMut<'a> {
    pub(crate) fn new(ctx: Ctx<'a>, reg: &'a mut SectionRegistry) -> Self {
        Self { ctx, reg }
    }

    pub fn reborrow(&mut self) -> SectionRegistryMut<'_> {
        SectionRegistryMut {
            ctx: self.ctx.reborrow(),
            reg: &mut *self.reg,
        }
    }

    pub fn get_mut(&mut self, name: &str) -> Option<SectionMut<'_>> {
        self.reborrow().into_section(name)
    }

    /// Consumes the view and returns the section named `name`.
    pub fn into_section(self, name: &str) -> Option<SectionMut<'a>> {
        let record = self.reg.records.get_mut(name)?;
        Some(SectionMut::new(name, self.ctx, &mut record.section))
    }

    /// Returns the section named `name`, creating an empty one of `kind`
    /// when it does not exist.
    ///
    /// An existing section of another kind fails with [`Error::InvalidType`]
    /// and is left as it is.
    pub fn get_or_add(&mut self, name: &str, kind: SectionKind) -> Result<SectionMut<'_>> {
        self.reborrow().into_get_or_add(name, kind)
    }

    /// Consuming form of [`get_or_add`](Self::get_or_add).
    pub fn into_get_or_add(self, name: &str, kind: SectionKind) -> Result<SectionMut<'a>> {
        validate_name(name)?;
        let Self { mut ctx, reg } = self;
        let record = match reg.records.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                if record.section.kind() != Some(kind) {
                    return Err(Error::InvalidType {
                        name: name.to_string(),
                        expected: kind.to_string(),
                        found: record.section.type_name().to_string(),
                    });
                }
                record
            }
            Entry::Vacant(entry) => {
                ensure_unclaimed(ctx.tree, reg.contents, name)?;
                let (declaration, content) = create_pair(
                    ctx.tree,
                    reg.declarations,
                    reg.contents,
                    name,
                    kind.type_name(),
                );
                debug!("created {kind} section `{name}`");
                let record = entry.insert(SectionRecord {
                    declaration,
                    content,
                    section: Section::empty(content, kind),
                });
                ctx.commit()?;
                record
            }
        };
        Ok(SectionMut::new(name, ctx, &mut record.section))
    }

    pub fn get_or_add_single_tag(&mut self, name: &str) -> Result<AttributesMut<'_>> {
        self.get_or_add(name, SectionKind::SingleTag)?
            .into_single_tag()
    }

    pub fn get_or_add_name_value(&mut self, name: &str) -> Result<PropertiesMut<'_, String>> {
        self.get_or_add(name, SectionKind::NameValue)?
            .into_name_value()
    }

    pub fn get_or_add_dictionary(
        &mut self,
        name: &str,
    ) -> Result<PropertiesMut<'_, TypedValue>> {
        self.get_or_add(name, SectionKind::Dictionary)?
            .into_dictionary()
    }

    /// Adds a section whose content is kept as given.
    ///
    /// `raw` is parsed as the children of the content element. When it is
    /// not well-formed or holds no element it is stored as plain text. The
    /// declared type name is free-form; a standard handler name makes the
    /// new section load as that kind.
    pub fn add_custom_section(&mut self, name: &str, type_name: &str, raw: &str) -> Result<()> {
        validate_name(name)?;
        if type_name.trim().is_empty() {
            return Err(Error::ArgumentRequired("type_name"));
        }
        if raw.is_empty() {
            return Err(Error::ArgumentRequired("raw"));
        }
        if self.reg.records.contains_key(name) {
            return Err(Error::DuplicateKey(name.to_string()));
        }
        ensure_unclaimed(self.ctx.tree, self.reg.contents, name)?;

        let indent = self.ctx.indent();
        let tree = &mut *self.ctx.tree;
        let content = tree.create_element(name);
        if !tree.import_fragment(content, name, raw) {
            trace!("custom section `{name}` content stored as text");
            tree.set_text(content, raw);
        }
        let section = match SectionKind::from_type_name(type_name) {
            None => Section::custom(type_name, raw),
            Some(_) => match Section::load(tree, content, type_name, indent) {
                Ok(section) => section,
                Err(e) => {
                    self.ctx.tree.detach(content);
                    return Err(e);
                }
            },
        };

        let tree = &mut *self.ctx.tree;
        let declaration = tree.create_element(SECTION_TAG);
        tree.set_attribute(declaration, "name", name);
        tree.set_attribute(declaration, "type", type_name);
        tree.append_child(self.reg.declarations, declaration);
        tree.append_child(self.reg.contents, content);
        debug!("added custom section `{name}` of type `{type_name}`");

        self.reg.records.insert(
            name.to_string(),
            SectionRecord {
                declaration,
                content,
                section,
            },
        );
        self.ctx.commit()
    }

    /// Creates or replaces `name` with a copy of `values`, or removes it when
    /// `values` is `None`.
    ///
    /// The declaration is re-tagged with the canonical type name of the new
    /// kind.
    pub fn add_or_update(&mut self, name: &str, values: Option<SectionValues>) -> Result<()> {
        let Some(values) = values else {
            self.remove(name)?;
            return Ok(());
        };
        validate_name(name)?;
        values.validate()?;

        let type_name = values.kind().type_name();
        let tree = &mut *self.ctx.tree;
        match self.reg.records.get_mut(name) {
            Some(record) => {
                record.section = values.write(tree, record.content)?;
                tree.set_attribute(record.declaration, "type", type_name);
                debug!("replaced section `{name}`");
            }
            None => {
                ensure_unclaimed(tree, self.reg.contents, name)?;
                let (declaration, content) =
                    create_pair(tree, self.reg.declarations, self.reg.contents, name, type_name);
                let section = values.write(tree, content)?;
                self.reg.records.insert(
                    name.to_string(),
                    SectionRecord {
                        declaration,
                        content,
                        section,
                    },
                );
                debug!("added section `{name}`");
            }
        }
        self.ctx.commit()
    }

    /// Removes the declaration and content of `name`.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let Some(record) = self.reg.records.remove(name) else {
            return Ok(false);
        };
        self.ctx.tree.detach(record.declaration);
        self.ctx.tree.detach(record.content);
        debug!("removed section `{name}`");
        self.ctx.commit()?;
        Ok(true)
    }

    /// Removes every section of this registry.
    ///
    /// Nodes under the same parents that belong to no section are kept.
    pub fn clear(&mut self) -> Result<()> {
        for (_, record) in self.reg.records.drain() {
            self.ctx.tree.detach(record.declaration);
            self.ctx.tree.detach(record.content);
        }
        self.ctx.commit()
    }
}

impl Deref for SectionRegistryMut<'_> {
    type Target = SectionRegistry;

    fn deref(&self) -> &SectionRegistry {
        self.reg
    }
}

pub(crate) fn is_region(tree: &XmlTree, contents: NodeId, name: &str) -> bool {
    contents == tree.root() && REGIONS.contains(&name)
}

/// Fails with [`Error::DuplicateKey`] when a new item named `name` would
/// share its content element with something already under `contents`.
pub(crate) fn ensure_unclaimed(tree: &XmlTree, contents: NodeId, name: &str) -> Result<()> {
    if is_region(tree, contents, name) || tree.child_element(contents, name).is_some() {
        return Err(Error::DuplicateKey(name.to_string()));
    }
    Ok(())
}

/// Sections and groups under the same parents share one content namespace.
pub(crate) fn ensure_disjoint(sections: &SectionRegistry, groups: &GroupRegistry) -> Result<()> {
    match sections.names().find(|name| groups.contains_name(name)) {
        Some(name) => Err(Error::DuplicateKey(name.to_string())),
        None => Ok(()),
    }
}

/// Appends a declaration element named `tag` and an empty content element.
pub(crate) fn create_declared(
    tree: &mut XmlTree,
    declarations: NodeId,
    contents: NodeId,
    tag: &str,
    name: &str,
) -> (NodeId, NodeId) {
    let declaration = tree.create_element(tag);
    tree.set_attribute(declaration, "name", name);
    tree.append_child(declarations, declaration);
    let content = tree.create_element(name);
    tree.append_child(contents, content);
    (declaration, content)
}

fn create_pair(
    tree: &mut XmlTree,
    declarations: NodeId,
    contents: NodeId,
    name: &str,
    type_name: &str,
) -> (NodeId, NodeId) {
    let (declaration, content) = create_declared(tree, declarations, contents, SECTION_TAG, name);
    tree.set_attribute(declaration, "type", type_name);
    (declaration, content)
}
