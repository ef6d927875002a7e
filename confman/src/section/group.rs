use std::{
    collections::{HashMap, hash_map::Entry},
    ops::Deref,
};

use crate::{
    error::{Error, Result},
    section::{
        SectionRegistry, SectionRegistryMut,
        registry::{create_declared, ensure_disjoint, ensure_unclaimed, is_region},
    },
    storage::Ctx,
    xml::{NodeId, XmlTree, validate_name},
};

/// Element name of a group declaration.
pub(crate) const GROUP_TAG: &str = "sectionGroup";

/// A named container of sections and nested groups.
///
/// The `<sectionGroup name="..">` declaration holds the declarations of
/// everything inside; the content element named after the group holds
/// their content.
#[derive(Debug, Clone)]
pub struct Group {
    declaration: NodeId,
    content: NodeId,
    sections: SectionRegistry,
    groups: GroupRegistry,
}

impl Group {
    fn load(tree: &mut XmlTree, declaration: NodeId, content: NodeId, indent: usize) -> Result<Self> {
        let sections = SectionRegistry::load(tree, declaration, content, indent)?;
        let groups = GroupRegistry::load(tree, declaration, content, indent)?;
        ensure_disjoint(&sections, &groups)?;
        Ok(Self {
            declaration,
            content,
            sections,
            groups,
        })
    }

    fn empty(declaration: NodeId, content: NodeId) -> Self {
        Self {
            declaration,
            content,
            sections: SectionRegistry::empty(declaration, content),
            groups: GroupRegistry::empty(declaration, content),
        }
    }

    pub fn sections(&self) -> &SectionRegistry {
        &self.sections
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }
}

/// Groups declared under one declarations parent.
#[derive(Debug, Clone)]
pub struct GroupRegistry {
    declarations: NodeId,
    contents: NodeId,
    groups: HashMap<String, Group>,
}

impl GroupRegistry {
    pub(crate) fn load(
        tree: &mut XmlTree,
        declarations: NodeId,
        contents: NodeId,
        indent: usize,
    ) -> Result<Self> {
        let nodes: Vec<NodeId> = tree.child_elements(declarations, GROUP_TAG).collect();
        let mut groups = HashMap::with_capacity(nodes.len());
        for declaration in nodes {
            let name = tree
                .attribute(declaration, "name")
                .ok_or_else(|| Error::malformed("<sectionGroup> declaration without `name`"))?
                .to_string();
            validate_name(&name)?;
            if groups.contains_key(&name) || is_region(tree, contents, &name) {
                return Err(Error::DuplicateKey(name));
            }
            let content = match tree.child_element(contents, &name) {
                Some(content) => content,
                None => {
                    debug!("group `{name}` has no content element, creating one");
                    let content = tree.create_element(&name);
                    tree.append_child(contents, content);
                    content
                }
            };
            let group = Group::load(tree, declaration, content, indent)?;
            groups.insert(name, group);
        }
        Ok(Self {
            declarations,
            contents,
            groups,
        })
    }

    fn empty(declarations: NodeId, contents: NodeId) -> Self {
        Self {
            declarations,
            contents,
            groups: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Group)> {
        self.groups.iter().map(|(name, g)| (name.as_str(), g))
    }
}

/// Mutable view over a [`GroupRegistry`].
pub struct GroupRegistryMut<'a> {
    ctx: Ctx<'a>,
    reg: &'a mut GroupRegistry,
}

impl<'a> GroupRegistryMut<'a> {
    pub(crate) fn new(ctx: Ctx<'a>, reg: &'a mut GroupRegistry) -> Self {
        Self { ctx, reg }
    }

    pub fn reborrow(&mut self) -> GroupRegistryMut<'_> {
        GroupRegistryMut {
            ctx: self.ctx.reborrow(),
            reg: &mut *self.reg,
        }
    }

    pub fn get_mut(&mut self, name: &str) -> Option<GroupMut<'_>> {
        self.reborrow().into_group(name)
    }

    pub fn into_group(self, name: &str) -> Option<GroupMut<'a>> {
        let group = self.reg.groups.get_mut(name)?;
        Some(GroupMut {
            ctx: self.ctx,
            group,
        })
    }

    /// Returns the group named `name`, creating an empty one if needed.
    pub fn get_or_add(&mut self, name: &str) -> Result<GroupMut<'_>> {
        self.reborrow().into_get_or_add(name)
    }

    /// Consuming form of [`get_or_add`](Self::get_or_add), for walking
    /// nested groups.
    pub fn into_get_or_add(self, name: &str) -> Result<GroupMut<'a>> {
        validate_name(name)?;
        let Self { mut ctx, reg } = self;
        let group = match reg.groups.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                ensure_unclaimed(ctx.tree, reg.contents, name)?;
                let (declaration, content) =
                    create_declared(ctx.tree, reg.declarations, reg.contents, GROUP_TAG, name);
                debug!("created group `{name}`");
                let group = entry.insert(Group::empty(declaration, content));
                ctx.commit()?;
                group
            }
        };
        Ok(GroupMut { ctx, group })
    }

    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let Some(group) = self.reg.groups.remove(name) else {
            return Ok(false);
        };
        self.ctx.tree.detach(group.declaration);
        self.ctx.tree.detach(group.content);
        debug!("removed group `{name}`");
        self.ctx.commit()?;
        Ok(true)
    }

    /// Removes every group of this registry with everything inside.
    pub fn clear(&mut self) -> Result<()> {
        for (_, group) in self.reg.groups.drain() {
            self.ctx.tree.detach(group.declaration);
            self.ctx.tree.detach(group.content);
        }
        self.ctx.commit()
    }
}

impl Deref for GroupRegistryMut<'_> {
    type Target = GroupRegistry;

    fn deref(&self) -> &GroupRegistry {
        self.reg
    }
}

/// Mutable view over one [`Group`].
pub struct GroupMut<'a> {
    ctx: Ctx<'a>,
    group: &'a mut Group,
}

impl<'a> GroupMut<'a> {
    pub fn sections_mut(&mut self) -> SectionRegistryMut<'_> {
        SectionRegistryMut::new(self.ctx.reborrow(), &mut self.group.sections)
    }

    pub fn groups_mut(&mut self) -> GroupRegistryMut<'_> {
        GroupRegistryMut::new(self.ctx.reborrow(), &mut self.group.groups)
    }

    pub fn into_sections(self) -> SectionRegistryMut<'a> {
        SectionRegistryMut::new(self.ctx, &mut self.group.sections)
    }

    pub fn into_groups(self) -> GroupRegistryMut<'a> {
        GroupRegistryMut::new(self.ctx, &mut self.group.groups)
    }
}

impl Deref for GroupMut<'_> {
    type Target = Group;

    fn deref(&self) -> &Group {
        self.group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        properties::PropertyMap,
        section::{SectionKind, registry::SECTION_TAG},
        storage::SavePolicy,
    };

    const DOC: &str = r#"<configuration>
  <configSections>
    <sectionGroup name="outer">
      <section name="inner" type="System.Configuration.NameValueSectionHandler" />
      <sectionGroup name="deep" />
    </sectionGroup>
  </configSections>
  <outer>
    <inner><add key="a" value="1" /></inner>
    <deep />
  </outer>
</configuration>"#;

    fn load(tree: &mut XmlTree) -> GroupRegistry {
        let root = tree.root();
        let decls = tree.child_element(root, "configSections").unwrap();
        GroupRegistry::load(tree, decls, root, 2).unwrap()
    }

    fn policy() -> SavePolicy {
        SavePolicy {
            auto_save: false,
            indent: 2,
            storage: None,
        }
    }

    #[test]
    fn test_load_nested_groups() {
        let mut tree = XmlTree::parse(DOC).unwrap();
        let reg = load(&mut tree);
        let outer = reg.get("outer").unwrap();
        assert_eq!(
            outer
                .sections()
                .try_get_name_value("inner")
                .and_then(|p| p.get("a"))
                .map(String::as_str),
            Some("1")
        );
        assert!(outer.groups().contains_name("deep"));
        assert!(outer.groups().get("deep").unwrap().sections().is_empty());
    }

    #[test]
    fn test_nested_get_or_add() {
        let mut tree = XmlTree::new("configuration");
        let root = tree.root();
        let decls = tree.create_element("configSections");
        tree.prepend_child(root, decls);
        let mut reg = GroupRegistry::load(&mut tree, decls, root, 2).unwrap();
        let mut policy = policy();

        {
            let groups = GroupRegistryMut::new(Ctx::new(&mut tree, &mut policy), &mut reg);
            let mut sections = groups
                .into_get_or_add("g1")
                .unwrap()
                .into_groups()
                .into_get_or_add("g2")
                .unwrap()
                .into_sections();
            sections
                .get_or_add_name_value("s")
                .unwrap()
                .insert("k", "v")
                .unwrap();
        }

        let expected = r#"<configuration>
  <configSections>
    <sectionGroup name="g1">
      <sectionGroup name="g2">
        <section name="s" type="System.Configuration.NameValueSectionHandler" />
      </sectionGroup>
    </sectionGroup>
  </configSections>
  <g1>
    <g2>
      <s>
        <add key="k" value="v" />
      </s>
    </g2>
  </g1>
</configuration>"#;
        assert_eq!(tree.to_xml(root, 2), expected);

        let reloaded = GroupRegistry::load(&mut tree.clone(), decls, root, 2).unwrap();
        let g2 = reloaded.get("g1").and_then(|g| g.groups().get("g2")).unwrap();
        assert_eq!(
            g2.sections().get("s").and_then(|s| s.kind()),
            Some(SectionKind::NameValue)
        );
    }

    #[test]
    fn test_remove_and_clear_groups() {
        let mut tree = XmlTree::parse(DOC).unwrap();
        let mut reg = load(&mut tree);
        let mut policy = policy();
        let root = tree.root();
        {
            let mut groups = GroupRegistryMut::new(Ctx::new(&mut tree, &mut policy), &mut reg);
            let mut outer = groups.get_mut("outer").unwrap();
            assert!(outer.groups_mut().remove("deep").unwrap());
            assert!(!outer.groups_mut().remove("deep").unwrap());
            assert!(matches!(
                groups.get_or_add("bad name"),
                Err(Error::InvalidKey(_))
            ));
        }
        let outer = tree.child_element(root, "outer").unwrap();
        assert!(tree.child_element(outer, "deep").is_none());
        assert!(tree.child_element(outer, "inner").is_some());

        {
            let mut groups = GroupRegistryMut::new(Ctx::new(&mut tree, &mut policy), &mut reg);
            groups.clear().unwrap();
            assert!(groups.is_empty());
        }
        let decls = tree.child_element(root, "configSections").unwrap();
        assert_eq!(tree.child_elements(decls, GROUP_TAG).count(), 0);
        assert_eq!(tree.child_elements(decls, SECTION_TAG).count(), 0);
        assert!(tree.child_element(root, "outer").is_none());
    }

    #[test]
    fn test_group_sections_mutate() {
        let mut tree = XmlTree::parse(DOC).unwrap();
        let mut reg = load(&mut tree);
        let mut policy = policy();
        let mut groups = GroupRegistryMut::new(Ctx::new(&mut tree, &mut policy), &mut reg);
        let mut outer = groups.get_or_add("outer").unwrap();
        let mut sections = outer.sections_mut();
        let mut inner = sections.get_or_add_name_value("inner").unwrap();
        inner.set("a", None).unwrap();
        assert!(inner.is_empty());
    }
}
