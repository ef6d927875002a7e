use std::{collections::HashMap, ops::Deref};

use crate::{
    error::Result,
    properties::PropertyMap,
    storage::Ctx,
    xml::{NodeId, XmlTree, validate_name},
};

/// Attributes held directly on a content node.
#[derive(Debug, Clone)]
pub struct Attributes {
    content: NodeId,
    values: HashMap<String, String>,
}

impl Attributes {
    pub(crate) fn load(tree: &XmlTree, content: NodeId) -> Self {
        let values = tree
            .attributes(content)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { content, values }
    }

    pub(crate) fn empty(content: NodeId) -> Self {
        Self {
            content,
            values: HashMap::new(),
        }
    }

    /// Replaces the whole content of `content` with `values` as attributes.
    pub(crate) fn rebuild<I>(tree: &mut XmlTree, content: NodeId, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let values: HashMap<String, String> = values.into_iter().collect();
        for key in values.keys() {
            validate_name(key)?;
        }
        tree.remove_children(content);
        tree.clear_attributes(content);
        for (k, v) in &values {
            tree.set_attribute(content, k, v);
        }
        Ok(Self { content, values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.values.clone()
    }
}

/// Mutable view over the [`Attributes`] of a single-tag section.
pub struct AttributesMut<'a> {
    ctx: Ctx<'a>,
    attrs: &'a mut Attributes,
}

impl<'a> AttributesMut<'a> {
    pub(crate) fn new(ctx: Ctx<'a>, attrs: &'a mut Attributes) -> Self {
        Self { ctx, attrs }
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.set(key, Some(value.into()))
    }
}

impl Deref for AttributesMut<'_> {
    type Target = Attributes;

    fn deref(&self) -> &Attributes {
        self.attrs
    }
}

impl PropertyMap for AttributesMut<'_> {
    type Value = String;

    fn get(&self, key: &str) -> Option<&String> {
        self.attrs.values.get(key)
    }

    /// Attribute names must be valid XML names.
    fn set(&mut self, key: &str, value: Option<String>) -> Result<()> {
        validate_name(key)?;
        let content = self.attrs.content;
        match value {
            Some(value) => {
                self.ctx.tree.set_attribute(content, key, &value);
                self.attrs.values.insert(key.to_string(), value);
                self.ctx.commit()
            }
            None => {
                if self.attrs.values.remove(key).is_some() {
                    self.ctx.tree.remove_attribute(content, key);
                    self.ctx.commit()?;
                }
                Ok(())
            }
        }
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        if self.attrs.values.remove(key).is_none() {
            return Ok(false);
        }
        self.ctx.tree.remove_attribute(self.attrs.content, key);
        self.ctx.commit()?;
        Ok(true)
    }

    fn clear(&mut self) -> Result<()> {
        self.attrs.values.clear();
        self.ctx.tree.clear_attributes(self.attrs.content);
        self.ctx.commit()
    }

    fn len(&self) -> usize {
        self.attrs.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, storage::SavePolicy};

    #[test]
    fn test_attributes_track_node() {
        let mut tree = XmlTree::parse(r#"<tag a="1" />"#).unwrap();
        let root = tree.root();
        let mut attrs = Attributes::load(&tree, root);
        assert_eq!(attrs.get("a"), Some("1"));

        let mut policy = SavePolicy {
            auto_save: false,
            indent: 2,
            storage: None,
        };
        let mut view = AttributesMut::new(Ctx::new(&mut tree, &mut policy), &mut attrs);
        view.insert("b", "2").unwrap();
        assert!(view.remove("a").unwrap());
        assert!(matches!(
            view.insert("bad key", "x"),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(view.set("", None), Err(Error::ArgumentRequired(_))));
        assert_eq!(view.len(), 1);

        assert_eq!(tree.to_xml(root, 2), r#"<tag b="2" />"#);
    }

    #[test]
    fn test_rebuild_replaces_content() {
        let mut tree = XmlTree::parse(r#"<tag old="x"><add key="k" value="v" /></tag>"#).unwrap();
        let root = tree.root();
        let attrs = Attributes::rebuild(&mut tree, root, [("n".to_string(), "1".to_string())])
            .unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(tree.to_xml(root, 2), r#"<tag n="1" />"#);

        assert!(
            Attributes::rebuild(&mut tree, root, [("no good".to_string(), String::new())]).is_err()
        );
    }
}
