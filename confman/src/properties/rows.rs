use std::{
    collections::{HashMap, hash_map},
    ops::Deref,
};

use crate::{
    error::{Error, Result},
    properties::{ConnectionValue, PropertyMap},
    storage::Ctx,
    value::TypedValue,
    xml::{NodeId, XmlTree},
};

/// Element name of a property row.
pub(crate) const ROW_TAG: &str = "add";

mod sealed {
    use crate::{
        error::Result,
        xml::{NodeId, XmlTree},
    };

    pub trait Row: Sized {
        /// Attribute carrying the row's key.
        const KEY_ATTR: &'static str;

        /// Reads the value attributes of a row.
        fn read(tree: &XmlTree, row: NodeId) -> Result<Self>;

        /// Writes the value attributes of a row, leaving the key untouched.
        fn write(&self, tree: &mut XmlTree, row: NodeId);
    }
}

use sealed::Row;

/// A value that is persisted as one `<add />` row.
///
/// Implemented for [`String`], [`TypedValue`] and [`ConnectionValue`].
pub trait RowValue: Clone + Row {}

impl<T: Clone + Row> RowValue for T {}

impl Row for String {
    const KEY_ATTR: &'static str = "key";

    fn read(tree: &XmlTree, row: NodeId) -> Result<Self> {
        Ok(tree.attribute(row, "value").unwrap_or_default().to_string())
    }

    fn write(&self, tree: &mut XmlTree, row: NodeId) {
        tree.set_attribute(row, "value", self);
    }
}

impl Row for TypedValue {
    const KEY_ATTR: &'static str = "key";

    fn read(tree: &XmlTree, row: NodeId) -> Result<Self> {
        let text = tree.attribute(row, "value").unwrap_or_default();
        TypedValue::decode(text, tree.attribute(row, "type"))
    }

    fn write(&self, tree: &mut XmlTree, row: NodeId) {
        let (text, tag) = self.encode();
        tree.set_attribute(row, "value", &text);
        tree.set_attribute(row, "type", tag);
    }
}

impl Row for ConnectionValue {
    const KEY_ATTR: &'static str = "name";

    fn read(tree: &XmlTree, row: NodeId) -> Result<Self> {
        let connection_string = tree
            .attribute(row, "connectionString")
            .ok_or_else(|| Error::malformed("connection entry without connectionString"))?;
        Ok(ConnectionValue::new(
            connection_string,
            tree.attribute(row, "providerName"),
        ))
    }

    fn write(&self, tree: &mut XmlTree, row: NodeId) {
        tree.set_attribute(row, "connectionString", self.connection_string());
        tree.set_optional_attribute(row, "providerName", self.provider_name());
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    row: NodeId,
    value: V,
}

/// Keyed rows under one content node.
#[derive(Debug, Clone)]
pub struct Properties<V> {
    content: NodeId,
    entries: HashMap<String, Entry<V>>,
}

impl<V: RowValue> Properties<V> {
    /// Indexes the existing `<add />` rows of `content`.
    pub(crate) fn load(tree: &XmlTree, content: NodeId) -> Result<Self> {
        let mut entries = HashMap::new();
        for row in tree.child_elements(content, ROW_TAG) {
            let key = tree.attribute(row, V::KEY_ATTR).ok_or_else(|| {
                Error::malformed(format!("<{ROW_TAG}> row without `{}`", V::KEY_ATTR))
            })?;
            let value = V::read(tree, row)?;
            match entries.entry(key.to_string()) {
                hash_map::Entry::Occupied(_) => return Err(Error::DuplicateKey(key.to_string())),
                hash_map::Entry::Vacant(slot) => {
                    slot.insert(Entry { row, value });
                }
            }
        }
        Ok(Self { content, entries })
    }

    pub(crate) fn empty(content: NodeId) -> Self {
        Self {
            content,
            entries: HashMap::new(),
        }
    }

    /// Replaces every row of `content` with `values`.
    pub(crate) fn rebuild<I>(tree: &mut XmlTree, content: NodeId, values: I) -> Self
    where
        I: IntoIterator<Item = (String, V)>,
    {
        tree.remove_children(content);
        tree.clear_attributes(content);
        let mut props = Self::empty(content);
        for (key, value) in values {
            props.put(tree, &key, value);
        }
        props
    }

    fn put(&mut self, tree: &mut XmlTree, key: &str, value: V) {
        match self.entries.get_mut(key) {
            Some(entry) => {
                value.write(tree, entry.row);
                entry.value = value;
            }
            None => {
                let row = tree.create_element(ROW_TAG);
                tree.set_attribute(row, V::KEY_ATTR, key);
                value.write(tree, row);
                tree.append_child(self.content, row);
                self.entries.insert(key.to_string(), Entry { row, value });
            }
        }
    }

    fn take(&mut self, tree: &mut XmlTree, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                tree.detach(entry.row);
                true
            }
            None => false,
        }
    }

    fn clear_rows(&mut self, tree: &mut XmlTree) {
        self.entries.clear();
        tree.remove_children(self.content);
    }
}

impl<V> Properties<V> {
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|e| &e.value)
    }

    /// Iterates over `(key, value)` pairs in map order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), &e.value))
    }

    /// Copies the entries out of the document.
    pub fn to_map(&self) -> HashMap<String, V>
    where
        V: Clone,
    {
        self.iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

impl Properties<String> {
    /// Splits a stored value on commas.
    ///
    /// Values that themselves contain commas do not survive a
    /// [`PropertiesMut::set_list`] / `get_list` round trip.
    pub fn get_list(&self, key: &str) -> Option<Vec<&str>> {
        self.get(key).map(|v| v.split(',').collect())
    }
}

impl Properties<ConnectionValue> {
    /// Connection string and provider name of an entry.
    pub fn get_parts(&self, name: &str) -> Option<(&str, Option<&str>)> {
        self.get(name)
            .map(|v| (v.connection_string(), v.provider_name()))
    }
}

/// Mutable view over a [`Properties`] set.
pub struct PropertiesMut<'a, V> {
    ctx: Ctx<'a>,
    props: &'a mut Properties<V>,
}

impl<'a, V: RowValue> PropertiesMut<'a, V> {
    pub(crate) fn new(ctx: Ctx<'a>, props: &'a mut Properties<V>) -> Self {
        Self { ctx, props }
    }

    /// Creates or replaces `key`.
    pub fn insert(&mut self, key: &str, value: impl Into<V>) -> Result<()> {
        self.set(key, Some(value.into()))
    }
}

impl<V> Deref for PropertiesMut<'_, V> {
    type Target = Properties<V>;

    fn deref(&self) -> &Self::Target {
        self.props
    }
}

impl<V: RowValue> PropertyMap for PropertiesMut<'_, V> {
    type Value = V;

    fn get(&self, key: &str) -> Option<&V> {
        self.props.get(key)
    }

    fn set(&mut self, key: &str, value: Option<V>) -> Result<()> {
        if key.is_empty() {
            return Err(Error::ArgumentRequired("key"));
        }
        match value {
            Some(value) => {
                self.props.put(self.ctx.tree, key, value);
                self.ctx.commit()
            }
            None => {
                if self.props.take(self.ctx.tree, key) {
                    self.ctx.commit()?;
                }
                Ok(())
            }
        }
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        if !self.props.take(self.ctx.tree, key) {
            return Ok(false);
        }
        self.ctx.commit()?;
        Ok(true)
    }

    fn clear(&mut self) -> Result<()> {
        self.props.clear_rows(self.ctx.tree);
        self.ctx.commit()
    }

    fn len(&self) -> usize {
        self.props.len()
    }
}

impl PropertiesMut<'_, String> {
    /// Adds `key`, or appends `value` to the existing value with a comma.
    pub fn add_or_merge(&mut self, key: &str, value: &str) -> Result<()> {
        let merged = match self.props.get(key) {
            Some(old) => format!("{old},{value}"),
            None => value.to_string(),
        };
        self.set(key, Some(merged))
    }

    /// Stores `values` joined with commas.
    pub fn set_list<S: AsRef<str>>(&mut self, key: &str, values: &[S]) -> Result<()> {
        let joined = values
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(",");
        self.set(key, Some(joined))
    }
}

impl PropertiesMut<'_, ConnectionValue> {
    /// Creates, replaces or removes a connection entry.
    ///
    /// Both parts absent removes the entry. A provider without a connection
    /// string is rejected.
    pub fn add_or_update(
        &mut self,
        name: &str,
        connection_string: Option<&str>,
        provider_name: Option<&str>,
    ) -> Result<()> {
        match (connection_string, provider_name) {
            (None, None) => self.set(name, None),
            (None, Some(_)) => Err(Error::ArgumentRequired("connection_string")),
            (Some(cs), provider) => self.set(name, Some(ConnectionValue::new(cs, provider))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SavePolicy;

    fn policy() -> SavePolicy {
        SavePolicy {
            auto_save: false,
            indent: 2,
            storage: None,
        }
    }

    #[test]
    fn test_set_get_remove() {
        let mut tree = XmlTree::parse("<appSettings />").unwrap();
        let root = tree.root();
        let mut props = Properties::<String>::load(&tree, root).unwrap();
        let mut policy = policy();
        let mut view = PropertiesMut::new(Ctx::new(&mut tree, &mut policy), &mut props);

        view.insert("a", "1").unwrap();
        assert_eq!(view.get("a").map(String::as_str), Some("1"));
        assert!(view.contains_key("a"));

        view.insert("a", "2").unwrap();
        assert_eq!(view.len(), 1);

        view.set("a", None).unwrap();
        assert!(!view.contains_key("a"));
        assert!(!view.remove("a").unwrap());
        assert!(matches!(view.set("", None), Err(Error::ArgumentRequired("key"))));

        assert_eq!(tree.to_xml(root, 2), "<appSettings />");
    }

    #[test]
    fn test_rows_follow_map() {
        let mut tree =
            XmlTree::parse(r#"<s><add key="x" value="1" /><add key="y" value="2" /></s>"#).unwrap();
        let root = tree.root();
        let mut props = Properties::<String>::load(&tree, root).unwrap();
        let mut policy = policy();
        {
            let mut view = PropertiesMut::new(Ctx::new(&mut tree, &mut policy), &mut props);
            view.insert("x", "10").unwrap();
            assert!(view.remove("y").unwrap());
            view.insert("z", "3").unwrap();
        }
        assert_eq!(
            tree.to_xml(root, 0),
            "<s>\n<add key=\"x\" value=\"10\" />\n<add key=\"z\" value=\"3\" />\n</s>"
        );
    }

    #[test]
    fn test_merge_and_list() {
        let mut tree = XmlTree::new("s");
        let root = tree.root();
        let mut props = Properties::<String>::load(&tree, root).unwrap();
        let mut policy = policy();
        let mut view = PropertiesMut::new(Ctx::new(&mut tree, &mut policy), &mut props);

        view.add_or_merge("k", "a").unwrap();
        view.add_or_merge("k", "b").unwrap();
        assert_eq!(view.get("k").map(String::as_str), Some("a,b"));

        view.set_list("l", &["x", "y", "z"]).unwrap();
        assert_eq!(view.get_list("l"), Some(vec!["x", "y", "z"]));
    }

    #[test]
    fn test_typed_rows() {
        let mut tree = XmlTree::parse(
            r#"<d><add key="n" value="42" type="System.Int32" /><add key="s" value="hi" /></d>"#,
        )
        .unwrap();
        let root = tree.root();
        let mut props = Properties::<TypedValue>::load(&tree, root).unwrap();
        assert_eq!(props.get("n"), Some(&TypedValue::I32(42)));
        assert_eq!(props.get("s"), Some(&TypedValue::String("hi".into())));

        let mut policy = policy();
        let mut view = PropertiesMut::new(Ctx::new(&mut tree, &mut policy), &mut props);
        view.insert("b", vec![0x01u8, 0xFF]).unwrap();
        let row = tree.child_elements(root, ROW_TAG).last().unwrap();
        assert_eq!(tree.attribute(row, "value"), Some("01FF"));
        assert_eq!(tree.attribute(row, "type"), Some("System.Byte[]"));
    }

    #[test]
    fn test_load_errors() {
        let tree = XmlTree::parse(r#"<d><add key="n" value="x" type="System.Int32" /></d>"#).unwrap();
        assert!(matches!(
            Properties::<TypedValue>::load(&tree, tree.root()),
            Err(Error::MalformedInput(_))
        ));

        let tree = XmlTree::parse(r#"<d><add key="a" value="1" /><add key="a" value="2" /></d>"#)
            .unwrap();
        assert!(matches!(
            Properties::<String>::load(&tree, tree.root()),
            Err(Error::DuplicateKey(k)) if k == "a"
        ));

        let tree = XmlTree::parse(r#"<d><add value="1" /></d>"#).unwrap();
        assert!(Properties::<String>::load(&tree, tree.root()).is_err());
    }

    #[test]
    fn test_connection_rows() {
        let mut tree = XmlTree::new("connectionStrings");
        let root = tree.root();
        let mut props = Properties::<ConnectionValue>::load(&tree, root).unwrap();
        let mut policy = policy();
        let mut view = PropertiesMut::new(Ctx::new(&mut tree, &mut policy), &mut props);

        view.add_or_update("main", Some("Data Source=app.db"), Some("System.Data.SQLite"))
            .unwrap();
        assert_eq!(
            view.get_parts("main"),
            Some(("Data Source=app.db", Some("System.Data.SQLite")))
        );

        view.add_or_update("main", Some("Data Source=other.db"), None).unwrap();
        assert_eq!(view.get_parts("main"), Some(("Data Source=other.db", None)));

        assert!(matches!(
            view.add_or_update("main", None, Some("x")),
            Err(Error::ArgumentRequired(_))
        ));
        view.add_or_update("main", None, None).unwrap();
        assert!(view.is_empty());
    }
}
