//! Arena-backed XML node tree.
//!
//! The whole document lives in one [`XmlTree`]. Registries keep [`NodeId`]
//! handles into it; the tree stays the single owner of every node. Detached
//! subtrees are freed immediately and their slots are reused.

use std::hash::{Hash, Hasher};

use quick_xml::{
    Reader,
    encoding::Decoder,
    escape::escape,
    events::{BytesStart, Event},
};

use crate::error::{Error, Result};

/// Handle to a node of an [`XmlTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    kind: NodeKind,
}

/// Mutable XML element tree with a single root element.
#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    root: NodeId,
}

impl XmlTree {
    /// Creates a tree holding only an empty root element.
    pub fn new(root_name: &str) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.create_element(root_name);
        tree
    }

    /// Parses a complete document.
    ///
    /// Whitespace-only text nodes are dropped; any other text is kept as is.
    /// Declarations, processing instructions and comments outside the root
    /// element are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);

        let mut tree = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
        };
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let id = tree.open_element(reader.decoder(), &start, &stack, &mut root)?;
                    stack.push(id);
                }
                Event::Empty(start) => {
                    tree.open_element(reader.decoder(), &start, &stack, &mut root)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(text) => {
                    if text.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let text = text.unescape()?.into_owned();
                    tree.push_leaf(&stack, NodeKind::Text(text))?;
                }
                Event::CData(data) => {
                    let text = reader.decoder().decode(&data)?.into_owned();
                    tree.push_leaf(&stack, NodeKind::CData(text))?;
                }
                Event::Comment(comment) => {
                    if !stack.is_empty() {
                        let text = reader.decoder().decode(&comment)?.into_owned();
                        tree.push_leaf(&stack, NodeKind::Comment(text))?;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(Error::malformed(format!(
                "element <{}> is not closed",
                tree.name(*open).unwrap_or_default()
            )));
        }
        tree.root = root.ok_or_else(|| Error::malformed("document has no root element"))?;
        Ok(tree)
    }

    fn open_element(
        &mut self,
        decoder: Decoder,
        start: &BytesStart,
        stack: &[NodeId],
        root: &mut Option<NodeId>,
    ) -> Result<NodeId> {
        let name = decoder.decode(start.name().as_ref())?.into_owned();
        let id = self.create_element(&name);
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = decoder.decode(attr.key.as_ref())?.into_owned();
            let value = attr.unescape_value()?.into_owned();
            self.set_attribute(id, &key, &value);
        }
        match stack.last() {
            Some(parent) => self.append_child(*parent, id),
            None if root.is_none() => *root = Some(id),
            None => return Err(Error::malformed("document has more than one root element")),
        }
        Ok(id)
    }

    fn push_leaf(&mut self, stack: &[NodeId], kind: NodeKind) -> Result<()> {
        let Some(parent) = stack.last() else {
            return Err(Error::malformed("text outside of the root element"));
        };
        let id = self.alloc(kind);
        self.append_child(*parent, id);
        Ok(())
    }

    /// Root element of the document.
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let node = Some(Node { parent: None, kind });
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                NodeId(slot)
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.node(id)?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(id.0)?.as_mut()?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Creates a detached element. Attach it with [`XmlTree::append_child`].
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.alloc(NodeKind::Element(Element {
            name: name.to_string(),
            ..Default::default()
        }))
    }

    /// Appends `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(element) = self.element_mut(parent) {
            element.children.push(child);
            self.set_parent(child, parent);
        }
    }

    /// Inserts `child` as the first child of `parent`.
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(element) = self.element_mut(parent) {
            element.children.insert(0, child);
            self.set_parent(child, parent);
        }
    }

    /// Inserts `child` right after `anchor`, under the parent of `anchor`.
    pub fn insert_after(&mut self, anchor: NodeId, child: NodeId) {
        let Some(parent) = self.node(anchor).and_then(|n| n.parent) else {
            return;
        };
        if let Some(element) = self.element_mut(parent) {
            let index = element
                .children
                .iter()
                .position(|c| *c == anchor)
                .map_or(element.children.len(), |i| i + 1);
            element.children.insert(index, child);
            self.set_parent(child, parent);
        }
    }

    fn set_parent(&mut self, child: NodeId, parent: NodeId) {
        if let Some(Some(node)) = self.nodes.get_mut(child.0) {
            node.parent = Some(parent);
        }
    }

    /// Element name, `None` for non-element nodes.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.name.as_str())
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attributes of an element in document order.
    pub fn attributes(&self, id: NodeId) -> impl Iterator<Item = (&str, &str)> {
        self.element(id)
            .into_iter()
            .flat_map(|e| e.attributes.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Sets an attribute, keeping its position when it already exists.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        let Some(element) = self.element_mut(id) else {
            return;
        };
        match element.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, current)) => *current = value.to_string(),
            None => element
                .attributes
                .push((name.to_string(), value.to_string())),
        }
    }

    /// Sets the attribute when `value` is present, removes it otherwise.
    pub fn set_optional_attribute(&mut self, id: NodeId, name: &str, value: Option<&str>) {
        match value {
            Some(value) => self.set_attribute(id, name, value),
            None => {
                self.remove_attribute(id, name);
            }
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> bool {
        let Some(element) = self.element_mut(id) else {
            return false;
        };
        let before = element.attributes.len();
        element.attributes.retain(|(k, _)| k != name);
        element.attributes.len() != before
    }

    pub fn clear_attributes(&mut self, id: NodeId) {
        if let Some(element) = self.element_mut(id) {
            element.attributes.clear();
        }
    }

    /// First child element named `name`.
    pub fn child_element(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.child_elements(parent, name).next()
    }

    /// Child elements named `name`, in document order.
    pub fn child_elements<'s>(
        &'s self,
        parent: NodeId,
        name: &'s str,
    ) -> impl Iterator<Item = NodeId> + 's {
        self.element(parent)
            .into_iter()
            .flat_map(|e| e.children.iter().copied())
            .filter(move |child| self.name(*child) == Some(name))
    }

    /// Removes a node from its parent and frees the whole subtree.
    pub fn detach(&mut self, id: NodeId) {
        let parent = self.node(id).and_then(|n| n.parent);
        if let Some(parent) = parent.and_then(|p| self.element_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
        self.free_subtree(id);
    }

    /// Removes and frees every child of an element, keeping its attributes.
    pub fn remove_children(&mut self, id: NodeId) {
        let children = match self.element_mut(id) {
            Some(element) => std::mem::take(&mut element.children),
            None => return,
        };
        for child in children {
            self.free_subtree(child);
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(node) = self.nodes.get_mut(current.0).and_then(Option::take) else {
                continue;
            };
            if let NodeKind::Element(element) = node.kind {
                pending.extend(element.children);
            }
            self.free.push(current.0);
        }
    }

    /// Replaces the children of an element with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.remove_children(id);
        let child = self.alloc(NodeKind::Text(text.to_string()));
        self.append_child(id, child);
    }

    /// Text of an element whose only child is a text or CDATA node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.element(id).map(|e| e.children.as_slice()) {
            Some([child]) => match self.node(*child).map(|n| &n.kind) {
                Some(NodeKind::Text(text) | NodeKind::CData(text)) => Some(text.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Parses `raw` as the content of an element named `wrapper` and moves
    /// the resulting child nodes under `parent`.
    ///
    /// Returns `false`, leaving `parent` untouched, when `raw` is not
    /// well-formed or contains no element.
    pub fn import_fragment(&mut self, parent: NodeId, wrapper: &str, raw: &str) -> bool {
        let Ok(fragment) = XmlTree::parse(&format!("<{wrapper}>{raw}</{wrapper}>")) else {
            return false;
        };
        let Some(children) = fragment.element(fragment.root).map(|e| e.children.clone()) else {
            return false;
        };
        if !children.iter().any(|c| fragment.element(*c).is_some()) {
            return false;
        }
        for child in children {
            let copy = self.copy_from(&fragment, child);
            self.append_child(parent, copy);
        }
        true
    }

    fn copy_from(&mut self, other: &XmlTree, src: NodeId) -> NodeId {
        let Some(node) = other.node(src) else {
            return self.alloc(NodeKind::Text(String::new()));
        };
        match &node.kind {
            NodeKind::Element(element) => {
                let id = self.create_element(&element.name);
                for (k, v) in &element.attributes {
                    self.set_attribute(id, k, v);
                }
                for child in &element.children {
                    let copy = self.copy_from(other, *child);
                    self.append_child(id, copy);
                }
                id
            }
            kind => self.alloc(kind.clone()),
        }
    }

    /// Serializes a subtree, indenting element-only content by `indent` spaces.
    pub fn to_xml(&self, id: NodeId, indent: usize) -> String {
        let mut out = String::new();
        self.write_node(id, Some((indent, 0)), &mut out);
        out
    }

    /// Serializes the children of an element, one block node per line.
    pub fn inner_xml(&self, id: NodeId, indent: usize) -> String {
        let Some(element) = self.element(id) else {
            return String::new();
        };
        let block = self.is_block(element);
        let mut out = String::new();
        for (i, child) in element.children.iter().enumerate() {
            if block && i > 0 {
                out.push('\n');
            }
            self.write_node(*child, block.then_some((indent, 0)), &mut out);
        }
        out
    }

    fn is_block(&self, element: &Element) -> bool {
        element.children.iter().all(|c| {
            matches!(
                self.node(*c).map(|n| &n.kind),
                Some(NodeKind::Element(_) | NodeKind::Comment(_))
            )
        })
    }

    fn write_node(&self, id: NodeId, layout: Option<(usize, usize)>, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(&escape(text.as_str())),
            NodeKind::CData(text) => {
                out.push_str("<![CDATA[");
                out.push_str(text);
                out.push_str("]]>");
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Element(element) => {
                out.push('<');
                out.push_str(&element.name);
                for (k, v) in &element.attributes {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    out.push_str(&escape(v.as_str()));
                    out.push('"');
                }
                if element.children.is_empty() {
                    out.push_str(" />");
                    return;
                }
                out.push('>');
                match layout.filter(|_| self.is_block(element)) {
                    Some((indent, depth)) => {
                        for child in &element.children {
                            out.push('\n');
                            out.push_str(&" ".repeat(indent * (depth + 1)));
                            self.write_node(*child, Some((indent, depth + 1)), out);
                        }
                        out.push('\n');
                        out.push_str(&" ".repeat(indent * depth));
                    }
                    None => {
                        for child in &element.children {
                            self.write_node(*child, None, out);
                        }
                    }
                }
                out.push_str("</");
                out.push_str(&element.name);
                out.push('>');
            }
        }
    }

    fn same_subtree(&self, a: NodeId, other: &XmlTree, b: NodeId) -> bool {
        match (self.node(a).map(|n| &n.kind), other.node(b).map(|n| &n.kind)) {
            (Some(NodeKind::Element(x)), Some(NodeKind::Element(y))) => {
                x.name == y.name
                    && x.attributes == y.attributes
                    && x.children.len() == y.children.len()
                    && x
                        .children
                        .iter()
                        .zip(&y.children)
                        .all(|(cx, cy)| self.same_subtree(*cx, other, *cy))
            }
            (Some(NodeKind::Text(x)), Some(NodeKind::Text(y)))
            | (Some(NodeKind::CData(x)), Some(NodeKind::CData(y)))
            | (Some(NodeKind::Comment(x)), Some(NodeKind::Comment(y))) => x == y,
            (None, None) => true,
            _ => false,
        }
    }

    fn hash_subtree<H: Hasher>(&self, id: NodeId, state: &mut H) {
        match self.node(id).map(|n| &n.kind) {
            Some(NodeKind::Element(element)) => {
                0u8.hash(state);
                element.name.hash(state);
                element.attributes.hash(state);
                element.children.len().hash(state);
                for child in &element.children {
                    self.hash_subtree(*child, state);
                }
            }
            Some(NodeKind::Text(text)) => (1u8, text).hash(state),
            Some(NodeKind::CData(text)) => (2u8, text).hash(state),
            Some(NodeKind::Comment(text)) => (3u8, text).hash(state),
            None => 4u8.hash(state),
        }
    }
}

/// Two trees are equal when their live node structures match, whatever
/// their arena layout.
impl PartialEq for XmlTree {
    fn eq(&self, other: &Self) -> bool {
        self.same_subtree(self.root, other, other.root)
    }
}

impl Eq for XmlTree {}

impl Hash for XmlTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_subtree(self.root, state);
    }
}

/// Checks that `name` can be used as an element name.
///
/// Names must be non-empty, must not contain whitespace and must follow the
/// XML name shape: a letter or `_` first, then letters, digits, `_`, `-`, `.`
/// or `:`.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(Error::ArgumentRequired("name"));
    };
    let valid_first = first.is_alphabetic() || first == '_';
    let valid_rest = chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if valid_first && valid_rest {
        Ok(())
    } else {
        Err(Error::InvalidKey(name.to_string()))
    }
}
