//! Live document: an arena of nodes addressed by [`NodeKey`].
//!
//! Invariants:
//! - Key `0` is the document node and is never removed.
//! - Keys are allocated monotonically and never reused.
//! - A node has at most one parent; operations never create cycles.
//! - Removing a node tombstones its whole subtree; detaching keeps it alive
//!   so it can be re-attached elsewhere.
//! - Attribute order is preserved; names are stored as given.
use crate::fragment::parse_document;
use crate::types::{Node, NodeKey};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0:?} does not exist")]
    MissingNode(NodeKey),
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeKey),
    #[error("node {0:?} cannot have children")]
    InvalidParent(NodeKey),
    #[error("node {before:?} is not a child of {parent:?}")]
    InvalidSibling { parent: NodeKey, before: NodeKey },
    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    Cycle { parent: NodeKey, child: NodeKey },
    #[error("the document node cannot be moved or removed")]
    DocumentNode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeData {
    Document { doctype: Option<String> },
    Element {
        name: String,
        attributes: Vec<(String, Option<String>)>,
    },
    Text { text: String },
    Comment { text: String },
}

/// A file chosen for an `<input type="file">` control.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct NodeRecord {
    data: NodeData,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
    live: bool,
}

#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeRecord>,
    files: HashMap<NodeKey, Vec<FilePart>>,
}

/// Iterator returned by [`Document::preorder`].
pub struct Preorder<'a> {
    doc: &'a Document,
    stack: Vec<NodeKey>,
}

impl Iterator for Preorder<'_> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<NodeKey> {
        let key = self.stack.pop()?;
        self.stack.extend(self.doc.children(key).iter().rev().copied());
        Some(key)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub const ROOT: NodeKey = NodeKey(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![NodeRecord {
                data: NodeData::Document { doctype: None },
                parent: None,
                children: Vec::new(),
                live: true,
            }],
            files: HashMap::new(),
        }
    }

    /// Build a document from page markup, forgiving malformed input.
    pub fn parse(html: &str) -> Self {
        let mut doc = Self::new();
        let Node::Document { doctype, children } = parse_document(html) else {
            return doc;
        };
        doc.nodes[0].data = NodeData::Document { doctype };
        for key in doc.import(&children) {
            doc.nodes[key.index()].parent = Some(Self::ROOT);
            doc.nodes[0].children.push(key);
        }
        doc
    }

    pub fn root(&self) -> NodeKey {
        Self::ROOT
    }

    fn record(&self, key: NodeKey) -> Option<&NodeRecord> {
        self.nodes.get(key.index()).filter(|r| r.live)
    }

    fn record_mut(&mut self, key: NodeKey) -> Result<&mut NodeRecord, DomError> {
        self.nodes
            .get_mut(key.index())
            .filter(|r| r.live)
            .ok_or(DomError::MissingNode(key))
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.record(key).is_some()
    }

    /// Live and reachable from the document node.
    pub fn is_connected(&self, key: NodeKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            if k == Self::ROOT {
                return true;
            }
            current = self.record(k).and_then(|r| r.parent);
        }
        false
    }

    pub fn data(&self, key: NodeKey) -> Option<&NodeData> {
        self.record(key).map(|r| &r.data)
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.record(key).and_then(|r| r.parent)
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        match self.record(key) {
            Some(r) => r.children.as_slice(),
            None => &[],
        }
    }

    pub fn element_children(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        self.children(key)
            .iter()
            .copied()
            .filter(|c| self.name(*c).is_some())
    }

    pub fn name(&self, key: NodeKey) -> Option<&str> {
        match self.data(key)? {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_element(&self, key: NodeKey, tag: &str) -> bool {
        self.name(key).is_some_and(|n| n.eq_ignore_ascii_case(tag))
    }

    pub fn attributes(&self, key: NodeKey) -> &[(String, Option<String>)] {
        match self.data(key) {
            Some(NodeData::Element { attributes, .. }) => attributes.as_slice(),
            _ => &[],
        }
    }

    /// Attribute value; a present attribute without a value reads as `""`.
    pub fn attr(&self, key: NodeKey, attr: &str) -> Option<&str> {
        self.attributes(key)
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(attr))
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    pub fn has_attr(&self, key: NodeKey, attr: &str) -> bool {
        self.attr(key, attr).is_some()
    }

    pub fn set_attr(
        &mut self,
        key: NodeKey,
        attr: &str,
        value: impl Into<String>,
    ) -> Result<(), DomError> {
        let NodeData::Element { attributes, .. } = &mut self.record_mut(key)?.data else {
            return Err(DomError::NotAnElement(key));
        };
        let value = Some(value.into());
        match attributes.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(attr)) {
            Some((_, existing)) => *existing = value,
            None => attributes.push((attr.to_string(), value)),
        }
        Ok(())
    }

    pub fn remove_attr(&mut self, key: NodeKey, attr: &str) -> Result<(), DomError> {
        let NodeData::Element { attributes, .. } = &mut self.record_mut(key)?.data else {
            return Err(DomError::NotAnElement(key));
        };
        attributes.retain(|(k, _)| !k.eq_ignore_ascii_case(attr));
        Ok(())
    }

    pub fn replace_attributes(
        &mut self,
        key: NodeKey,
        new_attributes: Vec<(String, Option<String>)>,
    ) -> Result<(), DomError> {
        let NodeData::Element { attributes, .. } = &mut self.record_mut(key)?.data else {
            return Err(DomError::NotAnElement(key));
        };
        *attributes = new_attributes;
        Ok(())
    }

    pub fn text_content(&self, key: NodeKey) -> String {
        let mut out = String::new();
        for k in self.preorder(key) {
            if let Some(NodeData::Text { text }) = self.data(k) {
                out.push_str(text);
            }
        }
        out
    }

    /// Replace all children of `key` with a single text node.
    pub fn set_text_content(&mut self, key: NodeKey, text: &str) -> Result<(), DomError> {
        for child in self.children(key).to_vec() {
            self.remove(child)?;
        }
        if !text.is_empty() {
            let node = self.create_text(text);
            self.append_child(key, node)?;
        }
        Ok(())
    }

    fn alloc(&mut self, data: NodeData) -> NodeKey {
        let key = NodeKey(self.nodes.len() as u32);
        self.nodes.push(NodeRecord {
            data,
            parent: None,
            children: Vec::new(),
            live: true,
        });
        key
    }

    pub fn create_element(
        &mut self,
        name: &str,
        attributes: Vec<(String, Option<String>)>,
    ) -> NodeKey {
        self.alloc(NodeData::Element {
            name: name.to_string(),
            attributes,
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeKey {
        self.alloc(NodeData::Text {
            text: text.to_string(),
        })
    }

    /// Copy detached markup trees into the arena. The results are not
    /// attached; document wrappers are flattened into their children.
    pub fn import(&mut self, nodes: &[Node]) -> Vec<NodeKey> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            self.import_into(node, &mut out);
        }
        out
    }

    fn import_into(&mut self, node: &Node, out: &mut Vec<NodeKey>) {
        let data = match node {
            Node::Document { children, .. } => {
                for c in children {
                    self.import_into(c, out);
                }
                return;
            }
            Node::Element {
                name, attributes, ..
            } => NodeData::Element {
                name: name.clone(),
                attributes: attributes.clone(),
            },
            Node::Text { text } => NodeData::Text { text: text.clone() },
            Node::Comment { text } => NodeData::Comment { text: text.clone() },
        };
        let key = self.alloc(data);
        let mut kids = Vec::with_capacity(node.children().len());
        for c in node.children() {
            self.import_into(c, &mut kids);
        }
        for child in &kids {
            self.nodes[child.index()].parent = Some(key);
        }
        self.nodes[key.index()].children = kids;
        out.push(key);
    }

    fn check_attach(&self, parent: NodeKey, child: NodeKey) -> Result<(), DomError> {
        if child == Self::ROOT {
            return Err(DomError::DocumentNode);
        }
        let parent_rec = self.record(parent).ok_or(DomError::MissingNode(parent))?;
        self.record(child).ok_or(DomError::MissingNode(child))?;
        if matches!(parent_rec.data, NodeData::Text { .. } | NodeData::Comment { .. }) {
            return Err(DomError::InvalidParent(parent));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(DomError::Cycle { parent, child });
        }
        Ok(())
    }

    fn is_ancestor(&self, ancestor: NodeKey, node: NodeKey) -> bool {
        let mut current = self.parent(node);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.parent(k);
        }
        false
    }

    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), DomError> {
        self.check_attach(parent, child)?;
        self.detach(child)?;
        self.nodes[parent.index()].children.push(child);
        self.nodes[child.index()].parent = Some(parent);
        Ok(())
    }

    pub fn insert_before(
        &mut self,
        parent: NodeKey,
        child: NodeKey,
        before: NodeKey,
    ) -> Result<(), DomError> {
        self.check_attach(parent, child)?;
        if self.parent(before) != Some(parent) {
            return Err(DomError::InvalidSibling { parent, before });
        }
        self.detach(child)?;
        let siblings = &mut self.nodes[parent.index()].children;
        let pos = siblings
            .iter()
            .position(|k| *k == before)
            .ok_or(DomError::InvalidSibling { parent, before })?;
        siblings.insert(pos, child);
        self.nodes[child.index()].parent = Some(parent);
        Ok(())
    }

    pub fn insert_after(
        &mut self,
        parent: NodeKey,
        child: NodeKey,
        after: NodeKey,
    ) -> Result<(), DomError> {
        match self.next_sibling(after) {
            Some(next) if self.parent(after) == Some(parent) => {
                self.insert_before(parent, child, next)
            }
            _ if self.parent(after) == Some(parent) => self.append_child(parent, child),
            _ => Err(DomError::InvalidSibling {
                parent,
                before: after,
            }),
        }
    }

    pub fn next_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|k| *k == key)?;
        siblings.get(pos + 1).copied()
    }

    /// Unlink `key` from its parent, keeping the subtree alive.
    pub fn detach(&mut self, key: NodeKey) -> Result<(), DomError> {
        if key == Self::ROOT {
            return Err(DomError::DocumentNode);
        }
        let parent = self.record_mut(key)?.parent.take();
        if let Some(parent) = parent
            && let Some(rec) = self.nodes.get_mut(parent.index())
        {
            rec.children.retain(|k| *k != key);
        }
        Ok(())
    }

    /// Detach and tombstone the whole subtree rooted at `key`. Tombstones keep
    /// their slot so keys stay stable, but drop their payload.
    pub fn remove(&mut self, key: NodeKey) -> Result<(), DomError> {
        self.detach(key)?;
        for k in self.subtree(key) {
            let rec = &mut self.nodes[k.index()];
            rec.live = false;
            rec.data = NodeData::Comment {
                text: String::new(),
            };
            rec.children = Vec::new();
            rec.parent = None;
            self.files.remove(&k);
        }
        Ok(())
    }

    /// Lazy walk over `key` and its live descendants, in document order.
    pub fn preorder(&self, key: NodeKey) -> Preorder<'_> {
        let stack = if self.contains(key) { vec![key] } else { Vec::new() };
        Preorder { doc: self, stack }
    }

    /// Collected [`Document::preorder`], for callers that mutate while walking.
    pub fn subtree(&self, key: NodeKey) -> Vec<NodeKey> {
        self.preorder(key).collect()
    }

    pub fn descendants(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        self.preorder(key).skip(1)
    }

    pub fn ancestors(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        std::iter::successors(self.parent(key), move |k| self.parent(*k))
    }

    /// First connected element with the given `id`, in document order.
    pub fn element_by_id(&self, id: &str) -> Option<NodeKey> {
        if id.is_empty() {
            return None;
        }
        self.preorder(Self::ROOT)
            .find(|k| self.attr(*k, "id") == Some(id))
    }

    pub fn elements_by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = NodeKey> + 'a {
        self.preorder(Self::ROOT)
            .filter(move |k| self.name(*k).is_some() && self.attr(*k, "name") == Some(name))
    }

    pub fn elements_by_tag(&self, root: NodeKey, tag: &str) -> Vec<NodeKey> {
        self.preorder(root)
            .filter(|k| self.is_element(*k, tag))
            .collect()
    }

    pub fn forms(&self) -> Vec<NodeKey> {
        self.elements_by_tag(Self::ROOT, "form")
    }

    pub fn document_element(&self) -> Option<NodeKey> {
        self.element_children(Self::ROOT).find(|k| self.is_element(*k, "html"))
    }

    pub fn head(&self) -> Option<NodeKey> {
        let html = self.document_element()?;
        self.element_children(html).find(|k| self.is_element(*k, "head"))
    }

    pub fn body(&self) -> Option<NodeKey> {
        let html = self.document_element()?;
        self.element_children(html).find(|k| self.is_element(*k, "body"))
    }

    /// Count of live nodes, including detached ones and the document node.
    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|r| r.live).count()
    }

    pub fn set_files(&mut self, key: NodeKey, files: Vec<FilePart>) -> Result<(), DomError> {
        if self.name(key).is_none() {
            return Err(DomError::NotAnElement(key));
        }
        self.files.insert(key, files);
        Ok(())
    }

    pub fn files(&self, key: NodeKey) -> &[FilePart] {
        match self.files.get(&key) {
            Some(files) => files.as_slice(),
            None => &[],
        }
    }

    /// Rebuild a detached markup tree from the live subtree at `key`.
    pub fn materialize(&self, key: NodeKey) -> Option<Node> {
        let children = self
            .children(key)
            .iter()
            .filter_map(|c| self.materialize(*c))
            .collect();
        Some(match self.data(key)? {
            NodeData::Document { doctype } => Node::Document {
                doctype: doctype.clone(),
                children,
            },
            NodeData::Element { name, attributes } => Node::Element {
                name: name.clone(),
                attributes: attributes.clone(),
                children,
            },
            NodeData::Text { text } => Node::Text { text: text.clone() },
            NodeData::Comment { text } => Node::Comment { text: text.clone() },
        })
    }
}
