//! Arena-based XML document tree.
//!
//! All nodes of a document live in a contiguous `Vec<NodeData>` owned by the
//! [`Document`] and are referenced by [`NodeId`], a newtype over
//! `NonZeroU32`. Nodes are created unparented through validating
//! constructors (`new_element`, `new_comment`, ...) and then attached with
//! the operations in [`mutation`](self#mutation). A node that is detached
//! stays in the arena until the document is dropped.
//!
//! The document node always has exactly one root element. A fresh document
//! is created with one, and it can only be swapped for another element,
//! never removed.

mod equality;
mod mutation;
mod node;
mod nodes;

pub use node::{AttributeType, NodeKind};
pub use nodes::Nodes;

use std::num::NonZeroU32;

use crate::error::{ErrorKind, XmlError};
use crate::util::qname::{join_qname, split_qname};
use crate::verifier::{self, XML_NAMESPACE};

/// A typed index into a document's node arena.
///
/// `Option<NodeId>` has the same size as `NodeId` thanks to the `NonZeroU32`
/// niche.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    /// Creates a `NodeId` from a raw arena index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is 0 or does not fit in a `u32`.
    #[allow(clippy::expect_used)]
    fn from_index(index: usize) -> Self {
        let raw = u32::try_from(index).expect("node arena exceeds u32::MAX entries");
        Self(NonZeroU32::new(raw).expect("NodeId index must be non-zero"))
    }

    /// Returns the raw index for indexing into the arena.
    fn as_index(self) -> usize {
        self.0.get() as usize
    }
}

/// Storage for a single node in the document arena.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// What kind of node this is and its payload.
    pub kind: NodeKind,
    /// The parent node. For attributes this is the owning element.
    pub parent: Option<NodeId>,
    /// Child nodes in document order. Always empty for leaf kinds.
    pub children: Vec<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Iterator over the children of a node.
pub type Children<'a> = std::iter::Copied<std::slice::Iter<'a, NodeId>>;

/// An XML document and the arena owning all of its nodes.
///
/// # Examples
///
/// ```
/// use xmlom::Document;
///
/// let mut doc = Document::new("greeting").unwrap();
/// let root = doc.root_element();
/// let text = doc.new_text("Hello");
/// doc.append_child(root, text).unwrap();
/// assert_eq!(doc.value(root), "Hello");
/// assert_eq!(doc.to_xml(root), "<greeting>Hello</greeting>");
/// ```
#[derive(Debug, Clone)]
pub struct Document {
    /// The node arena. Index 0 is an unused placeholder for `NonZeroU32`.
    nodes: Vec<NodeData>,
    /// The document node.
    root: NodeId,
    /// The current root element, always a child of `root`.
    root_element: NodeId,
    /// The URI the document was loaded from, if known.
    base_uri: Option<String>,
}

impl Document {
    /// Creates a document whose root element is named `root_name` and is in
    /// no namespace.
    ///
    /// # Errors
    ///
    /// Returns the [`new_element`](Self::new_element) error for an illegal name.
    pub fn new(root_name: &str) -> Result<Self, XmlError> {
        Self::new_ns(root_name, "")
    }

    /// Creates a document whose root element has the given qualified name
    /// and namespace URI.
    ///
    /// # Errors
    ///
    /// Returns the [`new_element_ns`](Self::new_element_ns) error for an
    /// illegal name or namespace.
    pub fn new_ns(root_name: &str, namespace: &str) -> Result<Self, XmlError> {
        let (prefix, local_name) = element_parts(root_name, namespace)?;
        Ok(Self::with_root(NodeKind::Element {
            local_name,
            prefix,
            namespace: namespace.to_string(),
            attributes: Vec::new(),
            namespace_declarations: Vec::new(),
        }))
    }

    /// Creates a document whose root element is a stand-in, meant to be
    /// replaced with [`set_root_element`](Self::set_root_element) once the
    /// real root is known. Builders start from this.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::with_root(NodeKind::Element {
            local_name: "root".to_string(),
            prefix: None,
            namespace: String::new(),
            attributes: Vec::new(),
            namespace_declarations: Vec::new(),
        })
    }

    fn with_root(element: NodeKind) -> Self {
        let mut nodes = Vec::with_capacity(64);
        // Index 0: placeholder (NodeId uses NonZeroU32)
        nodes.push(NodeData::new(NodeKind::Document));
        nodes.push(NodeData::new(NodeKind::Document));
        nodes.push(NodeData::new(element));
        let root = NodeId::from_index(1);
        let root_element = NodeId::from_index(2);
        nodes[1].children.push(root_element);
        nodes[2].parent = Some(root);
        Self {
            nodes,
            root,
            root_element,
            base_uri: None,
        }
    }

    // --- Construction ---

    fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let index = self.nodes.len();
        self.nodes.push(NodeData::new(kind));
        NodeId::from_index(index)
    }

    /// Creates an unparented element in no namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IllegalName`] if `name` is not a legal qualified
    /// name, or [`ErrorKind::Namespace`] if it has a prefix (a prefixed
    /// element needs a namespace URI; use [`new_element_ns`](Self::new_element_ns)).
    pub fn new_element(&mut self, name: &str) -> Result<NodeId, XmlError> {
        self.new_element_ns(name, "")
    }

    /// Creates an unparented element with a qualified name and namespace URI.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IllegalName`] for an illegal qualified name and
    /// [`ErrorKind::Namespace`] for an illegal prefix binding.
    pub fn new_element_ns(&mut self, name: &str, namespace: &str) -> Result<NodeId, XmlError> {
        let (prefix, local_name) = element_parts(name, namespace)?;
        Ok(self.create_node(NodeKind::Element {
            local_name,
            prefix,
            namespace: namespace.to_string(),
            attributes: Vec::new(),
            namespace_declarations: Vec::new(),
        }))
    }

    /// Creates an unparented attribute in no namespace.
    ///
    /// # Errors
    ///
    /// See [`new_attribute_ns`](Self::new_attribute_ns).
    pub fn new_attribute(&mut self, name: &str, value: &str) -> Result<NodeId, XmlError> {
        self.new_attribute_ns(name, "", value, AttributeType::Undeclared)
    }

    /// Creates an unparented attribute.
    ///
    /// An attribute with the `xml` prefix and an empty namespace URI is put in
    /// the XML namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IllegalName`] for an illegal qualified name or for
    /// `xmlns` (namespace declarations are not attributes), and
    /// [`ErrorKind::Namespace`] when a prefixed attribute has no namespace or
    /// an unprefixed one has a namespace.
    pub fn new_attribute_ns(
        &mut self,
        name: &str,
        namespace: &str,
        value: &str,
        attribute_type: AttributeType,
    ) -> Result<NodeId, XmlError> {
        let (prefix, local_name, namespace) = attribute_parts(name, namespace)?;
        verifier::check_text(value)?;
        Ok(self.create_node(NodeKind::Attribute {
            local_name,
            prefix,
            namespace,
            value: value.to_string(),
            attribute_type,
        }))
    }

    /// Creates an unparented text node.
    pub fn new_text(&mut self, content: &str) -> NodeId {
        self.create_node(NodeKind::Text {
            content: content.to_string(),
            cdata: false,
        })
    }

    /// Creates an unparented text node that prefers to be written as a CDATA
    /// section.
    pub fn new_cdata(&mut self, content: &str) -> NodeId {
        self.create_node(NodeKind::Text {
            content: content.to_string(),
            cdata: true,
        })
    }

    /// Creates an unparented comment.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IllegalData`] if `data` is not legal comment data.
    pub fn new_comment(&mut self, data: &str) -> Result<NodeId, XmlError> {
        verifier::check_comment_data(data)?;
        Ok(self.create_node(NodeKind::Comment {
            content: data.to_string(),
        }))
    }

    /// Creates an unparented processing instruction.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IllegalTarget`] for a bad target and
    /// [`ErrorKind::IllegalData`] for bad data.
    pub fn new_processing_instruction(
        &mut self,
        target: &str,
        data: &str,
    ) -> Result<NodeId, XmlError> {
        verifier::check_pi_target(target)?;
        verifier::check_pi_data(data)?;
        Ok(self.create_node(NodeKind::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        }))
    }

    /// Creates an unparented document type declaration.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IllegalName`] for a bad root name,
    /// [`ErrorKind::IllegalData`] for bad identifiers, and
    /// [`ErrorKind::Wellformedness`] for a public identifier without a system
    /// identifier.
    pub fn new_doc_type(
        &mut self,
        root_name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<NodeId, XmlError> {
        verifier::check_qname(root_name)?;
        check_doc_type_ids(public_id, system_id)?;
        Ok(self.create_node(NodeKind::DocType {
            root_name: root_name.to_string(),
            public_id: public_id.map(str::to_string),
            system_id: system_id.map(str::to_string),
            internal_subset: None,
        }))
    }

    // --- Access ---

    /// Returns the document node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the root element.
    #[must_use]
    pub fn root_element(&self) -> NodeId {
        self.root_element
    }

    /// Returns the URI the document was loaded from, if known.
    #[must_use]
    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    /// Sets the URI the document was loaded from.
    pub fn set_base_uri(&mut self, uri: Option<&str>) {
        self.base_uri = uri.map(str::to_string);
    }

    /// Returns the storage of a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not created by this document.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.as_index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.as_index()]
    }

    /// Returns the kind and payload of a node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    /// Returns the number of nodes in the arena, attached or not.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    // --- Navigation ---

    /// Returns the parent of a node. The parent of an attribute is its element.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Returns the number of children. Leaf nodes have none.
    #[must_use]
    pub fn child_count(&self, id: NodeId) -> usize {
        self.node(id).children.len()
    }

    /// Returns the child at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IndexOutOfBounds`] if `index >= child_count(id)`;
    /// for leaf nodes this is every index.
    pub fn child(&self, id: NodeId, index: usize) -> Result<NodeId, XmlError> {
        let children = &self.node(id).children;
        children
            .get(index)
            .copied()
            .ok_or_else(|| XmlError::index_out_of_bounds(index, children.len()))
    }

    /// Returns an iterator over the children of a node.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        self.node(id).children.iter().copied()
    }

    /// Returns the position of `child` among the children of `parent`.
    #[must_use]
    pub fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.node(parent).children.iter().position(|&c| c == child)
    }

    /// Returns an iterator over a node and its ancestors, walking up.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: Some(id),
        }
    }

    /// Returns an iterator over the descendants of a node in document order,
    /// excluding the node itself. Attributes are not visited.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.node(id).children.clone();
        stack.reverse();
        Descendants { doc: self, stack }
    }

    /// Returns `true` if `ancestor` is `id` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    // --- Names and values ---

    /// Returns the local name of an element or attribute.
    #[must_use]
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Element { local_name, .. } | NodeKind::Attribute { local_name, .. } => {
                Some(local_name)
            }
            _ => None,
        }
    }

    /// Returns the namespace prefix of an element or attribute, if any.
    #[must_use]
    pub fn prefix(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Element { prefix, .. } | NodeKind::Attribute { prefix, .. } => {
                prefix.as_deref()
            }
            _ => None,
        }
    }

    /// Returns the namespace URI of an element or attribute (empty for none).
    #[must_use]
    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Element { namespace, .. } | NodeKind::Attribute { namespace, .. } => {
                Some(namespace)
            }
            _ => None,
        }
    }

    /// Returns the qualified name of an element or attribute, the target of a
    /// processing instruction, or the root name of a doctype.
    #[must_use]
    pub fn qualified_name(&self, id: NodeId) -> Option<String> {
        match self.kind(id) {
            NodeKind::Element {
                local_name, prefix, ..
            }
            | NodeKind::Attribute {
                local_name, prefix, ..
            } => Some(join_qname(prefix.as_deref(), local_name)),
            NodeKind::ProcessingInstruction { target, .. } => Some(target.clone()),
            NodeKind::DocType { root_name, .. } => Some(root_name.clone()),
            _ => None,
        }
    }

    /// Returns the stored string of a text, comment, processing instruction
    /// (its data) or attribute node.
    #[must_use]
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Text { content, .. } | NodeKind::Comment { content } => Some(content),
            NodeKind::ProcessingInstruction { data, .. } => Some(data),
            NodeKind::Attribute { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Returns `true` for a text node that prefers CDATA output.
    #[must_use]
    pub fn is_cdata(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Text { cdata: true, .. })
    }

    /// Returns the string value of a node.
    ///
    /// Elements yield the concatenation of all descendant text, the document
    /// yields its root element's value, doctypes yield the empty string, and
    /// other nodes yield their stored string.
    #[must_use]
    pub fn value(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Document => self.value(self.root_element),
            NodeKind::Element { .. } => {
                let mut result = String::new();
                for d in self.descendants(id) {
                    if let NodeKind::Text { content, .. } = self.kind(d) {
                        result.push_str(content);
                    }
                }
                result
            }
            NodeKind::DocType { .. } => String::new(),
            _ => self.text(id).unwrap_or_default().to_string(),
        }
    }

    /// Returns the document type declaration, if the document has one.
    #[must_use]
    pub fn doc_type(&self) -> Option<NodeId> {
        self.children(self.root)
            .find(|&c| matches!(self.kind(c), NodeKind::DocType { .. }))
    }

    // --- Attributes ---

    /// Returns the attribute nodes of an element (empty for other kinds).
    #[must_use]
    pub fn attributes(&self, element: NodeId) -> &[NodeId] {
        match self.kind(element) {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Returns the number of attributes of an element.
    #[must_use]
    pub fn attribute_count(&self, element: NodeId) -> usize {
        self.attributes(element).len()
    }

    /// Returns the attribute at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IndexOutOfBounds`] if `index >= attribute_count`.
    pub fn attribute_at(&self, element: NodeId, index: usize) -> Result<NodeId, XmlError> {
        let attributes = self.attributes(element);
        attributes
            .get(index)
            .copied()
            .ok_or_else(|| XmlError::index_out_of_bounds(index, attributes.len()))
    }

    /// Finds an attribute by local name and namespace URI.
    #[must_use]
    pub fn attribute(&self, element: NodeId, local_name: &str, namespace: &str) -> Option<NodeId> {
        self.attributes(element).iter().copied().find(|&a| {
            matches!(self.kind(a), NodeKind::Attribute { local_name: l, namespace: n, .. }
                if l == local_name && n == namespace)
        })
    }

    /// Returns the value of the no-namespace attribute `local_name`.
    #[must_use]
    pub fn attribute_value(&self, element: NodeId, local_name: &str) -> Option<&str> {
        self.attribute(element, local_name, "")
            .and_then(|a| self.text(a))
    }

    /// Returns the additional namespace declarations of an element.
    #[must_use]
    pub fn namespace_declarations(&self, element: NodeId) -> &[(String, String)] {
        match self.kind(element) {
            NodeKind::Element {
                namespace_declarations,
                ..
            } => namespace_declarations,
            _ => &[],
        }
    }

    /// Resolves `prefix` (`""` for the default namespace) in the scope of
    /// `element`: its own name, its attributes, its declarations, then its
    /// ancestors.
    #[must_use]
    pub fn lookup_namespace(&self, element: NodeId, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        for id in self.ancestors(element) {
            let NodeKind::Element {
                prefix: own_prefix,
                namespace,
                attributes,
                namespace_declarations,
                ..
            } = self.kind(id)
            else {
                continue;
            };
            if own_prefix.as_deref().unwrap_or("") == prefix {
                return Some(namespace);
            }
            for &a in attributes {
                if let NodeKind::Attribute {
                    prefix: Some(p),
                    namespace,
                    ..
                } = self.kind(a)
                {
                    if p == prefix {
                        return Some(namespace);
                    }
                }
            }
            if let Some((_, uri)) = namespace_declarations.iter().find(|(p, _)| p == prefix) {
                return Some(uri);
            }
        }
        if prefix.is_empty() {
            Some("")
        } else {
            None
        }
    }

    // --- Serialization ---

    /// Returns the XML form of a node without an XML declaration.
    ///
    /// See [`crate::serial::to_xml`].
    #[must_use]
    pub fn to_xml(&self, id: NodeId) -> String {
        crate::serial::to_xml(self, id)
    }
}

/// Splits and validates an element name against its namespace.
fn element_parts(name: &str, namespace: &str) -> Result<(Option<String>, String), XmlError> {
    verifier::check_qname(name)?;
    let (prefix, local) = split_qname(name);
    verifier::check_namespace_binding(prefix.unwrap_or(""), namespace)?;
    Ok((prefix.map(str::to_string), local.to_string()))
}

/// Splits and validates an attribute name against its namespace, returning
/// the effective namespace.
fn attribute_parts(
    name: &str,
    namespace: &str,
) -> Result<(Option<String>, String, String), XmlError> {
    verifier::check_qname(name)?;
    let (prefix, local) = split_qname(name);
    if name == "xmlns" || prefix == Some("xmlns") {
        return Err(XmlError::illegal_name(
            "namespace declarations are not attributes",
            name,
        ));
    }
    match prefix {
        Some("xml") if namespace.is_empty() => Ok((
            Some("xml".to_string()),
            local.to_string(),
            XML_NAMESPACE.to_string(),
        )),
        Some(p) => {
            verifier::check_namespace_binding(p, namespace)?;
            Ok((Some(p.to_string()), local.to_string(), namespace.to_string()))
        }
        None if !namespace.is_empty() => Err(XmlError::new(
            ErrorKind::Namespace,
            "unprefixed attributes cannot be in a namespace",
        )
        .with_data(name)),
        None => Ok((None, local.to_string(), String::new())),
    }
}

fn check_doc_type_ids(public_id: Option<&str>, system_id: Option<&str>) -> Result<(), XmlError> {
    if let Some(id) = public_id {
        verifier::check_public_id(id)?;
        if system_id.is_none() {
            return Err(XmlError::new(
                ErrorKind::Wellformedness,
                "a public identifier requires a system identifier",
            )
            .with_data(id));
        }
    }
    if let Some(id) = system_id {
        verifier::check_system_id(id)?;
    }
    Ok(())
}

impl Default for Document {
    fn default() -> Self {
        Self::placeholder()
    }
}

// --- Iterators ---

/// Iterator over a node and its ancestors.
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).parent;
        Some(current)
    }
}

/// Depth-first iterator over the descendants of a node.
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.stack.pop()?;
        self.stack
            .extend(self.doc.node(current).children.iter().rev().copied());
        Some(current)
    }
}
