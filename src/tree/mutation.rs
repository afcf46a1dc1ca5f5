//! Tree mutation: attaching, detaching and editing nodes.
//!
//! Every operation validates first and commits only when all checks pass, so
//! a failed call leaves the document exactly as it was.

use super::{Document, NodeId, NodeKind};
use crate::error::{ErrorKind, XmlError};
use crate::util::qname::join_qname;
use crate::verifier;

impl Document {
    // --- Children ---

    /// Appends `child` as the last child of `parent`.
    ///
    /// # Errors
    ///
    /// See [`insert_child`](Self::insert_child).
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), XmlError> {
        let index = self.child_count(parent);
        self.insert_child(parent, child, index)
    }

    /// Inserts `child` at `index` among the children of `parent`.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::IllegalAdd`] if `child` is a document or attribute, if
    ///   `parent` cannot have children, or if the document's structure would
    ///   break (a second root element, text under the document, a second
    ///   doctype, or a doctype after the root element).
    /// - [`ErrorKind::MultipleParents`] if `child` already has a parent.
    /// - [`ErrorKind::Cycle`] if `child` is `parent` or one of its ancestors.
    /// - [`ErrorKind::IndexOutOfBounds`] if `index > child_count(parent)`.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: usize,
    ) -> Result<(), XmlError> {
        self.add_structure_check(parent, child)?;
        let count = self.child_count(parent);
        if index > count {
            return Err(XmlError::index_out_of_bounds(index, count));
        }
        if parent == self.root {
            self.document_position_check(child, index, None)?;
        }
        self.node_mut(parent).children.insert(index, child);
        self.node_mut(child).parent = Some(parent);
        Ok(())
    }

    /// Removes and returns the child of `parent` at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IndexOutOfBounds`] for a bad index and
    /// [`ErrorKind::Wellformedness`] for the root element.
    pub fn remove_child(&mut self, parent: NodeId, index: usize) -> Result<NodeId, XmlError> {
        let child = self.child(parent, index)?;
        if child == self.root_element {
            return Err(cannot_remove_root());
        }
        self.node_mut(parent).children.remove(index);
        self.node_mut(child).parent = None;
        Ok(child)
    }

    /// Detaches a node from its parent. Detaching an attribute removes it from
    /// its element. Detaching an unparented node does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Wellformedness`] for the root element.
    pub fn detach(&mut self, id: NodeId) -> Result<(), XmlError> {
        let Some(parent) = self.parent(id) else {
            return Ok(());
        };
        if id == self.root_element {
            return Err(cannot_remove_root());
        }
        if matches!(self.kind(id), NodeKind::Attribute { .. }) {
            if let NodeKind::Element { attributes, .. } = &mut self.node_mut(parent).kind {
                attributes.retain(|&a| a != id);
            }
        } else {
            self.node_mut(parent).children.retain(|&c| c != id);
        }
        self.node_mut(id).parent = None;
        Ok(())
    }

    /// Replaces the child `old` of `parent` with `new`, in place.
    ///
    /// Under the document node the root element may be replaced with another
    /// element, and the doctype with another doctype.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NoSuchChild`] if `old` is not a child of `parent`,
    /// and the [`insert_child`](Self::insert_child) errors for `new`.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        old: NodeId,
        new: NodeId,
    ) -> Result<(), XmlError> {
        if old == new {
            return Ok(());
        }
        let index = self.index_of(parent, old).ok_or_else(|| {
            XmlError::new(
                ErrorKind::NoSuchChild,
                format!("the {} is not a child of its supposed parent", self.kind(old).type_name()),
            )
        })?;
        self.add_structure_check(parent, new)?;
        if parent == self.root {
            self.document_position_check(new, index, Some(old))?;
        }
        self.node_mut(parent).children[index] = new;
        self.node_mut(new).parent = Some(parent);
        self.node_mut(old).parent = None;
        if old == self.root_element {
            self.root_element = new;
        }
        Ok(())
    }

    /// Replaces the root element of the document.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IllegalAdd`] if `element` is not an element,
    /// [`ErrorKind::MultipleParents`] if it already has a parent.
    pub fn set_root_element(&mut self, element: NodeId) -> Result<(), XmlError> {
        let (root, old) = (self.root, self.root_element);
        self.replace_child(root, old, element)
    }

    /// Checks the rules shared by every operation that gives `child` the
    /// parent `parent`.
    fn add_structure_check(&self, parent: NodeId, child: NodeId) -> Result<(), XmlError> {
        let child_kind = self.kind(child);
        match child_kind {
            NodeKind::Document => {
                return Err(XmlError::illegal_add("a document cannot be a child"));
            }
            NodeKind::Attribute { .. } => {
                return Err(XmlError::illegal_add(
                    "attributes are not children; use add_attribute",
                ));
            }
            _ => {}
        }
        let parent_kind = self.kind(parent);
        if parent_kind.is_leaf() {
            return Err(XmlError::illegal_add(format!(
                "a {} cannot have children",
                parent_kind.type_name()
            )));
        }
        if self.parent(child).is_some() {
            return Err(XmlError::new(
                ErrorKind::MultipleParents,
                format!("the {} already has a parent; detach it first", child_kind.type_name()),
            ));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(XmlError::new(
                ErrorKind::Cycle,
                "cannot add a node to itself or to one of its descendants",
            ));
        }
        Ok(())
    }

    /// Checks that `child` may sit at `index` among the document's children,
    /// optionally in place of `replacing`.
    fn document_position_check(
        &self,
        child: NodeId,
        index: usize,
        replacing: Option<NodeId>,
    ) -> Result<(), XmlError> {
        let replacing_root = replacing == Some(self.root_element);
        match self.kind(child) {
            NodeKind::Element { .. } if replacing_root => Ok(()),
            NodeKind::Element { .. } => Err(XmlError::illegal_add(
                "a document has exactly one root element; use set_root_element",
            )),
            NodeKind::Text { .. } => Err(XmlError::illegal_add(
                "text cannot be a child of a document",
            )),
            _ if replacing_root => Err(XmlError::illegal_add(
                "the root element can only be replaced by an element",
            )),
            NodeKind::DocType { .. } => {
                if let Some(existing) = self.doc_type() {
                    if Some(existing) != replacing {
                        return Err(XmlError::illegal_add("a document has at most one doctype"));
                    }
                }
                let root_index = self.index_of(self.root, self.root_element).unwrap_or(0);
                if index > root_index {
                    return Err(XmlError::illegal_add(
                        "the doctype must precede the root element",
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // --- Values ---

    /// Sets the value of a text, comment, processing instruction (its data)
    /// or attribute node.
    ///
    /// # Errors
    ///
    /// Returns the validator's error if `value` is not legal for the node; the
    /// previous value is kept. Returns [`ErrorKind::IllegalAdd`] for elements,
    /// documents and doctypes, whose values derive from their content.
    pub fn set_value(&mut self, id: NodeId, value: &str) -> Result<(), XmlError> {
        match &self.kind(id) {
            NodeKind::Text { .. } | NodeKind::Attribute { .. } => verifier::check_text(value)?,
            NodeKind::Comment { .. } => verifier::check_comment_data(value)?,
            NodeKind::ProcessingInstruction { .. } => verifier::check_pi_data(value)?,
            other => {
                return Err(XmlError::illegal_add(format!(
                    "the value of a {} cannot be set directly",
                    other.type_name()
                )));
            }
        }
        match &mut self.node_mut(id).kind {
            NodeKind::Text { content, .. } | NodeKind::Comment { content } => {
                *content = value.to_string();
            }
            NodeKind::ProcessingInstruction { data, .. } => *data = value.to_string(),
            NodeKind::Attribute { value: v, .. } => *v = value.to_string(),
            _ => {}
        }
        Ok(())
    }

    /// Sets the target of a processing instruction.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IllegalTarget`] for a bad target and
    /// [`ErrorKind::IllegalAdd`] if `id` is not a processing instruction.
    pub fn set_target(&mut self, id: NodeId, target: &str) -> Result<(), XmlError> {
        verifier::check_pi_target(target)?;
        match &mut self.node_mut(id).kind {
            NodeKind::ProcessingInstruction { target: t, .. } => {
                *t = target.to_string();
                Ok(())
            }
            other => Err(not_a(other, "processing instruction")),
        }
    }

    /// Sets the local name of an element or attribute.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IllegalName`] if `name` is not an `NCName`, or if
    /// an attribute would be renamed to `xmlns`.
    pub fn set_local_name(&mut self, id: NodeId, name: &str) -> Result<(), XmlError> {
        verifier::check_ncname(name)?;
        let is_unprefixed_attribute = matches!(
            self.kind(id),
            NodeKind::Attribute { prefix: None, .. }
        );
        if is_unprefixed_attribute && name == "xmlns" {
            return Err(XmlError::illegal_name(
                "namespace declarations are not attributes",
                name,
            ));
        }
        if let NodeKind::Attribute {
            namespace, ..
        } = self.kind(id)
        {
            let namespace = namespace.clone();
            if let Some(element) = self.parent(id) {
                if let Some(other) = self.attribute(element, name, &namespace) {
                    if other != id {
                        return Err(XmlError::new(
                            ErrorKind::IllegalAdd,
                            format!("the element already has an attribute named {name:?}"),
                        ));
                    }
                }
            }
        }
        match &mut self.node_mut(id).kind {
            NodeKind::Element { local_name, .. } | NodeKind::Attribute { local_name, .. } => {
                *local_name = name.to_string();
                Ok(())
            }
            other => Err(not_a(other, "element or attribute")),
        }
    }

    /// Moves an element into a namespace, with an optional prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Namespace`] if the binding is illegal or if the
    /// prefix is already bound to a different URI by one of the element's
    /// attributes or declarations.
    pub fn set_namespace(
        &mut self,
        element: NodeId,
        prefix: Option<&str>,
        namespace: &str,
    ) -> Result<(), XmlError> {
        let NodeKind::Element { .. } = self.kind(element) else {
            return Err(not_a(self.kind(element), "element"));
        };
        if let Some(p) = prefix {
            verifier::check_ncname(p)?;
        }
        let p = prefix.unwrap_or("");
        verifier::check_namespace_binding(p, namespace)?;
        if !p.is_empty() {
            self.check_prefix_free(element, p, namespace, false)?;
        }
        if let NodeKind::Element {
            prefix: own_prefix,
            namespace: own_namespace,
            namespace_declarations,
            ..
        } = &mut self.node_mut(element).kind
        {
            *own_prefix = prefix.map(str::to_string);
            *own_namespace = namespace.to_string();
            namespace_declarations.retain(|(dp, _)| dp != p);
        }
        Ok(())
    }

    /// Sets the public identifier of a doctype.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IllegalData`] for an illegal identifier and
    /// [`ErrorKind::Wellformedness`] when setting a public identifier on a
    /// doctype without a system identifier.
    pub fn set_public_id(&mut self, id: NodeId, public_id: Option<&str>) -> Result<(), XmlError> {
        let NodeKind::DocType { system_id, .. } = self.kind(id) else {
            return Err(not_a(self.kind(id), "doctype"));
        };
        super::check_doc_type_ids(public_id, system_id.clone().as_deref())?;
        if let NodeKind::DocType { public_id: p, .. } = &mut self.node_mut(id).kind {
            *p = public_id.map(str::to_string);
        }
        Ok(())
    }

    /// Sets the system identifier of a doctype.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IllegalData`] for an illegal identifier and
    /// [`ErrorKind::Wellformedness`] when removing the system identifier of a
    /// doctype that has a public identifier.
    pub fn set_system_id(&mut self, id: NodeId, system_id: Option<&str>) -> Result<(), XmlError> {
        let NodeKind::DocType { public_id, .. } = self.kind(id) else {
            return Err(not_a(self.kind(id), "doctype"));
        };
        super::check_doc_type_ids(public_id.clone().as_deref(), system_id)?;
        if let NodeKind::DocType { system_id: s, .. } = &mut self.node_mut(id).kind {
            *s = system_id.map(str::to_string);
        }
        Ok(())
    }

    /// Sets or clears the CDATA preference of a text node. Other kinds are
    /// left alone.
    pub fn set_cdata(&mut self, id: NodeId, prefer_cdata: bool) {
        if let NodeKind::Text { cdata, .. } = &mut self.node_mut(id).kind {
            *cdata = prefer_cdata;
        }
    }

    /// Stores the raw internal subset of a doctype.
    pub(crate) fn set_internal_subset(&mut self, id: NodeId, subset: Option<&str>) {
        if let NodeKind::DocType {
            internal_subset, ..
        } = &mut self.node_mut(id).kind
        {
            *internal_subset = subset.map(str::to_string);
        }
    }

    // --- Attributes and namespaces ---

    /// Adds an attribute to an element. An existing attribute with the same
    /// local name and namespace URI is detached and returned.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::IllegalAdd`] if `element` is not an element or
    ///   `attribute` is not an attribute.
    /// - [`ErrorKind::MultipleParents`] if the attribute belongs to another
    ///   element.
    /// - [`ErrorKind::Namespace`] if the attribute's prefix is bound to a
    ///   different URI on the element.
    pub fn add_attribute(
        &mut self,
        element: NodeId,
        attribute: NodeId,
    ) -> Result<Option<NodeId>, XmlError> {
        if !matches!(self.kind(element), NodeKind::Element { .. }) {
            return Err(not_a(self.kind(element), "element"));
        }
        let NodeKind::Attribute {
            local_name,
            prefix,
            namespace,
            ..
        } = self.kind(attribute)
        else {
            return Err(not_a(self.kind(attribute), "attribute"));
        };
        match self.parent(attribute) {
            Some(owner) if owner == element => return Ok(None),
            Some(_) => {
                return Err(XmlError::new(
                    ErrorKind::MultipleParents,
                    format!(
                        "attribute {} already belongs to another element",
                        join_qname(prefix.as_deref(), local_name)
                    ),
                ));
            }
            None => {}
        }
        let (local_name, namespace) = (local_name.clone(), namespace.clone());
        let replaced = self.attribute(element, &local_name, &namespace);
        if let Some(p) = prefix.clone() {
            self.check_prefix_free_except(element, &p, &namespace, replaced)?;
        }
        if let NodeKind::Element { attributes, .. } = &mut self.node_mut(element).kind {
            match replaced.and_then(|old| attributes.iter().position(|&a| a == old)) {
                Some(i) => attributes[i] = attribute,
                None => attributes.push(attribute),
            }
        }
        self.node_mut(attribute).parent = Some(element);
        if let Some(old) = replaced {
            self.node_mut(old).parent = None;
        }
        Ok(replaced)
    }

    /// Removes an attribute from an element.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NoSuchChild`] if the attribute is not on `element`.
    pub fn remove_attribute(&mut self, element: NodeId, attribute: NodeId) -> Result<(), XmlError> {
        if !self.attributes(element).contains(&attribute) {
            return Err(XmlError::new(
                ErrorKind::NoSuchChild,
                "the attribute does not belong to this element",
            ));
        }
        self.detach(attribute)
    }

    /// Declares `prefix` (`""` for the default namespace) as bound to `uri` on
    /// `element`. Re-declaring a prefix replaces the earlier declaration.
    /// Declarations the element's own name already implies are not stored.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Namespace`] for an illegal binding, or when the
    /// element's name or one of its attributes binds `prefix` differently.
    pub fn add_namespace_declaration(
        &mut self,
        element: NodeId,
        prefix: &str,
        uri: &str,
    ) -> Result<(), XmlError> {
        if !prefix.is_empty() {
            verifier::check_ncname(prefix)?;
        }
        verifier::check_namespace_binding(prefix, uri)?;
        if prefix == "xml" {
            return Ok(());
        }
        let NodeKind::Element {
            prefix: own_prefix,
            namespace,
            ..
        } = self.kind(element)
        else {
            return Err(not_a(self.kind(element), "element"));
        };
        if own_prefix.as_deref().unwrap_or("") == prefix {
            if namespace == uri {
                return Ok(());
            }
            return Err(namespace_conflict(prefix));
        }
        self.check_prefix_free(element, prefix, uri, true)?;
        if let NodeKind::Element {
            namespace_declarations,
            ..
        } = &mut self.node_mut(element).kind
        {
            match namespace_declarations.iter_mut().find(|(p, _)| p == prefix) {
                Some(entry) => entry.1 = uri.to_string(),
                None => namespace_declarations.push((prefix.to_string(), uri.to_string())),
            }
        }
        Ok(())
    }

    /// Removes the additional declaration of `prefix` from `element`.
    pub fn remove_namespace_declaration(&mut self, element: NodeId, prefix: &str) {
        if let NodeKind::Element {
            namespace_declarations,
            ..
        } = &mut self.node_mut(element).kind
        {
            namespace_declarations.retain(|(p, _)| p != prefix);
        }
    }

    fn check_prefix_free(
        &self,
        element: NodeId,
        prefix: &str,
        uri: &str,
        skip_declarations: bool,
    ) -> Result<(), XmlError> {
        for &a in self.attributes(element) {
            if let NodeKind::Attribute {
                prefix: Some(p),
                namespace,
                ..
            } = self.kind(a)
            {
                if p == prefix && namespace != uri {
                    return Err(namespace_conflict(prefix));
                }
            }
        }
        if !skip_declarations
            && self
                .namespace_declarations(element)
                .iter()
                .any(|(p, u)| p == prefix && u != uri)
        {
            return Err(namespace_conflict(prefix));
        }
        Ok(())
    }

    /// Like `check_prefix_free`, but also checks the element's own prefix and
    /// ignores the attribute about to be replaced.
    fn check_prefix_free_except(
        &self,
        element: NodeId,
        prefix: &str,
        uri: &str,
        replaced: Option<NodeId>,
    ) -> Result<(), XmlError> {
        if let NodeKind::Element {
            prefix: Some(own),
            namespace,
            ..
        } = self.kind(element)
        {
            if own == prefix && namespace != uri {
                return Err(namespace_conflict(prefix));
            }
        }
        if self
            .namespace_declarations(element)
            .iter()
            .any(|(p, u)| p == prefix && u != uri)
        {
            return Err(namespace_conflict(prefix));
        }
        for &a in self.attributes(element) {
            if Some(a) == replaced {
                continue;
            }
            if let NodeKind::Attribute {
                prefix: Some(p),
                namespace,
                ..
            } = self.kind(a)
            {
                if p == prefix && namespace != uri {
                    return Err(namespace_conflict(prefix));
                }
            }
        }
        Ok(())
    }

    // --- Copying ---

    /// Makes an unparented deep copy of a node in this document. The copy is
    /// structurally equal to the original and shares nothing with it.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IllegalAdd`] for the document node; copy a whole
    /// document with [`Clone`].
    pub fn copy(&mut self, id: NodeId) -> Result<NodeId, XmlError> {
        if matches!(self.kind(id), NodeKind::Document) {
            return Err(XmlError::illegal_add(
                "the document node cannot be copied into itself; clone the document instead",
            ));
        }
        Ok(self.copy_node(id))
    }

    fn copy_node(&mut self, id: NodeId) -> NodeId {
        let mut kind = self.kind(id).clone();
        let original_attributes = match &mut kind {
            NodeKind::Element { attributes, .. } => std::mem::take(attributes),
            _ => Vec::new(),
        };
        let copy = self.create_node(kind);
        for a in original_attributes {
            let attribute_kind = self.kind(a).clone();
            let attribute = self.create_node(attribute_kind);
            self.node_mut(attribute).parent = Some(copy);
            if let NodeKind::Element { attributes, .. } = &mut self.node_mut(copy).kind {
                attributes.push(attribute);
            }
        }
        let children = self.node(id).children.clone();
        for child in children {
            let child_copy = self.copy_node(child);
            self.node_mut(child_copy).parent = Some(copy);
            self.node_mut(copy).children.push(child_copy);
        }
        copy
    }
}

fn cannot_remove_root() -> XmlError {
    XmlError::new(
        ErrorKind::Wellformedness,
        "cannot remove the root element; use set_root_element to replace it",
    )
}

fn not_a(kind: &NodeKind, expected: &str) -> XmlError {
    XmlError::illegal_add(format!("expected {expected}, found {}", kind.type_name()))
}

fn namespace_conflict(prefix: &str) -> XmlError {
    XmlError::new(
        ErrorKind::Namespace,
        format!("prefix {prefix:?} is already bound to a different namespace on this element"),
    )
    .with_data(prefix)
}
