//! Pluggable node construction for the builder.
//!
//! The [`Builder`](super::Builder) never creates nodes itself: every node
//! goes through a [`NodeFactory`] hook. A factory can pass nodes through,
//! drop them by returning an empty [`Nodes`], replace them, or expand one
//! event into several nodes.
//!
//! # Examples
//!
//! A factory that drops every comment:
//!
//! ```
//! use xmlom::builder::{Builder, NodeFactory};
//! use xmlom::{Document, Nodes, XmlError};
//!
//! struct NoComments;
//!
//! impl NodeFactory for NoComments {
//!     fn make_comment(&mut self, _doc: &mut Document, _data: &str) -> Result<Nodes, XmlError> {
//!         Ok(Nodes::new())
//!     }
//! }
//!
//! let mut factory = NoComments;
//! let doc = Builder::with_factory(&mut factory)
//!     .build_str("<root><!-- gone -->text</root>")
//!     .unwrap();
//! assert_eq!(doc.to_xml(doc.root_element()), "<root>text</root>");
//! ```

use crate::error::XmlError;
use crate::tree::{AttributeType, Document, NodeId, Nodes};

/// Hooks the builder calls to turn parse events into nodes.
///
/// Every method has a default that creates the node unchanged, so an
/// implementation only overrides what it wants to change. Nodes are created
/// in the document passed to each hook; returned nodes must be unparented.
/// An error returned from any hook aborts the build and becomes the cause of
/// the resulting parsing error.
#[allow(unused_variables)]
pub trait NodeFactory {
    /// Creates the document the builder fills. The default is a
    /// [`Document::placeholder`], whose stand-in root element is replaced
    /// when the real root element ends.
    fn start_making_document(&mut self) -> Result<Document, XmlError> {
        Ok(Document::placeholder())
    }

    /// Called once the whole input has been consumed.
    fn finish_making_document(&mut self, doc: &mut Document) -> Result<(), XmlError> {
        Ok(())
    }

    /// Creates an element for a start tag.
    ///
    /// Returning `None` drops only the tags: the element's content is
    /// attached to the enclosing element instead, and its attributes are
    /// discarded. The root element cannot be dropped.
    fn start_making_element(
        &mut self,
        doc: &mut Document,
        name: &str,
        namespace: &str,
    ) -> Result<Option<NodeId>, XmlError> {
        doc.new_element_ns(name, namespace).map(Some)
    }

    /// Called when an element's end tag is reached, with all of its content
    /// attached. The returned nodes take the element's place; an empty
    /// result discards the whole subtree. For the root element the result
    /// must contain exactly one element.
    fn finish_making_element(
        &mut self,
        doc: &mut Document,
        element: NodeId,
    ) -> Result<Nodes, XmlError> {
        Ok(Nodes::one(element))
    }

    /// Creates the nodes for an attribute. Returned attributes are added to
    /// the element being built; other nodes are appended to it as children.
    fn make_attribute(
        &mut self,
        doc: &mut Document,
        name: &str,
        namespace: &str,
        value: &str,
        attribute_type: AttributeType,
    ) -> Result<Nodes, XmlError> {
        doc.new_attribute_ns(name, namespace, value, attribute_type)
            .map(Nodes::one)
    }

    /// Creates the nodes for a comment.
    fn make_comment(&mut self, doc: &mut Document, data: &str) -> Result<Nodes, XmlError> {
        doc.new_comment(data).map(Nodes::one)
    }

    /// Creates the nodes for a run of character data.
    fn make_text(&mut self, doc: &mut Document, text: &str) -> Result<Nodes, XmlError> {
        Ok(Nodes::one(doc.new_text(text)))
    }

    /// Creates the nodes for character data that began with a CDATA section.
    ///
    /// The default delegates to [`make_text`](Self::make_text) and marks the
    /// resulting text nodes as preferring CDATA output.
    fn make_cdata_section(&mut self, doc: &mut Document, text: &str) -> Result<Nodes, XmlError> {
        let nodes = self.make_text(doc, text)?;
        for node in &nodes {
            doc.set_cdata(node, true);
        }
        Ok(nodes)
    }

    /// Creates the nodes for a processing instruction.
    fn make_processing_instruction(
        &mut self,
        doc: &mut Document,
        target: &str,
        data: &str,
    ) -> Result<Nodes, XmlError> {
        doc.new_processing_instruction(target, data).map(Nodes::one)
    }

    /// Creates the nodes for a document type declaration. The builder stores
    /// the internal subset on every returned doctype.
    fn make_doc_type(
        &mut self,
        doc: &mut Document,
        root_name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<Nodes, XmlError> {
        doc.new_doc_type(root_name, public_id, system_id)
            .map(Nodes::one)
    }
}

/// The pass-through factory: every hook keeps its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFactory;

impl NodeFactory for DefaultFactory {}
