//! Node type definitions.
//!
//! The `NodeKind` enum is the closed set of node kinds in a document tree.
//! Each variant carries the kind-specific payload; navigation links (parent,
//! children) are stored in `NodeData`, not here.

use super::NodeId;

/// The declared type of an attribute.
///
/// Attribute types come from a DTD. The builder passes
/// [`AttributeType::Undeclared`] when no declaration is known. The type is
/// informational: it does not take part in equality or serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeType {
    /// No declaration was seen for this attribute.
    #[default]
    Undeclared,
    /// `CDATA`
    Cdata,
    /// `ID`
    Id,
    /// `IDREF`
    IdRef,
    /// `IDREFS`
    IdRefs,
    /// `NMTOKEN`
    NmToken,
    /// `NMTOKENS`
    NmTokens,
    /// `ENTITY`
    Entity,
    /// `ENTITIES`
    Entities,
    /// `NOTATION`
    Notation,
    /// An enumerated list of tokens.
    Enumeration,
}

/// The kind of a node and its associated data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node. There is exactly one per [`Document`](super::Document).
    Document,

    /// An element, e.g. `<svg:rect width="3">`.
    Element {
        /// The local part of the name.
        local_name: String,
        /// The namespace prefix, if any.
        prefix: Option<String>,
        /// The namespace URI; empty for no namespace.
        namespace: String,
        /// Attribute nodes, in insertion order. Not children.
        attributes: Vec<NodeId>,
        /// Namespace declarations beyond those the element's own name and
        /// attributes need, as `(prefix, uri)` pairs; `""` is the default
        /// namespace.
        namespace_declarations: Vec<(String, String)>,
    },

    /// An attribute, owned by at most one element.
    Attribute {
        /// The local part of the name.
        local_name: String,
        /// The namespace prefix, if any.
        prefix: Option<String>,
        /// The namespace URI; empty for no namespace.
        namespace: String,
        /// The attribute value (entity references already expanded).
        value: String,
        /// The declared type.
        attribute_type: AttributeType,
    },

    /// Character data. `cdata` records a preference for writing the content as
    /// a CDATA section; the serializer honours it when it can.
    Text {
        /// The text content.
        content: String,
        /// Whether the text prefers CDATA output.
        cdata: bool,
    },

    /// A comment, e.g. `<!-- note -->`.
    Comment {
        /// The comment text without delimiters.
        content: String,
    },

    /// A processing instruction, e.g. `<?xml-stylesheet href="a.css"?>`.
    ProcessingInstruction {
        /// The target, an `NCName`.
        target: String,
        /// The data; empty when the instruction has none.
        data: String,
    },

    /// A document type declaration, e.g. `<!DOCTYPE html SYSTEM "about:legacy-compat">`.
    DocType {
        /// The declared root element name.
        root_name: String,
        /// The PUBLIC identifier, if any.
        public_id: Option<String>,
        /// The SYSTEM identifier, if any.
        system_id: Option<String>,
        /// The raw internal subset (between `[` and `]`), if any.
        internal_subset: Option<String>,
    },
}

impl NodeKind {
    /// Returns `true` for kinds that can never have children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Self::Document | Self::Element { .. })
    }

    /// Returns a short lowercase name for this kind, used in messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Element { .. } => "element",
            Self::Attribute { .. } => "attribute",
            Self::Text { .. } => "text",
            Self::Comment { .. } => "comment",
            Self::ProcessingInstruction { .. } => "processing instruction",
            Self::DocType { .. } => "document type declaration",
        }
    }
}
