//! # xmlom
//!
//! An in-memory XML object model: a typed node tree built from markup,
//! mutated under strict validity rules, and serialized back to bytes with
//! escaping that reproduces the same tree when parsed again.
//!
//! Nodes live in a [`Document`] arena and are addressed by [`NodeId`]. Every
//! constructor and mutator validates its input before changing anything, so a
//! failed call leaves the tree as it was.
//!
//! ## Quick Start
//!
//! ```
//! use xmlom::{Document, SerializeOptions, Serializer};
//!
//! let mut doc = Document::parse_str("<root><![CDATA[<&>]]></root>").unwrap();
//! let root = doc.root_element();
//! assert_eq!(doc.value(root), "<&>");
//!
//! let note = doc.new_comment(" edited ").unwrap();
//! doc.append_child(root, note).unwrap();
//!
//! let mut serializer = Serializer::new(Vec::new(), SerializeOptions::default());
//! serializer.write(&doc).unwrap();
//! assert_eq!(
//!     String::from_utf8(serializer.into_inner()).unwrap(),
//!     "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n\
//!      <root><![CDATA[<&>]]><!-- edited --></root>\r\n"
//! );
//! ```

pub mod builder;
pub mod encoding;
pub mod error;
pub mod serial;
pub mod tree;
pub mod util;
pub mod verifier;

// Re-export primary types at the crate root for convenience.
pub use builder::{Builder, BuilderOptions, NodeFactory};
pub use error::{ErrorKind, XmlError};
pub use serial::{SerializeOptions, Serializer};
pub use tree::{AttributeType, Document, NodeId, NodeKind, Nodes};
