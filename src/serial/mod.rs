//! XML serialization.
//!
//! [`Serializer`] writes whole documents as bytes in a chosen encoding;
//! [`to_xml`] gives the string form of a single node.

pub mod xml;

pub use xml::{serialize_to_vec, to_xml, SerializeOptions, Serializer, LINE_SEPARATOR};
