//! Small helpers shared by the tree, builder and serializer.

pub mod qname;
