//! Structural equality between nodes, possibly of different documents.

use super::{Document, NodeId, NodeKind};

impl Document {
    /// Compares node `a` of this document with node `b` of `other`.
    ///
    /// Two nodes are equal when they have the same kind, name, namespace and
    /// value, equal children in the same order, and the same set of
    /// attributes in any order. Namespace declarations, attribute types and
    /// the CDATA preference of text are not compared.
    #[must_use]
    pub fn node_eq(&self, a: NodeId, other: &Document, b: NodeId) -> bool {
        let (ka, kb) = (self.kind(a), other.kind(b));
        let shallow = match (ka, kb) {
            (NodeKind::Document, NodeKind::Document) => true,
            (
                NodeKind::Element {
                    local_name: la,
                    prefix: pa,
                    namespace: na,
                    ..
                },
                NodeKind::Element {
                    local_name: lb,
                    prefix: pb,
                    namespace: nb,
                    ..
                },
            ) => la == lb && pa == pb && na == nb && self.attributes_eq(a, other, b),
            (
                NodeKind::Attribute {
                    local_name: la,
                    prefix: pa,
                    namespace: na,
                    value: va,
                    ..
                },
                NodeKind::Attribute {
                    local_name: lb,
                    prefix: pb,
                    namespace: nb,
                    value: vb,
                    ..
                },
            ) => la == lb && pa == pb && na == nb && va == vb,
            (NodeKind::Text { content: ca, .. }, NodeKind::Text { content: cb, .. })
            | (NodeKind::Comment { content: ca }, NodeKind::Comment { content: cb }) => ca == cb,
            (
                NodeKind::ProcessingInstruction {
                    target: ta,
                    data: da,
                },
                NodeKind::ProcessingInstruction {
                    target: tb,
                    data: db,
                },
            ) => ta == tb && da == db,
            (NodeKind::DocType { .. }, NodeKind::DocType { .. }) => ka == kb,
            _ => false,
        };
        if !shallow {
            return false;
        }
        let (ca, cb) = (&self.node(a).children, &other.node(b).children);
        ca.len() == cb.len()
            && ca
                .iter()
                .zip(cb)
                .all(|(&x, &y)| self.node_eq(x, other, y))
    }

    fn attributes_eq(&self, a: NodeId, other: &Document, b: NodeId) -> bool {
        let (aa, ab) = (self.attributes(a), other.attributes(b));
        aa.len() == ab.len()
            && aa
                .iter()
                .all(|&x| ab.iter().any(|&y| self.node_eq(x, other, y)))
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.node_eq(self.root, other, other.root)
    }
}
