//! An ordered list of node handles.

use super::NodeId;
use crate::error::XmlError;

/// An ordered, possibly empty sequence of nodes.
///
/// Factory hooks return `Nodes` so that one parse event can produce zero,
/// one, or many nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nodes {
    items: Vec<NodeId>,
}

impl Nodes {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list holding a single node.
    #[must_use]
    pub fn one(node: NodeId) -> Self {
        Self { items: vec![node] }
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the list holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the node at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IndexOutOfBounds`](crate::error::ErrorKind::IndexOutOfBounds)
    /// if `index >= len()`.
    pub fn get(&self, index: usize) -> Result<NodeId, XmlError> {
        self.items
            .get(index)
            .copied()
            .ok_or_else(|| XmlError::index_out_of_bounds(index, self.items.len()))
    }

    /// Appends a node.
    pub fn push(&mut self, node: NodeId) {
        self.items.push(node);
    }

    /// Inserts a node at `index`.
    ///
    /// # Errors
    ///
    /// Returns an index-out-of-bounds error if `index > len()`.
    pub fn insert(&mut self, index: usize, node: NodeId) -> Result<(), XmlError> {
        if index > self.items.len() {
            return Err(XmlError::index_out_of_bounds(index, self.items.len()));
        }
        self.items.insert(index, node);
        Ok(())
    }

    /// Removes and returns the node at `index`.
    ///
    /// # Errors
    ///
    /// Returns an index-out-of-bounds error if `index >= len()`.
    pub fn remove(&mut self, index: usize) -> Result<NodeId, XmlError> {
        if index >= self.items.len() {
            return Err(XmlError::index_out_of_bounds(index, self.items.len()));
        }
        Ok(self.items.remove(index))
    }

    /// Returns an iterator over the nodes.
    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, NodeId>> {
        self.items.iter().copied()
    }

    /// Returns the nodes as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[NodeId] {
        &self.items
    }
}

impl From<Vec<NodeId>> for Nodes {
    fn from(items: Vec<NodeId>) -> Self {
        Self { items }
    }
}

impl From<NodeId> for Nodes {
    fn from(node: NodeId) -> Self {
        Self::one(node)
    }
}

impl FromIterator<NodeId> for Nodes {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Nodes {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Nodes {
    type Item = NodeId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, NodeId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
