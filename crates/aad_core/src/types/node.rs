//! Typed node identifiers.
//!
//! Every node in a computation graph is addressed by a `NodeId` rather than
//! a raw `usize`. Many parallel per-node vectors exist during a pass
//! (values, derivatives, requirement map, active and keep masks); the
//! newtype keeps graph indices from being confused with unrelated offsets.

use std::fmt;

/// Handle for a node in a computation graph.
///
/// Node ids are dense indices assigned in append order, so for every edge
/// the operand id is strictly smaller than the consumer id.
///
/// # Examples
///
/// ```
/// use aad_core::types::NodeId;
///
/// let id = NodeId::new(7);
/// assert_eq!(id.index(), 7);
/// assert!(NodeId::new(3) < id);
/// assert_eq!(format!("{}", id), "#7");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(usize);

impl NodeId {
    /// Creates a node id from a dense index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying dense index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }

    /// Returns the id of the next node in append order.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_follows_index() {
        assert!(NodeId::new(0) < NodeId::new(1));
        assert_eq!(NodeId::new(5), NodeId::new(5));
    }

    #[test]
    fn test_next() {
        assert_eq!(NodeId::new(3).next(), NodeId::new(4));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", NodeId::new(12)), "#12");
    }
}
