//! Node liveness: requirement map and active/keep masks.
//!
//! The requirement map records, for every node, the highest-index consumer
//! that reads it — one forward scan over the graph, computed once after
//! the build phase. The forward pass releases a value the moment its last
//! consumer has run (unless kept), which is what keeps 10^6-node graphs
//! over 10^5-path vectors inside memory.
//!
//! Active and keep masks restrict a pass to a node subset and force
//! retention past natural liveness. Self-consistency of an active set
//! (predecessor closure) is a caller contract, not structurally enforced;
//! [`RequirementMap::validate_active`] is the opt-in debug check used by
//! tests and `debug_assertions` call sites.

use aad_core::types::NodeId;

use crate::error::EngineError;
use crate::graph::ComputationGraph;

/// Boolean vector over node ids, used for both active and keep sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMask {
    bits: Vec<bool>,
}

impl NodeMask {
    /// Mask with every node set.
    pub fn all_active(n: usize) -> Self {
        Self {
            bits: vec![true; n],
        }
    }

    /// Mask with no node set.
    pub fn none(n: usize) -> Self {
        Self {
            bits: vec![false; n],
        }
    }

    /// Number of nodes covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// `true` for a zero-length mask.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Whether `id` is set.
    #[inline]
    pub fn is_active(&self, id: NodeId) -> bool {
        self.bits[id.index()]
    }

    /// Sets `id`.
    #[inline]
    pub fn activate(&mut self, id: NodeId) {
        self.bits[id.index()] = true;
    }

    /// Clears `id`.
    #[inline]
    pub fn deactivate(&mut self, id: NodeId) {
        self.bits[id.index()] = false;
    }

    /// Sets every node in `[first, last)`.
    pub fn activate_range(&mut self, first: NodeId, last: NodeId) {
        for i in first.index()..last.index() {
            self.bits[i] = true;
        }
    }

    /// Clears every node in `[first, last)`.
    pub fn deactivate_range(&mut self, first: NodeId, last: NodeId) {
        for i in first.index()..last.index() {
            self.bits[i] = false;
        }
    }
}

/// Last-consumer index per node.
///
/// # Examples
///
/// ```
/// use aad_engine::graph::ComputationGraph;
/// use aad_engine::liveness::RequirementMap;
/// use aad_engine::ops::Opcode;
///
/// let mut g = ComputationGraph::new();
/// let a = g.add_constant(1.0);
/// let b = g.add_constant(2.0);
/// let c = g.add_operation(Opcode::Add, &[a, b]).unwrap();
/// let d = g.add_operation(Opcode::Mul, &[a, c]).unwrap();
///
/// let reqs = RequirementMap::build(&g);
/// assert_eq!(reqs.last_use(a), d); // read again by d
/// assert_eq!(reqs.last_use(b), c);
/// assert_eq!(reqs.last_use(d), d); // never read: dead after self
/// assert!(reqs.is_dead_after_self(d));
/// ```
#[derive(Debug, Clone)]
pub struct RequirementMap {
    last_use: Vec<NodeId>,
}

impl RequirementMap {
    /// Computes the map in one forward scan:
    /// `requirement[o] = max(requirement[o], i)` for every operand `o` of
    /// every node `i`.
    pub fn build(graph: &ComputationGraph) -> Self {
        let mut last_use: Vec<NodeId> = (0..graph.len()).map(NodeId::new).collect();
        for (id, node) in graph.nodes() {
            for &operand in node.operands() {
                if id > last_use[operand.index()] {
                    last_use[operand.index()] = id;
                }
            }
        }
        Self { last_use }
    }

    /// Highest-index consumer of `id`; `id` itself when never read.
    #[inline]
    pub fn last_use(&self, id: NodeId) -> NodeId {
        self.last_use[id.index()]
    }

    /// `true` when no node reads `id`.
    #[inline]
    pub fn is_dead_after_self(&self, id: NodeId) -> bool {
        self.last_use[id.index()] == id
    }

    /// Debug validation of a caller-supplied mask pair: every operand of an
    /// active operation node must be active itself, kept, or an externally
    /// seeded source. Recomputes nothing in release passes — this is the
    /// opt-in check behind the liveness caller contract.
    ///
    /// # Errors
    ///
    /// [`EngineError::InconsistentMask`] naming the first offending edge.
    pub fn validate_active(
        &self,
        graph: &ComputationGraph,
        active: &NodeMask,
        keep: &NodeMask,
    ) -> Result<(), EngineError> {
        for (id, node) in graph.nodes() {
            if !active.is_active(id) {
                continue;
            }
            for &operand in node.operands() {
                let source = graph.node(operand).opcode().is_source();
                if !(active.is_active(operand) || keep.is_active(operand) || source) {
                    return Err(EngineError::InconsistentMask {
                        consumer: id,
                        operand,
                    });
                }
            }
        }
        Ok(())
    }
}
