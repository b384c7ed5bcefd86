//! The computation graph: an append-only tape of vectorised operations.
//!
//! A graph is built once in a linear phase — model layer first, then each
//! trade's subgraph under its own namespace, then aggregation and
//! post-processing — and is immutable thereafter. Nodes are appended in
//! topological order by construction: every operand id is strictly smaller
//! than its consumer's id, which is what lets the passes run as plain
//! index sweeps.
//!
//! Variable bindings are namespaced with an explicit [`Namespace`]
//! argument rather than ambient "current prefix" state, so per-trade
//! compilation carries no hidden order dependency. [`ScopedGraph`] threads
//! one namespace through a trade's compilation for the script-compiler
//! surface.

use std::collections::HashMap;

use aad_core::types::NodeId;

use crate::error::GraphError;
use crate::ops::Opcode;
use crate::store::ValueStore;

/// Binding namespace for graph variables.
///
/// Each trade compiles under its own namespace so its variable names never
/// collide with another trade's; model-level bindings live in the global
/// namespace and are visible as a fallback from every trade.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// The global (unprefixed) namespace.
    pub fn global() -> Self {
        Self(String::new())
    }

    /// A named namespace, typically the trade id.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// `true` for the global namespace.
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    /// Namespace name; empty for the global namespace.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single graph node, immutable once appended.
#[derive(Debug, Clone)]
pub struct Node {
    opcode: Opcode,
    operands: Vec<NodeId>,
    constant: Option<f64>,
}

impl Node {
    /// The node's operation code.
    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Operand ids, all strictly before this node.
    #[inline]
    pub fn operands(&self) -> &[NodeId] {
        &self.operands
    }

    /// Constant payload, for `Constant` nodes.
    #[inline]
    pub fn constant(&self) -> Option<f64> {
        self.constant
    }
}

/// Append-only computation graph with a constants table and namespaced
/// variable bindings.
///
/// # Examples
///
/// ```
/// use aad_engine::graph::{ComputationGraph, Namespace};
/// use aad_engine::ops::Opcode;
///
/// let mut g = ComputationGraph::new();
/// let two = g.add_constant(2.0);
/// let three = g.add_constant(3.0);
/// let sum = g.add_operation(Opcode::Add, &[two, three]).unwrap();
///
/// g.bind(&Namespace::global(), "notional", sum);
/// assert_eq!(g.lookup(&Namespace::new("T1"), "notional").unwrap(), sum);
/// assert_eq!(g.len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct ComputationGraph {
    nodes: Vec<Node>,
    constants: Vec<(NodeId, f64)>,
    bindings: HashMap<(Namespace, String), NodeId>,
}

impl ComputationGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes appended so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when no node has been appended.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Id the next appended node will receive.
    #[inline]
    pub fn next_id(&self) -> NodeId {
        NodeId::new(self.nodes.len())
    }

    /// The node behind an id.
    ///
    /// # Panics
    ///
    /// Panics if `id` has not been appended.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Iterates nodes in append (topological) order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::new(i), n))
    }

    /// Appends an operation node.
    ///
    /// O(1) amortized. Arity and the DAG property (every operand strictly
    /// before the new node) are enforced here, once, so the passes can
    /// assume them.
    ///
    /// # Errors
    ///
    /// [`GraphError::NotAnOperation`] for source opcodes,
    /// [`GraphError::ArityMismatch`] on a wrong operand count,
    /// [`GraphError::ForwardReference`] when an operand is not strictly
    /// before the new node (forward reference or cycle attempt).
    pub fn add_operation(
        &mut self,
        opcode: Opcode,
        operands: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        if opcode.is_source() {
            return Err(GraphError::NotAnOperation {
                opcode: opcode.name(),
            });
        }
        if operands.len() != opcode.arity() {
            return Err(GraphError::ArityMismatch {
                opcode: opcode.name(),
                expected: opcode.arity(),
                got: operands.len(),
            });
        }
        let id = self.next_id();
        for &operand in operands {
            if operand >= id {
                return Err(GraphError::ForwardReference { node: id, operand });
            }
        }
        self.nodes.push(Node {
            opcode,
            operands: operands.to_vec(),
            constant: None,
        });
        Ok(id)
    }

    /// Appends a constant node and records it in the constants table.
    pub fn add_constant(&mut self, value: f64) -> NodeId {
        let id = self.next_id();
        self.nodes.push(Node {
            opcode: Opcode::Constant,
            operands: Vec::new(),
            constant: Some(value),
        });
        self.constants.push((id, value));
        id
    }

    /// Appends a leaf node, seeded externally before every pass (model
    /// parameters, random-draw arrays).
    pub fn add_leaf(&mut self) -> NodeId {
        let id = self.next_id();
        self.nodes.push(Node {
            opcode: Opcode::Leaf,
            operands: Vec::new(),
            constant: None,
        });
        id
    }

    /// The constants table: `(node, value)` in append order.
    pub fn constants(&self) -> &[(NodeId, f64)] {
        &self.constants
    }

    /// Seeds every constant node's value slot. Called at the start of each
    /// evaluation pass, since in-pass liveness may have released constant
    /// slots during the previous pass.
    pub fn seed_constants(&self, store: &mut ValueStore) {
        for &(id, value) in &self.constants {
            store.seed_scalar(id, value);
        }
    }

    /// Binds `name` to `id` under `namespace`. Rebinding an existing name
    /// rebinds it; it does not create a new entry.
    pub fn bind(&mut self, namespace: &Namespace, name: &str, id: NodeId) {
        self.bindings
            .insert((namespace.clone(), name.to_string()), id);
    }

    /// Resolves `name` under `namespace`, falling back to the global
    /// namespace.
    ///
    /// # Errors
    ///
    /// [`GraphError::NameNotFound`] when neither binding exists.
    pub fn lookup(&self, namespace: &Namespace, name: &str) -> Result<NodeId, GraphError> {
        if let Some(&id) = self.bindings.get(&(namespace.clone(), name.to_string())) {
            return Ok(id);
        }
        if !namespace.is_global() {
            if let Some(&id) = self.bindings.get(&(Namespace::global(), name.to_string())) {
                return Ok(id);
            }
        }
        Err(GraphError::NameNotFound {
            namespace: namespace.as_str().to_string(),
            name: name.to_string(),
        })
    }

    /// A builder view that threads `namespace` through every binding and
    /// lookup, for compiling one trade's subgraph.
    pub fn scoped(&mut self, namespace: Namespace) -> ScopedGraph<'_> {
        ScopedGraph {
            graph: self,
            namespace,
        }
    }
}

/// A graph builder scoped to one namespace.
///
/// The script-to-graph compiler obtains one of these per trade and never
/// touches namespaces explicitly; returned node ids are opaque stable
/// handles.
pub struct ScopedGraph<'g> {
    graph: &'g mut ComputationGraph,
    namespace: Namespace,
}

impl ScopedGraph<'_> {
    /// The namespace this view binds and resolves under.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Appends an operation node. See [`ComputationGraph::add_operation`].
    ///
    /// # Errors
    ///
    /// Propagates the underlying graph errors unchanged.
    pub fn add_operation(&mut self, opcode: Opcode, operands: &[NodeId]) -> Result<NodeId, GraphError> {
        self.graph.add_operation(opcode, operands)
    }

    /// Appends a constant node.
    pub fn add_constant(&mut self, value: f64) -> NodeId {
        self.graph.add_constant(value)
    }

    /// Appends an externally seeded leaf node.
    pub fn add_leaf(&mut self) -> NodeId {
        self.graph.add_leaf()
    }

    /// Binds `name` under this scope's namespace.
    pub fn bind(&mut self, name: &str, id: NodeId) {
        self.graph.bind(&self.namespace, name, id);
    }

    /// Resolves `name` under this scope's namespace, with global fallback.
    ///
    /// # Errors
    ///
    /// [`GraphError::NameNotFound`] when neither binding exists.
    pub fn lookup(&self, name: &str) -> Result<NodeId, GraphError> {
        self.graph.lookup(&self.namespace, name)
    }
}
