//! # aad_engine: Adjoint Computation-Graph Engine (Layer 2)
//!
//! ## Layer 2 Role
//!
//! aad_engine holds the core of the platform: a DAG of vectorised
//! (per-Monte-Carlo-path) operations built once, evaluated forward to
//! price across simulated paths, and differentiated backward
//! (adjoint/reverse mode) to obtain sensitivities of one aggregate risk
//! number to model parameters — without finite-difference repricing.
//!
//! - [`graph`]: append-only node tape, constants table, namespaced
//!   variable bindings
//! - [`ops`]: operator registry (forward and gradient kernels per opcode)
//! - [`regression`]: cross-path conditional-expectation fit and its
//!   transposed adjoint
//! - [`liveness`]: requirement map and active/keep masks
//! - [`store`]: pass-scoped value/derivative storage with RAII release
//! - [`forward`] / [`backward`]: the two evaluation passes
//!
//! ## Concurrency Model
//!
//! The node loop of either pass is single-threaded: node `i` may depend
//! only on indices `< i`, so strict index order is the dependency order.
//! Data parallelism lives *inside* one node's elementwise kernel, across
//! paths (see `aad_core`). The conditional-expectation node aggregates
//! across all paths and is therefore a synchronisation point.
//!
//! The graph is immutable post-build and safely shareable read-only;
//! value and derivative stores are exclusively owned by the single active
//! pass invocation.
//!
//! ## Liveness Caller Contract
//!
//! Active sets must be predecessor-closed with respect to the values a
//! pass reads: reading a slot that an incorrect active/keep mask caused
//! to be freed early yields the placeholder value silently. Detecting
//! this at runtime would cost a full requirement recomputation per pass,
//! so it is a documented contract with an opt-in debug check
//! ([`liveness::RequirementMap::validate_active`]) instead of an error
//! path.
//!
//! ## Usage Example
//!
//! ```rust
//! use aad_core::types::RandomVariable;
//! use aad_engine::graph::ComputationGraph;
//! use aad_engine::liveness::{NodeMask, RequirementMap};
//! use aad_engine::ops::{Opcode, OperatorRegistry};
//! use aad_engine::regression::RegressionCache;
//! use aad_engine::store::ValueStore;
//!
//! // price = 4 * draws
//! let mut g = ComputationGraph::new();
//! let four = g.add_constant(4.0);
//! let draws = g.add_leaf();
//! let price = g.add_operation(Opcode::Mul, &[four, draws]).unwrap();
//!
//! let registry = OperatorRegistry::standard();
//! let requirements = RequirementMap::build(&g);
//! let keep = NodeMask::all_active(g.len());
//! let active = NodeMask::all_active(g.len());
//!
//! let mut values = ValueStore::new(g.len());
//! g.seed_constants(&mut values);
//! values.set(draws, RandomVariable::from_paths(vec![1.0, 2.0, 3.0]));
//! let mut regressions = RegressionCache::new();
//! aad_engine::forward::evaluate(
//!     &g, &registry, &mut values, &mut regressions, &requirements, &keep, &active,
//! ).unwrap();
//! assert_eq!(values.get(price).paths().unwrap(), &[4.0, 8.0, 12.0]);
//!
//! let mut derivatives = ValueStore::new(g.len());
//! derivatives.seed_scalar(price, 1.0);
//! aad_engine::backward::propagate(
//!     &g, &registry, &values, &mut derivatives, &regressions, &keep, &active,
//! ).unwrap();
//! assert_eq!(derivatives.get(draws).at(0), 4.0);
//! assert_eq!(derivatives.get(four).paths().unwrap(), &[1.0, 2.0, 3.0]);
//! ```

#![warn(missing_docs)]

pub mod backward;
pub mod error;
pub mod forward;
pub mod graph;
pub mod liveness;
pub mod ops;
pub mod regression;
pub mod store;

pub use error::{EngineError, GraphError};
pub use graph::{ComputationGraph, Namespace, Node, ScopedGraph};
pub use liveness::{NodeMask, RequirementMap};
pub use ops::{Opcode, Operator, OperatorRegistry};
pub use regression::{FittedRegression, RegressionCache};
pub use store::{PassGuard, ValueStore};
