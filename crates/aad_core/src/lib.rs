//! # aad_core: Foundation Types for Adjoint Graph Computation
//!
//! ## Layer 1 (Foundation) Role
//!
//! aad_core serves as the bottom layer of the 3-layer architecture, providing:
//! - Typed node handles: `NodeId` (`types::node`)
//! - Path-vectorised values: `RandomVariable` (`types::value`)
//! - Error types: `ValueError` (`types::error`)
//!
//! ## Zero Dependency Principle
//!
//! Layer 1 has no dependencies on other aad_* crates, with minimal external
//! dependencies:
//! - rayon: Per-path data parallelism inside elementwise kernels
//! - thiserror: Structured error derivation
//! - serde: Serialisation support (optional)
//!
//! ## Usage Examples
//!
//! ```rust
//! use aad_core::types::{NodeId, RandomVariable};
//!
//! let spot = RandomVariable::from_paths(vec![99.0, 101.0, 103.0]);
//! let strike = RandomVariable::scalar(100.0);
//!
//! // (S - K)+ payoff, elementwise with scalar broadcast
//! let payoff = spot.sub(&strike).unwrap().max(&RandomVariable::scalar(0.0)).unwrap();
//! assert_eq!(payoff.at(0), 0.0);
//! assert_eq!(payoff.at(2), 3.0);
//!
//! let id = NodeId::new(42);
//! assert_eq!(id.index(), 42);
//! ```

#![warn(missing_docs)]

pub mod types;

pub use types::{NodeId, RandomVariable, ValueError};
