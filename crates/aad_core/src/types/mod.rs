//! Core type definitions.
//!
//! This module provides:
//! - `NodeId`: typed handle for computation-graph nodes
//! - `RandomVariable`: a value vectorised over Monte-Carlo paths
//! - `ValueError`: shape errors from elementwise operations

mod error;
mod node;
mod value;

pub use error::ValueError;
pub use node::NodeId;
pub use value::RandomVariable;
