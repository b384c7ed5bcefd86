//! Error types for graph construction and evaluation passes.
//!
//! Structural errors (`GraphError`, and the configuration variants of
//! `EngineError`) fail fast at build/setup time and identify the offending
//! opcode or node; they are never retried. Numerical edge cases are not
//! errors anywhere in the engine and propagate as IEEE-754 special values.
//!
//! Reading a value that a caller's incorrect active/keep mask caused to be
//! freed early (a liveness violation) is not detectable cheaply at runtime
//! and is deliberately NOT represented here: it is a documented caller
//! contract, exercised by the property tests instead.

use aad_core::types::{NodeId, ValueError};
use thiserror::Error;

/// Errors from computation-graph construction and name resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Operand count does not match the opcode's fixed arity.
    #[error("opcode {opcode} takes {expected} operand(s), got {got}")]
    ArityMismatch {
        /// Name of the offending opcode.
        opcode: &'static str,
        /// Arity the opcode requires.
        expected: usize,
        /// Operand count supplied.
        got: usize,
    },

    /// An operand refers at or past the node being appended. Append order
    /// is the topological order; this rejects forward references and
    /// cycles at construction time.
    #[error("node {node} references operand {operand}, which is not before it")]
    ForwardReference {
        /// Id the new node would receive.
        node: NodeId,
        /// The out-of-order operand.
        operand: NodeId,
    },

    /// `add_operation` called with a source opcode (`Constant`, `Leaf`);
    /// those have dedicated constructors.
    #[error("opcode {opcode} is a source, not an operation")]
    NotAnOperation {
        /// Name of the offending opcode.
        opcode: &'static str,
    },

    /// Variable lookup found no binding under the namespace nor globally.
    #[error("no binding for '{name}' in namespace '{namespace}' or globally")]
    NameNotFound {
        /// Namespace the lookup ran under.
        namespace: String,
        /// The unresolved variable name.
        name: String,
    },
}

/// Errors from evaluation-pass setup and execution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Graph construction or name resolution failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Elementwise shape error surfaced during a pass.
    #[error(transparent)]
    Value(#[from] ValueError),

    /// An opcode has no entry in the operator registry.
    #[error("opcode {opcode} is not registered")]
    UnknownOpcode {
        /// Name of the offending opcode.
        opcode: &'static str,
    },

    /// A gradient was requested for a non-differentiable opcode. Checked
    /// once at setup via [`crate::ops::OperatorRegistry::check_differentiable`].
    #[error("opcode {opcode} has no gradient")]
    NonDifferentiable {
        /// Name of the offending opcode.
        opcode: &'static str,
    },

    /// An active source node (constant, model parameter or random draw)
    /// was never seeded before the pass.
    #[error("source node {0} was not seeded before the pass")]
    MissingSeed(NodeId),

    /// Backward reached a conditional-expectation node whose forward fit
    /// was never recorded.
    #[error("no cached regression fit for node {0}")]
    MissingRegression(NodeId),

    /// Debug mask validation: an active node consumes an operand that is
    /// neither active, kept, nor an externally seeded source.
    #[error("active node {consumer} reads operand {operand}, which the masks free early")]
    InconsistentMask {
        /// The active consumer.
        consumer: NodeId,
        /// The operand the masks do not retain.
        operand: NodeId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_identifies_offender() {
        let err = EngineError::NonDifferentiable { opcode: "Gt" };
        assert_eq!(format!("{}", err), "opcode Gt has no gradient");

        let err = GraphError::ForwardReference {
            node: NodeId::new(3),
            operand: NodeId::new(7),
        };
        assert!(format!("{}", err).contains("#3"));
        assert!(format!("{}", err).contains("#7"));
    }

    #[test]
    fn test_from_value_error() {
        let err: EngineError = ValueError::PathCountMismatch { left: 1, right: 2 }.into();
        assert!(matches!(err, EngineError::Value(_)));
    }
}
