//! Backward (adjoint) propagation pass.
//!
//! Walks nodes in strictly decreasing index order over the active set and
//! accumulates each node's adjoint into its operands:
//! `derivatives[o] += dNode/dOperand(forward values) * derivatives[node]`.
//! Conditional-expectation nodes dispatch to the cached regression and
//! apply the transpose of the forward fit instead of a pointwise term.
//!
//! Accumulation across repeated restricted calls over different active
//! ranges is intentional — it is the mechanism behind per-trade replay
//! attribution. A node outside the active range is a silent no-op by
//! construction; callers must get active-range membership exactly right.
//!
//! Once a node is fully propagated its adjoint is released unless kept,
//! so a backward pass leaves adjoints only where the keep mask asks for
//! them (sensitivity targets) and at untouched seeds.

use aad_core::types::RandomVariable;

use crate::error::EngineError;
use crate::graph::ComputationGraph;
use crate::liveness::NodeMask;
use crate::ops::{Operator, OperatorRegistry};
use crate::regression::RegressionCache;
use crate::store::ValueStore;

/// Runs one backward pass over the active set.
///
/// `values` must still hold every forward value the active nodes'
/// gradients read — retaining them is the caller's keep-mask contract
/// during the forward pass (a violation silently reads placeholder zeros;
/// see the crate docs on liveness).
///
/// Run [`OperatorRegistry::check_differentiable`] over the active set
/// before the first backward pass; the per-node error here is the
/// backstop, not the intended detection point.
///
/// # Errors
///
/// - [`EngineError::NonDifferentiable`] for an active comparison node
/// - [`EngineError::MissingRegression`] when a conditional-expectation
///   node's forward fit was never recorded
/// - [`EngineError::Value`] on a path-count mismatch while accumulating
pub fn propagate(
    graph: &ComputationGraph,
    registry: &OperatorRegistry,
    values: &ValueStore,
    derivatives: &mut ValueStore,
    regressions: &RegressionCache,
    keep: &NodeMask,
    active: &NodeMask,
) -> Result<(), EngineError> {
    for index in (0..graph.len()).rev() {
        let id = aad_core::types::NodeId::new(index);
        if !active.is_active(id) {
            continue;
        }
        let node = graph.node(id);

        // A slot nothing accumulated into carries a zero adjoint; its
        // contributions would all be zero, so propagation is skipped.
        if derivatives.is_present(id) {
            match registry.operator(node.opcode())? {
                Operator::Source => {}
                Operator::Pointwise { gradient, .. } => {
                    let gradient = gradient.ok_or(EngineError::NonDifferentiable {
                        opcode: node.opcode().name(),
                    })?;
                    let contributions = {
                        let args: Vec<&RandomVariable> =
                            node.operands().iter().map(|&o| values.get(o)).collect();
                        gradient(&args, values.get(id), derivatives.get(id))?
                    };
                    for (&operand, contribution) in node.operands().iter().zip(&contributions) {
                        derivatives.accumulate(operand, contribution)?;
                    }
                }
                Operator::CrossPath => {
                    let fit = regressions
                        .get(id)
                        .ok_or(EngineError::MissingRegression(id))?;
                    // Transpose of the forward fit; the regressor is
                    // frozen and receives no adjoint.
                    let adjoint = fit.project(derivatives.get(id));
                    derivatives.accumulate(node.operands()[0], &adjoint)?;
                }
            }
        }

        if !keep.is_active(id) {
            derivatives.release(id);
        }
    }
    Ok(())
}
