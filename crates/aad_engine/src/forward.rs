//! Forward evaluation pass.
//!
//! Executes nodes in strictly increasing index order over the active set.
//! Ascending order is both the correctness requirement (every operand was
//! computed before its consumer, the DAG property) and the basis of
//! single-pass liveness deletion: the moment a node's last consumer has
//! run, its value is released unless the keep mask retains it.
//!
//! Constants and externally supplied leaves (model parameters, random
//! draws) have no operands and are never recomputed; the caller seeds them
//! before the pass, every pass, since in-pass liveness may have released
//! their slots during the previous one.

use aad_core::types::RandomVariable;

use crate::error::EngineError;
use crate::graph::ComputationGraph;
use crate::liveness::{NodeMask, RequirementMap};
use crate::ops::{Operator, OperatorRegistry};
use crate::regression::{FittedRegression, RegressionCache};
use crate::store::ValueStore;

/// Runs one forward pass over the active set.
///
/// Inactive nodes are skipped entirely; their value slots must already
/// hold whatever the active nodes read from them (seeded constants and
/// leaves, or values kept from an earlier pass — the latter is the caller
/// contract restricted replays rely on).
///
/// Conditional-expectation nodes record their fit in `regressions` so the
/// backward pass applies the transpose of the exact same linear map.
///
/// # Errors
///
/// - [`EngineError::MissingSeed`] for an active, unseeded source node
/// - [`EngineError::Value`] on a path-count mismatch between operands
/// - [`EngineError::UnknownOpcode`] for an unregistered opcode
pub fn evaluate(
    graph: &ComputationGraph,
    registry: &OperatorRegistry,
    values: &mut ValueStore,
    regressions: &mut RegressionCache,
    requirements: &RequirementMap,
    keep: &NodeMask,
    active: &NodeMask,
) -> Result<(), EngineError> {
    for (id, node) in graph.nodes() {
        if !active.is_active(id) {
            continue;
        }

        match registry.operator(node.opcode())? {
            Operator::Source => {
                if !values.is_present(id) {
                    return Err(EngineError::MissingSeed(id));
                }
            }
            Operator::Pointwise { forward, .. } => {
                let value = {
                    let args: Vec<&RandomVariable> =
                        node.operands().iter().map(|&o| values.get(o)).collect();
                    forward(&args)?
                };
                values.set(id, value);
            }
            Operator::CrossPath => {
                let regressand = node.operands()[0];
                let regressor = node.operands()[1];
                let fit = FittedRegression::fit(
                    values.get(regressand),
                    values.get(regressor),
                    regressions.degree(),
                );
                let value = fit.project(values.get(regressand));
                values.set(id, value);
                regressions.insert(id, fit);
            }
        }

        // Single-pass liveness: each operand dies at its last consumer.
        for &operand in node.operands() {
            if requirements.last_use(operand) == id && !keep.is_active(operand) {
                values.release(operand);
            }
        }
    }
    Ok(())
}
