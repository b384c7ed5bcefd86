//! Operator registry: forward kernels and gradient kernels per opcode.
//!
//! Every differentiable opcode carries a forward function and a gradient
//! function; the gradient returns one adjoint contribution per operand,
//! already multiplied by the upstream adjoint. Comparison opcodes have a
//! forward kernel only — asking for their gradient is a configuration
//! error surfaced once at setup by
//! [`OperatorRegistry::check_differentiable`], never mid-pass.
//!
//! Operator kind is a tagged variant so pass dispatch is exhaustive:
//! - `Source`: externally seeded (constants, model parameters, draws)
//! - `Pointwise`: per-path chain rule
//! - `CrossPath`: the conditional-expectation regression, whose adjoint is
//!   the transpose of the forward linear fit (see [`crate::regression`])

use std::collections::HashMap;

use aad_core::types::{RandomVariable, ValueError};

use crate::error::EngineError;
use crate::graph::ComputationGraph;
use crate::liveness::NodeMask;

/// Operation code of a computation-graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Scalar constant, reseeded from the constants table every pass.
    Constant,
    /// Externally seeded input (model parameter or random-draw array).
    Leaf,
    /// Elementwise addition.
    Add,
    /// Elementwise subtraction.
    Sub,
    /// Elementwise multiplication.
    Mul,
    /// Elementwise division (IEEE semantics, unguarded).
    Div,
    /// Elementwise negation.
    Neg,
    /// Elementwise maximum; gradient ties route to the first operand.
    Max,
    /// Elementwise minimum; gradient ties route to the first operand.
    Min,
    /// Elementwise exponential.
    Exp,
    /// Elementwise natural logarithm.
    Ln,
    /// Elementwise square root.
    Sqrt,
    /// Elementwise `>` as 1.0/0.0. Not differentiable.
    Gt,
    /// Elementwise `<` as 1.0/0.0. Not differentiable.
    Lt,
    /// Elementwise `>=` as 1.0/0.0. Not differentiable.
    Ge,
    /// Elementwise `<=` as 1.0/0.0. Not differentiable.
    Le,
    /// Elementwise `==` as 1.0/0.0. Not differentiable.
    Eq,
    /// Cross-path regression `E[y | x]`: fitted value per path.
    CondExpectation,
}

impl Opcode {
    /// Fixed operand count of the opcode.
    pub const fn arity(self) -> usize {
        match self {
            Opcode::Constant | Opcode::Leaf => 0,
            Opcode::Neg | Opcode::Exp | Opcode::Ln | Opcode::Sqrt => 1,
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Max
            | Opcode::Min
            | Opcode::Gt
            | Opcode::Lt
            | Opcode::Ge
            | Opcode::Le
            | Opcode::Eq
            | Opcode::CondExpectation => 2,
        }
    }

    /// `true` for externally seeded nodes (no forward computation).
    pub const fn is_source(self) -> bool {
        matches!(self, Opcode::Constant | Opcode::Leaf)
    }

    /// Stable display name, used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Constant => "Constant",
            Opcode::Leaf => "Leaf",
            Opcode::Add => "Add",
            Opcode::Sub => "Sub",
            Opcode::Mul => "Mul",
            Opcode::Div => "Div",
            Opcode::Neg => "Neg",
            Opcode::Max => "Max",
            Opcode::Min => "Min",
            Opcode::Exp => "Exp",
            Opcode::Ln => "Ln",
            Opcode::Sqrt => "Sqrt",
            Opcode::Gt => "Gt",
            Opcode::Lt => "Lt",
            Opcode::Ge => "Ge",
            Opcode::Le => "Le",
            Opcode::Eq => "Eq",
            Opcode::CondExpectation => "CondExpectation",
        }
    }

    /// All opcodes, in registry order.
    pub const ALL: [Opcode; 18] = [
        Opcode::Constant,
        Opcode::Leaf,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Neg,
        Opcode::Max,
        Opcode::Min,
        Opcode::Exp,
        Opcode::Ln,
        Opcode::Sqrt,
        Opcode::Gt,
        Opcode::Lt,
        Opcode::Ge,
        Opcode::Le,
        Opcode::Eq,
        Opcode::CondExpectation,
    ];
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Forward kernel: operand values in, node value out.
pub type ForwardFn = fn(&[&RandomVariable]) -> Result<RandomVariable, ValueError>;

/// Gradient kernel: `(operands, node value, upstream adjoint)` in, one
/// adjoint contribution per operand out.
pub type GradientFn =
    fn(&[&RandomVariable], &RandomVariable, &RandomVariable) -> Result<Vec<RandomVariable>, ValueError>;

/// How a registered operator participates in the two passes.
pub enum Operator {
    /// Externally seeded; neither pass computes it.
    Source,
    /// Per-path operator with an optional gradient.
    Pointwise {
        /// Forward kernel.
        forward: ForwardFn,
        /// Gradient kernel; `None` for non-differentiable opcodes.
        gradient: Option<GradientFn>,
    },
    /// Cross-path regression; dispatched to the dedicated fit/transpose
    /// routines rather than a pointwise chain-rule term.
    CrossPath,
}

// ---------------------------------------------------------------------
// Forward kernels
// ---------------------------------------------------------------------

fn fwd_add(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    a[0].add(a[1])
}

fn fwd_sub(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    a[0].sub(a[1])
}

fn fwd_mul(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    a[0].mul(a[1])
}

fn fwd_div(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    a[0].div(a[1])
}

fn fwd_neg(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    Ok(a[0].neg())
}

fn fwd_max(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    a[0].max(a[1])
}

fn fwd_min(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    a[0].min(a[1])
}

fn fwd_exp(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    Ok(a[0].exp())
}

fn fwd_ln(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    Ok(a[0].ln())
}

fn fwd_sqrt(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    Ok(a[0].sqrt())
}

fn fwd_gt(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    a[0].gt(a[1])
}

fn fwd_lt(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    a[0].lt(a[1])
}

fn fwd_ge(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    a[0].ge(a[1])
}

fn fwd_le(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    a[0].le(a[1])
}

fn fwd_eq(a: &[&RandomVariable]) -> Result<RandomVariable, ValueError> {
    a[0].eq_cmp(a[1])
}

// ---------------------------------------------------------------------
// Gradient kernels
//
// Each returns the operand adjoints already scaled by the upstream
// adjoint. IEEE specials (division by zero, log of a negative) propagate.
// ---------------------------------------------------------------------

fn grad_add(
    _a: &[&RandomVariable],
    _v: &RandomVariable,
    up: &RandomVariable,
) -> Result<Vec<RandomVariable>, ValueError> {
    Ok(vec![up.clone(), up.clone()])
}

fn grad_sub(
    _a: &[&RandomVariable],
    _v: &RandomVariable,
    up: &RandomVariable,
) -> Result<Vec<RandomVariable>, ValueError> {
    Ok(vec![up.clone(), up.neg()])
}

fn grad_mul(
    a: &[&RandomVariable],
    _v: &RandomVariable,
    up: &RandomVariable,
) -> Result<Vec<RandomVariable>, ValueError> {
    Ok(vec![a[1].mul(up)?, a[0].mul(up)?])
}

fn grad_div(
    a: &[&RandomVariable],
    v: &RandomVariable,
    up: &RandomVariable,
) -> Result<Vec<RandomVariable>, ValueError> {
    // d/da (a/b) = 1/b, d/db (a/b) = -(a/b)/b
    let d_a = up.div(a[1])?;
    let d_b = v.div(a[1])?.neg().mul(up)?;
    Ok(vec![d_a, d_b])
}

fn grad_neg(
    _a: &[&RandomVariable],
    _v: &RandomVariable,
    up: &RandomVariable,
) -> Result<Vec<RandomVariable>, ValueError> {
    Ok(vec![up.neg()])
}

fn grad_max(
    a: &[&RandomVariable],
    _v: &RandomVariable,
    up: &RandomVariable,
) -> Result<Vec<RandomVariable>, ValueError> {
    // Tie-break: a == b routes the full gradient to the first operand.
    let first = a[0].ge(a[1])?;
    let d_a = first.mul(up)?;
    let d_b = up.sub(&d_a)?;
    Ok(vec![d_a, d_b])
}

fn grad_min(
    a: &[&RandomVariable],
    _v: &RandomVariable,
    up: &RandomVariable,
) -> Result<Vec<RandomVariable>, ValueError> {
    let first = a[0].le(a[1])?;
    let d_a = first.mul(up)?;
    let d_b = up.sub(&d_a)?;
    Ok(vec![d_a, d_b])
}

fn grad_exp(
    _a: &[&RandomVariable],
    v: &RandomVariable,
    up: &RandomVariable,
) -> Result<Vec<RandomVariable>, ValueError> {
    Ok(vec![v.mul(up)?])
}

fn grad_ln(
    a: &[&RandomVariable],
    _v: &RandomVariable,
    up: &RandomVariable,
) -> Result<Vec<RandomVariable>, ValueError> {
    Ok(vec![up.div(a[0])?])
}

fn grad_sqrt(
    _a: &[&RandomVariable],
    v: &RandomVariable,
    up: &RandomVariable,
) -> Result<Vec<RandomVariable>, ValueError> {
    // d/dx sqrt(x) = 1 / (2 sqrt(x))
    let two_v = v.add(v)?;
    Ok(vec![up.div(&two_v)?])
}

// ---------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------

/// Table of forward and gradient kernels keyed by opcode.
///
/// Built once per process (or per run) via [`OperatorRegistry::standard`];
/// passes borrow it read-only.
pub struct OperatorRegistry {
    table: HashMap<Opcode, Operator>,
}

impl OperatorRegistry {
    /// Builds the full standard operator table.
    pub fn standard() -> Self {
        let mut table = HashMap::new();

        table.insert(Opcode::Constant, Operator::Source);
        table.insert(Opcode::Leaf, Operator::Source);

        let mut pointwise = |op: Opcode, forward: ForwardFn, gradient: Option<GradientFn>| {
            table.insert(op, Operator::Pointwise { forward, gradient });
        };
        pointwise(Opcode::Add, fwd_add, Some(grad_add));
        pointwise(Opcode::Sub, fwd_sub, Some(grad_sub));
        pointwise(Opcode::Mul, fwd_mul, Some(grad_mul));
        pointwise(Opcode::Div, fwd_div, Some(grad_div));
        pointwise(Opcode::Neg, fwd_neg, Some(grad_neg));
        pointwise(Opcode::Max, fwd_max, Some(grad_max));
        pointwise(Opcode::Min, fwd_min, Some(grad_min));
        pointwise(Opcode::Exp, fwd_exp, Some(grad_exp));
        pointwise(Opcode::Ln, fwd_ln, Some(grad_ln));
        pointwise(Opcode::Sqrt, fwd_sqrt, Some(grad_sqrt));
        pointwise(Opcode::Gt, fwd_gt, None);
        pointwise(Opcode::Lt, fwd_lt, None);
        pointwise(Opcode::Ge, fwd_ge, None);
        pointwise(Opcode::Le, fwd_le, None);
        pointwise(Opcode::Eq, fwd_eq, None);

        table.insert(Opcode::CondExpectation, Operator::CrossPath);

        Self { table }
    }

    /// Looks up an opcode's registered operator.
    ///
    /// # Errors
    ///
    /// `EngineError::UnknownOpcode` when the opcode was never registered.
    pub fn operator(&self, op: Opcode) -> Result<&Operator, EngineError> {
        self.table
            .get(&op)
            .ok_or(EngineError::UnknownOpcode { opcode: op.name() })
    }

    /// Returns the gradient kernel of a differentiable pointwise opcode.
    ///
    /// # Errors
    ///
    /// `EngineError::NonDifferentiable` for comparison opcodes;
    /// `EngineError::UnknownOpcode` for unregistered ones. Source and
    /// cross-path opcodes are not pointwise and also report
    /// `NonDifferentiable`.
    pub fn gradient(&self, op: Opcode) -> Result<GradientFn, EngineError> {
        match self.operator(op)? {
            Operator::Pointwise {
                gradient: Some(g), ..
            } => Ok(*g),
            _ => Err(EngineError::NonDifferentiable { opcode: op.name() }),
        }
    }

    /// Fail-fast setup check before any backward pass: every active
    /// operation node must be differentiable or cross-path.
    ///
    /// # Errors
    ///
    /// `EngineError::NonDifferentiable` naming the first offending opcode.
    pub fn check_differentiable(
        &self,
        graph: &ComputationGraph,
        active: &NodeMask,
    ) -> Result<(), EngineError> {
        for (id, node) in graph.nodes() {
            if !active.is_active(id) {
                continue;
            }
            if let Operator::Pointwise { gradient: None, .. } = self.operator(node.opcode())? {
                return Err(EngineError::NonDifferentiable {
                    opcode: node.opcode().name(),
                });
            }
        }
        Ok(())
    }
}
