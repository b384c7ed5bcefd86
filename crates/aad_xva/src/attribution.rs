//! Per-trade sensitivity attribution by segmented replay.
//!
//! One full forward pass prices the portfolio while keeping only the model
//! prefix and the aggregation suffix resident; trade internals are freed
//! as aggregation consumes them. A backward pass restricted to the
//! aggregation suffix then plants an adjoint seed at every trade's value
//! node. Each trade is finally replayed on its own: a forward pass over
//! its private range restores its values, and a backward pass over the
//! model prefix plus that range carries the seed down to the parameter
//! leaves. The parameter adjoints read after each replay are that trade's
//! marginal contribution, and peak memory is bounded by the largest single
//! trade rather than the portfolio.
//!
//! Replay is exact, not approximate: every pass reuses the same draws and
//! the same cached regression fits, so per-trade marginals sum to the
//! unrestricted totals to rounding.

use aad_core::types::NodeId;
use aad_engine::error::EngineError;
use aad_engine::liveness::{NodeMask, RequirementMap};
use aad_engine::ops::OperatorRegistry;
use aad_engine::regression::{RegressionCache, DEFAULT_DEGREE};
use aad_engine::store::{PassGuard, ValueStore};
use aad_engine::{backward, forward};
use thiserror::Error;

use crate::portfolio::{Portfolio, TradeId};
use crate::rng::PathRng;

/// Run settings for an attribution.
#[derive(Debug, Clone)]
pub struct AttributionConfig {
    /// Number of Monte Carlo paths.
    pub n_paths: usize,
    /// Seed for the draw simulation.
    pub seed: u64,
    /// Polynomial degree for conditional-expectation regressions.
    pub regression_degree: usize,
}

impl AttributionConfig {
    /// Settings with the default regression degree.
    pub fn new(n_paths: usize, seed: u64) -> Self {
        Self {
            n_paths,
            seed,
            regression_degree: DEFAULT_DEGREE,
        }
    }
}

/// One trade's value and its marginal parameter sensitivities.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TradeSensitivity {
    /// The trade.
    pub trade: TradeId,
    /// Expected trade value across paths.
    pub value: f64,
    /// Marginal sensitivity per parameter, in parameter registration
    /// order.
    pub sensitivities: Vec<f64>,
}

/// The result of a portfolio attribution run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributionReport {
    /// Expected portfolio value across paths.
    pub aggregate: f64,
    /// Parameter names, in registration order.
    pub parameters: Vec<String>,
    /// Portfolio-level sensitivity per parameter: the sum of the per-trade
    /// marginals.
    pub totals: Vec<f64>,
    /// Per-trade breakdown, in compilation order.
    pub trades: Vec<TradeSensitivity>,
}

/// Errors raised by an attribution run.
#[derive(Debug, Error)]
pub enum AttributionError {
    /// An evaluation pass failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// A priced or differentiated quantity came out NaN or infinite.
    #[error("non-finite {quantity}")]
    NonFinite {
        /// What overflowed: the portfolio value or a named sensitivity.
        quantity: String,
    },
}

/// Runs the segmented-replay attribution over a portfolio.
///
/// # Errors
///
/// [`AttributionError::Engine`] when a pass fails — notably
/// [`EngineError::NonDifferentiable`] if a comparison opcode sits in the
/// model or a trade range, raised up front before any pass runs — and
/// [`AttributionError::NonFinite`] when the portfolio value or a total
/// sensitivity is NaN or infinite.
pub fn attribute(
    portfolio: &Portfolio,
    config: &AttributionConfig,
) -> Result<AttributionReport, AttributionError> {
    let graph = portfolio.graph();
    let n = graph.len();
    let registry = OperatorRegistry::standard();
    let requirements = RequirementMap::build(graph);
    let mut regressions = RegressionCache::with_degree(config.regression_degree);

    // Backward passes walk the model prefix and the trade ranges; the
    // aggregation suffix is additions only. Fail fast before simulating.
    let mut differentiated = NodeMask::none(n);
    differentiated.activate_range(NodeId::new(0), portfolio.aggregation_start());
    registry.check_differentiable(graph, &differentiated)?;

    let mut rng = PathRng::from_seed(config.seed);
    let draws = portfolio.simulate(&mut rng, config.n_paths);

    let mut values = ValueStore::new(n);
    let mut derivatives = ValueStore::new(n);

    // Full forward. Kept resident: the model prefix (every replay backward
    // reads those values), the aggregation suffix, and each trade's value
    // node. Everything else inside a trade is freed at its last use.
    let all = NodeMask::all_active(n);
    let mut keep_shared = NodeMask::none(n);
    keep_shared.activate_range(NodeId::new(0), portfolio.model_end());
    keep_shared.activate_range(portfolio.aggregation_start(), NodeId::new(n));
    for trade in portfolio.trades() {
        keep_shared.activate(trade.value());
    }

    portfolio.seed(&mut values, &draws);
    forward::evaluate(
        graph,
        &registry,
        &mut values,
        &mut regressions,
        &requirements,
        &keep_shared,
        &all,
    )?;

    let aggregate = values.mean(portfolio.aggregate());
    if !aggregate.is_finite() {
        return Err(AttributionError::NonFinite {
            quantity: "portfolio value".to_string(),
        });
    }

    // Backward over the aggregation suffix alone. This plants the adjoint
    // of the portfolio with respect to each trade's value — 1.0 for a sum
    // — at the trade value nodes, where it waits for that trade's replay.
    derivatives.seed_scalar(portfolio.aggregate(), 1.0);
    let mut aggregation = NodeMask::none(n);
    aggregation.activate_range(portfolio.aggregation_start(), NodeId::new(n));
    let keep_none = NodeMask::none(n);
    backward::propagate(
        graph,
        &registry,
        &values,
        &mut derivatives,
        &regressions,
        &keep_none,
        &aggregation,
    )?;

    // Per-trade replay, sequential: each iteration owns the one shared
    // derivative store, and parameter adjoint slots are read and cleared
    // before the next trade accumulates into them.
    let parameter_count = portfolio.parameters().len();
    let mut totals = vec![0.0; parameter_count];
    let mut trades = Vec::with_capacity(portfolio.trades().len());

    let mut keep_parameters = NodeMask::none(n);
    for parameter in portfolio.parameters() {
        keep_parameters.activate(parameter.node());
    }

    for trade in portfolio.trades() {
        let mut replay_forward = NodeMask::none(n);
        replay_forward.activate_range(trade.first(), trade.last());

        // The whole private range stays resident for the trade's backward.
        let mut keep_trade = keep_shared.clone();
        keep_trade.activate_range(trade.first(), trade.last());

        let mut replay_backward = NodeMask::none(n);
        replay_backward.activate_range(NodeId::new(0), portfolio.model_end());
        replay_backward.activate_range(trade.first(), trade.last());

        // Guards release the trade's private value and adjoint ranges on
        // scope exit, error paths included.
        let mut trade_values =
            PassGuard::new(&mut values).with_range(trade.first(), trade.last());
        let mut trade_derivatives =
            PassGuard::new(&mut derivatives).with_range(trade.first(), trade.last());

        // The full pass freed trade-range constants at their last use.
        graph.seed_constants(&mut trade_values);
        forward::evaluate(
            graph,
            &registry,
            &mut trade_values,
            &mut regressions,
            &requirements,
            &keep_trade,
            &replay_forward,
        )?;
        let value = trade_values.mean(trade.value());

        backward::propagate(
            graph,
            &registry,
            &trade_values,
            &mut trade_derivatives,
            &regressions,
            &keep_parameters,
            &replay_backward,
        )?;

        let mut sensitivities = Vec::with_capacity(parameter_count);
        for (parameter, total) in portfolio.parameters().iter().zip(totals.iter_mut()) {
            let marginal = trade_derivatives.mean(parameter.node());
            *total += marginal;
            sensitivities.push(marginal);
            trade_derivatives.release(parameter.node());
        }

        trades.push(TradeSensitivity {
            trade: trade.id().clone(),
            value,
            sensitivities,
        });
    }

    for (parameter, total) in portfolio.parameters().iter().zip(&totals) {
        if !total.is_finite() {
            return Err(AttributionError::NonFinite {
                quantity: format!("sensitivity to '{}'", parameter.name()),
            });
        }
    }

    Ok(AttributionReport {
        aggregate,
        parameters: portfolio
            .parameters()
            .iter()
            .map(|p| p.name().to_string())
            .collect(),
        totals,
        trades,
    })
}

/// Prices the portfolio and differentiates it in one unrestricted
/// forward/backward pair, with every value kept resident.
///
/// This is the memory-unbounded reference the segmented replay must agree
/// with; it is also the cheaper choice when no per-trade breakdown is
/// needed and the graph fits in memory.
///
/// # Errors
///
/// Same conditions as [`attribute`].
pub fn total_sensitivities(
    portfolio: &Portfolio,
    config: &AttributionConfig,
) -> Result<(f64, Vec<f64>), AttributionError> {
    let graph = portfolio.graph();
    let n = graph.len();
    let registry = OperatorRegistry::standard();
    let requirements = RequirementMap::build(graph);
    let mut regressions = RegressionCache::with_degree(config.regression_degree);

    let mut differentiated = NodeMask::none(n);
    differentiated.activate_range(NodeId::new(0), portfolio.aggregation_start());
    registry.check_differentiable(graph, &differentiated)?;

    let mut rng = PathRng::from_seed(config.seed);
    let draws = portfolio.simulate(&mut rng, config.n_paths);

    let all = NodeMask::all_active(n);
    let keep_all = NodeMask::all_active(n);

    let mut values = ValueStore::new(n);
    portfolio.seed(&mut values, &draws);
    forward::evaluate(
        graph,
        &registry,
        &mut values,
        &mut regressions,
        &requirements,
        &keep_all,
        &all,
    )?;
    let aggregate = values.mean(portfolio.aggregate());

    let mut keep_parameters = NodeMask::none(n);
    for parameter in portfolio.parameters() {
        keep_parameters.activate(parameter.node());
    }

    let mut derivatives = ValueStore::new(n);
    derivatives.seed_scalar(portfolio.aggregate(), 1.0);
    backward::propagate(
        graph,
        &registry,
        &values,
        &mut derivatives,
        &regressions,
        &keep_parameters,
        &all,
    )?;

    let totals = portfolio
        .parameters()
        .iter()
        .map(|p| derivatives.mean(p.node()))
        .collect();
    Ok((aggregate, totals))
}
