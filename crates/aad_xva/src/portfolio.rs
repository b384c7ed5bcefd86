//! Portfolio assembly: model prefix, per-trade subgraphs, aggregation.
//!
//! A portfolio's graph is laid out in three contiguous phases. The model
//! prefix holds parameters, draws and derived market quantities every
//! trade may read. Each trade then compiles into its own contiguous node
//! range under its own namespace. Finally an aggregation suffix folds the
//! trade values into one portfolio value with a chain of additions.
//!
//! The phase layout is what per-trade attribution exploits: a trade's
//! node range is private, so replaying it touches no other trade's
//! storage.

use aad_core::types::NodeId;
use aad_engine::error::GraphError;
use aad_engine::graph::{ComputationGraph, Namespace, ScopedGraph};
use aad_engine::ops::Opcode;
use aad_engine::store::ValueStore;
use thiserror::Error;

use crate::model::{ModelParameter, SimulatedDraws};
use crate::rng::PathRng;

/// Identifies one trade within a portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TradeId(String);

impl TradeId {
    /// Creates a trade id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TradeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One trade's contiguous node range `[first, last)` and its value node.
#[derive(Debug, Clone)]
pub struct TradeRange {
    id: TradeId,
    first: NodeId,
    last: NodeId,
    value: NodeId,
}

impl TradeRange {
    /// The trade's id.
    pub fn id(&self) -> &TradeId {
        &self.id
    }

    /// First node of the trade's private range.
    #[inline]
    pub fn first(&self) -> NodeId {
        self.first
    }

    /// One past the last node of the trade's private range.
    #[inline]
    pub fn last(&self) -> NodeId {
        self.last
    }

    /// The node carrying the trade's value.
    #[inline]
    pub fn value(&self) -> NodeId {
        self.value
    }
}

/// Errors raised while assembling a portfolio.
#[derive(Debug, Error, PartialEq)]
pub enum PortfolioError {
    /// A model-phase call arrived after `seal_model`.
    #[error("model layer is already sealed")]
    ModelSealed,
    /// A trade-phase call arrived before `seal_model`.
    #[error("model layer is not sealed yet")]
    ModelOpen,
    /// Two parameters were registered under the same name.
    #[error("duplicate parameter name '{name}'")]
    DuplicateParameter {
        /// The offending name.
        name: String,
    },
    /// Two trades were added under the same id.
    #[error("duplicate trade id '{id}'")]
    DuplicateTrade {
        /// The offending id.
        id: TradeId,
    },
    /// A trade closure produced a value node outside its own range.
    #[error("trade '{id}' value node {value} lies outside its range")]
    TradeValueOutOfRange {
        /// The offending trade.
        id: TradeId,
        /// The node the closure returned.
        value: NodeId,
    },
    /// A portfolio was built with no trades.
    #[error("portfolio has no trades")]
    Empty,
    /// Graph construction failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Builds a [`Portfolio`] in the three-phase layout.
///
/// # Examples
///
/// ```
/// use aad_engine::ops::Opcode;
/// use aad_xva::portfolio::{PortfolioBuilder, TradeId};
///
/// let mut builder = PortfolioBuilder::new();
/// let spot = builder.add_parameter("spot", 100.0).unwrap();
/// builder.seal_model().unwrap();
/// builder
///     .add_trade(TradeId::new("fwd-1"), |g| {
///         let k = g.add_constant(95.0);
///         g.add_operation(Opcode::Sub, &[spot, k])
///     })
///     .unwrap();
/// let portfolio = builder.build().unwrap();
/// assert_eq!(portfolio.trades().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct PortfolioBuilder {
    graph: ComputationGraph,
    parameters: Vec<ModelParameter>,
    draws: Vec<NodeId>,
    model_end: Option<NodeId>,
    trades: Vec<TradeRange>,
}

impl PortfolioBuilder {
    /// Creates an empty builder in the model phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named model parameter as a scalar-seeded leaf and binds
    /// it in the global namespace.
    ///
    /// # Errors
    ///
    /// [`PortfolioError::ModelSealed`] after `seal_model`,
    /// [`PortfolioError::DuplicateParameter`] on a repeated name.
    pub fn add_parameter(&mut self, name: &str, value: f64) -> Result<NodeId, PortfolioError> {
        if self.model_end.is_some() {
            return Err(PortfolioError::ModelSealed);
        }
        if self.parameters.iter().any(|p| p.name() == name) {
            return Err(PortfolioError::DuplicateParameter {
                name: name.to_string(),
            });
        }
        let node = self.graph.add_leaf();
        self.graph.bind(&Namespace::global(), name, node);
        self.parameters
            .push(ModelParameter::new(name.to_string(), node, value));
        Ok(node)
    }

    /// Registers a draw leaf, seeded with one standard normal per path.
    ///
    /// # Errors
    ///
    /// [`PortfolioError::ModelSealed`] after `seal_model`.
    pub fn add_draw(&mut self) -> Result<NodeId, PortfolioError> {
        if self.model_end.is_some() {
            return Err(PortfolioError::ModelSealed);
        }
        let node = self.graph.add_leaf();
        self.draws.push(node);
        Ok(node)
    }

    /// A globally scoped builder view for derived model nodes (discount
    /// factors, simulated underlyings).
    ///
    /// # Errors
    ///
    /// [`PortfolioError::ModelSealed`] after `seal_model`.
    pub fn model(&mut self) -> Result<ScopedGraph<'_>, PortfolioError> {
        if self.model_end.is_some() {
            return Err(PortfolioError::ModelSealed);
        }
        Ok(self.graph.scoped(Namespace::global()))
    }

    /// Closes the model phase. Every node appended so far belongs to the
    /// shared prefix; trades come next.
    ///
    /// # Errors
    ///
    /// [`PortfolioError::ModelSealed`] on a second call.
    pub fn seal_model(&mut self) -> Result<(), PortfolioError> {
        if self.model_end.is_some() {
            return Err(PortfolioError::ModelSealed);
        }
        self.model_end = Some(self.graph.next_id());
        Ok(())
    }

    /// Compiles one trade under its own namespace. The closure appends the
    /// trade's nodes and returns its value node, which is bound as
    /// `"value"` in the trade's namespace.
    ///
    /// # Errors
    ///
    /// [`PortfolioError::ModelOpen`] before `seal_model`,
    /// [`PortfolioError::DuplicateTrade`] on a repeated id,
    /// [`PortfolioError::TradeValueOutOfRange`] when the closure returns a
    /// node it did not append, and any graph error the closure raises.
    pub fn add_trade<F>(&mut self, id: TradeId, build: F) -> Result<NodeId, PortfolioError>
    where
        F: FnOnce(&mut ScopedGraph<'_>) -> Result<NodeId, GraphError>,
    {
        if self.model_end.is_none() {
            return Err(PortfolioError::ModelOpen);
        }
        if self.trades.iter().any(|t| t.id() == &id) {
            return Err(PortfolioError::DuplicateTrade { id });
        }

        let first = self.graph.next_id();
        let value = {
            let mut scope = self.graph.scoped(Namespace::new(id.as_str()));
            let value = build(&mut scope)?;
            scope.bind("value", value);
            value
        };
        let last = self.graph.next_id();
        if value < first || value >= last {
            return Err(PortfolioError::TradeValueOutOfRange { id, value });
        }

        self.trades.push(TradeRange {
            id,
            first,
            last,
            value,
        });
        Ok(value)
    }

    /// Appends the aggregation suffix and freezes the portfolio.
    ///
    /// The suffix is a left fold of additions over the trade values; for a
    /// single trade the suffix is empty and the aggregate is the trade's
    /// own value node.
    ///
    /// # Errors
    ///
    /// [`PortfolioError::ModelOpen`] before `seal_model`,
    /// [`PortfolioError::Empty`] with no trades.
    pub fn build(mut self) -> Result<Portfolio, PortfolioError> {
        let model_end = self.model_end.ok_or(PortfolioError::ModelOpen)?;
        if self.trades.is_empty() {
            return Err(PortfolioError::Empty);
        }

        let aggregation_start = self.graph.next_id();
        let mut aggregate = self.trades[0].value();
        for trade in &self.trades[1..] {
            aggregate = self
                .graph
                .add_operation(Opcode::Add, &[aggregate, trade.value()])?;
        }
        self.graph.bind(&Namespace::global(), "portfolio", aggregate);

        Ok(Portfolio {
            graph: self.graph,
            parameters: self.parameters,
            draws: self.draws,
            model_end,
            trades: self.trades,
            aggregation_start,
            aggregate,
        })
    }
}

/// A frozen portfolio graph with its phase boundaries.
#[derive(Debug)]
pub struct Portfolio {
    graph: ComputationGraph,
    parameters: Vec<ModelParameter>,
    draws: Vec<NodeId>,
    model_end: NodeId,
    trades: Vec<TradeRange>,
    aggregation_start: NodeId,
    aggregate: NodeId,
}

impl Portfolio {
    /// The underlying computation graph.
    pub fn graph(&self) -> &ComputationGraph {
        &self.graph
    }

    /// The model parameters, in registration order.
    pub fn parameters(&self) -> &[ModelParameter] {
        &self.parameters
    }

    /// One past the last model-prefix node.
    #[inline]
    pub fn model_end(&self) -> NodeId {
        self.model_end
    }

    /// The trades, in compilation order.
    pub fn trades(&self) -> &[TradeRange] {
        &self.trades
    }

    /// First node of the aggregation suffix.
    #[inline]
    pub fn aggregation_start(&self) -> NodeId {
        self.aggregation_start
    }

    /// The node carrying the portfolio value.
    #[inline]
    pub fn aggregate(&self) -> NodeId {
        self.aggregate
    }

    /// Simulates one run's draws for every draw leaf.
    pub fn simulate(&self, rng: &mut PathRng, n_paths: usize) -> SimulatedDraws {
        SimulatedDraws::simulate(rng, &self.draws, n_paths)
    }

    /// Seeds constants, parameters and draws into a value store, making it
    /// ready for a forward pass.
    pub fn seed(&self, values: &mut ValueStore, draws: &SimulatedDraws) {
        self.graph.seed_constants(values);
        for parameter in &self.parameters {
            values.seed_scalar(parameter.node(), parameter.value());
        }
        draws.seed(values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_trade_portfolio() -> Portfolio {
        let mut builder = PortfolioBuilder::new();
        let spot = builder.add_parameter("spot", 100.0).unwrap();
        builder.seal_model().unwrap();
        builder
            .add_trade(TradeId::new("a"), |g| {
                let k = g.add_constant(90.0);
                g.add_operation(Opcode::Sub, &[spot, k])
            })
            .unwrap();
        builder
            .add_trade(TradeId::new("b"), |g| {
                let two = g.add_constant(2.0);
                g.add_operation(Opcode::Mul, &[spot, two])
            })
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_phase_ranges_are_contiguous() {
        let p = two_trade_portfolio();
        assert_eq!(p.model_end(), NodeId::new(1));

        let [a, b] = p.trades() else { panic!() };
        assert_eq!(a.first(), NodeId::new(1));
        assert_eq!(a.last(), b.first());
        assert_eq!(b.last(), p.aggregation_start());
        assert!(p.aggregate() >= p.aggregation_start());
        assert_eq!(p.graph().len(), p.aggregate().index() + 1);
    }

    #[test]
    fn test_single_trade_aggregate_is_the_trade_value() {
        let mut builder = PortfolioBuilder::new();
        let spot = builder.add_parameter("spot", 1.0).unwrap();
        builder.seal_model().unwrap();
        let value = builder
            .add_trade(TradeId::new("only"), |g| {
                g.add_operation(Opcode::Exp, &[spot])
            })
            .unwrap();
        let p = builder.build().unwrap();
        assert_eq!(p.aggregate(), value);
        assert_eq!(p.aggregation_start(), NodeId::new(p.graph().len()));
    }

    #[test]
    fn test_model_phase_closes_on_seal() {
        let mut builder = PortfolioBuilder::new();
        builder.add_parameter("r", 0.02).unwrap();
        builder.seal_model().unwrap();
        assert_eq!(
            builder.add_parameter("q", 0.0),
            Err(PortfolioError::ModelSealed)
        );
        assert_eq!(builder.add_draw().unwrap_err(), PortfolioError::ModelSealed);
        assert!(builder.model().is_err());
        assert_eq!(builder.seal_model(), Err(PortfolioError::ModelSealed));
    }

    #[test]
    fn test_trades_require_sealed_model() {
        let mut builder = PortfolioBuilder::new();
        let err = builder
            .add_trade(TradeId::new("early"), |g| Ok(g.add_constant(1.0)))
            .unwrap_err();
        assert_eq!(err, PortfolioError::ModelOpen);
        assert_eq!(
            PortfolioBuilder::new().build().unwrap_err(),
            PortfolioError::ModelOpen
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut builder = PortfolioBuilder::new();
        builder.add_parameter("spot", 1.0).unwrap();
        assert_eq!(
            builder.add_parameter("spot", 2.0),
            Err(PortfolioError::DuplicateParameter {
                name: "spot".to_string()
            })
        );

        builder.seal_model().unwrap();
        builder
            .add_trade(TradeId::new("t"), |g| Ok(g.add_constant(1.0)))
            .unwrap();
        let err = builder
            .add_trade(TradeId::new("t"), |g| Ok(g.add_constant(2.0)))
            .unwrap_err();
        assert_eq!(
            err,
            PortfolioError::DuplicateTrade {
                id: TradeId::new("t")
            }
        );
    }

    #[test]
    fn test_trade_value_must_live_in_its_range() {
        let mut builder = PortfolioBuilder::new();
        let spot = builder.add_parameter("spot", 1.0).unwrap();
        builder.seal_model().unwrap();
        // The closure returns a model node without appending anything.
        let err = builder.add_trade(TradeId::new("t"), |_| Ok(spot)).unwrap_err();
        assert!(matches!(err, PortfolioError::TradeValueOutOfRange { .. }));
    }

    #[test]
    fn test_empty_portfolio_rejected() {
        let mut builder = PortfolioBuilder::new();
        builder.seal_model().unwrap();
        assert_eq!(builder.build().unwrap_err(), PortfolioError::Empty);
    }

    #[test]
    fn test_trade_value_bound_in_namespace() {
        let p = two_trade_portfolio();
        let bound = p
            .graph()
            .lookup(&Namespace::new("a"), "value")
            .unwrap();
        assert_eq!(bound, p.trades()[0].value());
        // The global portfolio binding resolves from any namespace.
        let agg = p.graph().lookup(&Namespace::new("b"), "portfolio").unwrap();
        assert_eq!(agg, p.aggregate());
    }

    #[test]
    fn test_seed_places_constants_parameters_and_draws() {
        let mut builder = PortfolioBuilder::new();
        let spot = builder.add_parameter("spot", 42.0).unwrap();
        let z = builder.add_draw().unwrap();
        builder.seal_model().unwrap();
        let k = std::cell::Cell::new(NodeId::new(0));
        builder
            .add_trade(TradeId::new("t"), |g| {
                let c = g.add_constant(7.0);
                k.set(c);
                g.add_operation(Opcode::Add, &[spot, c])
            })
            .unwrap();
        let p = builder.build().unwrap();

        let draws = p.simulate(&mut PathRng::from_seed(1), 4);
        let mut values = ValueStore::new(p.graph().len());
        p.seed(&mut values, &draws);

        assert_eq!(values.get(spot).at(0), 42.0);
        assert!(values.get(spot).deterministic());
        assert_eq!(values.get(z).len(), 4);
        assert_eq!(values.get(k.get()).at(0), 7.0);
    }
}
