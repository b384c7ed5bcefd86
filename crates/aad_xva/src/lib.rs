//! Portfolio-level sensitivity attribution over the adjoint graph engine.
//!
//! This crate is the application layer of the workspace. It assembles a
//! portfolio graph in three contiguous phases — shared model prefix,
//! per-trade subgraphs, aggregation suffix — simulates market draws from a
//! seeded generator, and attributes the portfolio's parameter
//! sensitivities to individual trades by segmented replay: one restricted
//! forward/backward pair per trade, with peak memory bounded by the
//! largest trade instead of the whole book.
//!
//! # Example
//!
//! ```
//! use aad_engine::ops::Opcode;
//! use aad_xva::attribution::{attribute, AttributionConfig};
//! use aad_xva::portfolio::{PortfolioBuilder, TradeId};
//!
//! let mut builder = PortfolioBuilder::new();
//! let spot = builder.add_parameter("spot", 100.0).unwrap();
//! builder.seal_model().unwrap();
//! builder
//!     .add_trade(TradeId::new("fwd"), |g| {
//!         let strike = g.add_constant(95.0);
//!         g.add_operation(Opcode::Sub, &[spot, strike])
//!     })
//!     .unwrap();
//! let portfolio = builder.build().unwrap();
//!
//! let report = attribute(&portfolio, &AttributionConfig::new(128, 7)).unwrap();
//! assert_eq!(report.aggregate, 5.0);
//! assert_eq!(report.totals, vec![1.0]);
//! ```

#![warn(missing_docs)]

pub mod attribution;
pub mod model;
pub mod portfolio;
pub mod rng;

pub use attribution::{attribute, AttributionConfig, AttributionError, AttributionReport};
pub use model::{ModelParameter, SimulatedDraws};
pub use portfolio::{Portfolio, PortfolioBuilder, PortfolioError, TradeId, TradeRange};
pub use rng::PathRng;
