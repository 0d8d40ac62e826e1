//! Avellaneda-Stoikov quoting engine.
//!
//! The pricing pieces (volatility, spreads, sizing, risk) are plain values
//! with no I/O. [`QuoteCycleController`] drives them against an
//! [`ExchangeAdapter`](crate::exchange::ExchangeAdapter), owning the mutable
//! [`EngineState`] for the lifetime of the loop.

pub mod config;
pub mod execution;
pub mod inventory;
pub mod market_data;
pub mod risk;
pub mod sizing;
pub mod spreads;
pub mod strategy;
pub mod types;
pub mod volatility;

pub use config::{OrderSizeMode, QuoterConfig, ReservationProfile, StrategyPreset};
pub use execution::{CycleOutcome, CyclePhase, QuoteCycleController};
pub use inventory::{FillReconciler, InventorySnapshot, InventoryState};
pub use risk::{RiskBreach, RiskDecision, RiskGate};
pub use sizing::PositionSizer;
pub use spreads::{QuoteCalculator, QuoteComputation, SpreadBounds};
pub use strategy::{AvellanedaStrategy, EngineState, StrategyDecision};
pub use types::{CycleReport, PlacementResult, PriceSample, QuoteContext, QuoteSet, StrategyClock};
pub use volatility::VolEstimator;
