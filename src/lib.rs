pub mod avellaneda;
pub mod errors;
pub mod exchange;
pub mod logging;
pub mod trading_helpers;
pub mod types;

pub use avellaneda::{
    AvellanedaStrategy, CycleOutcome, CyclePhase, CycleReport, EngineState, OrderSizeMode,
    PositionSizer, QuoteCalculator, QuoteCycleController, QuoteSet, QuoterConfig, RiskDecision,
    RiskGate, VolEstimator,
};
pub use errors::{AdapterError, QuoterError, Result};
pub use exchange::{ExchangeAdapter, PaperExchange};
pub use types::{Fill, Granularity, Instrument, InstrumentRules, OrderBookTop, OrderHandle, OrderSide};
