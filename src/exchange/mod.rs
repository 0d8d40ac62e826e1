//! Exchange collaborator seam.
//!
//! The quoting core only talks to an exchange through [`ExchangeAdapter`].
//! Concrete venues (REST/websocket SDKs) live outside this crate; the
//! [`paper`] module ships an in-memory implementation for dry runs and tests.

pub mod paper;

use async_trait::async_trait;

use crate::{
    errors::AdapterResult,
    types::{Fill, Instrument, InstrumentRules, OrderBookTop, OrderHandle, OrderSide},
};

pub use paper::{PaperAction, PaperExchange, PaperOperation};

#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Best bid / best ask. Missing levels are reported as `None`, not as errors.
    async fn order_book(&self, instrument: &Instrument) -> AdapterResult<OrderBookTop>;

    /// Own fills with `timestamp_ms >= since_ms`.
    async fn recent_fills(&self, instrument: &Instrument, since_ms: i64)
        -> AdapterResult<Vec<Fill>>;

    /// Free balance of `currency`.
    async fn available_balance(&self, currency: &str) -> AdapterResult<f64>;

    async fn place_limit_order(
        &self,
        instrument: &Instrument,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> AdapterResult<OrderHandle>;

    async fn cancel_all_orders(&self, instrument: &Instrument) -> AdapterResult<()>;

    async fn instrument_rules(&self, instrument: &Instrument) -> AdapterResult<InstrumentRules>;
}
