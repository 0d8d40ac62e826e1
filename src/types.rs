use std::fmt;

use serde::{Deserialize, Serialize};

use crate::trading_helpers::{
    ceil_to_increment, floor_to_increment, round_to_decimals, round_to_increment,
};

/// Exchange symbol, e.g. `ETH/USDT:USDT`.
#[repr(transparent)]
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(pub String);

impl Instrument {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quote asset, `USDT` for `ETH/USDT:USDT`. Falls back to the full symbol
    /// when it carries no `/`.
    pub fn quote_currency(&self) -> &str {
        match self.0.split_once('/') {
            Some((_, rest)) => rest.split(':').next().unwrap_or(rest),
            None => &self.0,
        }
    }
}

impl From<&str> for Instrument {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price or quantity increment accepted by an instrument.
///
/// Exchanges describe precision either as a number of decimal places or as an
/// explicit step (tick size / lot size).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Decimals(u32),
    Increment(f64),
}

impl Granularity {
    pub fn round(self, value: f64) -> f64 {
        match self {
            Granularity::Decimals(places) => round_to_decimals(value, places),
            Granularity::Increment(step) => round_to_increment(value, step),
        }
    }

    pub fn round_down(self, value: f64) -> f64 {
        match self {
            Granularity::Decimals(places) => round_to_decimals(
                floor_to_increment(value, decimal_step(places)),
                places,
            ),
            Granularity::Increment(step) => floor_to_increment(value, step),
        }
    }

    pub fn round_up(self, value: f64) -> f64 {
        match self {
            Granularity::Decimals(places) => round_to_decimals(
                ceil_to_increment(value, decimal_step(places)),
                places,
            ),
            Granularity::Increment(step) => ceil_to_increment(value, step),
        }
    }
}

fn decimal_step(places: u32) -> f64 {
    10_f64.powi(-(places as i32))
}

/// Declarative trading constraints for one instrument, supplied by the adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRules {
    pub min_quantity: f64,
    /// Minimum `price * size` accepted by the venue, if it enforces one.
    pub min_notional: Option<f64>,
    pub quantity_granularity: Granularity,
    pub price_granularity: Granularity,
}

/// Top of book as reported by the adapter. Either side may be missing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OrderBookTop {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
}

impl OrderBookTop {
    pub fn new(best_bid: f64, best_ask: f64) -> Self {
        Self {
            best_bid: Some(best_bid),
            best_ask: Some(best_ask),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// Own trade execution reported by the adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub fee_cost: f64,
    pub timestamp_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderHandle {
    pub id: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
}
