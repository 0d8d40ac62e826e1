use crate::{
    errors::{QuoterError, Result},
    trading_helpers::{calculate_mid_price, calculate_spread},
    types::OrderBookTop,
};
use std::time::Instant;

#[derive(Clone, Debug, PartialEq)]
pub struct MarketTick {
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
    pub spread: f64,
    pub timestamp: Instant,
}

/// Validate a top of book into a tick. Missing sides, non-positive or
/// non-finite prices and crossed or locked books are all reported as
/// `MarketDataUnavailable`.
pub fn tick_from_book(book: &OrderBookTop, timestamp: Instant) -> Result<MarketTick> {
    let (Some(bid), Some(ask)) = (book.best_bid, book.best_ask) else {
        return Err(QuoterError::MarketDataUnavailable(format!(
            "empty book side (bid={:?}, ask={:?})",
            book.best_bid, book.best_ask
        )));
    };
    if !(bid.is_finite() && ask.is_finite() && bid > 0.0 && ask > 0.0) {
        return Err(QuoterError::MarketDataUnavailable(format!(
            "malformed prices bid={} ask={}",
            bid, ask
        )));
    }
    if ask <= bid {
        return Err(QuoterError::MarketDataUnavailable(format!(
            "crossed book bid={} ask={}",
            bid, ask
        )));
    }
    Ok(MarketTick {
        bid,
        ask,
        mid: calculate_mid_price(bid, ask),
        spread: calculate_spread(bid, ask),
        timestamp,
    })
}

/// Last validated tick, kept for reporting between cycles.
#[derive(Clone, Debug, Default)]
pub struct MarketDataState {
    last_tick: Option<MarketTick>,
}

impl MarketDataState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_book(&mut self, book: &OrderBookTop, timestamp: Instant) -> Result<MarketTick> {
        let tick = tick_from_book(book, timestamp)?;
        self.last_tick = Some(tick.clone());
        Ok(tick)
    }

    pub fn last_tick(&self) -> Option<&MarketTick> {
        self.last_tick.as_ref()
    }
}
