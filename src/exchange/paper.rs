//! In-memory paper exchange.
//!
//! Keeps a single top-of-book, a list of resting limit orders and the fills
//! they produce when the book trades through them. Every adapter call is
//! recorded so callers can inspect exactly what the quoting loop did, and any
//! operation can be made to fail once for fault-path testing.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use super::ExchangeAdapter;
use crate::{
    errors::{AdapterError, AdapterResult},
    types::{Fill, Instrument, InstrumentRules, OrderBookTop, OrderHandle, OrderSide},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PaperOperation {
    OrderBook,
    RecentFills,
    Balance,
    PlaceBuy,
    PlaceSell,
    CancelAll,
    Rules,
}

impl PaperOperation {
    fn for_side(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => Self::PlaceBuy,
            OrderSide::Sell => Self::PlaceSell,
        }
    }
}

/// Mutating calls observed by the paper exchange, in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum PaperAction {
    CancelAll { cancelled: usize },
    Placed(OrderHandle),
    Filled(Fill),
}

struct PaperState {
    book: OrderBookTop,
    rules: InstrumentRules,
    balances: HashMap<String, f64>,
    fee_rate: f64,
    resting: Vec<OrderHandle>,
    fills: Vec<Fill>,
    failures: HashMap<PaperOperation, String>,
    calls: HashMap<PaperOperation, usize>,
    actions: Vec<PaperAction>,
    latency: Option<Duration>,
    next_order_id: u64,
    next_fill_id: u64,
}

impl PaperState {
    /// Count the call, then fail it if a failure was queued for `op`.
    fn enter(&mut self, op: PaperOperation) -> AdapterResult<()> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.remove(&op) {
            Some(message) => Err(AdapterError::Request(message)),
            None => Ok(()),
        }
    }

    fn match_resting(&mut self) {
        let (Some(bid), Some(ask)) = (self.book.best_bid, self.book.best_ask) else {
            return;
        };
        let now_ms = Utc::now().timestamp_millis();
        let mut still_resting = Vec::with_capacity(self.resting.len());
        for order in std::mem::take(&mut self.resting) {
            let crossed = match order.side {
                OrderSide::Buy => order.price >= ask,
                OrderSide::Sell => order.price <= bid,
            };
            if !crossed {
                still_resting.push(order);
                continue;
            }
            self.next_fill_id += 1;
            let fill = Fill {
                id: format!("paper-fill-{}", self.next_fill_id),
                side: order.side,
                quantity: order.quantity,
                price: order.price,
                fee_cost: order.quantity * order.price * self.fee_rate,
                timestamp_ms: now_ms,
            };
            debug!(order_id = %order.id, side = %order.side, price = order.price, qty = order.quantity, "paper fill");
            self.actions.push(PaperAction::Filled(fill.clone()));
            self.fills.push(fill);
        }
        self.resting = still_resting;
    }
}

/// Cloneable handle; clones share the same book and order state.
#[derive(Clone)]
pub struct PaperExchange {
    inner: Arc<Mutex<PaperState>>,
}

impl PaperExchange {
    pub fn new(rules: InstrumentRules) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PaperState {
                book: OrderBookTop::empty(),
                rules,
                balances: HashMap::new(),
                fee_rate: 0.0,
                resting: Vec::new(),
                fills: Vec::new(),
                failures: HashMap::new(),
                calls: HashMap::new(),
                actions: Vec::new(),
                latency: None,
                next_order_id: 0,
                next_fill_id: 0,
            })),
        }
    }

    /// Fee charged on fills as a fraction of notional.
    pub async fn set_fee_rate(&self, fee_rate: f64) {
        self.inner.lock().await.fee_rate = fee_rate;
    }

    /// Move the top of book. Resting orders the new book trades through are filled
    /// at their own limit price.
    pub async fn set_book(&self, best_bid: f64, best_ask: f64) {
        let mut state = self.inner.lock().await;
        state.book = OrderBookTop::new(best_bid, best_ask);
        state.match_resting();
    }

    /// Install a book as-is, one-sided or crossed, without matching.
    pub async fn set_raw_book(&self, book: OrderBookTop) {
        self.inner.lock().await.book = book;
    }

    pub async fn set_balance(&self, currency: &str, amount: f64) {
        self.inner
            .lock()
            .await
            .balances
            .insert(currency.to_string(), amount);
    }

    /// Inject an externally produced fill (e.g. a manual trade).
    pub async fn push_fill(&self, fill: Fill) {
        self.inner.lock().await.fills.push(fill);
    }

    /// Make the next call of `op` fail with `message`.
    pub async fn fail_next(&self, op: PaperOperation, message: impl Into<String>) {
        self.inner.lock().await.failures.insert(op, message.into());
    }

    /// Delay every call by `latency`, used to exercise request timeouts.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.inner.lock().await.latency = latency;
    }

    pub async fn resting_orders(&self) -> Vec<OrderHandle> {
        self.inner.lock().await.resting.clone()
    }

    pub async fn actions(&self) -> Vec<PaperAction> {
        self.inner.lock().await.actions.clone()
    }

    pub async fn fills(&self) -> Vec<Fill> {
        self.inner.lock().await.fills.clone()
    }

    /// How many times `op` has been called, failed calls included.
    pub async fn calls(&self, op: PaperOperation) -> usize {
        self.inner.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    async fn simulate_latency(&self) {
        let latency = self.inner.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ExchangeAdapter for PaperExchange {
    async fn order_book(&self, _instrument: &Instrument) -> AdapterResult<OrderBookTop> {
        self.simulate_latency().await;
        let mut state = self.inner.lock().await;
        state.enter(PaperOperation::OrderBook)?;
        Ok(state.book)
    }

    async fn recent_fills(
        &self,
        _instrument: &Instrument,
        since_ms: i64,
    ) -> AdapterResult<Vec<Fill>> {
        self.simulate_latency().await;
        let mut state = self.inner.lock().await;
        state.enter(PaperOperation::RecentFills)?;
        Ok(state
            .fills
            .iter()
            .filter(|fill| fill.timestamp_ms >= since_ms)
            .cloned()
            .collect())
    }

    async fn available_balance(&self, currency: &str) -> AdapterResult<f64> {
        self.simulate_latency().await;
        let mut state = self.inner.lock().await;
        state.enter(PaperOperation::Balance)?;
        Ok(state.balances.get(currency).copied().unwrap_or(0.0))
    }

    async fn place_limit_order(
        &self,
        _instrument: &Instrument,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> AdapterResult<OrderHandle> {
        self.simulate_latency().await;
        let mut state = self.inner.lock().await;
        state.enter(PaperOperation::for_side(side))?;
        if quantity < state.rules.min_quantity || quantity <= 0.0 {
            return Err(AdapterError::Rejected(format!(
                "quantity {} below minimum {}",
                quantity, state.rules.min_quantity
            )));
        }
        if price <= 0.0 {
            return Err(AdapterError::Rejected(format!("invalid price {}", price)));
        }
        state.next_order_id += 1;
        let handle = OrderHandle {
            id: format!("paper-{}", state.next_order_id),
            side,
            quantity,
            price,
        };
        state.resting.push(handle.clone());
        state.actions.push(PaperAction::Placed(handle.clone()));
        Ok(handle)
    }

    async fn cancel_all_orders(&self, _instrument: &Instrument) -> AdapterResult<()> {
        self.simulate_latency().await;
        let mut state = self.inner.lock().await;
        state.enter(PaperOperation::CancelAll)?;
        let cancelled = state.resting.len();
        state.resting.clear();
        state.actions.push(PaperAction::CancelAll { cancelled });
        Ok(())
    }

    async fn instrument_rules(&self, _instrument: &Instrument) -> AdapterResult<InstrumentRules> {
        self.simulate_latency().await;
        let mut state = self.inner.lock().await;
        state.enter(PaperOperation::Rules)?;
        Ok(state.rules.clone())
    }
}
