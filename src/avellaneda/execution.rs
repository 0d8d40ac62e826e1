//! Quote cycle controller.
//!
//! One task runs the whole loop: fetch the book, update volatility, reconcile
//! fills, check risk, price, then cancel and re-place both sides. Cycles never
//! overlap, so at most one replacement is ever in flight, and every adapter
//! call is bounded by the configured request timeout.

use super::{
    config::QuoterConfig,
    risk::{RiskBreach, RiskDecision},
    strategy::{AvellanedaStrategy, EngineState, StrategyDecision},
    types::{CycleReport, PlacementResult, QuoteSet},
};
use crate::{
    errors::{AdapterError, AdapterResult, QuoterError, Result},
    exchange::ExchangeAdapter,
    types::{InstrumentRules, OrderSide},
};
use chrono::Utc;
use std::{
    fmt,
    future::Future,
    time::{Duration, Instant},
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    FetchingMarket,
    RiskChecking,
    Computing,
    Replacing,
    Sleeping,
    ShuttingDown,
}

impl CyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FetchingMarket => "fetching_market",
            Self::RiskChecking => "risk_checking",
            Self::Computing => "computing",
            Self::Replacing => "replacing",
            Self::Sleeping => "sleeping",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a cycle that did not fault ended.
#[derive(Clone, Debug)]
pub enum CycleOutcome {
    Quoted(CycleReport),
    Withdrawn(RiskBreach),
    Skipped(&'static str),
}

/// Bound an adapter call by `after`, folding an elapsed deadline into
/// [`AdapterError::Timeout`].
pub async fn with_timeout<T, F>(operation: &'static str, after: Duration, call: F) -> Result<T>
where
    F: Future<Output = AdapterResult<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result.map_err(QuoterError::from),
        Err(_) => Err(AdapterError::Timeout { operation, after }.into()),
    }
}

pub struct QuoteCycleController<A> {
    adapter: A,
    config: QuoterConfig,
    strategy: AvellanedaStrategy,
    state: EngineState,
    rules: Option<InstrumentRules>,
    phase: CyclePhase,
}

impl<A: ExchangeAdapter> QuoteCycleController<A> {
    /// Validates `config`; an invalid configuration never reaches the loop.
    pub fn new(adapter: A, config: QuoterConfig) -> Result<Self> {
        config.validate()?;
        let strategy = AvellanedaStrategy::new(&config);
        let state = EngineState::new(&config, Instant::now());
        Ok(Self {
            adapter,
            config,
            strategy,
            state,
            rules: None,
            phase: CyclePhase::Idle,
        })
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn config(&self) -> &QuoterConfig {
        &self.config
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Quote until `stop` turns true (or its sender is dropped), then cancel
    /// every resting order.
    ///
    /// The flag is checked between cycles; a cycle in progress always runs to
    /// completion. Sleeps are cut short by a change on `stop`.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> Result<()> {
        info!(
            instrument = %self.config.instrument,
            gamma = self.config.gamma,
            kappa = self.config.kappa,
            horizon_h = self.config.time_horizon_hours,
            interval_ms = self.config.update_interval_ms,
            "quoting loop started"
        );

        loop {
            if stop_requested(&mut stop) {
                break;
            }
            let started = Instant::now();
            let delay = match self.run_cycle().await {
                Ok(CycleOutcome::Quoted(report)) => {
                    info!(instrument = %self.config.instrument, "{}", report);
                    self.config.update_interval().saturating_sub(started.elapsed())
                }
                Ok(CycleOutcome::Skipped(reason)) => {
                    info!(instrument = %self.config.instrument, reason, "cycle skipped");
                    self.config.update_interval().saturating_sub(started.elapsed())
                }
                Ok(CycleOutcome::Withdrawn(breach)) => {
                    warn!(
                        instrument = %self.config.instrument,
                        %breach,
                        cooldown_ms = self.config.risk_cooldown_ms,
                        "risk limit hit, quotes withdrawn"
                    );
                    self.config.risk_cooldown()
                }
                Err(QuoterError::MarketDataUnavailable(reason)) => {
                    warn!(
                        instrument = %self.config.instrument,
                        %reason,
                        retry_ms = self.config.market_retry_delay_ms,
                        "market data unavailable"
                    );
                    self.config.market_retry_delay()
                }
                Err(err) => {
                    error!(
                        instrument = %self.config.instrument,
                        phase = %self.phase,
                        kind = err.kind(),
                        error = %err,
                        backoff_ms = self.config.error_backoff_ms,
                        "quote cycle failed"
                    );
                    self.config.error_backoff()
                }
            };

            self.phase = CyclePhase::Sleeping;
            if sleep_or_stop(delay, &mut stop).await {
                break;
            }
        }

        self.phase = CyclePhase::ShuttingDown;
        info!(instrument = %self.config.instrument, "stop requested, withdrawing quotes");
        let cleanup = self.withdraw_all().await;
        if let Err(err) = &cleanup {
            error!(instrument = %self.config.instrument, error = %err, "cleanup cancel failed");
        }
        self.phase = CyclePhase::Idle;
        cleanup
    }

    /// One pass through the state machine. Faults are returned to the caller
    /// untouched; `run` decides how long to back off.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let timeout = self.config.request_timeout();
        let instrument = self.config.instrument.clone();

        self.phase = CyclePhase::FetchingMarket;
        let book = with_timeout("order_book", timeout, self.adapter.order_book(&instrument)).await?;
        let now = Instant::now();
        let tick = self.state.observe_book(&book, now)?;

        if self.state.fills_due(now) {
            let since_ms = self.state.fill_query_since(Utc::now().timestamp_millis());
            let fills = with_timeout(
                "recent_fills",
                timeout,
                self.adapter.recent_fills(&instrument, since_ms),
            )
            .await?;
            let applied = self.state.reconcile_fills(fills, now);
            if applied > 0 {
                info!(
                    %instrument,
                    applied,
                    position = self.state.inventory().position(),
                    realized_pnl = self.state.inventory().realized_pnl(),
                    "fills reconciled"
                );
            }
        }

        self.phase = CyclePhase::RiskChecking;
        let today = Utc::now().date_naive();
        if let RiskDecision::Deny(breach) = self.strategy.risk_check(&mut self.state, tick.mid, today) {
            self.withdraw_all().await?;
            return Ok(CycleOutcome::Withdrawn(breach));
        }

        self.phase = CyclePhase::Computing;
        let rules = self.instrument_rules().await?;
        let balance = if self.strategy.needs_balance() {
            let currency = instrument.quote_currency();
            with_timeout(
                "available_balance",
                timeout,
                self.adapter.available_balance(currency),
            )
            .await?
        } else {
            0.0
        };
        let quotes = match self.strategy.compute(&mut self.state, &tick, &rules, balance) {
            StrategyDecision::Quote { quotes, context } => {
                debug!(
                    reservation = context.reservation_price,
                    raw_spread_bps = context.raw_spread_bps,
                    effective_spread_bps = context.effective_spread_bps,
                    t_rem_h = context.time_remaining_hours,
                    "quote computed"
                );
                quotes
            }
            StrategyDecision::Skip(reason) => return Ok(CycleOutcome::Skipped(reason)),
        };

        let placement = self.replace_quotes(&quotes).await?;
        Ok(CycleOutcome::Quoted(self.state.report(&tick, quotes, placement)))
    }

    /// Cancel every resting order for the instrument and drop the live quotes.
    pub async fn withdraw_all(&mut self) -> Result<()> {
        self.cancel_resting().await?;
        self.state.forget_quotes();
        Ok(())
    }

    async fn cancel_resting(&mut self) -> Result<()> {
        let instrument = &self.config.instrument;
        with_timeout(
            "cancel_all_orders",
            self.config.request_timeout(),
            self.adapter.cancel_all_orders(instrument),
        )
        .await?;
        debug!(%instrument, "all orders cancelled");
        Ok(())
    }

    async fn instrument_rules(&mut self) -> Result<InstrumentRules> {
        if let Some(rules) = &self.rules {
            return Ok(rules.clone());
        }
        let rules = with_timeout(
            "instrument_rules",
            self.config.request_timeout(),
            self.adapter.instrument_rules(&self.config.instrument),
        )
        .await?;
        self.rules = Some(rules.clone());
        Ok(rules)
    }

    /// Cancel first; a failed cancel aborts before anything new is stacked on
    /// top of orders in an unknown state. The two sides are then placed
    /// independently.
    async fn replace_quotes(&mut self, quotes: &QuoteSet) -> Result<PlacementResult> {
        self.phase = CyclePhase::Replacing;
        self.cancel_resting().await?;

        let timeout = self.config.request_timeout();
        let instrument = &self.config.instrument;
        let mut placement = PlacementResult::default();
        for side in [OrderSide::Buy, OrderSide::Sell] {
            let price = quotes.price(side);
            if !(price.is_finite() && price > 0.0) {
                warn!(%instrument, %side, price, size = quotes.size, "skipping non-positive quote");
                continue;
            }
            let placed = with_timeout(
                "place_limit_order",
                timeout,
                self.adapter
                    .place_limit_order(instrument, side, quotes.size, price),
            )
            .await;
            match placed {
                Ok(handle) => {
                    debug!(%instrument, %side, order_id = %handle.id, price, size = quotes.size, "quote placed");
                    match side {
                        OrderSide::Buy => placement.bid_placed = true,
                        OrderSide::Sell => placement.ask_placed = true,
                    }
                }
                Err(err) => {
                    warn!(
                        %instrument,
                        %side,
                        price,
                        size = quotes.size,
                        error = %err,
                        "failed to place quote"
                    );
                }
            }
        }
        if !(placement.bid_placed || placement.ask_placed) {
            self.state.forget_quotes();
        }
        self.state.record_placement(placement);
        Ok(placement)
    }
}

/// True once the flag is set or its sender is gone.
fn stop_requested(stop: &mut watch::Receiver<bool>) -> bool {
    *stop.borrow_and_update() || stop.has_changed().is_err()
}

/// Sleep for `delay` unless `stop` changes first. Returns whether to stop.
/// A dropped sender counts as a stop request.
async fn sleep_or_stop(delay: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if delay.is_zero() {
        return stop_requested(stop);
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => stop_requested(stop),
        changed = stop.changed() => match changed {
            Ok(()) => *stop.borrow(),
            Err(_) => true,
        },
    }
}
