use super::{
    config::QuoterConfig,
    inventory::{FillReconciler, InventorySnapshot, InventoryState},
    market_data::{MarketDataState, MarketTick},
    risk::{RiskDecision, RiskGate},
    sizing::PositionSizer,
    spreads::QuoteCalculator,
    types::{CycleReport, PlacementResult, PriceSample, QuoteContext, QuoteSet, StrategyClock},
    volatility::VolEstimator,
};
use crate::{
    errors::Result,
    trading_helpers::spread_to_bps,
    types::{Fill, InstrumentRules, OrderBookTop},
};
use chrono::NaiveDate;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Everything the quoting loop mutates between cycles.
///
/// Owned by the controller and lent out `&mut` to each cycle step; nothing
/// here is shared or locked.
#[derive(Clone, Debug)]
pub struct EngineState {
    volatility: VolEstimator,
    inventory: InventoryState,
    fills: FillReconciler,
    clock: StrategyClock,
    market_data: MarketDataState,
    last_quotes: Option<QuoteSet>,
    last_context: Option<QuoteContext>,
    quotes_placed: u64,
    warmup_logged: bool,
}

impl EngineState {
    pub fn new(config: &QuoterConfig, start: Instant) -> Self {
        Self {
            volatility: VolEstimator::new(
                config.sigma_lookback,
                config.sigma_scale_factor,
                config.sigma_floor,
                config.initial_sigma,
            ),
            inventory: InventoryState::new(),
            fills: FillReconciler::new(
                config.fill_check_interval(),
                Duration::from_secs(config.fill_lookback_secs),
            ),
            clock: StrategyClock::new(start, config.time_horizon_hours),
            market_data: MarketDataState::new(),
            last_quotes: None,
            last_context: None,
            quotes_placed: 0,
            warmup_logged: false,
        }
    }

    /// Validate the book and feed its mid into volatility and inventory marks.
    pub fn observe_book(&mut self, book: &OrderBookTop, now: Instant) -> Result<MarketTick> {
        let tick = self.market_data.on_book(book, now)?;
        if let Some(sample) = PriceSample::new(tick.mid, tick.timestamp) {
            self.volatility.update(sample);
        }
        self.inventory.update_mid(tick.mid);

        if !self.warmup_logged && self.volatility.is_warmed_up() {
            info!(
                sigma = self.volatility.current(),
                samples = self.volatility.len(),
                "volatility estimator warmed up"
            );
            self.warmup_logged = true;
        }
        Ok(tick)
    }

    pub fn fills_due(&self, now: Instant) -> bool {
        self.fills.is_due(now)
    }

    pub fn fill_query_since(&self, now_ms: i64) -> i64 {
        self.fills.since_ms(now_ms)
    }

    /// Apply the fills not seen before; returns how many were new.
    pub fn reconcile_fills(&mut self, fills: Vec<Fill>, now: Instant) -> usize {
        let fresh = self.fills.accept(fills, now);
        for fill in &fresh {
            debug!(
                id = %fill.id,
                side = %fill.side,
                qty = fill.quantity,
                price = fill.price,
                fee = fill.fee_cost,
                "applying fill"
            );
            self.inventory.apply_fill(fill);
        }
        fresh.len()
    }

    pub fn record_placement(&mut self, placement: PlacementResult) {
        self.quotes_placed += u64::from(placement.bid_placed) + u64::from(placement.ask_placed);
    }

    /// Drop the live quote pair once nothing from it rests on the book.
    pub fn forget_quotes(&mut self) {
        self.last_quotes = None;
    }

    pub fn sigma(&self) -> f64 {
        self.volatility.current()
    }

    pub fn volatility(&self) -> &VolEstimator {
        &self.volatility
    }

    pub fn inventory(&self) -> &InventoryState {
        &self.inventory
    }

    pub fn last_tick(&self) -> Option<&MarketTick> {
        self.market_data.last_tick()
    }

    pub fn last_quotes(&self) -> Option<&QuoteSet> {
        self.last_quotes.as_ref()
    }

    pub fn last_context(&self) -> Option<&QuoteContext> {
        self.last_context.as_ref()
    }

    pub fn quotes_placed(&self) -> u64 {
        self.quotes_placed
    }

    pub fn inventory_snapshot(&self) -> InventorySnapshot {
        self.inventory.snapshot()
    }

    pub fn report(&self, tick: &MarketTick, quotes: QuoteSet, placement: PlacementResult) -> CycleReport {
        let snapshot = self.inventory.snapshot();
        CycleReport {
            mid: tick.mid,
            spread_bps: spread_to_bps(quotes.ask - quotes.bid, tick.mid),
            sigma: self.volatility.current(),
            time_remaining_hours: self.clock.time_remaining(tick.timestamp),
            time_remaining_fraction: self.clock.time_remaining_fraction(tick.timestamp),
            inventory: snapshot.position,
            inventory_usd: snapshot.position_usd,
            quotes,
            trades: snapshot.trade_count,
            realized_pnl: snapshot.realized_pnl,
            mark_to_market_pnl: snapshot.mark_to_market_pnl,
            placement,
        }
    }
}

/// Outcome of the pricing step for one cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum StrategyDecision {
    Quote {
        quotes: QuoteSet,
        context: QuoteContext,
    },
    Skip(&'static str),
}

/// Immutable pricing pipeline: risk gate, quote calculator and sizer built
/// once from the validated configuration.
#[derive(Clone, Debug)]
pub struct AvellanedaStrategy {
    calculator: QuoteCalculator,
    sizer: PositionSizer,
    risk: RiskGate,
}

impl AvellanedaStrategy {
    pub fn new(config: &QuoterConfig) -> Self {
        Self {
            calculator: QuoteCalculator::from_config(config),
            sizer: PositionSizer::from_config(config),
            risk: RiskGate::from_config(config),
        }
    }

    pub fn needs_balance(&self) -> bool {
        self.sizer.needs_balance()
    }

    pub fn risk_check(&self, state: &mut EngineState, mid: f64, today: NaiveDate) -> RiskDecision {
        let daily_pnl = state.inventory.daily_pnl(today);
        self.risk.check(state.inventory.position(), mid, daily_pnl)
    }

    /// Price and size the next quote pair from the current state.
    pub fn compute(
        &self,
        state: &mut EngineState,
        tick: &MarketTick,
        rules: &InstrumentRules,
        available_balance: f64,
    ) -> StrategyDecision {
        let inventory = state.inventory.position();
        let time_remaining = state.clock.time_remaining(tick.timestamp);
        let computed = self.calculator.compute(
            tick.mid,
            inventory,
            state.volatility.current(),
            time_remaining,
            rules.price_granularity,
        );

        let Some(size) = self
            .sizer
            .size(tick.mid, inventory, available_balance, rules)
        else {
            return StrategyDecision::Skip("no_positive_size");
        };

        let quotes = QuoteSet {
            bid: computed.bid,
            ask: computed.ask,
            size,
        };
        state.last_quotes = Some(quotes);
        state.last_context = Some(computed.context.clone());
        StrategyDecision::Quote {
            quotes,
            context: computed.context,
        }
    }
}
