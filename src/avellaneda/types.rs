use crate::types::OrderSide;
use serde::Serialize;
use std::{fmt, time::Instant};

/// Floor applied to the time remaining in a horizon, in hours.
pub const MIN_TIME_REMAINING_HOURS: f64 = 0.01;

/// Timestamped mid-price. Only finite, strictly positive prices can be built.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriceSample {
    price: f64,
    timestamp: Instant,
}

impl PriceSample {
    pub fn new(price: f64, timestamp: Instant) -> Option<Self> {
        if price.is_finite() && price > 0.0 {
            Some(Self { price, timestamp })
        } else {
            None
        }
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

/// Rolling strategy horizon anchored at a fixed start instant.
///
/// The horizon restarts every `horizon_hours` measured from `start`, so the
/// time-decay term cycles independently of the time of day.
#[derive(Clone, Copy, Debug)]
pub struct StrategyClock {
    start: Instant,
    horizon_hours: f64,
}

impl StrategyClock {
    pub fn new(start: Instant, horizon_hours: f64) -> Self {
        Self {
            start,
            horizon_hours,
        }
    }

    pub fn horizon_hours(&self) -> f64 {
        self.horizon_hours
    }

    /// Hours left in the current horizon, never below [`MIN_TIME_REMAINING_HOURS`].
    pub fn time_remaining(&self, now: Instant) -> f64 {
        let elapsed_hours = now.saturating_duration_since(self.start).as_secs_f64() / 3600.0;
        let position = elapsed_hours % self.horizon_hours;
        (self.horizon_hours - position).max(MIN_TIME_REMAINING_HOURS)
    }

    /// Fraction of the horizon still ahead, in `(0, 1]`.
    pub fn time_remaining_fraction(&self, now: Instant) -> f64 {
        (self.time_remaining(now) / self.horizon_hours).min(1.0)
    }
}

/// Bid/ask/size decided for one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QuoteSet {
    pub bid: f64,
    pub ask: f64,
    pub size: f64,
}

impl QuoteSet {
    pub fn price(&self, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => self.bid,
            OrderSide::Sell => self.ask,
        }
    }
}

/// Intermediate values of a quote computation, kept for diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QuoteContext {
    pub reservation_price: f64,
    pub reservation_coefficient: f64,
    pub time_remaining_hours: f64,
    pub raw_spread: f64,
    pub raw_spread_bps: f64,
    pub effective_spread: f64,
    pub effective_spread_bps: f64,
    pub min_distance: f64,
}

/// Which sides made it to the book in a replacement round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlacementResult {
    pub bid_placed: bool,
    pub ask_placed: bool,
}

/// Per-cycle monitoring output.
#[derive(Clone, Debug, Serialize)]
pub struct CycleReport {
    pub mid: f64,
    pub spread_bps: f64,
    pub sigma: f64,
    pub time_remaining_hours: f64,
    /// Share of the current horizon still ahead, in `(0, 1]`.
    pub time_remaining_fraction: f64,
    pub inventory: f64,
    pub inventory_usd: f64,
    pub quotes: QuoteSet,
    pub trades: u64,
    pub realized_pnl: f64,
    pub mark_to_market_pnl: f64,
    pub placement: PlacementResult,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mid={:.4} spread={:.1}bps sigma={:.4} t_rem={:.3}h ({:.0}%) inv={:.4} (${:.2}) bid={:.4} ask={:.4} size={:.4} trades={} pnl={:.2} mtm={:.2}",
            self.mid,
            self.spread_bps,
            self.sigma,
            self.time_remaining_hours,
            self.time_remaining_fraction * 100.0,
            self.inventory,
            self.inventory_usd,
            self.quotes.bid,
            self.quotes.ask,
            self.quotes.size,
            self.trades,
            self.realized_pnl,
            self.mark_to_market_pnl,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn price_sample_rejects_non_positive() {
        let now = Instant::now();
        assert!(PriceSample::new(0.0, now).is_none());
        assert!(PriceSample::new(-1.0, now).is_none());
        assert!(PriceSample::new(f64::NAN, now).is_none());
        assert_eq!(PriceSample::new(2000.0, now).unwrap().price(), 2000.0);
    }

    #[test]
    fn clock_cycles_through_the_horizon() {
        let start = Instant::now();
        let clock = StrategyClock::new(start, 0.1);

        assert!((clock.time_remaining(start) - 0.1).abs() < 1e-12);

        // 3 minutes in: half of a six-minute horizon left.
        let mid_way = start + Duration::from_secs(180);
        assert!((clock.time_remaining(mid_way) - 0.05).abs() < 1e-9);
        assert!((clock.time_remaining_fraction(mid_way) - 0.5).abs() < 1e-9);

        // 9 minutes in: second horizon, again half left.
        let next = start + Duration::from_secs(540);
        assert!((clock.time_remaining(next) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn clock_floors_time_remaining() {
        let start = Instant::now();
        let clock = StrategyClock::new(start, 0.1);
        // 5m59.9s in: 0.1s left, below the floor.
        let almost = start + Duration::from_millis(359_900);
        assert_eq!(clock.time_remaining(almost), MIN_TIME_REMAINING_HOURS);
    }
}
