use super::{config::QuoterConfig, types::QuoteContext};
use crate::{
    trading_helpers::{bps_to_price, spread_to_bps},
    types::Granularity,
};

/// Slack for float noise when checking a rounded quote against the minimum
/// distance from mid.
const DISTANCE_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpreadBounds {
    pub min_spread_bps: f64,
    pub max_spread_bps: f64,
}

impl SpreadBounds {
    pub fn min_abs(&self, mid: f64) -> f64 {
        bps_to_price(self.min_spread_bps, mid)
    }

    pub fn max_abs(&self, mid: f64) -> f64 {
        bps_to_price(self.max_spread_bps, mid)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuoteComputation {
    pub bid: f64,
    pub ask: f64,
    pub context: QuoteContext,
}

/// `mid - coefficient * q * sigma^2 * T`.
///
/// # Panics
/// If `mid` is not strictly positive.
pub fn reservation_price(
    mid: f64,
    inventory: f64,
    sigma: f64,
    time_remaining: f64,
    coefficient: f64,
) -> f64 {
    assert!(mid > 0.0, "mid price must be positive, got {}", mid);
    let variance_horizon = (sigma * sigma) * time_remaining;
    mid - coefficient * inventory * variance_horizon
}

/// Unclamped Avellaneda-Stoikov spread as a fraction of price:
/// `gamma * sigma^2 * T + (2 / gamma) * ln(1 + gamma / kappa)`.
pub fn raw_spread(gamma: f64, sigma: f64, time_remaining: f64, kappa: f64) -> f64 {
    let risk_term = gamma * (sigma * sigma) * time_remaining;
    let liquidity_term = (2.0 / gamma) * (1.0 + gamma / kappa).ln();
    risk_term + liquidity_term
}

/// Clamp an absolute spread into the configured band around `mid`.
///
/// Non-finite inputs land on a bound: `+inf` on the maximum, `NaN` on the minimum.
pub fn clamp_spread(spread: f64, mid: f64, bounds: &SpreadBounds) -> f64 {
    spread.max(bounds.min_abs(mid)).min(bounds.max_abs(mid))
}

/// Raw spread converted to price units and clamped to `bounds`.
///
/// # Panics
/// If `mid` is not strictly positive.
pub fn optimal_spread(
    mid: f64,
    sigma: f64,
    time_remaining: f64,
    gamma: f64,
    kappa: f64,
    bounds: &SpreadBounds,
) -> f64 {
    assert!(mid > 0.0, "mid price must be positive, got {}", mid);
    clamp_spread(raw_spread(gamma, sigma, time_remaining, kappa) * mid, mid, bounds)
}

/// Place bid/ask symmetrically around `reservation`, push each side at least
/// `min_distance` away from `mid`, then round to the price grid.
///
/// The distance guarantee is one-sided: each side is checked on its own, so
/// the final quotes may be asymmetric around mid. If rounding to nearest would
/// pull a side back inside the distance, that side is rounded outward instead.
///
/// # Panics
/// If `mid` is not strictly positive.
pub fn quote(
    mid: f64,
    reservation: f64,
    spread: f64,
    min_distance: f64,
    price_granularity: Granularity,
) -> (f64, f64) {
    assert!(mid > 0.0, "mid price must be positive, got {}", mid);
    let half = spread / 2.0;
    let bid = (reservation - half).min(mid - min_distance);
    let ask = (reservation + half).max(mid + min_distance);

    let mut bid_rounded = price_granularity.round(bid);
    if mid - bid_rounded < min_distance - DISTANCE_TOLERANCE {
        bid_rounded = price_granularity.round_down(bid);
    }
    let mut ask_rounded = price_granularity.round(ask);
    if ask_rounded - mid < min_distance - DISTANCE_TOLERANCE {
        ask_rounded = price_granularity.round_up(ask);
    }
    (bid_rounded, ask_rounded)
}

/// Stateless quote pricing built from the immutable configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct QuoteCalculator {
    gamma: f64,
    kappa: f64,
    reservation_coefficient: f64,
    bounds: SpreadBounds,
    min_quote_distance_bps: f64,
}

impl QuoteCalculator {
    pub fn new(
        gamma: f64,
        kappa: f64,
        reservation_coefficient: f64,
        bounds: SpreadBounds,
        min_quote_distance_bps: f64,
    ) -> Self {
        Self {
            gamma,
            kappa,
            reservation_coefficient,
            bounds,
            min_quote_distance_bps,
        }
    }

    pub fn from_config(config: &QuoterConfig) -> Self {
        Self::new(
            config.gamma,
            config.kappa,
            config.reservation_coefficient(),
            SpreadBounds {
                min_spread_bps: config.min_spread_bps,
                max_spread_bps: config.max_spread_bps,
            },
            config.min_quote_distance_bps,
        )
    }

    pub fn bounds(&self) -> &SpreadBounds {
        &self.bounds
    }

    /// # Panics
    /// If `mid` is not strictly positive.
    pub fn compute(
        &self,
        mid: f64,
        inventory: f64,
        sigma: f64,
        time_remaining: f64,
        price_granularity: Granularity,
    ) -> QuoteComputation {
        let reservation = reservation_price(
            mid,
            inventory,
            sigma,
            time_remaining,
            self.reservation_coefficient,
        );
        let raw = raw_spread(self.gamma, sigma, time_remaining, self.kappa);
        let raw_abs = raw * mid;
        let effective = clamp_spread(raw_abs, mid, &self.bounds);
        let min_distance = bps_to_price(self.min_quote_distance_bps, mid);
        let (bid, ask) = quote(mid, reservation, effective, min_distance, price_granularity);

        QuoteComputation {
            bid,
            ask,
            context: QuoteContext {
                reservation_price: reservation,
                reservation_coefficient: self.reservation_coefficient,
                time_remaining_hours: time_remaining,
                raw_spread: raw_abs,
                raw_spread_bps: spread_to_bps(raw_abs, mid),
                effective_spread: effective,
                effective_spread_bps: spread_to_bps(effective, mid),
                min_distance,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const BOUNDS: SpreadBounds = SpreadBounds {
        min_spread_bps: 2.0,
        max_spread_bps: 20.0,
    };

    fn calculator(coefficient: f64) -> QuoteCalculator {
        QuoteCalculator::new(0.01, 5.0, coefficient, BOUNDS, 5.0)
    }

    #[test]
    fn reference_scenario_is_clamped_to_max_spread() {
        let raw = raw_spread(0.01, 0.01, 0.05, 5.0);
        assert!((raw - 0.3996).abs() < 1e-4);

        let spread = optimal_spread(2000.0, 0.01, 0.05, 0.01, 5.0, &BOUNDS);
        // Raw spread in price units is ~799; the 20 bps cap is 4.0.
        assert!(raw * 2000.0 > 700.0);
        assert!((spread - 4.0).abs() < 1e-9);
    }

    #[test]
    fn spread_stays_within_bounds_for_pathological_inputs() {
        let sigmas = [0.0, 1e-12, 0.01, 1.0, 1e6, f64::INFINITY];
        let times = [0.0, 0.01, 0.05, 1.0, 24.0];
        let gammas = [1e-6, 0.01, 0.5, 5.0];
        for &sigma in &sigmas {
            for &t in &times {
                for &gamma in &gammas {
                    let spread = optimal_spread(2000.0, sigma, t, gamma, 5.0, &BOUNDS);
                    assert!(spread >= BOUNDS.min_abs(2000.0) - 1e-12, "sigma={sigma} t={t}");
                    assert!(spread <= BOUNDS.max_abs(2000.0) + 1e-12, "sigma={sigma} t={t}");
                }
            }
        }
    }

    #[test]
    fn narrow_model_spread_is_raised_to_minimum() {
        // gamma/kappa tiny: liquidity term ~ 2/kappa is large, so use huge kappa.
        let bounds = SpreadBounds {
            min_spread_bps: 10.0,
            max_spread_bps: 50.0,
        };
        let spread = optimal_spread(100.0, 0.0, 0.05, 0.01, 1e9, &bounds);
        assert!((spread - 0.1).abs() < 1e-12);
    }

    #[test]
    fn reservation_shifts_against_inventory() {
        let long = reservation_price(100.0, 2.0, 0.5, 0.1, 0.1);
        let short = reservation_price(100.0, -2.0, 0.5, 0.1, 0.1);
        assert!((long - (100.0 - 0.1 * 2.0 * 0.25 * 0.1)).abs() < 1e-12);
        assert!(long < 100.0);
        assert!(short > 100.0);
        assert_eq!(reservation_price(100.0, 0.0, 0.5, 0.1, 0.1), 100.0);
    }

    #[test]
    #[should_panic(expected = "mid price must be positive")]
    fn non_positive_mid_fails_fast() {
        let _ = optimal_spread(0.0, 0.01, 0.05, 0.01, 5.0, &BOUNDS);
    }

    #[test]
    fn each_side_respects_min_distance_independently() {
        let mut rng = StdRng::seed_from_u64(42);
        let granularities = [
            Granularity::Decimals(2),
            Granularity::Increment(0.05),
            Granularity::Increment(0.5),
            Granularity::Decimals(0),
        ];
        for _ in 0..500 {
            let mid = rng.gen_range(50.0..5000.0);
            let inventory = rng.gen_range(-50.0..50.0);
            let sigma = rng.gen_range(0.001..3.0);
            let t = rng.gen_range(0.01..0.1);
            let granularity = granularities[rng.gen_range(0..granularities.len())];
            let calc = QuoteCalculator::new(0.1, 1.5, 0.1, BOUNDS, 5.0);
            let q = calc.compute(mid, inventory, sigma, t, granularity);
            let d = q.context.min_distance;
            assert!(mid - q.bid >= d - 1e-9, "bid too close: mid={mid} bid={}", q.bid);
            assert!(q.ask - mid >= d - 1e-9, "ask too close: mid={mid} ask={}", q.ask);
        }
    }

    #[test]
    fn min_distance_can_make_quotes_asymmetric() {
        // Large long inventory drags reservation far below mid: the ask gets
        // pinned to mid + distance while the bid stays where the model put it.
        let (bid, ask) = quote(100.0, 90.0, 1.0, 0.05, Granularity::Decimals(2));
        assert!((bid - 89.5).abs() < 1e-9);
        assert!((ask - 100.05).abs() < 1e-9);
        assert!((100.0 - bid) > (ask - 100.0));
    }

    #[test]
    fn rounding_never_pulls_a_side_inside_the_distance() {
        // mid - d = 99.953 rounds to 99.95 on a 0.05 grid; 99.96 would violate.
        let (bid, ask) = quote(100.0, 100.0, 0.0, 0.047, Granularity::Increment(0.05));
        assert!((bid - 99.95).abs() < 1e-9);
        assert!((ask - 100.05).abs() < 1e-9);

        // mid - d = 99.976 rounds to nearest 99.98, which is too close; floor to 99.97.
        let (bid, ask) = quote(100.0, 100.0, 0.0, 0.024, Granularity::Decimals(2));
        assert!((bid - 99.97).abs() < 1e-9);
        assert!((ask - 100.03).abs() < 1e-9);
    }

    #[test]
    fn tick_and_decimal_modes_round_prices() {
        let calc = calculator(0.01);
        let by_decimals = calc.compute(2000.0, 0.0, 0.01, 0.05, Granularity::Decimals(1));
        assert!((by_decimals.bid - 1998.0).abs() < 1e-9);
        assert!((by_decimals.ask - 2002.0).abs() < 1e-9);

        let by_tick = calc.compute(2000.3, 0.0, 0.01, 0.05, Granularity::Increment(0.25));
        assert!(((by_tick.bid / 0.25).round() * 0.25 - by_tick.bid).abs() < 1e-9);
        assert!(((by_tick.ask / 0.25).round() * 0.25 - by_tick.ask).abs() < 1e-9);
    }

    #[test]
    fn compute_is_idempotent() {
        let calc = calculator(0.001);
        let first = calc.compute(2000.0, 0.7, 0.02, 0.07, Granularity::Decimals(2));
        let second = calc.compute(2000.0, 0.7, 0.02, 0.07, Granularity::Decimals(2));
        assert_eq!(first, second);
    }

    #[test]
    fn profiles_select_the_inventory_coefficient() {
        let gamma_profile = QuoteCalculator::new(0.5, 1.0, 0.5, BOUNDS, 0.0);
        let alpha_profile = QuoteCalculator::new(0.5, 1.0, 0.001, BOUNDS, 0.0);
        let a = gamma_profile.compute(100.0, 10.0, 0.2, 0.1, Granularity::Decimals(8));
        let b = alpha_profile.compute(100.0, 10.0, 0.2, 0.1, Granularity::Decimals(8));
        assert!((a.context.reservation_price - (100.0 - 0.5 * 10.0 * 0.04 * 0.1)).abs() < 1e-9);
        assert!((b.context.reservation_price - (100.0 - 0.001 * 10.0 * 0.04 * 0.1)).abs() < 1e-9);
        assert_eq!(a.context.effective_spread, b.context.effective_spread);
    }
}
