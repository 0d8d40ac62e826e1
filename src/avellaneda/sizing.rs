use super::config::{OrderSizeMode, QuoterConfig};
use crate::types::InstrumentRules;

const MID_TIER_RATIO: f64 = 0.5;
const HIGH_TIER_RATIO: f64 = 0.7;

/// Size multiplier for the exposure band `inventory_usd` falls into.
///
/// Discrete on purpose: 1.0 up to half the cap, 0.75 up to 70%, 0.5 beyond.
pub fn tier_multiplier(inventory_usd: f64, max_inventory_usd: f64) -> f64 {
    if max_inventory_usd <= 0.0 {
        return 0.5;
    }
    let ratio = inventory_usd.abs() / max_inventory_usd;
    if ratio <= MID_TIER_RATIO {
        1.0
    } else if ratio <= HIGH_TIER_RATIO {
        0.75
    } else {
        0.5
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PositionSizer {
    mode: OrderSizeMode,
    max_inventory_usd: f64,
    max_order_notional_usd: Option<f64>,
}

impl PositionSizer {
    pub fn new(
        mode: OrderSizeMode,
        max_inventory_usd: f64,
        max_order_notional_usd: Option<f64>,
    ) -> Self {
        Self {
            mode,
            max_inventory_usd,
            max_order_notional_usd,
        }
    }

    pub fn from_config(config: &QuoterConfig) -> Self {
        Self::new(
            config.order_size,
            config.max_inventory_usd,
            config.max_order_notional_usd,
        )
    }

    /// Whether sizing reads the account balance at all.
    pub fn needs_balance(&self) -> bool {
        matches!(self.mode, OrderSizeMode::BalancePercent { .. })
    }

    /// Pre-rounding size before inventory throttling.
    pub fn base_size(&self, price: f64, available_balance: f64) -> f64 {
        match self.mode {
            OrderSizeMode::Fixed { quantity } => quantity,
            OrderSizeMode::BalancePercent { fraction } => {
                available_balance.max(0.0) * fraction / price
            }
        }
    }

    /// Quantity for the next quote pair, or `None` if nothing positive can be
    /// placed. `available_balance` is ignored in fixed mode.
    pub fn size(
        &self,
        price: f64,
        inventory: f64,
        available_balance: f64,
        rules: &InstrumentRules,
    ) -> Option<f64> {
        if !price.is_finite() || price <= 0.0 {
            return None;
        }
        let base = self.base_size(price, available_balance);
        if !base.is_finite() {
            return None;
        }

        let mut size = base * tier_multiplier(inventory * price, self.max_inventory_usd);
        if let Some(cap) = self.max_order_notional_usd {
            size = size.min(cap / price);
        }

        let granularity = rules.quantity_granularity;
        size = granularity.round(size).max(rules.min_quantity);
        if let Some(min_notional) = rules.min_notional {
            if size * price < min_notional {
                size = granularity.round_up(min_notional / price).max(rules.min_quantity);
            }
        }

        (size.is_finite() && size > 0.0).then_some(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Granularity;

    fn rules(min_quantity: f64, min_notional: Option<f64>, granularity: Granularity) -> InstrumentRules {
        InstrumentRules {
            min_quantity,
            min_notional,
            quantity_granularity: granularity,
            price_granularity: Granularity::Decimals(2),
        }
    }

    #[test]
    fn tiers_step_down_with_exposure() {
        assert_eq!(tier_multiplier(0.0, 200.0), 1.0);
        assert_eq!(tier_multiplier(100.0, 200.0), 1.0);
        assert_eq!(tier_multiplier(-101.0, 200.0), 0.75);
        assert_eq!(tier_multiplier(140.0, 200.0), 0.75);
        assert_eq!(tier_multiplier(141.0, 200.0), 0.5);
        assert_eq!(tier_multiplier(1_000.0, 200.0), 0.5);
    }

    #[test]
    fn fixed_mode_applies_tier_and_rounding() {
        let sizer = PositionSizer::new(OrderSizeMode::Fixed { quantity: 0.1 }, 200.0, None);
        let r = rules(0.001, None, Granularity::Decimals(3));
        assert_eq!(sizer.size(100.0, 0.0, 0.0, &r), Some(0.1));
        // 1.2 * 100 = 120 USD, 60% of the cap.
        assert_eq!(sizer.size(100.0, 1.2, 0.0, &r), Some(0.075));
        // 1.5 * 100 = 150 USD, 75% of the cap; 0.05 exactly.
        assert_eq!(sizer.size(100.0, -1.5, 0.0, &r), Some(0.05));
    }

    #[test]
    fn balance_mode_converts_at_price() {
        let sizer = PositionSizer::new(
            OrderSizeMode::BalancePercent { fraction: 0.01 },
            10_000.0,
            None,
        );
        assert!(sizer.needs_balance());
        let r = rules(0.001, None, Granularity::Decimals(3));
        // 1% of 5000 USDT at 2000 = 0.025
        assert_eq!(sizer.size(2000.0, 0.0, 5_000.0, &r), Some(0.025));
    }

    #[test]
    fn raises_to_minimum_quantity() {
        let sizer = PositionSizer::new(OrderSizeMode::Fixed { quantity: 0.0001 }, 200.0, None);
        let r = rules(0.01, None, Granularity::Decimals(3));
        assert_eq!(sizer.size(100.0, 0.0, 0.0, &r), Some(0.01));
    }

    #[test]
    fn min_notional_result_stays_on_the_lot_grid() {
        let sizer = PositionSizer::new(OrderSizeMode::Fixed { quantity: 0.01 }, 1_000.0, None);
        let r = rules(0.005, Some(5.0), Granularity::Increment(0.005));
        // 0.01 * 300 = 3 USD; 5 / 300 = 0.01667 -> next 0.005 multiple
        let size = sizer.size(300.0, 0.0, 0.0, &r).unwrap();
        assert!((size - 0.02).abs() < 1e-12);
        assert!(size * 300.0 >= 5.0);
    }

    #[test]
    fn notional_cap_limits_size() {
        let sizer = PositionSizer::new(OrderSizeMode::Fixed { quantity: 1.0 }, 1_000_000.0, Some(50.0));
        let r = rules(0.001, None, Granularity::Decimals(3));
        assert_eq!(sizer.size(100.0, 0.0, 0.0, &r), Some(0.5));
    }

    #[test]
    fn nothing_positive_yields_none() {
        let sizer = PositionSizer::new(OrderSizeMode::BalancePercent { fraction: 0.1 }, 200.0, None);
        let r = rules(0.0, None, Granularity::Decimals(3));
        assert_eq!(sizer.size(100.0, 0.0, 0.0, &r), None);
        assert_eq!(sizer.size(0.0, 0.0, 1_000.0, &r), None);
    }
}
