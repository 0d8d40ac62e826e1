use super::config::QuoterConfig;
use crate::trading_helpers::calculate_position_value;
use std::fmt;

/// Reason the gate refused to quote.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RiskBreach {
    InventoryLimit { inventory_usd: f64, limit_usd: f64 },
    DailyLoss { pnl_usd: f64, limit_usd: f64 },
}

impl fmt::Display for RiskBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskBreach::InventoryLimit {
                inventory_usd,
                limit_usd,
            } => write!(
                f,
                "inventory value ${:.2} exceeds limit ${:.2}",
                inventory_usd, limit_usd
            ),
            RiskBreach::DailyLoss { pnl_usd, limit_usd } => write!(
                f,
                "daily pnl ${:.2} breaches loss limit ${:.2}",
                pnl_usd, limit_usd
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RiskDecision {
    Allow,
    Deny(RiskBreach),
}

impl RiskDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskDecision::Allow)
    }
}

/// Hard stops evaluated once per cycle before any pricing work.
///
/// A denial is not a throttle: the controller withdraws every quote and waits
/// out the cooldown before asking again.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskGate {
    max_inventory_usd: f64,
    daily_loss_limit_usd: Option<f64>,
}

impl RiskGate {
    pub fn new(max_inventory_usd: f64, daily_loss_limit_usd: Option<f64>) -> Self {
        Self {
            max_inventory_usd,
            daily_loss_limit_usd,
        }
    }

    pub fn from_config(config: &QuoterConfig) -> Self {
        Self::new(config.max_inventory_usd, config.daily_loss_limit_usd)
    }

    pub fn max_inventory_usd(&self) -> f64 {
        self.max_inventory_usd
    }

    pub fn allow(&self, inventory: f64, price: f64) -> bool {
        calculate_position_value(inventory, price).abs() <= self.max_inventory_usd
    }

    /// Inventory stop first, then the optional daily loss stop on
    /// mark-to-market PnL since the start of the UTC day.
    pub fn check(&self, inventory: f64, price: f64, daily_pnl: f64) -> RiskDecision {
        if !self.allow(inventory, price) {
            return RiskDecision::Deny(RiskBreach::InventoryLimit {
                inventory_usd: calculate_position_value(inventory, price).abs(),
                limit_usd: self.max_inventory_usd,
            });
        }
        if let Some(limit) = self.daily_loss_limit_usd {
            if daily_pnl <= -limit {
                return RiskDecision::Deny(RiskBreach::DailyLoss {
                    pnl_usd: daily_pnl,
                    limit_usd: limit,
                });
            }
        }
        RiskDecision::Allow
    }
}
