use crate::{
    errors::{QuoterError, Result},
    types::Instrument,
};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, str::FromStr, time::Duration};

/// Which constant scales the inventory term of the reservation price.
///
/// `risk_aversion` uses γ (the same γ that drives the spread), while
/// `inventory_penalty` uses the separately configured α.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationProfile {
    RiskAversion,
    InventoryPenalty,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OrderSizeMode {
    /// Fixed base-asset quantity per quote.
    Fixed { quantity: f64 },
    /// Fraction of the free quote balance, converted at the quote price.
    BalancePercent { fraction: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPreset {
    Conservative,
    Balanced,
    Aggressive,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QuoterConfig {
    pub instrument: Instrument,
    #[serde(default)]
    pub preset: Option<StrategyPreset>,
    pub gamma: f64,
    pub kappa: f64,
    #[serde(default = "default_inventory_penalty")]
    pub inventory_penalty: f64,
    #[serde(default = "default_reservation_profile")]
    pub reservation_profile: ReservationProfile,
    pub time_horizon_hours: f64,
    #[serde(default = "default_sigma_lookback")]
    pub sigma_lookback: usize,
    #[serde(default = "default_sigma_scale_factor")]
    pub sigma_scale_factor: f64,
    #[serde(default = "default_sigma_floor")]
    pub sigma_floor: f64,
    #[serde(default = "default_initial_sigma")]
    pub initial_sigma: f64,
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    #[serde(default = "default_min_spread_bps")]
    pub min_spread_bps: f64,
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: f64,
    #[serde(default = "default_min_quote_distance_bps")]
    pub min_quote_distance_bps: f64,
    pub max_inventory_usd: f64,
    #[serde(default)]
    pub max_order_notional_usd: Option<f64>,
    #[serde(default)]
    pub daily_loss_limit_usd: Option<f64>,
    pub order_size: OrderSizeMode,
    #[serde(default = "default_market_retry_delay_ms")]
    pub market_retry_delay_ms: u64,
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    #[serde(default = "default_risk_cooldown_ms")]
    pub risk_cooldown_ms: u64,
    #[serde(default = "default_fill_check_interval_ms")]
    pub fill_check_interval_ms: u64,
    #[serde(default = "default_fill_lookback_secs")]
    pub fill_lookback_secs: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_inventory_penalty() -> f64 {
    0.001
}

fn default_reservation_profile() -> ReservationProfile {
    ReservationProfile::RiskAversion
}

fn default_sigma_lookback() -> usize {
    50
}

fn default_sigma_scale_factor() -> f64 {
    3600.0
}

fn default_sigma_floor() -> f64 {
    0.001
}

fn default_initial_sigma() -> f64 {
    0.01
}

fn default_update_interval_ms() -> u64 {
    1_000
}

fn default_min_spread_bps() -> f64 {
    2.0
}

fn default_max_spread_bps() -> f64 {
    20.0
}

fn default_min_quote_distance_bps() -> f64 {
    5.0
}

fn default_market_retry_delay_ms() -> u64 {
    1_000
}

fn default_error_backoff_ms() -> u64 {
    5_000
}

fn default_risk_cooldown_ms() -> u64 {
    10_000
}

fn default_fill_check_interval_ms() -> u64 {
    30_000
}

fn default_fill_lookback_secs() -> u64 {
    300
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl QuoterConfig {
    /// Defaults tuned for a liquid perpetual: γ = 0.01, k = 5, six-minute horizon.
    pub fn new(instrument: impl Into<Instrument>) -> Self {
        Self {
            instrument: instrument.into(),
            preset: None,
            gamma: 0.01,
            kappa: 5.0,
            inventory_penalty: default_inventory_penalty(),
            reservation_profile: default_reservation_profile(),
            time_horizon_hours: 0.1,
            sigma_lookback: default_sigma_lookback(),
            sigma_scale_factor: default_sigma_scale_factor(),
            sigma_floor: default_sigma_floor(),
            initial_sigma: default_initial_sigma(),
            update_interval_ms: default_update_interval_ms(),
            min_spread_bps: default_min_spread_bps(),
            max_spread_bps: default_max_spread_bps(),
            min_quote_distance_bps: default_min_quote_distance_bps(),
            max_inventory_usd: 200.0,
            max_order_notional_usd: None,
            daily_loss_limit_usd: None,
            order_size: OrderSizeMode::Fixed { quantity: 0.01 },
            market_retry_delay_ms: default_market_retry_delay_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            risk_cooldown_ms: default_risk_cooldown_ms(),
            fill_check_interval_ms: default_fill_check_interval_ms(),
            fill_lookback_secs: default_fill_lookback_secs(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    /// Load, apply preset and `QUOTER_*` env overrides, then validate.
    ///
    /// `.json` files are parsed as JSON, anything else as TOML. Parameters may
    /// live at the top level or inside a `quoter` table/object.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| QuoterError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json_str(&data)
        } else {
            Self::from_toml_str(&data)
        }
    }

    pub fn from_toml_str(data: &str) -> Result<Self> {
        let raw: toml::Value = toml::from_str(data)?;
        // Support nested [quoter] tables or top-level entries.
        let table = if let Some(inner) = raw.get("quoter").filter(|v| v.is_table()).cloned() {
            inner
        } else {
            raw
        };
        let cfg: QuoterConfig = table.try_into()?;
        cfg.finish()
    }

    pub fn from_json_str(data: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(data)?;
        let object = if let Some(inner) = raw.get("quoter").filter(|v| v.is_object()).cloned() {
            inner
        } else {
            raw
        };
        let cfg: QuoterConfig = serde_json::from_value(object)?;
        cfg.finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_preset();
        self.apply_env_overrides()?;
        self.validate()?;
        Ok(self)
    }

    /// Overwrite the preset-controlled parameters. A fixed order size is kept
    /// as configured; only a balance percentage is retuned.
    pub fn apply_preset(&mut self) {
        let Some(preset) = self.preset else {
            return;
        };
        let (gamma, kappa, update_ms, max_spread_bps, fraction) = match preset {
            StrategyPreset::Conservative => (0.5, 1.0, 5_000, 50.0, 0.005),
            StrategyPreset::Balanced => (0.1, 1.5, 2_000, 30.0, 0.01),
            StrategyPreset::Aggressive => (0.01, 3.0, 500, 20.0, 0.02),
        };
        self.gamma = gamma;
        self.kappa = kappa;
        self.update_interval_ms = update_ms;
        self.max_spread_bps = max_spread_bps;
        if let OrderSizeMode::BalancePercent { fraction: current } = &mut self.order_size {
            *current = fraction;
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Each field can be overridden by a `QUOTER_*` variable. A value that
    /// does not parse is a configuration error, never silently skipped.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("QUOTER_INSTRUMENT") {
            if !value.trim().is_empty() {
                self.instrument = Instrument::new(value.trim());
            }
        }
        override_value(&lookup, "QUOTER_GAMMA", "gamma", &mut self.gamma)?;
        override_value(&lookup, "QUOTER_KAPPA", "kappa", &mut self.kappa)?;
        override_value(
            &lookup,
            "QUOTER_INVENTORY_PENALTY",
            "inventory_penalty",
            &mut self.inventory_penalty,
        )?;
        if let Some(value) = lookup("QUOTER_RESERVATION_PROFILE") {
            self.reservation_profile = match value.trim().to_ascii_lowercase().as_str() {
                "risk_aversion" => ReservationProfile::RiskAversion,
                "inventory_penalty" => ReservationProfile::InventoryPenalty,
                _ => {
                    return Err(QuoterError::invalid_config(
                        "reservation_profile",
                        format!("malformed env override {:?}", value),
                    ))
                }
            };
        }
        override_value(
            &lookup,
            "QUOTER_TIME_HORIZON_HOURS",
            "time_horizon_hours",
            &mut self.time_horizon_hours,
        )?;
        override_value(&lookup, "QUOTER_SIGMA_LOOKBACK", "sigma_lookback", &mut self.sigma_lookback)?;
        override_value(
            &lookup,
            "QUOTER_SIGMA_SCALE_FACTOR",
            "sigma_scale_factor",
            &mut self.sigma_scale_factor,
        )?;
        override_value(&lookup, "QUOTER_SIGMA_FLOOR", "sigma_floor", &mut self.sigma_floor)?;
        override_value(&lookup, "QUOTER_INITIAL_SIGMA", "initial_sigma", &mut self.initial_sigma)?;
        override_value(
            &lookup,
            "QUOTER_UPDATE_INTERVAL_MS",
            "update_interval_ms",
            &mut self.update_interval_ms,
        )?;
        override_value(&lookup, "QUOTER_MIN_SPREAD_BPS", "min_spread_bps", &mut self.min_spread_bps)?;
        override_value(&lookup, "QUOTER_MAX_SPREAD_BPS", "max_spread_bps", &mut self.max_spread_bps)?;
        override_value(
            &lookup,
            "QUOTER_MIN_QUOTE_DISTANCE_BPS",
            "min_quote_distance_bps",
            &mut self.min_quote_distance_bps,
        )?;
        override_value(
            &lookup,
            "QUOTER_MAX_INVENTORY_USD",
            "max_inventory_usd",
            &mut self.max_inventory_usd,
        )?;
        override_optional(
            &lookup,
            "QUOTER_MAX_ORDER_NOTIONAL_USD",
            "max_order_notional_usd",
            &mut self.max_order_notional_usd,
        )?;
        override_optional(
            &lookup,
            "QUOTER_DAILY_LOSS_LIMIT_USD",
            "daily_loss_limit_usd",
            &mut self.daily_loss_limit_usd,
        )?;
        match &mut self.order_size {
            OrderSizeMode::Fixed { quantity } => {
                override_value(&lookup, "QUOTER_ORDER_SIZE", "order_size", quantity)?
            }
            OrderSizeMode::BalancePercent { fraction } => {
                override_value(&lookup, "QUOTER_ORDER_SIZE_FRACTION", "order_size", fraction)?
            }
        }
        override_value(
            &lookup,
            "QUOTER_MARKET_RETRY_DELAY_MS",
            "market_retry_delay_ms",
            &mut self.market_retry_delay_ms,
        )?;
        override_value(
            &lookup,
            "QUOTER_ERROR_BACKOFF_MS",
            "error_backoff_ms",
            &mut self.error_backoff_ms,
        )?;
        override_value(
            &lookup,
            "QUOTER_RISK_COOLDOWN_MS",
            "risk_cooldown_ms",
            &mut self.risk_cooldown_ms,
        )?;
        override_value(
            &lookup,
            "QUOTER_FILL_CHECK_INTERVAL_MS",
            "fill_check_interval_ms",
            &mut self.fill_check_interval_ms,
        )?;
        override_value(
            &lookup,
            "QUOTER_FILL_LOOKBACK_SECS",
            "fill_lookback_secs",
            &mut self.fill_lookback_secs,
        )?;
        override_value(
            &lookup,
            "QUOTER_REQUEST_TIMEOUT_MS",
            "request_timeout_ms",
            &mut self.request_timeout_ms,
        )?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure(
            !self.instrument.as_str().trim().is_empty(),
            "instrument",
            "must not be empty",
        )?;
        ensure(positive(self.gamma), "gamma", "must be greater than zero")?;
        ensure(positive(self.kappa), "kappa", "must be greater than zero")?;
        ensure(
            self.inventory_penalty.is_finite() && self.inventory_penalty >= 0.0,
            "inventory_penalty",
            "must be non-negative",
        )?;
        ensure(
            positive(self.time_horizon_hours),
            "time_horizon_hours",
            "must be greater than zero",
        )?;
        ensure(
            self.sigma_lookback >= 3,
            "sigma_lookback",
            "must be at least 3 so two returns exist",
        )?;
        ensure(
            positive(self.sigma_scale_factor),
            "sigma_scale_factor",
            "must be greater than zero",
        )?;
        ensure(
            positive(self.sigma_floor),
            "sigma_floor",
            "must be greater than zero",
        )?;
        ensure(
            self.initial_sigma.is_finite() && self.initial_sigma >= 0.0,
            "initial_sigma",
            "must be non-negative",
        )?;
        ensure(
            self.update_interval_ms > 0,
            "update_interval_ms",
            "must be greater than zero",
        )?;
        ensure(
            self.min_spread_bps.is_finite() && self.min_spread_bps >= 0.0,
            "min_spread_bps",
            "must be non-negative",
        )?;
        ensure(
            positive(self.max_spread_bps) && self.max_spread_bps >= self.min_spread_bps,
            "max_spread_bps",
            "must be positive and >= min_spread_bps",
        )?;
        ensure(
            self.min_quote_distance_bps.is_finite() && self.min_quote_distance_bps >= 0.0,
            "min_quote_distance_bps",
            "must be non-negative",
        )?;
        ensure(
            positive(self.max_inventory_usd),
            "max_inventory_usd",
            "must be greater than zero",
        )?;
        ensure(
            self.max_order_notional_usd.map_or(true, positive),
            "max_order_notional_usd",
            "must be greater than zero when set",
        )?;
        ensure(
            self.daily_loss_limit_usd.map_or(true, positive),
            "daily_loss_limit_usd",
            "must be greater than zero when set",
        )?;
        match self.order_size {
            OrderSizeMode::Fixed { quantity } => {
                ensure(positive(quantity), "order_size", "quantity must be positive")?
            }
            OrderSizeMode::BalancePercent { fraction } => ensure(
                positive(fraction) && fraction <= 1.0,
                "order_size",
                "fraction must be within (0, 1]",
            )?,
        }
        ensure(
            self.request_timeout_ms > 0,
            "request_timeout_ms",
            "must be greater than zero",
        )?;
        Ok(())
    }

    /// Coefficient multiplying `q·σ²·T` in the reservation price.
    pub fn reservation_coefficient(&self) -> f64 {
        match self.reservation_profile {
            ReservationProfile::RiskAversion => self.gamma,
            ReservationProfile::InventoryPenalty => self.inventory_penalty,
        }
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn market_retry_delay(&self) -> Duration {
        Duration::from_millis(self.market_retry_delay_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn risk_cooldown(&self) -> Duration {
        Duration::from_millis(self.risk_cooldown_ms)
    }

    pub fn fill_check_interval(&self) -> Duration {
        Duration::from_millis(self.fill_check_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn ensure(condition: bool, field: &'static str, why: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(QuoterError::invalid_config(field, why))
    }
}

fn parse_override<T: FromStr>(key: &str, field: &'static str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        QuoterError::invalid_config(field, format!("malformed env override {}={:?}", key, value))
    })
}

fn override_value<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &'static str,
    target: &mut T,
) -> Result<()> {
    if let Some(value) = lookup(key) {
        *target = parse_override(key, field, &value)?;
    }
    Ok(())
}

fn override_optional<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &'static str,
    target: &mut Option<T>,
) -> Result<()> {
    if let Some(value) = lookup(key) {
        *target = Some(parse_override(key, field, &value)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED_TOML: &str = r#"
        [quoter]
        instrument = "ETH/USDT:USDT"
        gamma = 0.01
        kappa = 5.0
        inventory_penalty = 0.001
        reservation_profile = "inventory_penalty"
        time_horizon_hours = 0.1
        max_inventory_usd = 200.0
        order_size = { mode = "fixed", quantity = 0.01 }
    "#;

    #[test]
    fn loads_nested_toml_with_defaults() {
        let cfg = QuoterConfig::from_toml_str(NESTED_TOML).unwrap();
        assert_eq!(cfg.instrument.as_str(), "ETH/USDT:USDT");
        assert_eq!(cfg.reservation_profile, ReservationProfile::InventoryPenalty);
        assert_eq!(cfg.sigma_lookback, 50);
        assert_eq!(cfg.sigma_floor, 0.001);
        assert_eq!(cfg.order_size, OrderSizeMode::Fixed { quantity: 0.01 });
        assert_eq!(cfg.reservation_coefficient(), 0.001);
    }

    #[test]
    fn loads_flat_json() {
        let json = r#"{
            "instrument": "SOL/USDC:USDC",
            "gamma": 0.1,
            "kappa": 1.5,
            "time_horizon_hours": 1.0,
            "max_inventory_usd": 1000.0,
            "daily_loss_limit_usd": 50.0,
            "order_size": { "mode": "balance_percent", "fraction": 0.01 }
        }"#;
        let cfg = QuoterConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.reservation_profile, ReservationProfile::RiskAversion);
        assert_eq!(cfg.reservation_coefficient(), 0.1);
        assert_eq!(cfg.daily_loss_limit_usd, Some(50.0));
        assert_eq!(
            cfg.order_size,
            OrderSizeMode::BalancePercent { fraction: 0.01 }
        );
    }

    #[test]
    fn missing_required_parameter_is_rejected() {
        let toml = r#"
            instrument = "ETH/USDT:USDT"
            gamma = 0.01
            time_horizon_hours = 0.1
            max_inventory_usd = 200.0
            order_size = { mode = "fixed", quantity = 0.01 }
        "#;
        let err = QuoterConfig::from_toml_str(toml).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn validation_rejects_inverted_spread_bounds() {
        let mut cfg = QuoterConfig::new("ETH/USDT:USDT");
        cfg.min_spread_bps = 30.0;
        cfg.max_spread_bps = 20.0;
        match cfg.validate() {
            Err(QuoterError::ConfigurationInvalid { field, .. }) => {
                assert_eq!(field, "max_spread_bps")
            }
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn validation_rejects_fraction_above_one() {
        let mut cfg = QuoterConfig::new("ETH/USDT:USDT");
        cfg.order_size = OrderSizeMode::BalancePercent { fraction: 1.5 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn preset_overrides_tuning_but_keeps_fixed_size() {
        let mut cfg = QuoterConfig::new("ETH/USDT:USDT");
        cfg.preset = Some(StrategyPreset::Conservative);
        cfg.apply_preset();
        assert_eq!(cfg.gamma, 0.5);
        assert_eq!(cfg.kappa, 1.0);
        assert_eq!(cfg.update_interval_ms, 5_000);
        assert_eq!(cfg.max_spread_bps, 50.0);
        assert_eq!(cfg.order_size, OrderSizeMode::Fixed { quantity: 0.01 });

        cfg.preset = Some(StrategyPreset::Aggressive);
        cfg.order_size = OrderSizeMode::BalancePercent { fraction: 0.5 };
        cfg.apply_preset();
        assert_eq!(
            cfg.order_size,
            OrderSizeMode::BalancePercent { fraction: 0.02 }
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_override_applies_before_validation() {
        env::set_var("QUOTER_REQUEST_TIMEOUT_MS", "750");
        let cfg = QuoterConfig::from_toml_str(NESTED_TOML);
        env::remove_var("QUOTER_REQUEST_TIMEOUT_MS");
        assert_eq!(cfg.unwrap().request_timeout(), Duration::from_millis(750));
    }

    fn lookup_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn overrides_parse_every_kind_of_field() {
        let mut cfg = QuoterConfig::new("ETH/USDT:USDT");
        cfg.apply_overrides(lookup_from(&[
            ("QUOTER_GAMMA", " 0.2 "),
            ("QUOTER_SIGMA_LOOKBACK", "30"),
            ("QUOTER_DAILY_LOSS_LIMIT_USD", "75"),
            ("QUOTER_RESERVATION_PROFILE", "Inventory_Penalty"),
        ]))
        .unwrap();
        assert_eq!(cfg.gamma, 0.2);
        assert_eq!(cfg.sigma_lookback, 30);
        assert_eq!(cfg.daily_loss_limit_usd, Some(75.0));
        assert_eq!(cfg.reservation_profile, ReservationProfile::InventoryPenalty);
    }

    #[test]
    fn malformed_override_is_invalid_config() {
        let cases: [(&'static [(&'static str, &'static str)], &str); 4] = [
            (&[("QUOTER_GAMMA", "not-a-number")], "gamma"),
            (&[("QUOTER_SIGMA_LOOKBACK", "-3")], "sigma_lookback"),
            (&[("QUOTER_DAILY_LOSS_LIMIT_USD", "")], "daily_loss_limit_usd"),
            (&[("QUOTER_RESERVATION_PROFILE", "greedy")], "reservation_profile"),
        ];
        for (pairs, expected) in cases {
            let mut cfg = QuoterConfig::new("ETH/USDT:USDT");
            let err = cfg.apply_overrides(lookup_from(pairs)).unwrap_err();
            assert!(err.is_fatal());
            match err {
                QuoterError::ConfigurationInvalid { field, .. } => assert_eq!(field, expected),
                other => panic!("{pairs:?} should be rejected as invalid config, got {other:?}"),
            }
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(QuoterConfig::new("ETH/USDT:USDT").validate().is_ok());
    }
}
