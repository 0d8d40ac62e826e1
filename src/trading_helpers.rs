//! Trading Helper Utilities
//!
//! Small numeric helpers shared by the quoting engine:
//! - Mid-price and spread calculations
//! - Basis-point conversions
//! - Price / quantity granularity rounding

/// Tolerance applied before flooring or ceiling so that values already sitting
/// on a grid line (up to float noise) are not pushed one step away.
const GRID_EPSILON: f64 = 1e-9;

/// Calculate the mid-price from bid and ask prices
///
/// # Arguments
/// * `bid` - Best bid price
/// * `ask` - Best ask price
///
/// # Returns
/// Mid-price (bid + ask) / 2
pub fn calculate_mid_price(bid: f64, ask: f64) -> f64 {
    (bid + ask) / 2.0
}

/// Calculate the spread between bid and ask
///
/// # Returns
/// Absolute spread (ask - bid)
pub fn calculate_spread(bid: f64, ask: f64) -> f64 {
    ask - bid
}

/// Express an absolute price distance in basis points of `mid`.
///
/// Returns 0 for a zero mid rather than dividing by it.
pub fn spread_to_bps(spread: f64, mid: f64) -> f64 {
    if mid.abs() <= f64::EPSILON {
        return 0.0;
    }
    (spread / mid) * 10_000.0
}

/// Convert basis points of `mid` into an absolute price distance.
pub fn bps_to_price(bps: f64, mid: f64) -> f64 {
    mid * bps / 10_000.0
}

/// Calculate position value in quote currency
///
/// # Arguments
/// * `position_size` - Position size in base currency (signed)
/// * `price` - Current price
///
/// # Returns
/// Signed position value (position_size * price)
pub fn calculate_position_value(position_size: f64, price: f64) -> f64 {
    position_size * price
}

/// Round to a fixed number of decimal places (half away from zero).
pub fn round_to_decimals(value: f64, places: u32) -> f64 {
    let factor = 10_f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Round to the nearest multiple of `step`.
///
/// A non-positive step leaves the value untouched.
pub fn round_to_increment(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step).round() * step
}

/// Round down to a multiple of `step`.
pub fn floor_to_increment(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step + GRID_EPSILON).floor() * step
}

/// Round up to a multiple of `step`.
pub fn ceil_to_increment(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step - GRID_EPSILON).ceil() * step
}
