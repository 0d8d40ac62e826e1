use crate::types::Fill;
use chrono::NaiveDate;
use serde::Serialize;
use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

/// Position and PnL accumulated from fills.
///
/// `realized_pnl` only ever moves by fee costs; price PnL shows up in the
/// mark-to-market figure, which combines the signed cash flow of every fill
/// with the open position valued at mid.
#[derive(Clone, Debug, Default)]
pub struct InventoryState {
    position: f64,
    realized_pnl: f64,
    total_fees: f64,
    cash_flow: f64,
    trade_count: u64,
    mid_price: f64,
    day_baseline: Option<(NaiveDate, f64)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct InventorySnapshot {
    pub position: f64,
    pub position_usd: f64,
    pub realized_pnl: f64,
    pub mark_to_market_pnl: f64,
    pub trade_count: u64,
}

impl InventoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_fill(&mut self, fill: &Fill) {
        let signed_qty = fill.side.sign() * fill.quantity;
        self.position += signed_qty;
        self.cash_flow -= signed_qty * fill.price;
        self.realized_pnl -= fill.fee_cost;
        self.total_fees += fill.fee_cost;
        self.trade_count += 1;
    }

    pub fn update_mid(&mut self, mid: f64) {
        self.mid_price = mid;
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn total_fees(&self) -> f64 {
        self.total_fees
    }

    pub fn trade_count(&self) -> u64 {
        self.trade_count
    }

    pub fn position_usd(&self) -> f64 {
        self.position * self.mid_price
    }

    pub fn mark_to_market(&self) -> f64 {
        self.cash_flow + self.position * self.mid_price - self.total_fees
    }

    /// Mark-to-market PnL since the first observation on `today` (UTC).
    /// The baseline resets whenever the date changes.
    pub fn daily_pnl(&mut self, today: NaiveDate) -> f64 {
        let mtm = self.mark_to_market();
        match self.day_baseline {
            Some((day, baseline)) if day == today => mtm - baseline,
            _ => {
                self.day_baseline = Some((today, mtm));
                0.0
            }
        }
    }

    pub fn snapshot(&self) -> InventorySnapshot {
        InventorySnapshot {
            position: self.position,
            position_usd: self.position_usd(),
            realized_pnl: self.realized_pnl,
            mark_to_market_pnl: self.mark_to_market(),
            trade_count: self.trade_count,
        }
    }
}

/// Rate-limits fill queries and drops fills that were already applied.
///
/// Fills are tracked by a timestamp watermark plus the ids seen at exactly
/// that timestamp, so overlapping query windows never double count.
#[derive(Clone, Debug)]
pub struct FillReconciler {
    check_interval: Duration,
    lookback: Duration,
    last_check: Option<Instant>,
    watermark_ms: Option<i64>,
    seen_at_watermark: HashSet<String>,
}

impl FillReconciler {
    pub fn new(check_interval: Duration, lookback: Duration) -> Self {
        Self {
            check_interval,
            lookback,
            last_check: None,
            watermark_ms: None,
            seen_at_watermark: HashSet::new(),
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_check {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.check_interval,
        }
    }

    /// Start of the query window: the watermark, or `lookback` before
    /// `now_ms` on the first check.
    pub fn since_ms(&self, now_ms: i64) -> i64 {
        self.watermark_ms
            .unwrap_or_else(|| now_ms.saturating_sub(self.lookback.as_millis() as i64))
    }

    /// Filter `fills` down to the ones not seen before, oldest first, and
    /// record the check time.
    pub fn accept(&mut self, mut fills: Vec<Fill>, now: Instant) -> Vec<Fill> {
        self.last_check = Some(now);
        fills.sort_by_key(|fill| fill.timestamp_ms);

        let mut fresh = Vec::with_capacity(fills.len());
        for fill in fills {
            let is_new = match self.watermark_ms {
                None => true,
                Some(mark) if fill.timestamp_ms > mark => true,
                Some(mark) if fill.timestamp_ms == mark => !self.seen_at_watermark.contains(&fill.id),
                Some(_) => false,
            };
            if !is_new {
                continue;
            }
            if self.watermark_ms != Some(fill.timestamp_ms) {
                self.watermark_ms = Some(fill.timestamp_ms);
                self.seen_at_watermark.clear();
            }
            self.seen_at_watermark.insert(fill.id.clone());
            fresh.push(fill);
        }
        fresh
    }

    pub fn last_check(&self) -> Option<Instant> {
        self.last_check
    }

    pub fn watermark_ms(&self) -> Option<i64> {
        self.watermark_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderSide;

    fn fill(id: &str, side: OrderSide, quantity: f64, price: f64, fee: f64, ts: i64) -> Fill {
        Fill {
            id: id.to_string(),
            side,
            quantity,
            price,
            fee_cost: fee,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn buy_then_partial_sell_leaves_net_position() {
        let mut inv = InventoryState::new();
        inv.apply_fill(&fill("a", OrderSide::Buy, 0.5, 100.0, 0.05, 1));
        inv.apply_fill(&fill("b", OrderSide::Sell, 0.2, 105.0, 0.021, 2));

        assert!((inv.position() - 0.3).abs() < 1e-12);
        assert!((inv.realized_pnl() - (-0.071)).abs() < 1e-12);
        assert_eq!(inv.trade_count(), 2);

        // -50 + 21 + 0.3 * 105 - fees
        inv.update_mid(105.0);
        assert!((inv.mark_to_market() - (2.5 - 0.071)).abs() < 1e-9);
    }

    #[test]
    fn realized_pnl_moves_only_by_fees() {
        let mut inv = InventoryState::new();
        inv.apply_fill(&fill("a", OrderSide::Sell, 1.0, 200.0, 0.0, 1));
        inv.apply_fill(&fill("b", OrderSide::Buy, 1.0, 150.0, 0.0, 2));
        assert_eq!(inv.realized_pnl(), 0.0);
        assert_eq!(inv.position(), 0.0);
        assert!((inv.mark_to_market() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn daily_pnl_resets_on_date_change() {
        let day1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let mut inv = InventoryState::new();
        inv.update_mid(100.0);
        assert_eq!(inv.daily_pnl(day1), 0.0);

        inv.apply_fill(&fill("a", OrderSide::Buy, 1.0, 100.0, 0.0, 1));
        inv.update_mid(90.0);
        assert!((inv.daily_pnl(day1) - (-10.0)).abs() < 1e-9);

        assert_eq!(inv.daily_pnl(day2), 0.0);
        inv.update_mid(95.0);
        assert!((inv.daily_pnl(day2) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn first_check_uses_lookback_then_watermark() {
        let mut rec = FillReconciler::new(Duration::from_secs(30), Duration::from_secs(300));
        assert_eq!(rec.since_ms(1_000_000), 700_000);

        let fresh = rec.accept(vec![fill("a", OrderSide::Buy, 1.0, 1.0, 0.0, 800_000)], Instant::now());
        assert_eq!(fresh.len(), 1);
        assert_eq!(rec.since_ms(2_000_000), 800_000);
    }

    #[test]
    fn overlapping_windows_do_not_double_count() {
        let now = Instant::now();
        let mut rec = FillReconciler::new(Duration::from_secs(30), Duration::from_secs(300));
        let batch = vec![
            fill("b", OrderSide::Sell, 1.0, 1.0, 0.0, 20),
            fill("a", OrderSide::Buy, 1.0, 1.0, 0.0, 10),
        ];
        let fresh = rec.accept(batch.clone(), now);
        let ids: Vec<&str> = fresh.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(rec.accept(batch.clone(), now).is_empty());

        let mut next = batch;
        next.push(fill("c", OrderSide::Buy, 1.0, 1.0, 0.0, 20));
        next.push(fill("d", OrderSide::Buy, 1.0, 1.0, 0.0, 30));
        let fresh = rec.accept(next, now);
        let ids: Vec<&str> = fresh.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn checks_are_rate_limited() {
        let start = Instant::now();
        let mut rec = FillReconciler::new(Duration::from_secs(30), Duration::from_secs(300));
        assert!(rec.is_due(start));
        rec.accept(Vec::new(), start);
        assert!(!rec.is_due(start + Duration::from_secs(10)));
        assert!(rec.is_due(start + Duration::from_secs(30)));
    }
}
