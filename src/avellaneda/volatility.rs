use super::types::PriceSample;
use ringbuffer::{AllocRingBuffer, RingBuffer, RingBufferExt, RingBufferRead, RingBufferWrite};
use statrs::statistics::Statistics;
use std::time::Instant;

/// Realized volatility over a bounded window of mid-prices.
///
/// The estimate is the sample standard deviation of log returns between
/// consecutive samples, scaled by `sqrt(scale_factor)` and floored. With fewer
/// than two returns the previous estimate is held.
#[derive(Clone, Debug)]
pub struct VolEstimator {
    lookback: usize,
    scale_factor: f64,
    floor: f64,
    initial_sigma: f64,
    samples: AllocRingBuffer<PriceSample>,
    sigma: f64,
    last_update: Option<Instant>,
}

impl VolEstimator {
    pub fn new(lookback: usize, scale_factor: f64, floor: f64, initial_sigma: f64) -> Self {
        let capacity = lookback.next_power_of_two().max(2);
        let initial_sigma = initial_sigma.max(floor);
        Self {
            lookback,
            scale_factor,
            floor,
            initial_sigma,
            samples: AllocRingBuffer::with_capacity(capacity),
            sigma: initial_sigma,
            last_update: None,
        }
    }

    pub fn update(&mut self, sample: PriceSample) {
        self.samples.push(sample);
        // Capacity is rounded up to a power of two; trim to the real lookback.
        while self.samples.len() > self.lookback {
            let _ = self.samples.dequeue();
        }
        self.last_update = Some(sample.timestamp());

        let returns: Vec<f64> = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .map(|(prev, next)| (next.price() / prev.price()).ln())
            .collect();
        if returns.len() < 2 {
            return;
        }
        let sample_sigma = returns.iter().std_dev();
        let scaled = sample_sigma * self.scale_factor.sqrt();
        self.sigma = if scaled.is_finite() {
            scaled.max(self.floor)
        } else {
            self.sigma.max(self.floor)
        };
    }

    pub fn current(&self) -> f64 {
        self.sigma
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.len() == 0
    }

    /// Samples in insertion order, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &PriceSample> + '_ {
        self.samples.iter()
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Check if volatility estimator has enough samples for reliable estimates
    /// Returns true when window is at least 50% full
    pub fn is_warmed_up(&self) -> bool {
        self.samples.len() >= (self.lookback / 2).max(3)
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.sigma = self.initial_sigma;
        self.last_update = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::time::Duration;

    fn sample(price: f64, at: Instant) -> PriceSample {
        PriceSample::new(price, at).unwrap()
    }

    #[test]
    fn holds_initial_estimate_until_two_returns_exist() {
        let now = Instant::now();
        let mut vol = VolEstimator::new(50, 3600.0, 0.001, 0.01);
        assert_eq!(vol.current(), 0.01);
        vol.update(sample(100.0, now));
        assert_eq!(vol.current(), 0.01);
        vol.update(sample(101.0, now));
        assert_eq!(vol.current(), 0.01);
        vol.update(sample(100.0, now));
        assert_ne!(vol.current(), 0.01);
    }

    #[test]
    fn matches_scaled_sample_standard_deviation() {
        let now = Instant::now();
        let prices = [100.0, 101.0, 100.5, 102.0];
        let mut vol = VolEstimator::new(50, 3600.0, 0.001, 0.01);
        for p in prices {
            vol.update(sample(p, now));
        }
        let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() as f64 - 1.0);
        let expected = var.sqrt() * 3600_f64.sqrt();
        assert!((vol.current() - expected).abs() < 1e-12);
    }

    #[test]
    fn flat_prices_hit_the_floor() {
        let now = Instant::now();
        let mut vol = VolEstimator::new(10, 3600.0, 0.001, 0.01);
        for _ in 0..5 {
            vol.update(sample(2000.0, now));
        }
        assert_eq!(vol.current(), 0.001);
    }

    #[test]
    fn never_drops_below_floor() {
        let mut rng = StdRng::seed_from_u64(7);
        let start = Instant::now();
        for trial in 0..50 {
            let mut vol = VolEstimator::new(20, 3600.0, 0.001, 0.0);
            let mut price = 100.0;
            for step in 0..(2 + trial) {
                price *= 1.0 + rng.gen_range(-1e-6..1e-6);
                vol.update(sample(price, start + Duration::from_millis(step as u64)));
                if vol.len() >= 2 {
                    assert!(vol.current() >= 0.001);
                }
            }
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let now = Instant::now();
        let mut vol = VolEstimator::new(3, 3600.0, 0.001, 0.01);
        for p in [1.0, 2.0, 3.0, 4.0] {
            vol.update(sample(p, now));
        }
        assert_eq!(vol.len(), 3);
        let kept: Vec<f64> = vol.samples().map(|s| s.price()).collect();
        assert_eq!(kept, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn reset_restores_initial_state() {
        let now = Instant::now();
        let mut vol = VolEstimator::new(5, 3600.0, 0.001, 0.02);
        for p in [100.0, 110.0, 90.0] {
            vol.update(sample(p, now));
        }
        vol.reset();
        assert!(vol.is_empty());
        assert_eq!(vol.current(), 0.02);
        assert!(vol.last_update().is_none());
    }
}
