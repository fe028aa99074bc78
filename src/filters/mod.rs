//! # Filters Module
//!
//! Signal conditioning helpers available to scripts.
//!
//! Every stateful filter takes an explicit string key. State for a key is
//! created on first use and lives for the whole process, except stopwatch
//! entries which are removed when they fire or when their input goes
//! inactive.
//!
//! ## Usage
//!
//! ```
//! use pie_bridge::filters::{AngleUnit, FilterBank};
//!
//! let mut filters = FilterBank::new();
//!
//! // Exponential moving average, seeded with the first sample
//! assert_eq!(filters.ema(10.0, 0.5, "yaw").unwrap(), 10.0);
//! assert_eq!(filters.ema(20.0, 0.5, "yaw").unwrap(), 15.0);
//!
//! // Unwrap a heading that crosses the ±180° boundary
//! filters.continuous_rotation(170.0, AngleUnit::Degrees, "heading");
//! assert_eq!(filters.continuous_rotation(-170.0, AngleUnit::Degrees, "heading"), 190.0);
//! ```

use std::collections::HashMap;
use std::f64::consts::PI;
use std::time::{Duration, Instant};

use crate::error::{BridgeError, Result};

/// Unit of a wrapping angle fed to [`FilterBank::continuous_rotation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnit {
    /// Wraps at ±180.
    Degrees,
    /// Wraps at ±π.
    Radians,
}

impl AngleUnit {
    /// Magnitude of half a turn in this unit.
    #[must_use]
    pub fn half_circle(self) -> f64 {
        match self {
            AngleUnit::Degrees => 180.0,
            AngleUnit::Radians => PI,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RotationState {
    prev: f64,
    out: f64,
}

/// Keyed filter state shared by all scripts of one engine.
#[derive(Debug, Default)]
pub struct FilterBank {
    ema_last: HashMap<String, f64>,
    delta_last: HashMap<String, f64>,
    stopwatches: HashMap<String, Instant>,
    rotations: HashMap<String, RotationState>,
}

impl FilterBank {
    /// Creates an empty filter bank.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exponential moving average.
    ///
    /// `smoothing` must lie in `[0, 1]`: 0 passes `x` through, 1 freezes
    /// the output at the first sample. The first call for a key seeds the
    /// state with `x`, so there is no start-up transient.
    ///
    /// # Errors
    ///
    /// Returns `FilterArgument` if `smoothing` is outside `[0, 1]` or NaN.
    pub fn ema(&mut self, x: f64, smoothing: f64, key: &str) -> Result<f64> {
        if !(0.0..=1.0).contains(&smoothing) {
            return Err(BridgeError::FilterArgument(format!(
                "ema smoothing must be between 0 and 1, got {}",
                smoothing
            )));
        }

        let last = self.ema_last.get(key).copied().unwrap_or(x);
        let out = last * smoothing + x * (1.0 - smoothing);
        self.ema_last.insert(key.to_string(), out);
        Ok(out)
    }

    /// Difference between `x` and the previous sample for `key`.
    ///
    /// Returns 0 on the first call for a key.
    pub fn delta(&mut self, x: f64, key: &str) -> f64 {
        let last = self.delta_last.insert(key.to_string(), x).unwrap_or(x);
        x - last
    }

    /// Simple dead zone: 0 when `|x| < |zone|`, otherwise `x` unchanged.
    #[must_use]
    pub fn deadband(x: f64, zone: f64) -> f64 {
        if x.abs() >= zone.abs() {
            x
        } else {
            0.0
        }
    }

    /// Scaled dead zone for a signal living in `[min_y, max_y]`.
    ///
    /// The input is normalized to `[-1, 1]`, the zone is applied there and
    /// the live region is stretched back to full scale so the output has
    /// no step at the zone edge. The result is mapped back to
    /// `[min_y, max_y]`.
    #[must_use]
    pub fn deadband_scaled(x: f64, zone: f64, min_y: f64, max_y: f64) -> f64 {
        let scaled = Self::map_range_clamped(x, min_y, max_y, -1.0, 1.0);
        let mut y = 0.0;
        if scaled.abs() > zone {
            y = Self::map_range_clamped(scaled.abs(), zone, 1.0, 0.0, 1.0) * scaled.signum();
        }
        Self::map_range_clamped(y, -1.0, 1.0, min_y, max_y)
    }

    /// Linear remap of `x` from `[x0, x1]` to `[y0, y1]` without clamping.
    #[must_use]
    pub fn map_range(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }

    /// Linear remap of `x` from `[x0, x1]` to `[y0, y1]`, bounded to the
    /// output range.
    ///
    /// ```
    /// use pie_bridge::filters::FilterBank;
    ///
    /// assert_eq!(FilterBank::map_range_clamped(300.0, 0.0, 255.0, -1.0, 1.0), 1.0);
    /// assert_eq!(FilterBank::map_range_clamped(0.0, -32767.0, 32767.0, -1.0, 1.0), 0.0);
    /// ```
    #[must_use]
    pub fn map_range_clamped(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
        let (lo, hi) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        Self::map_range(x, x0, x1, y0, y1).clamp(lo, hi)
    }

    /// Boolean timer.
    ///
    /// Starts timing the first call `active` is true and returns true once
    /// `ms` milliseconds have elapsed, clearing itself. Going inactive
    /// before expiry clears the timer without firing.
    pub fn stopwatch(&mut self, active: bool, ms: u64, key: &str) -> bool {
        self.stopwatch_at(active, ms, key, Instant::now())
    }

    /// [`FilterBank::stopwatch`] against an explicit clock reading.
    pub fn stopwatch_at(&mut self, active: bool, ms: u64, key: &str, now: Instant) -> bool {
        if !active {
            self.stopwatches.remove(key);
            return false;
        }

        let started = *self.stopwatches.entry(key.to_string()).or_insert(now);
        if now.saturating_duration_since(started) >= Duration::from_millis(ms) {
            self.stopwatches.remove(key);
            return true;
        }
        false
    }

    /// Unwraps an angle that wraps at half a turn into a continuous value.
    ///
    /// Each step takes the shorter way around the circle. The first call
    /// for a key returns `x` itself; later calls accumulate from there.
    pub fn continuous_rotation(&mut self, x: f64, unit: AngleUnit, key: &str) -> f64 {
        let half = unit.half_circle();
        let state = self
            .rotations
            .entry(key.to_string())
            .or_insert(RotationState { prev: x, out: x });

        let mut delta = x - state.prev;
        if delta.abs() > half {
            delta += if delta > 0.0 { -2.0 * half } else { 2.0 * half };
        }

        state.out += delta;
        state.prev = x;
        state.out
    }

    /// Drops all state held for `key` across every filter kind.
    pub fn reset(&mut self, key: &str) {
        self.ema_last.remove(key);
        self.delta_last.remove(key);
        self.stopwatches.remove(key);
        self.rotations.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_zero_smoothing_passes_through() {
        let mut bank = FilterBank::new();
        for x in [0.0, -3.5, 12.25, 1e6] {
            assert_eq!(bank.ema(x, 0.0, "k").unwrap(), x);
        }
    }

    #[test]
    fn test_ema_full_smoothing_freezes_first_sample() {
        let mut bank = FilterBank::new();
        assert_eq!(bank.ema(4.0, 1.0, "k").unwrap(), 4.0);
        assert_eq!(bank.ema(100.0, 1.0, "k").unwrap(), 4.0);
        assert_eq!(bank.ema(-7.0, 1.0, "k").unwrap(), 4.0);
    }

    #[test]
    fn test_ema_keys_are_independent() {
        let mut bank = FilterBank::new();
        bank.ema(10.0, 0.5, "a").unwrap();
        assert_eq!(bank.ema(2.0, 0.5, "b").unwrap(), 2.0);
        assert_eq!(bank.ema(20.0, 0.5, "a").unwrap(), 15.0);
    }

    #[test]
    fn test_ema_rejects_out_of_range_smoothing() {
        let mut bank = FilterBank::new();
        assert!(matches!(
            bank.ema(1.0, 1.5, "k"),
            Err(BridgeError::FilterArgument(_))
        ));
        assert!(bank.ema(1.0, -0.1, "k").is_err());
        assert!(bank.ema(1.0, f64::NAN, "k").is_err());
    }

    #[test]
    fn test_delta_first_call_is_zero() {
        let mut bank = FilterBank::new();
        assert_eq!(bank.delta(42.0, "d"), 0.0);
        assert_eq!(bank.delta(45.0, "d"), 3.0);
        assert_eq!(bank.delta(40.0, "d"), -5.0);
    }

    #[test]
    fn test_deadband_threshold() {
        assert_eq!(FilterBank::deadband(0.04, 0.05), 0.0);
        assert_eq!(FilterBank::deadband(-0.04, 0.05), 0.0);
        assert_eq!(FilterBank::deadband(0.05, 0.05), 0.05);
        assert_eq!(FilterBank::deadband(-0.5, 0.05), -0.5);
        // Negative zone uses its magnitude
        assert_eq!(FilterBank::deadband(0.04, -0.05), 0.0);
    }

    #[test]
    fn test_deadband_scaled_centre_and_ends() {
        // Centre of a symmetric stick range stays centred
        assert_eq!(FilterBank::deadband_scaled(0.0, 0.1, -32767.0, 32767.0), 0.0);
        // Small offsets are swallowed
        assert_eq!(FilterBank::deadband_scaled(1000.0, 0.1, -32767.0, 32767.0), 0.0);
        // Full deflection is preserved
        assert_eq!(
            FilterBank::deadband_scaled(32767.0, 0.1, -32767.0, 32767.0),
            32767.0
        );
        assert_eq!(
            FilterBank::deadband_scaled(-32767.0, 0.1, -32767.0, 32767.0),
            -32767.0
        );
    }

    #[test]
    fn test_deadband_scaled_stretches_live_region() {
        // Halfway through the live region maps to half deflection
        let out = FilterBank::deadband_scaled(0.6, 0.2, -1.0, 1.0);
        assert!((out - 0.5).abs() < 1e-9, "got {}", out);
    }

    #[test]
    fn test_map_range() {
        assert_eq!(FilterBank::map_range(63.5, 0.0, 127.0, -1.0, 1.0), 0.0);
        assert_eq!(FilterBank::map_range(254.0, 0.0, 127.0, -1.0, 1.0), 3.0);
    }

    #[test]
    fn test_map_range_clamped_bounds_output() {
        assert_eq!(FilterBank::map_range_clamped(-10.0, 0.0, 255.0, -1.0, 1.0), -1.0);
        assert_eq!(FilterBank::map_range_clamped(500.0, 0.0, 255.0, -1.0, 1.0), 1.0);
        // Inverted output range still clamps to its bounds
        assert_eq!(FilterBank::map_range_clamped(2.0, 0.0, 1.0, 1.0, -1.0), -1.0);
    }

    #[test]
    fn test_stopwatch_fires_once_after_elapsed() {
        let mut bank = FilterBank::new();
        let t0 = Instant::now();

        assert!(!bank.stopwatch_at(true, 100, "sw", t0));
        assert!(!bank.stopwatch_at(true, 100, "sw", t0 + Duration::from_millis(50)));
        assert!(bank.stopwatch_at(true, 100, "sw", t0 + Duration::from_millis(100)));
        // State cleared: the next active tick restarts timing
        assert!(!bank.stopwatch_at(true, 100, "sw", t0 + Duration::from_millis(101)));
    }

    #[test]
    fn test_stopwatch_cleared_when_inactive() {
        let mut bank = FilterBank::new();
        let t0 = Instant::now();

        assert!(!bank.stopwatch_at(true, 100, "sw", t0));
        assert!(!bank.stopwatch_at(false, 100, "sw", t0 + Duration::from_millis(90)));
        // Restarted at 95 ms, so 150 ms is only 55 ms in
        assert!(!bank.stopwatch_at(true, 100, "sw", t0 + Duration::from_millis(95)));
        assert!(!bank.stopwatch_at(true, 100, "sw", t0 + Duration::from_millis(150)));
        assert!(bank.stopwatch_at(true, 100, "sw", t0 + Duration::from_millis(195)));
    }

    #[test]
    fn test_continuous_rotation_degrees() {
        let mut bank = FilterBank::new();
        let outputs: Vec<f64> = [170.0, -170.0, -160.0]
            .iter()
            .map(|&x| bank.continuous_rotation(x, AngleUnit::Degrees, "yaw"))
            .collect();
        assert_eq!(outputs, vec![170.0, 190.0, 200.0]);
    }

    #[test]
    fn test_continuous_rotation_radians_wraps_backwards() {
        let mut bank = FilterBank::new();
        let start = -PI + 0.1;
        bank.continuous_rotation(start, AngleUnit::Radians, "r");
        let out = bank.continuous_rotation(PI - 0.1, AngleUnit::Radians, "r");
        assert!((out - (start - 0.2)).abs() < 1e-9, "got {}", out);
    }

    #[test]
    fn test_reset_clears_key_state() {
        let mut bank = FilterBank::new();
        bank.continuous_rotation(170.0, AngleUnit::Degrees, "k");
        bank.continuous_rotation(-170.0, AngleUnit::Degrees, "k");
        bank.reset("k");
        assert_eq!(bank.continuous_rotation(-170.0, AngleUnit::Degrees, "k"), -170.0);
    }
}
