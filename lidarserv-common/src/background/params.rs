use serde::{Deserialize, Serialize};

/// Tuning knobs for one sensor's `BackgroundGrid`.
///
/// Loaded from JSON by the server crate (`serde_json::from_reader`), swapped
/// atomically at a frame boundary on `reconfigure()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundParams {
    /// EWMA rate after warmup. `(0, 1]`.
    pub update_fraction: f64,
    /// Sensitivity multiplier on spread. `> 0`.
    pub closeness_multiplier: f64,
    /// Additive slack added to the threshold. `>= 0`.
    pub safety_margin_m: f64,
    /// Fraction of range treated as a noise floor. `>= 0`.
    pub noise_relative_fraction: f64,
    /// Required foreground neighbours to confirm a tentative flag. `[0, 8]`.
    pub neighbor_confirm_count: u8,
    /// Suppression window, in nanoseconds, after a confirmed foreground flag.
    pub freeze_duration_ns: i64,
    /// Scheduling only: how long a cell must be stable before it is considered settled.
    pub settling_period_ns: i64,
    /// Scheduling only: period between periodic snapshots.
    pub snapshot_interval_ns: i64,
    /// Scheduling only: fraction of changed cells that triggers an out-of-band snapshot.
    pub change_threshold_for_snapshot: f64,
    /// Whether an unseen cell seeds its baseline from its first observation.
    pub seed_from_first_observation: bool,
    /// `N_warm` in the warmup multiplier.
    pub warmup_count: u32,
    /// `k` in the warmup multiplier.
    pub warmup_k: f64,
    /// Small additive constant inside the threshold formula, guards against a
    /// zero threshold when `spread_m` and `avg_range_m` are both zero.
    pub epsilon: f64,
    /// Ratio bounding the "farther than background" branch: a farther-range
    /// return is foreground only if `diff <= avg_range_m * farther_ratio`.
    /// This is the single authoritative predicate for that branch.
    pub farther_ratio: f64,
    /// Saturating cap on `times_seen`, to avoid unbounded growth in long-running sensors.
    pub max_times_seen: u32,
}

impl Default for BackgroundParams {
    fn default() -> Self {
        BackgroundParams {
            update_fraction: 0.01,
            closeness_multiplier: 3.0,
            safety_margin_m: 0.1,
            noise_relative_fraction: 0.01,
            neighbor_confirm_count: 2,
            freeze_duration_ns: 5_000_000_000,
            settling_period_ns: 30_000_000_000,
            snapshot_interval_ns: 300_000_000_000,
            change_threshold_for_snapshot: 0.05,
            seed_from_first_observation: true,
            warmup_count: 100,
            warmup_k: 3.0,
            epsilon: 1e-6,
            farther_ratio: 0.5,
            max_times_seen: 1_000_000,
        }
    }
}

impl BackgroundParams {
    /// `warmup_mult(n) = 1 + k * max(0, (N_warm - n) / N_warm)`.
    pub fn warmup_mult(&self, times_seen: u32) -> f64 {
        let n_warm = self.warmup_count as f64;
        let remaining = (n_warm - times_seen as f64).max(0.0);
        1.0 + self.warmup_k * (remaining / n_warm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_mult_decays_to_one() {
        let p = BackgroundParams::default();
        assert!(p.warmup_mult(0) > p.warmup_mult(50));
        assert_eq!(p.warmup_mult(100), 1.0);
        assert_eq!(p.warmup_mult(1000), 1.0);
    }
}
