use log::{debug, info, trace};

use crate::error::PipelineError;
use crate::polar::PolarPoint;

use super::cell::BackgroundCell;
use super::histogram::AcceptanceHistogram;
use super::params::BackgroundParams;
use super::snapshot;

/// `az_bin = floor(azimuth_deg * azimuth_bins / 360) mod azimuth_bins`.
/// `360.0` wraps to bin `0`, matching a full revolution.
pub fn azimuth_bin(azimuth_deg: f64, azimuth_bins: usize) -> usize {
    let raw = (azimuth_deg * azimuth_bins as f64 / 360.0).floor() as i64;
    raw.rem_euclid(azimuth_bins as i64) as usize
}

fn effective_threshold(cell: &BackgroundCell, params: &BackgroundParams) -> f64 {
    let warmup = params.warmup_mult(cell.times_seen);
    warmup
        * (params.closeness_multiplier
            * (cell.spread_m + params.noise_relative_fraction * cell.avg_range_m + params.epsilon))
        + params.safety_margin_m
}

/// The single authoritative predicate for the "farther than background"
/// branch: a farther-range return is foreground only within a ratio of the
/// learned range, narrower than the unbounded closer-than-background branch.
fn is_farther_foreground(diff: f64, avg_range_m: f64, params: &BackgroundParams) -> bool {
    diff > 0.0 && diff <= avg_range_m * params.farther_ratio
}

/// Per-sensor `(rings x azimuth_bins)` grid of learned range statistics.
///
/// Owned exclusively by its `BackgroundManager`; nothing outside that owner
/// mutates cells directly.
#[derive(Debug, Clone)]
pub struct BackgroundGrid {
    rings: usize,
    azimuth_bins: usize,
    cells: Vec<BackgroundCell>,
    params: BackgroundParams,
    ring_elevations_deg: Vec<f64>,
    histogram: AcceptanceHistogram,
    invalid_point_count: u64,
}

impl BackgroundGrid {
    pub fn new(rings: usize, azimuth_bins: usize, params: BackgroundParams) -> Self {
        let n = rings * azimuth_bins;
        BackgroundGrid {
            rings,
            azimuth_bins,
            cells: vec![BackgroundCell::default(); n],
            params,
            ring_elevations_deg: vec![0.0; rings],
            histogram: AcceptanceHistogram::default(),
            invalid_point_count: 0,
        }
    }

    pub fn rings(&self) -> usize {
        self.rings
    }

    pub fn azimuth_bins(&self) -> usize {
        self.azimuth_bins
    }

    pub fn params(&self) -> &BackgroundParams {
        &self.params
    }

    pub fn reconfigure(&mut self, params: BackgroundParams) {
        self.params = params;
    }

    pub fn cells(&self) -> &[BackgroundCell] {
        &self.cells
    }

    pub fn histogram(&self) -> &AcceptanceHistogram {
        &self.histogram
    }

    pub fn invalid_point_count(&self) -> u64 {
        self.invalid_point_count
    }

    pub fn set_ring_elevations(&mut self, elevations_deg: Vec<f64>) {
        assert_eq!(elevations_deg.len(), self.rings);
        self.ring_elevations_deg = elevations_deg;
    }

    pub fn ring_elevation_deg(&self, ring: usize) -> f64 {
        self.ring_elevations_deg[ring]
    }

    /// Wipes all cells and the histogram atomically.
    pub fn reset(&mut self) {
        let n = self.rings * self.azimuth_bins;
        self.cells = vec![BackgroundCell::default(); n];
        self.histogram.reset();
        self.invalid_point_count = 0;
        info!("background grid reset: {} rings x {} azimuth bins", self.rings, self.azimuth_bins);
    }

    fn cell_index(&self, ring: usize, az_bin: usize) -> usize {
        ring * self.azimuth_bins + az_bin
    }

    /// Counts how many of `idx`'s eight neighbours were tentatively
    /// foreground in `tentative`, a mask computed for the *same* frame as
    /// `idx`, and compares that count to `neighbor_confirm_count`.
    fn neighbor_confirmed(&self, idx: usize, tentative: &[bool]) -> bool {
        let ring = idx / self.azimuth_bins;
        let az = (idx % self.azimuth_bins) as i64;
        let mut count = 0u8;
        for dr in [-1i64, 0, 1] {
            let r = ring as i64 + dr;
            if r < 0 || r as usize >= self.rings {
                continue;
            }
            for da in [-1i64, 0, 1] {
                if dr == 0 && da == 0 {
                    continue;
                }
                let a = (az + da).rem_euclid(self.azimuth_bins as i64) as usize;
                let nidx = r as usize * self.azimuth_bins + a;
                if tentative[nidx] {
                    count += 1;
                }
            }
        }
        count >= self.params.neighbor_confirm_count
    }

    /// The per-point farther/closer-than-background predicate (spec 4.1),
    /// read-only against the cell's statistics as of the start of the frame.
    /// Run for every point in a first pass so confirmation (`neighbor_confirmed`)
    /// can compare against a same-frame snapshot rather than the previous
    /// frame's mask, which would make a freshly-appearing object's cells
    /// permanently unconfirmable (they were background a moment ago).
    fn tentative_foreground(&self, idx: usize, distance_m: f64) -> bool {
        let cell = &self.cells[idx];
        if cell.times_seen == 0 && self.params.seed_from_first_observation {
            return false;
        }
        let threshold = effective_threshold(cell, &self.params);
        let diff = distance_m - cell.avg_range_m;
        if diff.abs() <= threshold {
            false
        } else if diff < 0.0 {
            true
        } else {
            is_farther_foreground(diff, cell.avg_range_m, &self.params)
        }
    }

    /// Applies the confirmed/unconfirmed outcome to one cell's statistics.
    fn finalize_cell(&mut self, idx: usize, distance_m: f64, frame_ts_ns: i64, confirmed: bool) {
        let params = self.params;

        if self.cells[idx].times_seen == 0 && params.seed_from_first_observation {
            let cell = &mut self.cells[idx];
            cell.avg_range_m = distance_m;
            cell.spread_m = 0.0;
            cell.times_seen = 1;
            cell.last_update_ns = frame_ts_ns;
            return;
        }

        let cell = &mut self.cells[idx];
        if confirmed {
            cell.frozen_until_ns = frame_ts_ns + params.freeze_duration_ns;
            cell.last_update_ns = frame_ts_ns;
            cell.recent_foreground_count = cell.recent_foreground_count.saturating_add(1);
            return;
        }

        if frame_ts_ns >= cell.frozen_until_ns {
            let alpha = params.update_fraction.max(1.0 / cell.times_seen.max(1) as f64);
            cell.avg_range_m = (1.0 - alpha) * cell.avg_range_m + alpha * distance_m;
            cell.spread_m =
                (1.0 - alpha) * cell.spread_m + alpha * (distance_m - cell.avg_range_m).abs();
            cell.times_seen = cell.times_seen.saturating_add(1).min(params.max_times_seen);
        }
        cell.last_update_ns = frame_ts_ns;
    }

    /// Classifies every point in `points` as foreground/background, updating
    /// cell statistics as it goes. Returns a mask the same length as `points`.
    /// Points with `distance_m == 0` (no return) or that fail validity
    /// (`InvalidPoint`) are classified `false` and counted, never crash the frame.
    ///
    /// Runs in two passes so neighbour confirmation sees the whole frame at
    /// once: pass one computes each point's tentative foreground/background
    /// call against the grid's pre-frame statistics (order-independent,
    /// no mutation); pass two confirms each point against that same-frame
    /// tentative mask and updates cell statistics.
    pub fn process_frame(&mut self, points: &[PolarPoint], frame_ts_ns: i64) -> Vec<bool> {
        trace!("background frame: {} points, ts={}", points.len(), frame_ts_ns);
        let mut mask = vec![false; points.len()];
        let mut dropped_this_frame = 0u64;
        let mut foreground_this_frame = 0u64;

        let mut point_cell = vec![None; points.len()];
        let mut point_tentative = vec![false; points.len()];
        let mut cell_tentative = vec![false; self.cells.len()];

        for (i, point) in points.iter().enumerate() {
            if !point.is_valid() {
                self.invalid_point_count += 1;
                dropped_this_frame += 1;
                continue;
            }
            if point.is_empty_return() {
                continue;
            }
            let ring = point.channel as usize;
            if ring >= self.rings {
                self.invalid_point_count += 1;
                dropped_this_frame += 1;
                continue;
            }
            let az_bin = azimuth_bin(point.azimuth_deg, self.azimuth_bins);
            let idx = self.cell_index(ring, az_bin);

            let tentative_fg = self.tentative_foreground(idx, point.distance_m);
            point_cell[i] = Some(idx);
            point_tentative[i] = tentative_fg;
            if tentative_fg {
                cell_tentative[idx] = true;
            }
        }

        for (i, point) in points.iter().enumerate() {
            let Some(idx) = point_cell[i] else {
                continue;
            };
            let confirmed = point_tentative[i] && self.neighbor_confirmed(idx, &cell_tentative);
            self.finalize_cell(idx, point.distance_m, frame_ts_ns, confirmed);
            mask[i] = confirmed;
            if confirmed {
                foreground_this_frame += 1;
            }
            self.histogram.record(point.distance_m, confirmed);
        }

        if dropped_this_frame > 0 {
            debug!(
                "background frame dropped {dropped_this_frame} invalid/out-of-range points (total {})",
                self.invalid_point_count
            );
        }
        trace!("background frame classified {foreground_this_frame} foreground points");

        mask
    }

    /// Opaque, compact encoding of `cells` (gzipped binary), for the
    /// persistence collaborator to store. Never fails.
    pub fn snapshot(&self) -> Vec<u8> {
        snapshot::encode_cells(&self.cells)
            .expect("in-memory gzip encoding is infallible")
    }

    /// Rehydrates from a blob produced by `snapshot()`. On dimension
    /// mismatch, or if the blob cannot be decoded, the grid is left
    /// untouched and an error is returned.
    pub fn restore(&mut self, blob: &[u8], rings: usize, azimuth_bins: usize) -> Result<(), PipelineError> {
        if rings != self.rings || azimuth_bins != self.azimuth_bins {
            info!(
                "background restore rejected: grid is {}x{}, blob is {}x{}",
                self.rings, self.azimuth_bins, rings, azimuth_bins
            );
            return Err(PipelineError::BackgroundRestoreMismatch {
                grid_rings: self.rings,
                grid_bins: self.azimuth_bins,
                blob_rings: rings,
                blob_bins: azimuth_bins,
            });
        }
        let cells = snapshot::decode_cells(blob).map_err(|e| {
            info!("background restore rejected: blob undecodable: {e}");
            PipelineError::BackgroundRestoreUnreadable {
                reason: e.to_string(),
            }
        })?;
        if cells.len() != self.cells.len() {
            info!(
                "background restore rejected: decoded {} cells, expected {}",
                cells.len(),
                self.cells.len()
            );
            return Err(PipelineError::BackgroundRestoreMismatch {
                grid_rings: self.rings,
                grid_bins: self.azimuth_bins,
                blob_rings: rings,
                blob_bins: azimuth_bins,
            });
        }
        self.cells = cells;
        info!("background restored: {} rings x {} azimuth bins", self.rings, self.azimuth_bins);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(channel: u16, azimuth_deg: f64, distance_m: f64) -> PolarPoint {
        PolarPoint {
            channel,
            azimuth_deg,
            distance_m,
            elevation_deg: 0.0,
            intensity: 100,
            ts_ns: 0,
        }
    }

    #[test]
    fn azimuth_360_wraps_to_bin_zero() {
        assert_eq!(azimuth_bin(360.0, 360), 0);
        assert_eq!(azimuth_bin(0.0, 360), 0);
        assert_eq!(azimuth_bin(359.9, 360), 359);
    }

    #[test]
    fn warmup_suppression_then_foreground() {
        let params = BackgroundParams {
            noise_relative_fraction: 0.01,
            closeness_multiplier: 3.0,
            safety_margin_m: 0.1,
            ..BackgroundParams::default()
        };
        let mut grid = BackgroundGrid::new(1, 1, params);

        for t in 0..5 {
            grid.process_frame(&[point(0, 0.0, 10.0)], t * 100_000_000);
        }
        assert_eq!(grid.cells()[0].times_seen, 5);

        let mask = grid.process_frame(&[point(0, 0.0, 10.5)], 600_000_000);
        assert!(!mask[0], "small deviation during warmup should stay background");

        let mask = grid.process_frame(&[point(0, 0.0, 5.0)], 700_000_000);
        assert!(mask[0], "a vehicle much closer than background is foreground");
    }

    #[test]
    fn warmed_up_sensitivity() {
        let params = BackgroundParams {
            noise_relative_fraction: 0.01,
            closeness_multiplier: 3.0,
            safety_margin_m: 0.1,
            neighbor_confirm_count: 0,
            ..BackgroundParams::default()
        };
        let mut grid = BackgroundGrid::new(1, 1, params);
        grid.cells[0].times_seen = 100;
        grid.cells[0].avg_range_m = 10.0;
        grid.cells[0].spread_m = 0.0;

        let mask = grid.process_frame(&[point(0, 0.0, 10.5)], 0);
        assert!(mask[0], "a warmed-up cell is sensitive to a 0.5m deviation");
    }

    #[test]
    fn freeze_holds_baseline() {
        let params = BackgroundParams {
            freeze_duration_ns: 5_000_000_000,
            neighbor_confirm_count: 0,
            ..BackgroundParams::default()
        };
        let mut grid = BackgroundGrid::new(1, 1, params);
        grid.cells[0].times_seen = 100;
        grid.cells[0].avg_range_m = 10.0;
        grid.cells[0].spread_m = 0.0;

        let mask = grid.process_frame(&[point(0, 0.0, 2.0)], 1_000_000_000);
        assert!(mask[0]);
        assert_eq!(grid.cells()[0].frozen_until_ns, 1_000_000_000 + 5_000_000_000);

        let avg_before = grid.cells()[0].avg_range_m;
        grid.process_frame(&[point(0, 0.0, 10.0)], 2_000_000_000);
        assert_eq!(grid.cells()[0].avg_range_m, avg_before, "frozen cell must not update");
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let mut grid = BackgroundGrid::new(2, 4, BackgroundParams::default());
        grid.process_frame(&[point(0, 0.0, 12.0), point(1, 90.0, 8.0)], 0);
        let blob = grid.snapshot();

        let mut other = BackgroundGrid::new(2, 4, BackgroundParams::default());
        other.restore(&blob, 2, 4).unwrap();
        assert_eq!(other.cells(), grid.cells());
    }

    #[test]
    fn restore_rejects_dimension_mismatch() {
        let grid = BackgroundGrid::new(2, 4, BackgroundParams::default());
        let blob = grid.snapshot();

        let mut other = BackgroundGrid::new(1, 4, BackgroundParams::default());
        let before = other.cells().to_vec();
        let result = other.restore(&blob, 2, 4);
        assert!(result.is_err());
        assert_eq!(other.cells(), before.as_slice());
    }

    #[test]
    fn repeated_frame_is_idempotent_past_first() {
        let mut grid = BackgroundGrid::new(1, 1, BackgroundParams::default());
        grid.process_frame(&[point(0, 0.0, 10.0)], 0);
        let after_first = grid.cells()[0];

        grid.process_frame(&[point(0, 0.0, 10.0)], 0);
        let after_second = grid.cells()[0];

        assert_eq!(after_first.avg_range_m, after_second.avg_range_m);
        assert_eq!(after_first.spread_m, after_second.spread_m);
        assert_eq!(after_first.last_update_ns, after_second.last_update_ns);
    }
}
