use crate::error::PipelineError;
use crate::polar::PolarPoint;

use super::grid::BackgroundGrid;
use super::histogram::AcceptanceHistogram;
use super::params::BackgroundParams;

/// Small, cheaply-cloned header describing a grid's shape and acceptance
/// telemetry, for non-blocking monitoring reads that must not take the same
/// critical section as frame processing.
#[derive(Debug, Clone)]
pub struct BackgroundHeader {
    pub rings: usize,
    pub azimuth_bins: usize,
    pub params: BackgroundParams,
    pub histogram: AcceptanceHistogram,
    pub invalid_point_count: u64,
}

/// Exclusive owner of one sensor's `BackgroundGrid`.
///
/// Frame processing happens only through this type's `process_frame`, called
/// from the sensor's single worker (spec 5). Monitoring/persistence reads go
/// through `header()`/`snapshot()`, which clone or copy rather than hold a
/// lock across the frame boundary.
#[derive(Debug)]
pub struct BackgroundManager {
    grid: BackgroundGrid,
}

impl BackgroundManager {
    pub fn new(rings: usize, azimuth_bins: usize, params: BackgroundParams) -> Self {
        BackgroundManager {
            grid: BackgroundGrid::new(rings, azimuth_bins, params),
        }
    }

    pub fn process_frame(&mut self, points: &[PolarPoint], frame_ts_ns: i64) -> Vec<bool> {
        self.grid.process_frame(points, frame_ts_ns)
    }

    pub fn reset(&mut self) {
        self.grid.reset();
    }

    pub fn reconfigure(&mut self, params: BackgroundParams) {
        self.grid.reconfigure(params);
    }

    pub fn set_ring_elevations(&mut self, elevations_deg: Vec<f64>) {
        self.grid.set_ring_elevations(elevations_deg);
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.grid.snapshot()
    }

    pub fn restore(&mut self, blob: &[u8], rings: usize, azimuth_bins: usize) -> Result<(), PipelineError> {
        self.grid.restore(blob, rings, azimuth_bins)
    }

    pub fn header(&self) -> BackgroundHeader {
        BackgroundHeader {
            rings: self.grid.rings(),
            azimuth_bins: self.grid.azimuth_bins(),
            params: *self.grid.params(),
            histogram: *self.grid.histogram(),
            invalid_point_count: self.grid.invalid_point_count(),
        }
    }

    pub fn grid(&self) -> &BackgroundGrid {
        &self.grid
    }
}
