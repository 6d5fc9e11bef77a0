//! The polar background-subtraction grid: per-cell range statistics, warmup,
//! freeze and neighbour-confirmation logic, and snapshot/restore.

mod cell;
mod grid;
mod histogram;
mod manager;
mod params;
mod snapshot;

pub use cell::BackgroundCell;
pub use grid::{azimuth_bin, BackgroundGrid};
pub use histogram::AcceptanceHistogram;
pub use manager::{BackgroundHeader, BackgroundManager};
pub use params::BackgroundParams;
