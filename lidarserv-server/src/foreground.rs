use lidarserv_common::polar::PolarPoint;

/// The per-sensor cached foreground polar subset from the most recently
/// processed frame, for non-blocking dashboard reads via
/// `get_recent_foreground` (spec 5, 6). Replaced wholesale once per frame.
#[derive(Debug, Clone, Default)]
pub struct ForegroundSnapshot {
    pub frame_ts_ns: i64,
    pub points: Vec<PolarPoint>,
}
