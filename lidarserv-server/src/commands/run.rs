use std::fs::File;
use std::io::BufReader;

use anyhow::Result;
use lidarserv_common::polar::PolarPoint;
use log::{debug, info};
use serde::Deserialize;

use crate::cli::RunOptions;
use crate::collaborators::{NoopVerticalBandFilter, StaticPoseSource};
use crate::config::SensorParams;
use crate::pipeline::PerceptionPipeline;

/// One recorded sensor frame, as read from the `frames` input file: a JSON
/// array of these.
#[derive(Debug, Deserialize)]
struct RecordedFrame {
    frame_ts_ns: i64,
    points: Vec<PolarPoint>,
}

pub fn run(options: RunOptions) -> Result<()> {
    let params = match &options.config {
        Some(path) => {
            debug!("loading sensor config from {}", path.display());
            SensorParams::load_from_file(path)?
        }
        None => SensorParams::default(),
    };

    let frames_file = File::open(&options.frames)?;
    let frames: Vec<RecordedFrame> = serde_json::from_reader(BufReader::new(frames_file))?;
    info!("loaded {} recorded frames from {}", frames.len(), options.frames.display());

    let mut pipeline = PerceptionPipeline::new(
        Box::new(StaticPoseSource::identity()),
        Box::new(NoopVerticalBandFilter),
    );
    pipeline.register_sensor(options.sensor_id, params);

    let mut last_frame_ts = 0i64;
    for frame in frames {
        last_frame_ts = frame.frame_ts_ns;
        let errors = pipeline
            .process_frame(options.sensor_id, frame.points, frame.frame_ts_ns)
            .expect("sensor was just registered");
        for error in errors {
            debug!("recoverable pipeline error: {error}");
        }
    }

    let counts = pipeline.get_track_counts(options.sensor_id).unwrap();
    info!(
        "done: {} tracks total ({} tentative, {} confirmed, {} deleted)",
        counts.total, counts.tentative, counts.confirmed, counts.deleted
    );

    if let Some(path) = options.snapshot_out {
        pipeline.request_snapshot(options.sensor_id, last_frame_ts);
        let pending = pipeline.take_pending_snapshots();
        if let Some(snapshot) = pending.last() {
            let file = File::create(&path)?;
            serde_json::to_writer_pretty(file, snapshot)?;
            info!("wrote background snapshot to {}", path.display());
        }
    }

    Ok(())
}
