use thiserror::Error;

/// The tagged sum of everything that can go wrong inside the perception core.
///
/// No variant aborts frame processing: every call site that can produce one of
/// these either drops the offending point/cluster/track and continues, or (for
/// `BackgroundRestoreMismatch`) leaves state untouched and returns the error to
/// the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("invalid point: {reason}")]
    InvalidPoint { reason: &'static str },

    #[error("pose quality insufficient for training-grade transform: {quality:?}")]
    PoseQualityInsufficient { quality: crate::pose::PoseQuality },

    #[error("background restore rejected: dimension mismatch (grid is {grid_rings}x{grid_bins}, blob is {blob_rings}x{blob_bins})")]
    BackgroundRestoreMismatch {
        grid_rings: usize,
        grid_bins: usize,
        blob_rings: usize,
        blob_bins: usize,
    },

    #[error("background restore rejected: blob could not be decoded ({reason})")]
    BackgroundRestoreUnreadable { reason: String },

    #[error("singular innovation covariance for track {track_id}")]
    SingularInnovation { track_id: String },

    #[error("track capacity exhausted ({max_tracks} tracks live)")]
    TrackCapacityExhausted { max_tracks: usize },

    #[error("callback error: {reason}")]
    CallbackError { reason: String },
}
