/// Range buckets used for the accepted/rejected acceptance telemetry: `0-5`,
/// `5-20`, `20-60`, `60+` metres.
const BUCKET_EDGES_M: [f64; 3] = [5.0, 20.0, 60.0];
const BUCKET_COUNT: usize = 4;

fn bucket_of(range_m: f64) -> usize {
    BUCKET_EDGES_M
        .iter()
        .position(|&edge| range_m < edge)
        .unwrap_or(BUCKET_COUNT - 1)
}

/// Accepted-background vs. rejected (foreground) counts, bucketed by range.
/// Feeds operational monitoring and bias diagnostics; has no effect on
/// classification.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptanceHistogram {
    accepted: [u64; BUCKET_COUNT],
    rejected: [u64; BUCKET_COUNT],
}

impl AcceptanceHistogram {
    pub fn record(&mut self, range_m: f64, is_foreground: bool) {
        let bucket = bucket_of(range_m);
        if is_foreground {
            self.rejected[bucket] += 1;
        } else {
            self.accepted[bucket] += 1;
        }
    }

    pub fn accepted_counts(&self) -> [u64; BUCKET_COUNT] {
        self.accepted
    }

    pub fn rejected_counts(&self) -> [u64; BUCKET_COUNT] {
        self.rejected
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_split_correctly() {
        assert_eq!(bucket_of(0.0), 0);
        assert_eq!(bucket_of(4.99), 0);
        assert_eq!(bucket_of(5.0), 1);
        assert_eq!(bucket_of(19.99), 1);
        assert_eq!(bucket_of(20.0), 2);
        assert_eq!(bucket_of(59.99), 2);
        assert_eq!(bucket_of(60.0), 3);
        assert_eq!(bucket_of(1000.0), 3);
    }

    #[test]
    fn record_splits_accepted_and_rejected() {
        let mut h = AcceptanceHistogram::default();
        h.record(2.0, false);
        h.record(2.0, true);
        assert_eq!(h.accepted_counts()[0], 1);
        assert_eq!(h.rejected_counts()[0], 1);
    }
}
