use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::world::WorldPoint;

use super::dbscan::dbscan;

/// Tuning knobs for `build_clusters`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusteringParams {
    /// DBSCAN neighbourhood radius, metres.
    pub eps_m: f64,
    /// DBSCAN density threshold.
    pub min_pts: usize,
    pub min_cluster_diameter_m: f64,
    pub max_cluster_diameter_m: f64,
    pub max_aspect_ratio: f64,
    /// Below this OBB short-side length, the aspect-ratio gate is waived
    /// (legitimate edge-on detections appear arc-thin).
    pub thin_object_floor_m: f64,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        ClusteringParams {
            eps_m: 0.5,
            min_pts: 3,
            min_cluster_diameter_m: 0.1,
            max_cluster_diameter_m: 12.0,
            max_aspect_ratio: 6.0,
            thin_object_floor_m: 0.03,
        }
    }
}

/// A per-frame object cluster in the world frame. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldCluster {
    pub cluster_id: u32,
    pub sensor_id: u32,
    pub ts_ns: i64,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub centroid_z: f64,
    /// OBB extent along its major axis.
    pub bbox_l: f64,
    /// OBB extent along its minor axis.
    pub bbox_w: f64,
    /// Axis-aligned extent in z.
    pub bbox_h: f64,
    /// OBB heading, radians, direction of the major axis. `None` when the
    /// cluster has fewer than 2 points (PCA is undefined).
    pub heading_rad: Option<f64>,
    pub points_count: usize,
    pub height_p95: f64,
    pub intensity_mean: u8,
}

/// Principal-axis half-extents and heading from 2D PCA on `(x, y)`. Returns
/// `None` if there are fewer than 2 distinct points (degenerate covariance).
fn pca_obb(centered: &[(f64, f64)]) -> Option<(f64, f64, f64)> {
    let n = centered.len() as f64;
    if centered.len() < 2 {
        return None;
    }

    let mut cov = Matrix2::zeros();
    for &(x, y) in centered {
        cov[(0, 0)] += x * x;
        cov[(0, 1)] += x * y;
        cov[(1, 0)] += x * y;
        cov[(1, 1)] += y * y;
    }
    cov /= n;

    let eigen = cov.symmetric_eigen();
    let (major_idx, minor_idx) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };
    let major_axis = eigen.eigenvectors.column(major_idx);
    let minor_axis = eigen.eigenvectors.column(minor_idx);

    let mut major_min = f64::INFINITY;
    let mut major_max = f64::NEG_INFINITY;
    let mut minor_min = f64::INFINITY;
    let mut minor_max = f64::NEG_INFINITY;
    for &(x, y) in centered {
        let v = Vector2::new(x, y);
        let major_proj = v.dot(&major_axis);
        let minor_proj = v.dot(&minor_axis);
        major_min = major_min.min(major_proj);
        major_max = major_max.max(major_proj);
        minor_min = minor_min.min(minor_proj);
        minor_max = minor_max.max(minor_proj);
    }

    let heading = major_axis.y.atan2(major_axis.x);
    Some((major_max - major_min, minor_max - minor_min, heading))
}

/// Arithmetic mean, then the real input point closest to it in 3D — the
/// medoid rule. Guarantees the centroid is a real return, important for
/// non-convex shapes where the arithmetic mean can sit outside the cloud.
fn medoid(points: &[&WorldPoint]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    let (sx, sy, sz) = points.iter().fold((0.0, 0.0, 0.0), |(ax, ay, az), p| {
        (ax + p.x, ay + p.y, az + p.z)
    });
    let mean = (sx / n, sy / n, sz / n);

    points
        .iter()
        .min_by(|a, b| {
            let da = (a.x - mean.0).powi(2) + (a.y - mean.1).powi(2) + (a.z - mean.2).powi(2);
            let db = (b.x - mean.0).powi(2) + (b.y - mean.1).powi(2) + (b.z - mean.2).powi(2);
            da.partial_cmp(&db).unwrap()
        })
        .map(|p| (p.x, p.y, p.z))
        .unwrap()
}

fn percentile_95(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let rank = ((values.len() as f64 - 1.0) * 0.95).round() as usize;
    values[rank]
}

fn build_one_cluster(
    cluster_id: u32,
    sensor_id: u32,
    ts_ns: i64,
    members: Vec<&WorldPoint>,
) -> WorldCluster {
    let (cx, cy, cz) = medoid(&members);

    let centered: Vec<(f64, f64)> = {
        let n = members.len() as f64;
        let (sx, sy) = members.iter().fold((0.0, 0.0), |(ax, ay), p| (ax + p.x, ay + p.y));
        let (mx, my) = (sx / n, sy / n);
        members.iter().map(|p| (p.x - mx, p.y - my)).collect()
    };
    let (bbox_l, bbox_w, heading) = pca_obb(&centered).unwrap_or((0.0, 0.0, 0.0));
    let heading_rad = if members.len() >= 2 { Some(heading) } else { None };

    let z_min = members.iter().map(|p| p.z).fold(f64::INFINITY, f64::min);
    let z_max = members.iter().map(|p| p.z).fold(f64::NEG_INFINITY, f64::max);
    let bbox_h = if members.is_empty() { 0.0 } else { z_max - z_min };

    let height_p95 = percentile_95(members.iter().map(|p| p.z).collect());
    let intensity_mean = {
        let sum: u64 = members.iter().map(|p| p.intensity as u64).sum();
        (sum / members.len() as u64) as u8
    };

    WorldCluster {
        cluster_id,
        sensor_id,
        ts_ns,
        centroid_x: cx,
        centroid_y: cy,
        centroid_z: cz,
        bbox_l: bbox_l.max(bbox_w),
        bbox_w: bbox_l.min(bbox_w),
        bbox_h,
        heading_rad,
        points_count: members.len(),
        height_p95,
        intensity_mean,
    }
}

fn passes_shape_gate(cluster: &WorldCluster, params: &ClusteringParams) -> bool {
    // Lower bound is inclusive (`== min` passes), upper bound is strict
    // (`== max` is rejected).
    let longest = cluster.bbox_l.max(cluster.bbox_w);
    if longest < params.min_cluster_diameter_m || longest >= params.max_cluster_diameter_m {
        return false;
    }
    let shortest = cluster.bbox_l.min(cluster.bbox_w);
    if shortest < params.thin_object_floor_m {
        return true;
    }
    longest / shortest <= params.max_aspect_ratio
}

/// Runs DBSCAN over `points` (2D, z used only for features) and builds
/// `WorldCluster` records, applying the post-clustering shape gates.
/// `cluster_id`s are assigned densely in discovery order, `0`-based, local to
/// this frame.
pub fn build_clusters(
    points: &[WorldPoint],
    params: &ClusteringParams,
    sensor_id: u32,
    ts_ns: i64,
) -> Vec<WorldCluster> {
    if points.is_empty() {
        return Vec::new();
    }

    let positions: Vec<(f64, f64)> = points.iter().map(|p| p.xy()).collect();
    let labels = dbscan(&positions, params.eps_m, params.min_pts);

    let max_label = labels.iter().copied().filter(|&l| l > 0).max().unwrap_or(0);
    let mut buckets: Vec<Vec<&WorldPoint>> = vec![Vec::new(); max_label as usize];
    for (point, &label) in points.iter().zip(labels.iter()) {
        if label > 0 {
            buckets[(label - 1) as usize].push(point);
        }
    }

    let mut next_id = 0u32;
    let mut clusters = Vec::new();
    for members in buckets {
        if members.is_empty() {
            continue;
        }
        let cluster = build_one_cluster(next_id, sensor_id, ts_ns, members);
        if passes_shape_gate(&cluster, params) {
            clusters.push(cluster);
            next_id += 1;
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wp(x: f64, y: f64, z: f64) -> WorldPoint {
        WorldPoint {
            x,
            y,
            z,
            intensity: 100,
            ts_ns: 0,
            sensor_id: 1,
        }
    }

    #[test]
    fn medoid_centroid_picks_nearest_real_point() {
        // Mean is (1, 3.33, 0); squared distances to it are (0,0,0) -> 12.11,
        // (2,0,0) -> 12.11, (1,10,0) -> 44.44, so the nearest real point is
        // the first one (the tie with (2,0,0) is broken by iteration order).
        let pts = vec![wp(0.0, 0.0, 0.0), wp(2.0, 0.0, 0.0), wp(1.0, 10.0, 0.0)];
        let refs: Vec<&WorldPoint> = pts.iter().collect();
        let (x, y, z) = medoid(&refs);
        assert_eq!((x, y, z), (0.0, 0.0, 0.0));
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        let clusters = build_clusters(&[], &ClusteringParams::default(), 1, 0);
        assert!(clusters.is_empty());
    }

    #[test]
    fn degenerate_coincident_cluster_is_filtered() {
        let points = vec![wp(0.0, 0.0, 0.0); 5];
        let params = ClusteringParams {
            min_cluster_diameter_m: 0.01,
            ..ClusteringParams::default()
        };
        let clusters = build_clusters(&points, &params, 1, 0);
        assert!(clusters.is_empty());
    }

    #[test]
    fn thin_object_floor_waives_aspect_ratio() {
        let params = ClusteringParams {
            eps_m: 0.3,
            min_pts: 2,
            max_aspect_ratio: 2.0,
            thin_object_floor_m: 0.03,
            min_cluster_diameter_m: 0.1,
            max_cluster_diameter_m: 10.0,
        };
        let mut points = Vec::new();
        for i in 0..20 {
            points.push(wp(i as f64 * 0.1, 0.0, 0.0));
        }
        let clusters = build_clusters(&points, &params, 1, 0);
        assert_eq!(clusters.len(), 1);
    }
}
