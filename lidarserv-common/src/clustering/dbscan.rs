use std::collections::VecDeque;

use super::spatial_index::SpatialIndex;

/// Point labels: `0` unvisited, `-1` noise, a positive integer is a cluster id.
pub type Label = i32;

/// Classic density-based clustering over 2D positions (z, if any, is ignored
/// here and used only for downstream cluster features). Deterministic given
/// input order: the outer loop visits points in order, and cluster ids are
/// assigned in the order clusters are discovered.
pub fn dbscan(positions: &[(f64, f64)], eps: f64, min_pts: usize) -> Vec<Label> {
    let n = positions.len();
    let mut labels = vec![0 as Label; n];
    if n == 0 {
        return labels;
    }

    let index = SpatialIndex::build(positions, eps);
    let mut next_cluster_id: Label = 1;

    for i in 0..n {
        if labels[i] != 0 {
            continue;
        }
        let neighbours = index.region_query(i, eps);
        if neighbours.len() < min_pts {
            labels[i] = -1;
            continue;
        }

        let cluster_id = next_cluster_id;
        next_cluster_id += 1;
        labels[i] = cluster_id;

        let mut queue: VecDeque<usize> = neighbours.into_iter().filter(|&j| j != i).collect();
        while let Some(j) = queue.pop_front() {
            if labels[j] == -1 {
                labels[j] = cluster_id;
            }
            if labels[j] != 0 {
                continue;
            }
            labels[j] = cluster_id;

            let j_neighbours = index.region_query(j, eps);
            if j_neighbours.len() >= min_pts {
                for k in j_neighbours {
                    if labels[k] == 0 || labels[k] == -1 {
                        queue.push_back(k);
                    }
                }
            }
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_clusters() {
        assert_eq!(dbscan(&[], 1.0, 3), Vec::<Label>::new());
    }

    #[test]
    fn two_dense_groups_and_noise() {
        let positions = vec![
            (0.0, 0.0),
            (0.1, 0.0),
            (0.0, 0.1),
            (10.0, 10.0),
            (10.1, 10.0),
            (10.0, 10.1),
            (50.0, 50.0),
        ];
        let labels = dbscan(&positions, 0.5, 3);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
        assert_eq!(labels[6], -1);
    }

    #[test]
    fn every_point_labelled_exactly_once() {
        let positions = vec![(0.0, 0.0), (0.2, 0.0), (0.4, 0.0), (5.0, 5.0)];
        let labels = dbscan(&positions, 0.5, 2);
        assert_eq!(labels.len(), positions.len());
        for label in labels {
            assert!(label == -1 || label > 0);
        }
    }
}
