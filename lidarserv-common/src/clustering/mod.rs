//! Regular-grid spatial index, DBSCAN, and cluster feature extraction
//! (medoid centroid, PCA-based OBB).

mod cluster;
mod dbscan;
mod spatial_index;

pub use cluster::{build_clusters, ClusteringParams, WorldCluster};
pub use dbscan::{dbscan, Label};
pub use spatial_index::SpatialIndex;
