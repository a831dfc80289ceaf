/// Pairwise distance between two points or clusters.
pub type Distance = f32;

/// A square N×N distance matrix, row-major.
pub type Matrix = Vec<Vec<Distance>>;

/// A partition of leaf indices into clusters. Order between and within
/// groups is unspecified.
pub type Groups = Vec<Vec<usize>>;

/// Rule used to extend pointwise distance to cluster-to-cluster distance.
/// Only average linkage is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkageType {
    #[default]
    Average,
}
