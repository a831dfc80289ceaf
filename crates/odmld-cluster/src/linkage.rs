use crate::tree::Node;
use crate::types::{Distance, Matrix};

/// Average linkage: cluster-to-cluster distance is the mean of every
/// pairwise leaf distance between the two clusters. Rather than
/// recomputing that mean on every merge, `sums` tracks the *sum* of pairwise
/// distances (updated by elementwise addition of the two merged rows) and
/// `sizes` tracks leaf counts, so the average is `sum / (size_a * size_b)`.
pub(crate) struct LinkageAverage {
    sizes: Vec<usize>,
    sums: Vec<Vec<Distance>>,
}

impl LinkageAverage {
    /// `n` is the leaf count; the arena holds at most `2n` nodes over the
    /// run, so both auxiliary tables are preallocated to that capacity to
    /// avoid reallocating mid-merge.
    pub(crate) fn new(distances: &Matrix, n: usize) -> Self {
        let capacity = 2 * n;
        let mut sums = vec![vec![0.0; capacity]; capacity];
        for (i, row) in distances.iter().enumerate() {
            for (j, &distance) in row.iter().enumerate() {
                sums[i][j] = distance;
            }
        }
        let mut sizes = vec![0; capacity];
        sizes[..n].fill(1);
        Self { sizes, sums }
    }

    pub(crate) fn merge(&mut self, a: usize, b: usize, new_id: usize, nodes: &[Node]) {
        self.sizes[new_id] = self.sizes[a] + self.sizes[b];
        for i in 0..new_id {
            if !nodes[i].active {
                continue;
            }
            let sum = self.sums[a][i] + self.sums[b][i];
            self.sums[i][new_id] = sum;
            self.sums[new_id][i] = sum;
        }
    }

    /// Distances from `node_id` to every other still-active node with a
    /// lower id (distances are symmetric, so only one side is needed).
    pub(crate) fn distances_from(&self, node_id: usize, nodes: &[Node]) -> Vec<(usize, Distance)> {
        let mut out = Vec::new();
        for i in 0..node_id {
            if !nodes[i].active {
                continue;
            }
            let average = self.sums[node_id][i] / self.sizes[node_id] as f32 / self.sizes[i] as f32;
            out.push((i, average));
        }
        out
    }
}
