use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::error::ClusterError;
use crate::linkage::LinkageAverage;
use crate::tree::{collect_groups, Node};
use crate::types::{Distance, Groups, LinkageType, Matrix};

/// A candidate merge waiting in the priority queue: the pair and the
/// distance it was pushed at. Ordering compares only `distance` — on a tie
/// the pop order between equally-distant pairs is unspecified, same as the
/// original's comparator.
#[derive(Debug, PartialEq)]
struct QueueEntry {
    distance: OrderedFloat<Distance>,
    a: usize,
    b: usize,
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance.cmp(&other.distance)
    }
}

/// Hierarchical clustering over a fixed N×N distance matrix. Construction
/// validates squareness; `run` performs one clustering pass and is pure
/// with respect to `self` (repeated calls with different stop conditions
/// are independent).
pub struct AgglomerativeClustering {
    distances: Matrix,
}

impl AgglomerativeClustering {
    pub fn new(distances: Matrix) -> Result<Self, ClusterError> {
        let n = distances.len();
        for (row, entries) in distances.iter().enumerate() {
            if entries.len() != n {
                return Err(ClusterError::NotSquare {
                    row,
                    len: entries.len(),
                    expected: n,
                });
            }
        }
        Ok(Self { distances })
    }

    pub fn run(
        &self,
        linkage_type: LinkageType,
        n_clusters: Option<usize>,
        threshold: Option<Distance>,
    ) -> Result<Groups, ClusterError> {
        let LinkageType::Average = linkage_type;

        match (n_clusters, threshold) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(ClusterError::AmbiguousStopCondition)
            }
            _ => {}
        }

        let n = self.distances.len();
        if let Some(k) = n_clusters {
            if k > n {
                return Err(ClusterError::NClustersOutOfRange { n_clusters: k, n });
            }
        }
        if let Some(t) = threshold {
            if t < 0.0 {
                return Err(ClusterError::NegativeThreshold(t));
            }
        }

        if n == 0 {
            return Ok(Vec::new());
        }

        let mut nodes = Vec::with_capacity(n * 2);
        nodes.extend((0..n).map(|_| Node::leaf()));

        let mut heap = BinaryHeap::new();
        for i in 0..n {
            for j in 0..i {
                heap.push(Reverse(QueueEntry {
                    distance: OrderedFloat(self.distances[j][i]),
                    a: j,
                    b: i,
                }));
            }
        }

        let mut linkage = LinkageAverage::new(&self.distances, n);

        while !heap.is_empty() {
            let live_clusters = n - (nodes.len() - n);
            if let Some(k) = n_clusters {
                if live_clusters <= k {
                    break;
                }
            }

            let Reverse(selected) = heap.pop().expect("heap checked non-empty above");
            if !nodes[selected.a].active || !nodes[selected.b].active {
                continue;
            }

            if let Some(t) = threshold {
                if selected.distance.into_inner() > t {
                    break;
                }
            }

            let new_id = nodes.len();
            nodes[selected.a].active = false;
            nodes[selected.b].active = false;
            nodes.push(Node::inner(selected.a, selected.b));

            linkage.merge(selected.a, selected.b, new_id, &nodes);
            for (id, distance) in linkage.distances_from(new_id, &nodes) {
                heap.push(Reverse(QueueEntry {
                    distance: OrderedFloat(distance),
                    a: id,
                    b: new_id,
                }));
            }
        }

        Ok(collect_groups(&nodes))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn euclidean(points: &[(f32, f32)]) -> Matrix {
        points
            .iter()
            .map(|&(x1, y1)| {
                points
                    .iter()
                    .map(|&(x2, y2)| ((x1 - x2).powi(2) + (y1 - y2).powi(2)).sqrt())
                    .collect()
            })
            .collect()
    }

    fn sorted(mut groups: Groups) -> Vec<Vec<usize>> {
        for g in &mut groups {
            g.sort_unstable();
        }
        groups.sort();
        groups
    }

    #[test]
    fn rejects_a_non_square_matrix() {
        let err = AgglomerativeClustering::new(vec![vec![0.0, 1.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, ClusterError::NotSquare { .. }));
    }

    #[test]
    fn rejects_neither_or_both_stop_conditions() {
        let clustering = AgglomerativeClustering::new(vec![vec![0.0]]).unwrap();
        assert!(matches!(
            clustering.run(LinkageType::Average, None, None).unwrap_err(),
            ClusterError::AmbiguousStopCondition
        ));
        assert!(matches!(
            clustering
                .run(LinkageType::Average, Some(1), Some(1.0))
                .unwrap_err(),
            ClusterError::AmbiguousStopCondition
        ));
    }

    #[test]
    fn rejects_out_of_range_n_clusters_and_negative_threshold() {
        let clustering = AgglomerativeClustering::new(vec![vec![0.0]]).unwrap();
        assert!(matches!(
            clustering
                .run(LinkageType::Average, Some(5), None)
                .unwrap_err(),
            ClusterError::NClustersOutOfRange { .. }
        ));
        assert!(matches!(
            clustering
                .run(LinkageType::Average, None, Some(-1.0))
                .unwrap_err(),
            ClusterError::NegativeThreshold(_)
        ));
    }

    #[test]
    fn empty_matrix_yields_zero_groups() {
        let clustering = AgglomerativeClustering::new(Vec::new()).unwrap();
        let groups = clustering.run(LinkageType::Average, Some(0), None).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn single_point_with_n_clusters_one_is_a_singleton() {
        let clustering = AgglomerativeClustering::new(vec![vec![0.0]]).unwrap();
        let groups = clustering.run(LinkageType::Average, Some(1), None).unwrap();
        assert_eq!(groups, vec![vec![0]]);
    }

    #[test]
    fn clusters_by_threshold() {
        let points = [(0.0, 0.0), (1.0, 1.0), (3.0, 0.0), (4.0, 5.0), (6.0, 0.0)];
        let clustering = AgglomerativeClustering::new(euclidean(&points)).unwrap();
        let groups = clustering
            .run(LinkageType::Average, None, Some(3.0))
            .unwrap();
        assert_eq!(
            sorted(groups),
            sorted(vec![vec![0, 1, 2], vec![3], vec![4]])
        );
    }

    #[test]
    fn clusters_by_count() {
        let points = [(0.0, 0.0), (1.0, 1.0), (3.0, 0.0), (4.0, 5.0), (6.0, 0.0)];
        let clustering = AgglomerativeClustering::new(euclidean(&points)).unwrap();
        let groups = clustering
            .run(LinkageType::Average, Some(2), None)
            .unwrap();
        assert_eq!(sorted(groups), sorted(vec![vec![3], vec![0, 1, 2, 4]]));
    }
}
