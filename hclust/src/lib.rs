//! Agglomerative clustering on top of kodama, plus dendrogram leaf ordering.

use anyhow::{bail, Error};
use itertools::Itertools;
pub use kodama::Method as LinkageMethod;
use kodama::{linkage, Dendrogram, Float as KodamaFloat, Step};
use ndarray::{Array2, ArrayView2};
use ndarray_stats::CorrelationExt;
use num_traits::{Float, FromPrimitive};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceMetric {
    /// `1 - r` with `r` the Pearson correlation. Pairs with zero variance get distance 1.
    Correlation,
}

impl DistanceMetric {
    /// Distances between all rows of `observations`, as a square matrix.
    pub fn pairwise<T>(self, observations: ArrayView2<'_, T>) -> Result<Array2<T>, Error>
    where
        T: Float + FromPrimitive + 'static,
    {
        match self {
            DistanceMetric::Correlation => {
                let r = observations.pearson_correlation()?;
                Ok(r.mapv(|r| if r.is_finite() { T::one() - r } else { T::one() }))
            }
        }
    }
}

#[derive(Clone, Copy)]
pub enum ClusterDirection {
    // Treat each row as an observation
    Rows,
    // Treat each column as an observation
    Columns,
}

impl ClusterDirection {
    pub fn n<F: Float>(self, array: &Array2<F>) -> usize {
        match self {
            ClusterDirection::Rows => array.nrows(),
            ClusterDirection::Columns => array.ncols(),
        }
    }
    /// View with one observation per row.
    pub fn observations<F: Float>(self, array: &Array2<F>) -> ArrayView2<'_, F> {
        match self {
            ClusterDirection::Rows => array.view(),
            ClusterDirection::Columns => array.t(),
        }
    }
}

#[derive(Clone, Copy)]
pub enum LeafOrdering {
    /// When merging two clusters, always keep the one with lower index on the left
    /// and the one with higher index on the right
    Naive,
}

#[derive(Debug, Default, Clone, Copy)]
struct Boundary {
    left: Option<usize>,
    right: Option<usize>,
}

/// Tracks the leftmost/rightmost leaf of every node while merges are replayed,
/// which is enough to chain the leaves in display order at the end.
struct LeafChain {
    boundaries: Vec<Boundary>,
    neighbor_leaves: Vec<Boundary>,
}

impl LeafChain {
    fn new(n_obs: usize) -> Self {
        let mut boundaries = vec![Boundary::default(); 2 * n_obs - 1];
        for (i, boundary) in boundaries.iter_mut().enumerate().take(n_obs) {
            *boundary = Boundary {
                left: Some(i),
                right: Some(i),
            };
        }
        LeafChain {
            boundaries,
            neighbor_leaves: vec![Boundary::default(); n_obs],
        }
    }

    fn join(&mut self, merged: usize, left: usize, right: usize) {
        let (l, r) = (self.boundaries[left], self.boundaries[right]);
        self.boundaries[merged] = Boundary {
            left: l.left,
            right: r.right,
        };
        if let (Some(l_end), Some(r_start)) = (l.right, r.left) {
            self.neighbor_leaves[l_end].right = Some(r_start);
            self.neighbor_leaves[r_start].left = Some(l_end);
        }
    }

    fn into_order(self) -> Vec<usize> {
        let Some((start, _)) = self.neighbor_leaves.iter().find_position(|b| b.left.is_none()) else {
            return vec![];
        };
        let mut leaves = vec![start];
        while let Some(next) = leaves.last().and_then(|&l| self.neighbor_leaves[l].right) {
            leaves.push(next);
        }
        leaves
    }
}

pub struct HierarchicalCluster<F: Float> {
    dendrogram: Dendrogram<F>,
}

impl<F: Float + FromPrimitive + KodamaFloat + 'static> HierarchicalCluster<F> {
    /// Cluster the observations of `array` along `direction`. Needs at least two
    /// observations.
    pub fn new(
        array: &Array2<F>,
        metric: DistanceMetric,
        method: LinkageMethod,
        direction: ClusterDirection,
    ) -> Result<Self, Error> {
        let n = direction.n(array);
        if n < 2 {
            bail!("need at least two observations for hierarchical clustering, got {}", n);
        }
        let distances = metric.pairwise(direction.observations(array))?;
        let mut condensed = Vec::with_capacity(n * (n - 1) / 2);
        for i in 0..n {
            condensed.extend((i + 1..n).map(|j| distances[[i, j]]));
        }
        let dendrogram = linkage(&mut condensed, n, method);
        Ok(HierarchicalCluster { dendrogram })
    }

    pub fn observations(&self) -> usize {
        self.dendrogram.observations()
    }

    fn steps_with_cluster_num(&self) -> impl Iterator<Item = (usize, &Step<F>)> {
        let n_obs = self.dendrogram.observations();
        self.dendrogram
            .steps()
            .iter()
            .enumerate()
            .map(move |(i, s)| (i + n_obs, s))
    }

    fn naive_leaf_ordering(&self) -> Vec<usize> {
        let mut chain = LeafChain::new(self.observations());
        for (merged, step) in self.steps_with_cluster_num() {
            chain.join(
                merged,
                step.cluster1.min(step.cluster2),
                step.cluster1.max(step.cluster2),
            );
        }
        chain.into_order()
    }

    /// Observation indices from left to right: `x[i] = j` means observation `j`
    /// is drawn at position `i`.
    pub fn leaves(&self, ordering: LeafOrdering) -> Vec<usize> {
        match ordering {
            LeafOrdering::Naive => self.naive_leaf_ordering(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_correlation_distance() {
        // rows: a, 2a, reversed a, constant
        let obs = array![[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [3.0, 2.0, 1.0], [5.0, 5.0, 5.0]];
        let d = DistanceMetric::Correlation.pairwise(obs.view()).unwrap();
        assert_eq!(d.dim(), (4, 4));
        assert_abs_diff_eq!(d[[0, 1]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d[[0, 2]], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d[[0, 3]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d[[2, 0]], d[[0, 2]], epsilon = 1e-12);

        let columns = ClusterDirection::Columns.observations(&obs);
        assert_eq!(columns.dim(), (3, 4));
        assert_eq!(ClusterDirection::Rows.n(&obs), 4);
    }

    #[test]
    fn test_correlated_columns_are_adjacent() {
        // columns 0 and 2 share a profile, 1 and 3 share the opposite one
        let arr = array![[1.0, 9.0, 1.1, 8.0], [5.0, 5.0, 5.2, 5.1], [9.0, 1.0, 9.3, 1.2]];
        let cluster = HierarchicalCluster::new(
            &arr,
            DistanceMetric::Correlation,
            LinkageMethod::Ward,
            ClusterDirection::Columns,
        )
        .unwrap();
        let order = cluster.leaves(LeafOrdering::Naive);
        assert_eq!(order.len(), 4);
        let pos = |i: usize| order.iter().position(|&x| x == i).unwrap() as i32;
        assert_eq!((pos(0) - pos(2)).abs(), 1);
        assert_eq!((pos(1) - pos(3)).abs(), 1);
        assert_eq!(cluster.observations(), 4);
    }

    #[test]
    fn test_too_few_observations() {
        let single = HierarchicalCluster::<f32>::new(
            &array![[1.0], [1.0]],
            DistanceMetric::Correlation,
            LinkageMethod::Ward,
            ClusterDirection::Columns,
        );
        assert!(single.is_err());
    }
}
