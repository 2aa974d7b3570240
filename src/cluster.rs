//! K-Means clustering of binned trajectories
//!
//! Lloyd's algorithm with deterministic farthest-point initialization: the
//! first centroid is picked from the seed, each remaining centroid is the
//! point farthest from all chosen so far. Given the same seed and data the
//! partition is fully reproducible; cluster ids are still arbitrary, so
//! callers compare clusters by their statistics, not raw ids.

use ndarray::Array2;
use serde::Serialize;

use crate::error::{EngineError, Result};

/// K-Means clusterer over sample feature vectors
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use ponderar::KMeans;
///
/// let bins = array![[0.1, 0.1], [0.2, 0.1], [3.0, 3.2], [2.9, 3.1]];
/// let mut km = KMeans::new(2).with_random_state(42);
/// km.fit(&bins).expect("enough samples");
/// assert_eq!(km.labels().expect("fitted").len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct KMeans {
    n_clusters: usize,
    max_iter: usize,
    tol: f32,
    random_state: Option<u64>,
    centroids: Option<Array2<f32>>,
    labels: Option<Vec<usize>>,
    inertia: f32,
    n_iter: usize,
}

impl KMeans {
    /// Create a clusterer for `n_clusters` groups
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 300,
            tol: 1e-4,
            random_state: None,
            centroids: None,
            labels: None,
            inertia: 0.0,
            n_iter: 0,
        }
    }

    /// Set the maximum number of iterations
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the convergence tolerance
    #[must_use]
    pub fn with_tol(mut self, tol: f32) -> Self {
        self.tol = tol;
        self
    }

    /// Set the seed for centroid initialization
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Cluster labels for the training data, if fitted
    pub fn labels(&self) -> Option<&[usize]> {
        self.labels.as_deref()
    }

    /// Centroids after fitting, one row per cluster
    pub fn centroids(&self) -> Option<&Array2<f32>> {
        self.centroids.as_ref()
    }

    /// Within-cluster sum of squared distances
    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    /// Iterations run by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Fit the clusterer to data
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for empty input, `TooManyClusters` when fewer
    /// samples than clusters are supplied.
    pub fn fit(&mut self, x: &Array2<f32>) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(EngineError::InvalidConfig(
                "cannot cluster zero samples".to_string(),
            ));
        }
        if n_samples < self.n_clusters {
            return Err(EngineError::TooManyClusters {
                requested: self.n_clusters,
                available: n_samples,
            });
        }

        let mut centroids = self.init_centroids(x);
        let mut labels = vec![0; n_samples];

        for iter in 0..self.max_iter {
            labels = self.assign_labels(x, &centroids);
            let new_centroids = self.update_centroids(x, &labels, &centroids);
            let converged = self.centroids_converged(&centroids, &new_centroids);
            centroids = new_centroids;
            self.n_iter = iter + 1;
            if converged {
                break;
            }
        }

        self.inertia = inertia(x, &centroids, &labels);
        self.labels = Some(labels);
        self.centroids = Some(centroids);
        Ok(())
    }

    /// Assign cluster labels to new data
    ///
    /// # Errors
    ///
    /// `NoTrajectoryData` if called before `fit`.
    pub fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        let centroids = self
            .centroids
            .as_ref()
            .ok_or(EngineError::NoTrajectoryData("predict"))?;
        Ok(self.assign_labels(x, centroids))
    }

    /// Deterministic farthest-point initialization
    fn init_centroids(&self, x: &Array2<f32>) -> Array2<f32> {
        let (n_samples, n_features) = x.dim();
        let mut centroids = Array2::zeros((self.n_clusters, n_features));

        let seed = self.random_state.unwrap_or(42);
        let first = (seed as usize) % n_samples;
        centroids.row_mut(0).assign(&x.row(first));

        for c in 1..self.n_clusters {
            let mut best_idx = 0;
            let mut best_dist = -1.0;
            for i in 0..n_samples {
                let mut min_dist = f32::INFINITY;
                for chosen in 0..c {
                    let d = squared_distance(x, i, &centroids, chosen);
                    if d < min_dist {
                        min_dist = d;
                    }
                }
                if min_dist > best_dist {
                    best_dist = min_dist;
                    best_idx = i;
                }
            }
            centroids.row_mut(c).assign(&x.row(best_idx));
        }

        centroids
    }

    fn assign_labels(&self, x: &Array2<f32>, centroids: &Array2<f32>) -> Vec<usize> {
        let n_samples = x.nrows();
        let mut labels = vec![0; n_samples];
        for (i, label) in labels.iter_mut().enumerate() {
            let mut min_dist = f32::INFINITY;
            for k in 0..self.n_clusters {
                let d = squared_distance(x, i, centroids, k);
                if d < min_dist {
                    min_dist = d;
                    *label = k;
                }
            }
        }
        labels
    }

    /// Mean of assigned samples; a cluster that lost all members keeps its
    /// previous centroid
    fn update_centroids(
        &self,
        x: &Array2<f32>,
        labels: &[usize],
        previous: &Array2<f32>,
    ) -> Array2<f32> {
        let n_features = x.ncols();
        let mut sums = Array2::<f32>::zeros((self.n_clusters, n_features));
        let mut counts = vec![0usize; self.n_clusters];

        for (i, &label) in labels.iter().enumerate() {
            counts[label] += 1;
            for j in 0..n_features {
                sums[[label, j]] += x[[i, j]];
            }
        }

        for k in 0..self.n_clusters {
            if counts[k] > 0 {
                for j in 0..n_features {
                    sums[[k, j]] /= counts[k] as f32;
                }
            } else {
                sums.row_mut(k).assign(&previous.row(k));
            }
        }
        sums
    }

    fn centroids_converged(&self, old: &Array2<f32>, new: &Array2<f32>) -> bool {
        for k in 0..self.n_clusters {
            let mut dist_sq = 0.0;
            for j in 0..old.ncols() {
                let diff = old[[k, j]] - new[[k, j]];
                dist_sq += diff * diff;
            }
            if dist_sq > self.tol * self.tol {
                return false;
            }
        }
        true
    }
}

fn squared_distance(x: &Array2<f32>, row: usize, centroids: &Array2<f32>, k: usize) -> f32 {
    let mut dist = 0.0;
    for j in 0..x.ncols() {
        let diff = x[[row, j]] - centroids[[k, j]];
        dist += diff * diff;
    }
    dist
}

fn inertia(x: &Array2<f32>, centroids: &Array2<f32>, labels: &[usize]) -> f32 {
    labels
        .iter()
        .enumerate()
        .map(|(i, &k)| squared_distance(x, i, centroids, k))
        .sum()
}

/// Per-cluster statistics derived from actual membership
#[derive(Debug, Clone, Serialize)]
pub struct ClusterStat {
    /// Number of member samples
    pub size: usize,
    /// Elementwise mean of member feature vectors; empty for an empty cluster
    pub mean_trajectory: Vec<f32>,
    /// Scalar mean over the mean trajectory; None for an empty cluster
    pub mean_loss: Option<f32>,
}

/// Mapping from sample slot to cluster, plus ranking statistics
#[derive(Debug, Clone, Serialize)]
pub struct ClusterAssignment {
    /// Cluster id per sample slot
    pub labels: Vec<usize>,
    /// Statistics per cluster id
    pub stats: Vec<ClusterStat>,
    /// Id of the non-empty cluster with the lowest mean loss
    pub trusted: usize,
}

impl ClusterAssignment {
    /// Build an assignment with membership statistics from binned features
    ///
    /// Empty clusters get a sentinel `mean_loss` of `None` and are skipped
    /// when picking the trusted cluster; they are reported, not fatal.
    ///
    /// # Errors
    ///
    /// `LengthMismatch` if `labels` does not cover every feature row;
    /// `InvalidConfig` if any label is outside `[0, k)`.
    pub fn from_labels(labels: Vec<usize>, bins: &Array2<f32>, k: usize) -> Result<Self> {
        if labels.len() != bins.nrows() {
            return Err(EngineError::LengthMismatch {
                what: "cluster labels",
                expected: bins.nrows(),
                actual: labels.len(),
            });
        }
        if let Some(&label) = labels.iter().find(|&&label| label >= k) {
            return Err(EngineError::InvalidConfig(format!(
                "cluster label {label} out of range for {k} clusters"
            )));
        }

        let width = bins.ncols();
        let mut sums = vec![vec![0.0f64; width]; k];
        let mut sizes = vec![0usize; k];
        for (i, &label) in labels.iter().enumerate() {
            sizes[label] += 1;
            for j in 0..width {
                sums[label][j] += f64::from(bins[[i, j]]);
            }
        }

        let stats: Vec<ClusterStat> = (0..k)
            .map(|c| {
                if sizes[c] == 0 {
                    ClusterStat {
                        size: 0,
                        mean_trajectory: Vec::new(),
                        mean_loss: None,
                    }
                } else {
                    let mean_trajectory: Vec<f32> = sums[c]
                        .iter()
                        .map(|&s| (s / sizes[c] as f64) as f32)
                        .collect();
                    let mean_loss =
                        mean_trajectory.iter().sum::<f32>() / mean_trajectory.len() as f32;
                    ClusterStat {
                        size: sizes[c],
                        mean_trajectory,
                        mean_loss: Some(mean_loss),
                    }
                }
            })
            .collect();

        let trusted = stats
            .iter()
            .enumerate()
            .filter_map(|(c, s)| s.mean_loss.map(|m| (c, m)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c)
            .unwrap_or(0);

        Ok(Self {
            labels,
            stats,
            trusted,
        })
    }

    /// Cluster ids with no members
    pub fn empty_clusters(&self) -> Vec<usize> {
        self.stats
            .iter()
            .enumerate()
            .filter(|(_, s)| s.size == 0)
            .map(|(c, _)| c)
            .collect()
    }

    /// Number of clusters with at least one member
    pub fn non_empty_count(&self) -> usize {
        self.stats.iter().filter(|s| s.size > 0).count()
    }
}
