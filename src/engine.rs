//! The reweighting engine driven by the training harness
//!
//! Call protocol per epoch: the harness trains one step from the current
//! weighted loader, then (on tracked epochs) calls `record` with the frozen
//! model, periodically `cluster_trajectories` + `reweight`, and finally
//! `rebuild_loader` so the next epoch sees updated weights.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::cluster::{ClusterAssignment, KMeans};
use crate::config::EngineConfig;
use crate::data::{Sample, SampleIndexSpace};
use crate::error::{EngineError, Result};
use crate::loader::{eval_batches, Batch, WeightedLoader};
use crate::loss::WeightedCrossEntropy;
use crate::reweight::{audit_low_weight, blend, NoiseAudit};
use crate::trajectory::TrajectoryStore;

/// Engine lifecycle phase, derived from recorded epochs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Nothing recorded yet
    Initialized,
    /// Recording only; no reweighting until burn-in ends
    BurnIn,
    /// Reweighting events run on the configured interval
    Reweighting,
}

/// Plain-numeric view of the engine state for harness-side persistence
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    /// Epochs recorded so far
    pub recorded_epochs: usize,
    /// Current per-slot weight vector
    pub weights: Vec<f32>,
    /// Mean loss per cluster from the last assignment, if any
    pub cluster_means: Option<Vec<Option<f32>>>,
    /// Trusted cluster id from the last assignment, if any
    pub trusted_cluster: Option<usize>,
}

/// Trajectory recording, clustering and reweighting over one training run
///
/// Owns the per-sample state (trajectory histories, weight vector) for the
/// run's whole duration; cluster assignments and binned features are
/// recomputed at each reweighting event. Single-threaded by design: every
/// operation completes before the next training step depends on it.
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use ponderar::{EngineConfig, ReweightEngine, Sample};
///
/// let train = vec![
///     Sample::new(array![0.0], 0),
///     Sample::new(array![1.0], 1),
///     Sample::new(array![2.0], 0),
/// ];
/// let config = EngineConfig {
///     num_clusters: 2,
///     burn_in: 1,
///     seed: Some(1),
///     ..Default::default()
/// };
/// let mut engine = ReweightEngine::new(train, vec![], config).expect("valid config");
///
/// // One frozen pass per tracked epoch
/// engine.record(|input| array![-input[0], input[0]]).expect("records");
/// assert_eq!(engine.num_recorded_epochs(), 1);
/// ```
#[derive(Debug)]
pub struct ReweightEngine {
    config: EngineConfig,
    samples: Vec<Sample>,
    valid_batches: Vec<Batch>,
    index_space: SampleIndexSpace,
    store: TrajectoryStore,
    weights: Vec<f32>,
    loss: WeightedCrossEntropy,
    rng: StdRng,
    train_loader: WeightedLoader,
    assignment: Option<ClusterAssignment>,
}

impl ReweightEngine {
    /// Create an engine over a training and validation subset
    ///
    /// Weights start uniform at 1.0 (unweighted loss). The initial train
    /// loader is built immediately so the first epoch can run before any
    /// recording.
    ///
    /// # Errors
    ///
    /// Fails fast on invalid configuration, an empty training subset, or
    /// `num_clusters` exceeding the sample count.
    pub fn new(train: Vec<Sample>, valid: Vec<Sample>, config: EngineConfig) -> Result<Self> {
        let index_space = SampleIndexSpace::identity(train.len());
        Self::with_index_space(train, valid, index_space, config)
    }

    /// Create an engine with an explicit slot-to-dataset index map
    ///
    /// # Errors
    ///
    /// As [`ReweightEngine::new`], plus `LengthMismatch` if `dataset_indices`
    /// does not cover the training subset.
    pub fn with_dataset_indices(
        train: Vec<Sample>,
        valid: Vec<Sample>,
        dataset_indices: Vec<usize>,
        config: EngineConfig,
    ) -> Result<Self> {
        let index_space = SampleIndexSpace::from_indices(train.len(), dataset_indices)?;
        Self::with_index_space(train, valid, index_space, config)
    }

    fn with_index_space(
        train: Vec<Sample>,
        valid: Vec<Sample>,
        index_space: SampleIndexSpace,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let n = train.len();
        if n == 0 {
            return Err(EngineError::InvalidConfig(
                "training subset is empty".to_string(),
            ));
        }
        if config.num_clusters > n {
            return Err(EngineError::TooManyClusters {
                requested: config.num_clusters,
                available: n,
            });
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let weights = vec![1.0; n];
        let valid_batches = eval_batches(&valid, config.batch_size);
        let train_loader = Self::build_loader(&train, &weights, config.batch_size, &mut rng);

        Ok(Self {
            config,
            samples: train,
            valid_batches,
            index_space,
            store: TrajectoryStore::new(n),
            weights,
            loss: WeightedCrossEntropy,
            rng,
            train_loader,
            assignment: None,
        })
    }

    /// The weighted loss function shared with the harness
    ///
    /// The same function serves weighted training steps and unweighted
    /// evaluation passes (`weights: None`).
    pub fn loss(&self) -> &WeightedCrossEntropy {
        &self.loss
    }

    /// Record one trajectory observation per sample from a frozen pass
    ///
    /// Walks the entire training subset in slot order; `forward` maps an
    /// input to its logit vector and must not mutate the model. Every
    /// history grows by exactly one entry, or none on failure.
    ///
    /// # Errors
    ///
    /// `ClassOutOfRange` if a sample's label does not fit its logit width.
    pub fn record<F>(&mut self, forward: F) -> Result<()>
    where
        F: Fn(&Array1<f32>) -> Array1<f32>,
    {
        let mut observations = Vec::with_capacity(self.samples.len());
        for sample in &self.samples {
            let logits = forward(&sample.input);
            let obs = self.loss.per_sample(logits.view(), sample.label)?;
            observations.push(obs);
        }
        self.store.append_epoch(&observations)?;

        if self.config.verbosity >= 2 {
            let mean = observations.iter().sum::<f32>() / observations.len() as f32;
            println!(
                "record epoch {}: mean frozen loss {:.4}",
                self.store.num_epochs(),
                mean
            );
        }
        Ok(())
    }

    /// Current fixed-width trajectory feature matrix
    ///
    /// # Errors
    ///
    /// `NoTrajectoryData` before the first `record`.
    pub fn bin_trajectories(&self) -> Result<Array2<f32>> {
        self.store.bin(self.config.bin_width)
    }

    /// Cluster the binned trajectories and store the assignment
    ///
    /// Empty clusters are reported on stderr and carried as sentinel
    /// statistics; they never abort the run.
    ///
    /// # Errors
    ///
    /// `NoTrajectoryData` before the first `record`; clustering errors
    /// propagate unchanged.
    pub fn cluster_trajectories(&mut self) -> Result<&ClusterAssignment> {
        if self.store.num_epochs() == 0 {
            return Err(EngineError::NoTrajectoryData("cluster_trajectories"));
        }
        let bins = self.store.bin(self.config.bin_width)?;

        let mut km = KMeans::new(self.config.num_clusters);
        if let Some(seed) = self.config.effective_cluster_seed() {
            km = km.with_random_state(seed);
        }
        km.fit(&bins)?;
        let labels = km
            .labels()
            .ok_or(EngineError::NoTrajectoryData("cluster_trajectories"))?
            .to_vec();

        let assignment = ClusterAssignment::from_labels(labels, &bins, self.config.num_clusters)?;

        for cluster in assignment.empty_clusters() {
            eprintln!(
                "warning: trajectory cluster {cluster} is empty after {} recorded epochs",
                self.store.num_epochs()
            );
        }
        if self.config.verbosity >= 1 {
            let means: Vec<Option<f32>> =
                assignment.stats.iter().map(|s| s.mean_loss).collect();
            println!(
                "cluster: means {:?}, trusted {}",
                means, assignment.trusted
            );
        }

        Ok(self.assignment.insert(assignment))
    }

    /// Blend the stored cluster assignment into the weight vector
    ///
    /// # Errors
    ///
    /// `NoClusterAssignment` if `cluster_trajectories` has not run.
    pub fn reweight(&mut self) -> Result<&[f32]> {
        let assignment = self
            .assignment
            .as_ref()
            .ok_or(EngineError::NoClusterAssignment)?;
        self.weights = blend(
            assignment,
            &self.weights,
            self.config.update_rate,
            self.config.trusted_weight,
            self.config.suppressed_weight,
        )?;

        if self.config.verbosity >= 1 {
            let mean = self.weights.iter().sum::<f32>() / self.weights.len() as f32;
            println!("reweight: mean weight {mean:.4}");
        }
        Ok(&self.weights)
    }

    /// Rebuild the shuffled weighted loader for the next epoch
    ///
    /// Must run after any reweight; a loader built earlier still carries
    /// the old weights.
    pub fn rebuild_loader(&mut self) -> &WeightedLoader {
        self.train_loader = Self::build_loader(
            &self.samples,
            &self.weights,
            self.config.batch_size,
            &mut self.rng,
        );
        &self.train_loader
    }

    fn build_loader(
        samples: &[Sample],
        weights: &[f32],
        batch_size: usize,
        rng: &mut StdRng,
    ) -> WeightedLoader {
        let mut order: Vec<usize> = (0..samples.len()).collect();
        order.shuffle(rng);
        WeightedLoader::from_order(samples, weights, &order, batch_size)
    }

    /// The current weighted train loader
    pub fn train_loader(&self) -> &WeightedLoader {
        &self.train_loader
    }

    /// Fixed-order validation batches
    pub fn valid_loader(&self) -> &[Batch] {
        &self.valid_batches
    }

    /// Lifecycle phase derived from recorded epochs vs burn-in
    pub fn phase(&self) -> Phase {
        let epochs = self.store.num_epochs();
        if epochs == 0 {
            Phase::Initialized
        } else if epochs < self.config.burn_in {
            Phase::BurnIn
        } else {
            Phase::Reweighting
        }
    }

    /// Whether a reweighting event is due at `epoch` (0-based)
    pub fn reweight_due(&self, epoch: usize) -> bool {
        epoch >= self.config.burn_in
            && (epoch - self.config.burn_in) % self.config.reweight_interval == 0
    }

    /// Current per-slot weight vector
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Last cluster assignment, if any
    pub fn assignment(&self) -> Option<&ClusterAssignment> {
        self.assignment.as_ref()
    }

    /// Epochs recorded so far
    pub fn num_recorded_epochs(&self) -> usize {
        self.store.num_epochs()
    }

    /// Trajectory history of one slot
    pub fn trajectory(&self, slot: usize) -> Option<&[f32]> {
        self.store.history(slot)
    }

    /// The slot-to-dataset index map fixed at construction
    pub fn index_space(&self) -> &SampleIndexSpace {
        &self.index_space
    }

    /// The engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Diagnostic comparison of low-weight slots against known noisy slots
    ///
    /// Has no effect on the weights; intended for post-hoc auditing with
    /// the harness's corruption bookkeeping.
    pub fn audit_noise(&self, known_noisy: &[usize], threshold: f32) -> NoiseAudit {
        audit_low_weight(&self.weights, known_noisy, threshold)
    }

    /// Serializable view of the current engine state
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            recorded_epochs: self.store.num_epochs(),
            weights: self.weights.clone(),
            cluster_means: self
                .assignment
                .as_ref()
                .map(|a| a.stats.iter().map(|s| s.mean_loss).collect()),
            trusted_cluster: self.assignment.as_ref().map(|a| a.trusted),
        }
    }
}
