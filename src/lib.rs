//! Trajectory-clustering sample reweighting for noisy-label training
//!
//! This crate provides the stateful engine behind loss-reweighted training:
//! - Weighted classification loss with `sum`/`mean` reduction
//! - Per-sample trajectory recording from frozen forward passes
//! - Fixed-width trajectory binning
//! - K-Means clustering of trajectory shapes
//! - Exponential per-sample weight updates from cluster membership
//! - A rebuildable shuffled loader carrying each sample's current weight
//!
//! The training harness owns the model, the optimizer and the datasets; the
//! engine owns the per-sample state across epochs and keeps it aligned to
//! stable sample slots regardless of shuffling.
//!
//! # Example
//!
//! ```
//! use ndarray::array;
//! use ponderar::{EngineConfig, Reduction, ReweightEngine, Sample};
//!
//! let train: Vec<Sample> = (0..10)
//!     .map(|i| Sample::new(array![i as f32 / 10.0], usize::from(i >= 5)))
//!     .collect();
//! let config = EngineConfig {
//!     num_clusters: 2,
//!     burn_in: 2,
//!     update_rate: 0.5,
//!     seed: Some(1),
//!     ..Default::default()
//! };
//! let mut engine = ReweightEngine::new(train, vec![], config).expect("valid config");
//!
//! let forward = |input: &ndarray::Array1<f32>| array![1.0 - input[0], input[0]];
//! for _ in 0..2 {
//!     engine.record(forward).expect("frozen pass");
//! }
//! engine.cluster_trajectories().expect("trajectories recorded");
//! engine.reweight().expect("assignment stored");
//! let loader = engine.rebuild_loader();
//! assert!(loader.len() > 0);
//! ```

pub mod cluster;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod loader;
pub mod loss;
pub mod reweight;
pub mod trajectory;

pub use cluster::{ClusterAssignment, ClusterStat, KMeans};
pub use config::EngineConfig;
pub use data::{Sample, SampleIndexSpace};
pub use engine::{EngineSnapshot, Phase, ReweightEngine};
pub use error::{EngineError, Result};
pub use loader::{Batch, WeightedBatch, WeightedLoader};
pub use loss::{Reduction, WeightedCrossEntropy};
pub use reweight::{audit_low_weight, blend, NoiseAudit};
pub use trajectory::TrajectoryStore;
