//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Configuration for the reweighting engine
///
/// All knobs are passed once at construction; nothing is read from ambient
/// process state. Defaults follow the reference experiment setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of trajectory clusters
    pub num_clusters: usize,
    /// Exponential weight update rate in [0, 1]
    pub update_rate: f32,
    /// Epochs between reweighting events once burn-in has ended
    pub reweight_interval: usize,
    /// Epochs of recording before the first reweight
    pub burn_in: usize,
    /// Batch size for the weighted train loader
    pub batch_size: usize,
    /// Fixed feature width for binned trajectories
    pub bin_width: usize,
    /// Target weight for the trusted (lowest mean loss) cluster
    pub trusted_weight: f32,
    /// Target weight for every other cluster
    pub suppressed_weight: f32,
    /// Seed for loader shuffling; None draws from OS entropy
    pub seed: Option<u64>,
    /// Seed for clustering initialization; None falls back to `seed`
    pub cluster_seed: Option<u64>,
    /// 0 = silent, 1 = reweight summaries, 2 = per-epoch detail
    pub verbosity: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_clusters: 3,
            update_rate: 0.1,
            reweight_interval: 1,
            burn_in: 5,
            batch_size: 128,
            bin_width: 10,
            trusted_weight: 1.0,
            suppressed_weight: 0.2,
            seed: None,
            cluster_seed: None,
            verbosity: 0,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on any out-of-range knob. Values are never
    /// silently clamped.
    pub fn validate(&self) -> Result<()> {
        if self.num_clusters == 0 {
            return Err(EngineError::InvalidConfig(
                "num_clusters must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.update_rate) {
            return Err(EngineError::InvalidConfig(format!(
                "update_rate must be in [0, 1], got {}",
                self.update_rate
            )));
        }
        if self.reweight_interval == 0 {
            return Err(EngineError::InvalidConfig(
                "reweight_interval must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.bin_width == 0 {
            return Err(EngineError::InvalidConfig(
                "bin_width must be at least 1".to_string(),
            ));
        }
        if self.trusted_weight < 0.0 || self.suppressed_weight < 0.0 {
            return Err(EngineError::InvalidConfig(
                "cluster target weights must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective clustering seed: `cluster_seed` if set, else `seed`
    pub fn effective_cluster_seed(&self) -> Option<u64> {
        self.cluster_seed.or(self.seed)
    }
}
