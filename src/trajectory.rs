//! Per-sample trajectory histories and fixed-width binning

use ndarray::Array2;

use crate::error::{EngineError, Result};

/// Append-only per-sample observation histories
///
/// Holds one ordered sequence per sample slot. Every `append_epoch` call
/// extends every history by exactly one entry, so all histories share the
/// same length at all times. Entries are never removed.
#[derive(Debug, Clone)]
pub struct TrajectoryStore {
    histories: Vec<Vec<f32>>,
    num_epochs: usize,
}

impl TrajectoryStore {
    /// Create an empty store for `n` sample slots
    pub fn new(n: usize) -> Self {
        Self {
            histories: vec![Vec::new(); n],
            num_epochs: 0,
        }
    }

    /// Number of sample slots
    pub fn num_samples(&self) -> usize {
        self.histories.len()
    }

    /// Number of recorded epochs (uniform across all slots)
    pub fn num_epochs(&self) -> usize {
        self.num_epochs
    }

    /// Append one observation per slot
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` if `observations` does not cover every
    /// slot; no partial append happens in that case.
    pub fn append_epoch(&mut self, observations: &[f32]) -> Result<()> {
        if observations.len() != self.histories.len() {
            return Err(EngineError::LengthMismatch {
                what: "epoch observations",
                expected: self.histories.len(),
                actual: observations.len(),
            });
        }
        for (history, &obs) in self.histories.iter_mut().zip(observations) {
            history.push(obs);
        }
        self.num_epochs += 1;
        Ok(())
    }

    /// Full history of one slot, oldest first
    pub fn history(&self, slot: usize) -> Option<&[f32]> {
        self.histories.get(slot).map(Vec::as_slice)
    }

    /// Bin all histories into a fixed-width feature matrix
    ///
    /// Each row holds the most recent `width` observations of one slot.
    /// Histories shorter than `width` are left-padded with their earliest
    /// observation so rows stay comparable; longer histories are truncated
    /// to the trailing window. Pure: identical store contents yield
    /// identical bins.
    ///
    /// # Errors
    ///
    /// Returns `NoTrajectoryData` if nothing has been recorded yet.
    pub fn bin(&self, width: usize) -> Result<Array2<f32>> {
        if self.num_epochs == 0 {
            return Err(EngineError::NoTrajectoryData("bin_trajectories"));
        }
        let n = self.histories.len();
        let mut bins = Array2::zeros((n, width));
        for (i, history) in self.histories.iter().enumerate() {
            let window: &[f32] = if history.len() > width {
                &history[history.len() - width..]
            } else {
                history
            };
            let pad = width - window.len();
            for j in 0..pad {
                bins[[i, j]] = window[0];
            }
            for (j, &obs) in window.iter().enumerate() {
                bins[[i, pad + j]] = obs;
            }
        }
        Ok(bins)
    }
}
