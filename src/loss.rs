//! Weighted classification loss

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Reduction mode for a batch loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reduction {
    /// Sum of per-sample losses
    Sum,
    /// Sum divided by batch size
    Mean,
}

/// Softmax cross-entropy with optional per-sample weights
///
/// With `weights: None` this is a plain classification loss. With weights
/// supplied, each sample's loss is multiplied by its weight before
/// reduction. `Mean` divides by the batch size rather than the weight sum,
/// so down-weighted samples contribute proportionally less gradient signal.
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use ponderar::{Reduction, WeightedCrossEntropy};
///
/// let loss_fn = WeightedCrossEntropy;
/// let logits = array![[2.0, 0.5], [0.1, 1.0]];
/// let loss = loss_fn
///     .forward(&logits, &[0, 1], None, Reduction::Mean)
///     .expect("aligned batch");
/// assert!(loss > 0.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedCrossEntropy;

impl WeightedCrossEntropy {
    /// Compute the batch loss
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` if `targets` or `weights` do not line up
    /// with the batch, and `ClassOutOfRange` if a target does not fit the
    /// logit width. Misaligned inputs are never truncated or broadcast.
    pub fn forward(
        &self,
        logits: &Array2<f32>,
        targets: &[usize],
        weights: Option<&[f32]>,
        reduction: Reduction,
    ) -> Result<f32> {
        let batch = logits.nrows();
        if targets.len() != batch {
            return Err(EngineError::LengthMismatch {
                what: "targets",
                expected: batch,
                actual: targets.len(),
            });
        }
        if let Some(w) = weights {
            if w.len() != batch {
                return Err(EngineError::LengthMismatch {
                    what: "weights",
                    expected: batch,
                    actual: w.len(),
                });
            }
        }

        let mut total = 0.0;
        for (i, &target) in targets.iter().enumerate() {
            let sample_loss = self.per_sample(logits.row(i), target)?;
            let w = weights.map_or(1.0, |w| w[i]);
            total += w * sample_loss;
        }

        Ok(match reduction {
            Reduction::Sum => total,
            Reduction::Mean => {
                if batch == 0 {
                    0.0
                } else {
                    total / batch as f32
                }
            }
        })
    }

    /// Negative log-softmax of one logit row at `target`
    ///
    /// # Errors
    ///
    /// Returns `ClassOutOfRange` if `target >= logits.len()`.
    pub fn per_sample(&self, logits: ArrayView1<'_, f32>, target: usize) -> Result<f32> {
        if target >= logits.len() {
            return Err(EngineError::ClassOutOfRange {
                class: target,
                num_classes: logits.len(),
            });
        }
        let log_probs = log_softmax(logits);
        Ok(-log_probs[target])
    }
}

/// Numerically stable log-softmax (max subtraction)
fn log_softmax(x: ArrayView1<'_, f32>) -> Array1<f32> {
    let max = x.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let shifted = x.mapv(|v| v - max);
    let log_sum: f32 = shifted.mapv(f32::exp).sum().ln();
    shifted.mapv(|v| v - log_sum)
}
