//! Samples and the stable sample-slot index space

use ndarray::Array1;

use crate::error::{EngineError, Result};

/// One training or validation example
///
/// The harness applies any label corruption and subset selection before
/// handing samples over; the engine treats `label` as ground truth.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Input features
    pub input: Array1<f32>,
    /// Integer class label
    pub label: usize,
}

impl Sample {
    /// Create a new sample
    pub fn new(input: Array1<f32>, label: usize) -> Self {
        Self { input, label }
    }
}

/// Immutable mapping from engine sample slots to upstream dataset indices
///
/// Upstream subset selection and shuffling change what a raw dataset index
/// means; the slot identity established here never does. Built once at
/// engine construction and never recomputed.
#[derive(Debug, Clone)]
pub struct SampleIndexSpace {
    dataset_indices: Vec<usize>,
}

impl SampleIndexSpace {
    /// Identity map for a subset already in slot order
    pub fn identity(n: usize) -> Self {
        Self {
            dataset_indices: (0..n).collect(),
        }
    }

    /// Map slots to explicit upstream dataset indices
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` if `indices` does not cover `n` slots.
    pub fn from_indices(n: usize, indices: Vec<usize>) -> Result<Self> {
        if indices.len() != n {
            return Err(EngineError::LengthMismatch {
                what: "dataset indices",
                expected: n,
                actual: indices.len(),
            });
        }
        Ok(Self {
            dataset_indices: indices,
        })
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.dataset_indices.len()
    }

    /// True if the space holds no slots
    pub fn is_empty(&self) -> bool {
        self.dataset_indices.is_empty()
    }

    /// Upstream dataset index for a slot
    pub fn dataset_index(&self, slot: usize) -> Option<usize> {
        self.dataset_indices.get(slot).copied()
    }

    /// All upstream indices in slot order
    pub fn dataset_indices(&self) -> &[usize] {
        &self.dataset_indices
    }
}
