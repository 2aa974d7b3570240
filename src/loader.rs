//! Batch types and the weighted iteration source

use ndarray::Array1;

use crate::data::Sample;

/// A plain evaluation batch of inputs and targets
#[derive(Debug, Clone)]
pub struct Batch {
    /// Input features, one per sample
    pub inputs: Vec<Array1<f32>>,
    /// Target labels aligned with inputs
    pub targets: Vec<usize>,
}

impl Batch {
    /// Batch size
    pub fn size(&self) -> usize {
        self.inputs.len()
    }
}

/// A training batch carrying each sample's current loss weight
///
/// An explicit record rather than a positional tuple: every field is
/// aligned by position within the batch, and `slots` preserves the stable
/// sample identity so weights can be traced back after shuffling.
#[derive(Debug, Clone)]
pub struct WeightedBatch {
    /// Input features, one per sample
    pub inputs: Vec<Array1<f32>>,
    /// Target labels aligned with inputs
    pub targets: Vec<usize>,
    /// Per-sample loss weights, looked up by slot at build time
    pub weights: Vec<f32>,
    /// Stable sample slots in batch order
    pub slots: Vec<usize>,
}

impl WeightedBatch {
    /// Batch size
    pub fn size(&self) -> usize {
        self.inputs.len()
    }
}

/// One epoch's worth of shuffled weighted batches
///
/// Materialized when built; rebuilding after a reweight is the caller's
/// responsibility, a loader built before a reweight holds the old weights.
#[derive(Debug, Clone)]
pub struct WeightedLoader {
    batches: Vec<WeightedBatch>,
    num_samples: usize,
}

impl WeightedLoader {
    /// Build from samples in `order`, looking weights up by stable slot
    pub(crate) fn from_order(
        samples: &[Sample],
        weights: &[f32],
        order: &[usize],
        batch_size: usize,
    ) -> Self {
        let batches = order
            .chunks(batch_size)
            .map(|chunk| WeightedBatch {
                inputs: chunk.iter().map(|&slot| samples[slot].input.clone()).collect(),
                targets: chunk.iter().map(|&slot| samples[slot].label).collect(),
                weights: chunk.iter().map(|&slot| weights[slot]).collect(),
                slots: chunk.to_vec(),
            })
            .collect();
        Self {
            batches,
            num_samples: order.len(),
        }
    }

    /// Number of batches
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// True if the loader holds no batches
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Total samples across batches
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Iterate over batches in order
    pub fn iter(&self) -> std::slice::Iter<'_, WeightedBatch> {
        self.batches.iter()
    }
}

impl<'a> IntoIterator for &'a WeightedLoader {
    type Item = &'a WeightedBatch;
    type IntoIter = std::slice::Iter<'a, WeightedBatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.batches.iter()
    }
}

/// Build fixed-order evaluation batches (no weights, no shuffle)
pub(crate) fn eval_batches(samples: &[Sample], batch_size: usize) -> Vec<Batch> {
    samples
        .chunks(batch_size)
        .map(|chunk| Batch {
            inputs: chunk.iter().map(|s| s.input.clone()).collect(),
            targets: chunk.iter().map(|s| s.label).collect(),
        })
        .collect()
}
