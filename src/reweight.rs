//! Cluster-driven weight updates and the noise audit

use serde::Serialize;

use crate::cluster::ClusterAssignment;
use crate::error::{EngineError, Result};

/// Blend cluster target weights into the previous weight vector
///
/// The trusted cluster's members move toward `trusted_weight`, everyone
/// else toward `suppressed_weight`, via the exponential update
/// `new = (1 - rate) * previous + rate * target` per slot. Slot alignment
/// is preserved: the output indexes by the same slots as `previous`.
///
/// Pure and idempotent: identical inputs always produce identical output.
///
/// # Errors
///
/// `InvalidConfig` if `rate` is outside [0, 1]; `LengthMismatch` if
/// `previous` and the assignment cover different slot counts.
pub fn blend(
    assignment: &ClusterAssignment,
    previous: &[f32],
    rate: f32,
    trusted_weight: f32,
    suppressed_weight: f32,
) -> Result<Vec<f32>> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(EngineError::InvalidConfig(format!(
            "update rate must be in [0, 1], got {rate}"
        )));
    }
    if previous.len() != assignment.labels.len() {
        return Err(EngineError::LengthMismatch {
            what: "previous weights",
            expected: assignment.labels.len(),
            actual: previous.len(),
        });
    }

    let updated = previous
        .iter()
        .zip(&assignment.labels)
        .map(|(&prev, &cluster)| {
            let target = if cluster == assignment.trusted {
                trusted_weight
            } else {
                suppressed_weight
            };
            (1.0 - rate) * prev + rate * target
        })
        .collect();
    Ok(updated)
}

/// Result of auditing low-weight samples against a known noisy set
///
/// Diagnostic only: computing it never touches the weights. The
/// ground-truth noisy slots come from the harness (test-time label
/// corruption bookkeeping), never from production data.
#[derive(Debug, Clone, Serialize)]
pub struct NoiseAudit {
    /// Slots whose weight fell below the threshold
    pub flagged: Vec<usize>,
    /// Fraction of flagged slots that are truly noisy
    pub precision: f32,
    /// Fraction of truly noisy slots that were flagged
    pub recall: f32,
}

/// Compare the low-weight set against ground-truth noisy slots
pub fn audit_low_weight(weights: &[f32], known_noisy: &[usize], threshold: f32) -> NoiseAudit {
    let flagged: Vec<usize> = weights
        .iter()
        .enumerate()
        .filter(|(_, &w)| w < threshold)
        .map(|(slot, _)| slot)
        .collect();

    let hits = flagged
        .iter()
        .filter(|&&slot| known_noisy.contains(&slot))
        .count();

    let precision = if flagged.is_empty() {
        0.0
    } else {
        hits as f32 / flagged.len() as f32
    };
    let recall = if known_noisy.is_empty() {
        0.0
    } else {
        hits as f32 / known_noisy.len() as f32
    };

    NoiseAudit {
        flagged,
        precision,
        recall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn assignment_two_clusters() -> ClusterAssignment {
        // Slots 0-2 land in the low-loss cluster, 3-4 in the high-loss one
        let bins = array![[0.1], [0.2], [0.15], [2.0], [2.2]];
        ClusterAssignment::from_labels(vec![0, 0, 0, 1, 1], &bins, 2).expect("aligned")
    }

    #[test]
    fn test_blend_law_exact() {
        let assignment = assignment_two_clusters();
        let previous = vec![1.0; 5];

        let updated = blend(&assignment, &previous, 0.5, 1.0, 0.2).expect("aligned");
        for slot in 0..3 {
            assert_relative_eq!(updated[slot], 1.0, epsilon = 1e-6);
        }
        for slot in 3..5 {
            assert_relative_eq!(updated[slot], 0.6, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_rate_zero_keeps_previous() {
        let assignment = assignment_two_clusters();
        let previous = vec![0.3, 0.9, 1.0, 0.5, 0.7];
        let updated = blend(&assignment, &previous, 0.0, 1.0, 0.2).expect("aligned");
        assert_eq!(updated, previous);
    }

    #[test]
    fn test_rate_one_jumps_to_target() {
        let assignment = assignment_two_clusters();
        let previous = vec![0.3, 0.9, 1.0, 0.5, 0.7];
        let updated = blend(&assignment, &previous, 1.0, 1.0, 0.2).expect("aligned");
        assert_eq!(updated, vec![1.0, 1.0, 1.0, 0.2, 0.2]);
    }

    #[test]
    fn test_blend_is_idempotent_for_same_inputs() {
        let assignment = assignment_two_clusters();
        let previous = vec![0.8, 0.6, 1.0, 0.4, 0.2];
        let a = blend(&assignment, &previous, 0.3, 1.0, 0.2).expect("aligned");
        let b = blend(&assignment, &previous, 0.3, 1.0, 0.2).expect("aligned");
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_cluster_degrades_to_uniform() {
        // Everything in one cluster: all slots are trusted
        let bins = array![[0.5], [0.5], [0.5]];
        let assignment = ClusterAssignment::from_labels(vec![0, 0, 0], &bins, 1).expect("aligned");

        let updated = blend(&assignment, &[0.4, 0.7, 1.0], 1.0, 1.0, 0.2).expect("aligned");
        assert_eq!(updated, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_rejects_bad_rate() {
        let assignment = assignment_two_clusters();
        for rate in [-0.1, 1.5] {
            assert!(matches!(
                blend(&assignment, &[1.0; 5], rate, 1.0, 0.2),
                Err(EngineError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_rejects_misaligned_previous() {
        let assignment = assignment_two_clusters();
        assert!(matches!(
            blend(&assignment, &[1.0; 4], 0.5, 1.0, 0.2),
            Err(EngineError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_audit_precision_recall() {
        let weights = [1.0, 0.2, 0.3, 1.0, 0.1];
        let noisy = [1, 4]; // slot 2 is a false positive
        let audit = audit_low_weight(&weights, &noisy, 0.5);

        assert_eq!(audit.flagged, vec![1, 2, 4]);
        assert_relative_eq!(audit.precision, 2.0 / 3.0, epsilon = 1e-6);
        assert_relative_eq!(audit.recall, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_audit_with_nothing_flagged() {
        let audit = audit_low_weight(&[1.0, 1.0], &[0], 0.5);
        assert!(audit.flagged.is_empty());
        assert_relative_eq!(audit.precision, 0.0);
        assert_relative_eq!(audit.recall, 0.0);
    }

    #[test]
    fn test_audit_does_not_touch_weights() {
        let weights = [1.0, 0.1];
        let before = weights;
        let _ = audit_low_weight(&weights, &[1], 0.5);
        assert_eq!(weights, before);
    }
}
