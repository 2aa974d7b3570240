//! End-to-end reweighting pipeline scenarios

use approx::assert_relative_eq;
use ndarray::{array, Array1};
use proptest::prelude::*;

use ponderar::{
    blend, ClusterAssignment, EngineConfig, EngineError, Phase, Reduction, ReweightEngine, Sample,
    WeightedCrossEntropy,
};

/// 10 samples on one feature: slots 0-4 carry the label the model agrees
/// with, slots 5-9 carry the flipped (noisy) label.
fn mixed_label_train() -> Vec<Sample> {
    let mut train = Vec::new();
    for _ in 0..5 {
        train.push(Sample::new(array![0.9], 1));
    }
    for _ in 0..5 {
        train.push(Sample::new(array![0.9], 0));
    }
    train
}

/// Frozen model: logits favor class 1 for inputs near 1.0
fn frozen_forward(input: &Array1<f32>) -> Array1<f32> {
    array![1.0 - input[0], input[0]]
}

fn pipeline_config() -> EngineConfig {
    EngineConfig {
        num_clusters: 2,
        update_rate: 0.5,
        reweight_interval: 1,
        burn_in: 2,
        batch_size: 4,
        bin_width: 2,
        trusted_weight: 1.0,
        suppressed_weight: 0.2,
        seed: Some(42),
        cluster_seed: None,
        verbosity: 0,
    }
}

#[test]
fn burn_in_then_reweight_produces_exact_weights() {
    let mut engine =
        ReweightEngine::new(mixed_label_train(), vec![], pipeline_config()).expect("valid config");

    // Burn-in: two recorded epochs, trajectories of length 2 everywhere
    engine.record(frozen_forward).expect("frozen pass");
    engine.record(frozen_forward).expect("frozen pass");
    assert_eq!(engine.num_recorded_epochs(), 2);
    for slot in 0..10 {
        assert_eq!(engine.trajectory(slot).expect("valid slot").len(), 2);
    }
    assert_eq!(engine.phase(), Phase::Reweighting);

    // Clustering separates agreeing from flipped labels into two non-empty
    // clusters; statistics match the elementwise trajectory averages
    let assignment = engine
        .cluster_trajectories()
        .expect("has trajectories")
        .clone();
    assert_eq!(assignment.non_empty_count(), 2);

    let trusted = assignment.trusted;
    let other = 1 - trusted;
    let trusted_stat = &assignment.stats[trusted];
    let other_stat = &assignment.stats[other];
    assert_eq!(trusted_stat.size, 5);
    assert_eq!(other_stat.size, 5);
    assert!(
        trusted_stat.mean_loss.expect("non-empty") < other_stat.mean_loss.expect("non-empty")
    );

    // The frozen pass is identical both epochs, so each cluster's mean
    // trajectory is flat and equals its members' per-epoch observation
    let member = assignment
        .labels
        .iter()
        .position(|&c| c == trusted)
        .expect("non-empty cluster");
    let history = engine.trajectory(member).expect("valid slot");
    assert_relative_eq!(trusted_stat.mean_trajectory[0], history[0], epsilon = 1e-5);
    assert_relative_eq!(trusted_stat.mean_trajectory[1], history[1], epsilon = 1e-5);

    // Reweight from uniform 1.0 with rate 0.5 and targets {1.0, 0.2}
    let agreeing_in_trusted = assignment.labels[0] == trusted;
    engine.reweight().expect("assignment stored");
    let weights = engine.weights();
    let (expect_clean, expect_noisy) = if agreeing_in_trusted {
        (1.0, 0.6)
    } else {
        (0.6, 1.0)
    };
    for slot in 0..5 {
        assert_relative_eq!(weights[slot], expect_clean, epsilon = 1e-6);
    }
    for slot in 5..10 {
        assert_relative_eq!(weights[slot], expect_noisy, epsilon = 1e-6);
    }
    // The model-agreeing half must be the trusted one here
    assert!(agreeing_in_trusted);
}

#[test]
fn loader_rebuilt_after_reweight_carries_new_weights() {
    let mut engine =
        ReweightEngine::new(mixed_label_train(), vec![], pipeline_config()).expect("valid config");

    engine.record(frozen_forward).expect("frozen pass");
    engine.record(frozen_forward).expect("frozen pass");
    engine.cluster_trajectories().expect("has trajectories");
    engine.reweight().expect("assignment stored");

    let weights = engine.weights().to_vec();
    let loader = engine.rebuild_loader();

    // Every batch of the next epoch, starting with the first, reflects the
    // updated weight of each slot it contains
    let mut seen = vec![false; 10];
    for batch in loader {
        for (i, &slot) in batch.slots.iter().enumerate() {
            assert_eq!(batch.weights[i], weights[slot]);
            seen[slot] = true;
        }
    }
    assert!(seen.iter().all(|&s| s));
}

#[test]
fn cluster_and_reweight_before_record_fail_loudly() {
    let mut engine =
        ReweightEngine::new(mixed_label_train(), vec![], pipeline_config()).expect("valid config");

    assert!(matches!(
        engine.cluster_trajectories(),
        Err(EngineError::NoTrajectoryData(_))
    ));
    assert!(matches!(
        engine.reweight(),
        Err(EngineError::NoClusterAssignment)
    ));
    // No silent default weights were produced
    assert_eq!(engine.weights(), &[1.0; 10]);
}

#[test]
fn repeated_reweights_converge_toward_targets() {
    let mut engine =
        ReweightEngine::new(mixed_label_train(), vec![], pipeline_config()).expect("valid config");

    engine.record(frozen_forward).expect("frozen pass");
    engine.record(frozen_forward).expect("frozen pass");

    for _ in 0..20 {
        engine.record(frozen_forward).expect("frozen pass");
        engine.cluster_trajectories().expect("has trajectories");
        engine.reweight().expect("assignment stored");
        engine.rebuild_loader();
    }

    let weights = engine.weights();
    for slot in 0..5 {
        assert_relative_eq!(weights[slot], 1.0, epsilon = 1e-3);
    }
    for slot in 5..10 {
        assert_relative_eq!(weights[slot], 0.2, epsilon = 1e-3);
    }

    // Audit with the known noisy half: all and only the flipped slots are
    // below threshold
    let audit = engine.audit_noise(&[5, 6, 7, 8, 9], 0.5);
    assert_eq!(audit.flagged, vec![5, 6, 7, 8, 9]);
    assert_relative_eq!(audit.precision, 1.0);
    assert_relative_eq!(audit.recall, 1.0);
}

#[test]
fn weighted_loss_matches_unweighted_with_unit_weights() {
    let loss_fn = WeightedCrossEntropy;
    let logits = array![
        [2.0, 0.1, 0.4],
        [0.3, 1.5, 0.2],
        [0.9, 0.9, 0.9],
        [0.0, 0.0, 3.0],
    ];
    let targets = [0, 1, 2, 2];
    let ones = vec![1.0; 4];

    for reduction in [Reduction::Sum, Reduction::Mean] {
        let unweighted = loss_fn
            .forward(&logits, &targets, None, reduction)
            .expect("aligned");
        let unit_weighted = loss_fn
            .forward(&logits, &targets, Some(&ones), reduction)
            .expect("aligned");
        assert_relative_eq!(unweighted, unit_weighted, epsilon = 1e-6);
    }
}

#[test]
fn snapshot_round_trips_through_json() {
    let mut engine =
        ReweightEngine::new(mixed_label_train(), vec![], pipeline_config()).expect("valid config");
    engine.record(frozen_forward).expect("frozen pass");
    engine.record(frozen_forward).expect("frozen pass");
    engine.cluster_trajectories().expect("has trajectories");
    engine.reweight().expect("assignment stored");

    let json = serde_json::to_string(&engine.snapshot()).expect("serialize");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert_eq!(value["recorded_epochs"], 2);
    assert_eq!(value["weights"].as_array().expect("array").len(), 10);
    assert!(value["trusted_cluster"].is_u64());
}

proptest! {
    #[test]
    fn blending_law_holds_for_every_slot(
        rate in 0.0f32..=1.0,
        previous in prop::collection::vec(0.0f32..2.0, 6),
        labels in prop::collection::vec(0usize..2, 6),
    ) {
        let bins = ndarray::Array2::from_shape_fn((6, 1), |(i, _)| labels[i] as f32);
        let assignment = ClusterAssignment::from_labels(labels.clone(), &bins, 2)
            .expect("aligned");

        let updated = blend(&assignment, &previous, rate, 1.0, 0.2).expect("aligned");
        for slot in 0..6 {
            let target = if labels[slot] == assignment.trusted { 1.0 } else { 0.2 };
            let expected = (1.0 - rate) * previous[slot] + rate * target;
            prop_assert!((updated[slot] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn histories_stay_uniform_after_k_records(k in 1usize..6, n in 2usize..8) {
        let train: Vec<Sample> = (0..n)
            .map(|i| Sample::new(array![i as f32 / n as f32], i % 2))
            .collect();
        let config = EngineConfig {
            num_clusters: 2,
            seed: Some(9),
            ..Default::default()
        };
        let mut engine = ReweightEngine::new(train, vec![], config).expect("valid config");

        for _ in 0..k {
            engine.record(|input| array![1.0 - input[0], input[0]]).expect("frozen pass");
        }
        for slot in 0..n {
            prop_assert_eq!(engine.trajectory(slot).expect("valid slot").len(), k);
        }
    }

    #[test]
    fn slot_weights_survive_any_number_of_rebuilds(rebuilds in 1usize..5, seed in 0u64..1000) {
        let config = EngineConfig { seed: Some(seed), ..pipeline_config() };
        let mut engine = ReweightEngine::new(mixed_label_train(), vec![], config)
            .expect("valid config");
        let before = engine.weights().to_vec();

        for _ in 0..rebuilds {
            engine.rebuild_loader();
        }

        prop_assert_eq!(engine.weights(), before.as_slice());
        for batch in engine.train_loader() {
            for (i, &slot) in batch.slots.iter().enumerate() {
                prop_assert_eq!(batch.weights[i], before[slot]);
            }
        }
    }
}
