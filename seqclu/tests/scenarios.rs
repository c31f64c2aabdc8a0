//! End-to-end scenarios exercising buffering, flush-triggered prototype swaps, and the
//! approximate/exact assignment paths together.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use seqclu::config::Config;
use seqclu::distance::DistanceMeasure;
use seqclu::hashing::{DefaultSequenceHasher, SequenceHasher};
use seqclu::sequence::Sequence;
use seqclu::stream::VecStreamSource;
use seqclu::value::LinearPrototypeValue;
use seqclu::{build_default_engine, Clusterer};

struct Euclidean1d;
impl DistanceMeasure for Euclidean1d {
    fn distance(&self, a: &Sequence, b: &Sequence) -> f64 {
        (a[0][0] - b[0][0]).abs()
    }
}

fn seq(v: f64) -> Sequence {
    Arc::new(vec![vec![v]])
}

fn hash(s: &str) -> seqclu::sequence::SequenceHash {
    seqclu::sequence::SequenceHash::new(s)
}

fn base_config() -> Config {
    Config {
        k: 2,
        p: 2,
        r: 1,
        buffer_capacity: 2,
        min_representativeness: 0.9,
        alpha: 1.0,
        approximate_cluster_assignment: true,
        buffering_enabled: true,
        max_per_tick: 100,
    }
}

#[test]
fn buffer_filling_up_triggers_a_prototype_swap() {
    let mut config = base_config();
    config.buffer_capacity = 1;
    let mut clusterer = Clusterer::new(
        config,
        Arc::new(Euclidean1d),
        Arc::new(DefaultSequenceHasher),
        Arc::new(LinearPrototypeValue { ratio: 1.0 }),
    )
    .unwrap();

    // Seed both clusters (k=2, p=2): representative then non-representative each.
    clusterer.process_sequence(hash("a0"), seq(0.0)).unwrap();
    clusterer.process_sequence(hash("a1"), seq(1.0)).unwrap();
    clusterer.process_sequence(hash("b0"), seq(100.0)).unwrap();
    clusterer.process_sequence(hash("b1"), seq(101.0)).unwrap();

    // Far from every prototype, so poorly representative of either cluster: buffered
    // instead of labelled outright. With buffer_capacity=1, inserting it immediately
    // fills the buffer and triggers its own flush, so it never sits there afterward —
    // but it did transit the buffer.
    clusterer.process_sequence(hash("mid0"), seq(50.0)).unwrap();
    assert!(!clusterer.is_buffered(&hash("mid0")));
    let outputs = clusterer.outputs();
    assert!(outputs.buffered_sequences.contains(&hash("mid0")));

    // A second low-representativeness sequence goes through the same insert-then-flush
    // cycle.
    clusterer.process_sequence(hash("mid1"), seq(51.0)).unwrap();

    let outputs = clusterer.outputs();
    // Every sequence ever ingested ends up labelled; none are silently dropped.
    assert_eq!(outputs.labels.len(), 6);
    assert!(outputs.buffered_sequences.contains(&hash("mid0")));
    assert!(outputs.buffered_sequences.contains(&hash("mid1")));
    assert!(!clusterer.is_buffered(&hash("mid0")));
    assert!(!clusterer.is_buffered(&hash("mid1")));
}

#[test]
fn a_completed_run_labels_every_sequence_it_saw() {
    let config = base_config();
    let batches = vec![
        vec![
            (hash("a0"), seq(0.0)),
            (hash("a1"), seq(1.0)),
            (hash("b0"), seq(100.0)),
            (hash("b1"), seq(101.0)),
        ],
        vec![(hash("x"), seq(0.5)), (hash("y"), seq(99.5))],
        vec![],
        vec![],
    ];
    let mut scheduler = build_default_engine(
        config,
        Arc::new(Euclidean1d),
        Box::new(VecStreamSource::new(batches)),
    )
    .unwrap();
    scheduler.run_to_completion().unwrap();

    let outputs = scheduler.outputs();
    // Whether or not x/y transited the candidate buffer on their way to a label, the
    // run must end with the buffer itself drained and every sequence labelled.
    assert!(!scheduler.clusterer().is_buffered(&hash("x")));
    assert!(!scheduler.clusterer().is_buffered(&hash("y")));
    for h in ["a0", "a1", "b0", "b1", "x", "y"] {
        assert!(outputs.labels.contains_key(&hash(h)), "{h} was never labelled");
    }
    // x is close to cluster a's seeds, y close to cluster b's.
    assert_eq!(outputs.labels[&hash("x")], outputs.labels[&hash("a0")]);
    assert_eq!(outputs.labels[&hash("y")], outputs.labels[&hash("b0")]);
}

/// Same seed, same synthetic stream of sequences scattered around a handful of
/// well-separated centers, run through two independently constructed clusterers: the
/// resulting labels, prototype sets, and buffered-sequence sets must match exactly
/// (spec.md §8's determinism property, S5).
#[test]
fn identical_seeds_over_a_randomly_generated_stream_produce_identical_outputs() {
    let centers = [0.0, 500.0, 1000.0];
    let hasher = DefaultSequenceHasher;

    let build_batches = |seed: u64| -> Vec<Vec<(seqclu::sequence::SequenceHash, Sequence)>> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut batch = Vec::new();
        for i in 0..60 {
            let center = centers[i % centers.len()];
            let point = center + rng.gen_range(-5.0..5.0);
            let data: Sequence = Arc::new(vec![vec![point]]);
            let hash = hasher.hash(&data);
            batch.push((hash, data));
        }
        vec![batch]
    };

    let config = Config {
        k: 3,
        p: 3,
        r: 1,
        buffer_capacity: 5,
        min_representativeness: 0.3,
        alpha: 0.5,
        approximate_cluster_assignment: true,
        buffering_enabled: true,
        max_per_tick: 100,
    };

    let run = |seed: u64| {
        let mut scheduler = build_default_engine(
            config.clone(),
            Arc::new(Euclidean1d),
            Box::new(VecStreamSource::new(build_batches(seed))),
        )
        .unwrap();
        scheduler.run_to_completion().unwrap();
        scheduler.outputs()
    };

    let first = run(42);
    let second = run(42);
    assert_eq!(first.labels, second.labels);
    assert_eq!(first.prototypes_by_cluster, second.prototypes_by_cluster);
    assert_eq!(first.buffered_sequences, second.buffered_sequences);
    assert_eq!(first.clustered_by_approximation, second.clustered_by_approximation);
}
