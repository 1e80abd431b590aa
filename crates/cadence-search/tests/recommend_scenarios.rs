//! End-to-end recommendation behavior over built and published generations.

use std::collections::HashSet;

use cadence_core::{FeatureVector, MemoryFeatureStore, TrackId, FEATURE_DIMENSION};
use cadence_search::{
    AnnIndex, ArtifactStore, BuildOutcome, FlatIndex, GenerationState, HnswIndex, IdLookup,
    IndexBackend, IndexBuilder, IndexParams, IndexSnapshot, RecommendOptions, RecommendationEngine,
    Recommender, SearchError, Stage,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

fn fv(id: &str, values: &[f32]) -> FeatureVector {
    FeatureVector::new(id, values.to_vec())
}

fn built(outcome: BuildOutcome) -> IndexSnapshot {
    match outcome {
        BuildOutcome::Built { snapshot, .. } => snapshot,
        BuildOutcome::Skipped(report) => panic!("build skipped: {report:?}"),
    }
}

fn random_corpus(n: usize, dim: usize, seed: u64) -> Vec<FeatureVector> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let values = (0..dim).map(|_| rng.gen_range(0.01..10.0)).collect();
            FeatureVector::new(format!("track-{i:04}"), values)
        })
        .collect()
}

/// Five tracks around the x axis at increasing angles from A.
fn scenario_a_corpus() -> Vec<FeatureVector> {
    vec![
        fv("A", &[1.0, 0.0, 0.0, 0.0]),
        fv("B", &[1.0, 0.1, 0.0, 0.0]),
        fv("C", &[1.0, 0.0, 0.4, 0.0]),
        fv("D", &[0.2, 0.0, 0.0, 1.0]),
        fv("E", &[0.0, 1.0, 0.0, 0.0]),
    ]
}

fn scenario_a(backend: IndexBackend) {
    let params = IndexParams {
        backend,
        ..IndexParams::default()
    };
    let snapshot = built(
        IndexBuilder::new(params)
            .with_dimension(4)
            .build_from(scenario_a_corpus())
            .unwrap(),
    );
    let engine = RecommendationEngine::new(RecommendOptions {
        top_n: 3,
        diversity_k: 1,
        neighbors_per_track: 2,
        with_scores: true,
    });

    let playlist = [fv("A", &[1.0, 0.0, 0.0, 0.0])];
    let recs = engine
        .recommend(&playlist, snapshot.index(), snapshot.lookup())
        .unwrap();

    assert!(recs.len() <= 3);
    let mood: Vec<&str> = recs
        .iter()
        .filter(|r| r.stage == Stage::Mood)
        .map(|r| r.track_id.as_str())
        .collect();
    assert_eq!(mood, vec!["B", "C"]);
    assert!(recs.iter().all(|r| r.track_id.as_str() != "A"));
    assert!(recs.iter().filter(|r| r.stage == Stage::Diversity).count() <= 1);

    let scores: Vec<f64> = recs.iter().filter_map(|r| r.score).collect();
    assert!(scores.iter().all(|s| (0.0..=100.0).contains(s)));
    assert!(scores[0] >= scores[1]);
}

#[test]
fn scenario_a_hnsw() {
    scenario_a(IndexBackend::Hnsw);
}

#[test]
fn scenario_a_flat() {
    scenario_a(IndexBackend::Flat);
}

#[test]
fn scenario_b_schema_mismatch() {
    let snapshot = built(
        IndexBuilder::default()
            .build_from(random_corpus(20, FEATURE_DIMENSION, 1))
            .unwrap(),
    );
    assert_eq!(snapshot.index().dimension(), 60);

    let playlist = [FeatureVector::new("short", vec![0.5; 55])];
    let err = RecommendationEngine::default()
        .recommend(&playlist, snapshot.index(), snapshot.lookup())
        .unwrap_err();
    assert!(err.is_schema_mismatch(), "{err}");

    let err = snapshot.index().query(&[0.5; 55], 5).unwrap_err();
    assert!(matches!(
        err,
        SearchError::DimensionMismatch {
            expected: 60,
            found: 55
        }
    ));
}

#[test]
fn scenario_c_k_clamped_to_index_size() {
    let snapshot = built(
        IndexBuilder::default()
            .with_dimension(3)
            .build_from(vec![
                fv("x", &[1.0, 0.0, 0.0]),
                fv("y", &[0.0, 1.0, 0.0]),
                fv("z", &[0.0, 0.0, 1.0]),
            ])
            .unwrap(),
    );
    assert_eq!(snapshot.index().query(&[1.0, 1.0, 1.0], 50).unwrap().len(), 3);

    let playlist = [fv("x", &[1.0, 0.0, 0.0])];
    let recs = RecommendationEngine::new(RecommendOptions {
        top_n: 10,
        ..RecommendOptions::default()
    })
    .recommend(&playlist, snapshot.index(), snapshot.lookup())
    .unwrap();
    assert!(recs.len() <= 3);
    let ids: HashSet<&str> = recs.iter().map(|r| r.track_id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["y", "z"]));
}

#[test]
fn scenario_d_empty_build_leaves_artifact_absent() {
    let dir = TempDir::new().unwrap();
    let artifacts = ArtifactStore::new(dir.path());

    let outcome = IndexBuilder::default()
        .build_and_publish(&MemoryFeatureStore::new(), &artifacts)
        .unwrap();
    assert!(!outcome.is_built());
    assert_eq!(artifacts.current().unwrap(), None);

    let recommender = Recommender::open(&artifacts).unwrap();
    assert_eq!(recommender.handle().state(), GenerationState::Absent);
    let playlist = [FeatureVector::new("a", vec![1.0; FEATURE_DIMENSION])];
    let err = recommender
        .recommend(&playlist, &RecommendOptions::default())
        .unwrap_err();
    assert!(err.is_unavailable());
}

#[test]
fn scenario_d_empty_build_keeps_previous_generation() {
    let dir = TempDir::new().unwrap();
    let artifacts = ArtifactStore::new(dir.path());
    let store: MemoryFeatureStore = random_corpus(10, 4, 3).into_iter().collect();
    let builder = IndexBuilder::default().with_dimension(4);

    builder.build_and_publish(&store, &artifacts).unwrap();
    let live = artifacts.current().unwrap();

    builder
        .build_and_publish(&MemoryFeatureStore::new(), &artifacts)
        .unwrap();
    assert_eq!(artifacts.current().unwrap(), live);
    assert_eq!(artifacts.load_current().unwrap().lookup().len(), 10);
}

#[test]
fn scenario_e_vote_ties_break_by_track_id() {
    // Dense ids deliberately disagree with track-id order.
    let vectors = vec![
        vec![1.0, 0.1, 0.0], // 0: zeta, next to p1
        vec![1.0, 0.0, 0.0], // 1: p1
        vec![0.0, 1.0, 0.0], // 2: p2
        vec![0.1, 1.0, 0.0], // 3: alpha, next to p2
        vec![0.0, 0.0, 1.0], // 4: far
    ];
    let mut index = FlatIndex::with_capacity(3, 5, &IndexParams::default()).unwrap();
    index.add(&vectors, &[0, 1, 2, 3, 4]).unwrap();
    let lookup = IdLookup::new(
        ["zeta", "p1", "p2", "alpha", "far"]
            .map(TrackId::from)
            .to_vec(),
    );

    let engine = RecommendationEngine::new(RecommendOptions {
        top_n: 1,
        diversity_k: 1,
        neighbors_per_track: 2,
        with_scores: false,
    });
    let playlist = [fv("p1", &[1.0, 0.0, 0.0]), fv("p2", &[0.0, 1.0, 0.0])];

    let first = engine.recommend(&playlist, &index, &lookup).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].track_id.as_str(), "alpha");
    assert_eq!(first[0].stage, Stage::Diversity);

    for _ in 0..10 {
        assert_eq!(engine.recommend(&playlist, &index, &lookup).unwrap(), first);
    }
}

#[test]
fn repeated_calls_are_identical() {
    let corpus = random_corpus(200, 16, 11);
    let snapshot = built(
        IndexBuilder::default()
            .with_dimension(16)
            .build_from(corpus.clone())
            .unwrap(),
    );
    let playlist = &corpus[10..15];
    let engine = RecommendationEngine::new(RecommendOptions {
        with_scores: true,
        ..RecommendOptions::default()
    });

    let first = engine
        .recommend(playlist, snapshot.index(), snapshot.lookup())
        .unwrap();
    assert!(!first.is_empty() && first.len() <= 10);
    for _ in 0..5 {
        let again = engine
            .recommend(playlist, snapshot.index(), snapshot.lookup())
            .unwrap();
        assert_eq!(again, first);
    }
}

#[test]
fn rebuild_from_shuffled_corpus_is_value_equivalent() {
    let corpus = random_corpus(150, 12, 5);
    let mut shuffled = corpus.clone();
    shuffled.reverse();
    shuffled.swap(3, 77);

    // Two independently built graphs only agree exactly when the beam
    // covers the whole corpus.
    let builder = IndexBuilder::new(IndexParams {
        ef_search: 200,
        ..IndexParams::default()
    })
    .with_dimension(12);
    let first = built(builder.build_from(corpus.clone()).unwrap());
    let second = built(builder.build_from(shuffled).unwrap());

    assert_eq!(first.lookup(), second.lookup());

    let engine = RecommendationEngine::new(RecommendOptions {
        diversity_k: 0,
        ..RecommendOptions::default()
    });
    for playlist in [&corpus[0..3], &corpus[40..48], &corpus[100..101]] {
        let a: HashSet<TrackId> = engine
            .recommend(playlist, first.index(), first.lookup())
            .unwrap()
            .into_iter()
            .map(|r| r.track_id)
            .collect();
        let b: HashSet<TrackId> = engine
            .recommend(playlist, second.index(), second.lookup())
            .unwrap()
            .into_iter()
            .map(|r| r.track_id)
            .collect();
        assert_eq!(a, b);
    }

    // Every dense id resolves to the track whose vector it was built from.
    for vector in &corpus {
        let hit = second.index().query(&vector.values, 1).unwrap();
        assert_eq!(second.lookup().get(hit[0].id), Some(&vector.track_id));
    }
}

#[test]
fn published_generation_answers_like_in_memory_one() {
    let dir = TempDir::new().unwrap();
    let artifacts = ArtifactStore::new(dir.path());
    let corpus = random_corpus(80, 8, 21);
    let store: MemoryFeatureStore = corpus.iter().cloned().collect();

    let outcome = IndexBuilder::default()
        .with_dimension(8)
        .build_and_publish(&store, &artifacts)
        .unwrap();
    let BuildOutcome::Built { snapshot, .. } = outcome else {
        panic!("expected a build");
    };
    let loaded = artifacts.load_current().unwrap();

    let engine = RecommendationEngine::default();
    let playlist = &corpus[5..9];
    assert_eq!(
        engine
            .recommend(playlist, loaded.index(), loaded.lookup())
            .unwrap(),
        engine
            .recommend(playlist, snapshot.index(), snapshot.lookup())
            .unwrap()
    );
}

#[test]
fn hnsw_and_flat_agree_on_small_corpus() {
    let corpus = random_corpus(60, 6, 9);
    let vectors: Vec<Vec<f32>> = corpus.iter().map(|v| v.values.clone()).collect();
    let ids: Vec<u32> = (0..60).collect();

    let params = IndexParams::default();
    let mut hnsw = HnswIndex::with_capacity(6, 60, &params).unwrap();
    hnsw.add(&vectors, &ids).unwrap();
    let mut flat = FlatIndex::with_capacity(6, 60, &params).unwrap();
    flat.add(&vectors, &ids).unwrap();

    for v in &vectors[..10] {
        let a: Vec<u32> = hnsw.query(v, 5).unwrap().iter().map(|n| n.id).collect();
        let b: Vec<u32> = flat.query(v, 5).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(a, b);
    }
}

#[test]
fn near_silent_track_does_not_block_rebuild() {
    let dir = TempDir::new().unwrap();
    let artifacts = ArtifactStore::new(dir.path());
    let mut corpus = random_corpus(12, FEATURE_DIMENSION, 31);
    corpus.push(fv("near-silent", &[1e-14; FEATURE_DIMENSION]));
    let store: MemoryFeatureStore = corpus.iter().cloned().collect();

    for backend in [IndexBackend::Hnsw, IndexBackend::Flat] {
        let builder = IndexBuilder::new(IndexParams {
            backend,
            ..IndexParams::default()
        });
        let outcome = builder.build_and_publish(&store, &artifacts).unwrap();
        assert_eq!(outcome.report().indexed, 12);
        assert_eq!(outcome.report().quarantined.len(), 1);

        let loaded = artifacts.load_current().unwrap();
        assert_eq!(loaded.manifest().quarantined, 1);
        assert!(loaded
            .lookup()
            .iter()
            .all(|(_, track)| track.as_str() != "near-silent"));

        let err = builder
            .clone()
            .strict(true)
            .build(&store)
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidVector(_)));
    }
}
