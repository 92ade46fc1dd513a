use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use core_types::{EMBEDDING_DIM, EmbeddingVector, Metric};
use embedding_client::{AttemptError, Embedder, EmbeddingError};
use person_index::{BuildOptions, PersonStore, StoreError};
use serde_json::json;
use service::{
    BuildInputs, BuildProgress, PipelineError, QueryRequest, build_index, run_query, store_status,
};
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

fn one_hot(weights: &[(usize, f32)]) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIM];
    for &(i, w) in weights {
        v[i] = w;
    }
    v
}

/// Writes the two build inputs in their on-disk format.
fn write_inputs(dir: &Path, people: serde_json::Value, embeddings: &[Vec<f32>]) -> BuildInputs {
    let inputs = BuildInputs {
        people: dir.join("people_with_index.json"),
        embeddings: dir.join("embeddings.json"),
        index_dir: dir.join("person_index"),
    };
    fs::write(&inputs.people, serde_json::to_vec(&people).unwrap()).unwrap();
    fs::write(&inputs.embeddings, serde_json::to_vec(embeddings).unwrap()).unwrap();
    inputs
}

fn three_people(dir: &TempDir) -> BuildInputs {
    write_inputs(
        dir.path(),
        json!([
            {"ID": "p1", "Bio": "Trial lawyer", "Resume_html": "<p>p1</p>", "Category": "Law", "embedding_index": 0},
            {"ID": "p2", "Bio": "Pastry chef", "Resume_html": "", "Category": "Food", "embedding_index": 1},
            {"ID": "p3", "Bio": "Lawyer and chef", "Resume_html": "", "Category": "Law", "embedding_index": 2},
            {"ID": "p4", "Bio": "No vector", "Resume_html": "", "Category": "Law", "embedding_index": 9}
        ]),
        &[
            one_hot(&[(0, 1.0)]),
            one_hot(&[(1, 1.0)]),
            one_hot(&[(0, 0.5), (1, 0.5)]),
        ],
    )
}

struct FixedEmbedder {
    vector: Vec<f32>,
    calls: AtomicU32,
}

impl FixedEmbedder {
    fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: AtomicU32::new(0),
        }
    }
}

impl Embedder for FixedEmbedder {
    async fn embed(
        &self,
        _text: &str,
        _cancel: Option<&CancellationToken>,
    ) -> Result<EmbeddingVector, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EmbeddingVector(self.vector.clone()))
    }
}

struct DownEmbedder;

impl Embedder for DownEmbedder {
    async fn embed(
        &self,
        _text: &str,
        _cancel: Option<&CancellationToken>,
    ) -> Result<EmbeddingVector, EmbeddingError> {
        Err(EmbeddingError::Unavailable {
            attempts: 3,
            source: AttemptError::Status {
                status: 503,
                body: "loading".into(),
            },
        })
    }
}

#[test]
fn build_skips_bad_references_and_reports_progress() {
    let dir = tempdir().unwrap();
    let inputs = three_people(&dir);

    let mut events = Vec::new();
    let report = build_index(&inputs, BuildOptions::default(), None, |p| events.push(p)).unwrap();

    assert_eq!(report.records_read, 4);
    assert_eq!(report.embeddings_read, 3);
    assert_eq!(report.indexed, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.warnings[0].person_id(), "p4");
    assert_eq!(report.manifest.document_count, 3);

    assert_eq!(events.first(), Some(&BuildProgress::Started { total: 3 }));
    assert_eq!(events.last(), Some(&BuildProgress::Committing));
    assert!(events.contains(&BuildProgress::Indexed { done: 3, total: 3 }));

    let status = store_status(&inputs.index_dir).unwrap();
    assert_eq!(status.document_count, 3);
    assert_eq!(status.dimension, EMBEDDING_DIM);
    assert_eq!(status.metric, Metric::DotProduct);
}

#[test]
fn missing_input_aborts_before_touching_the_store() {
    let dir = tempdir().unwrap();
    let inputs = three_people(&dir);
    build_index(&inputs, BuildOptions::default(), None, |_| {}).unwrap();

    let broken = BuildInputs {
        people: dir.path().join("absent.json"),
        ..inputs.clone()
    };
    let err = build_index(&broken, BuildOptions::default(), None, |_| {}).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Input(core_serialization::SerializationError::MissingInput(_))
    ));
    assert_eq!(PersonStore::open(&inputs.index_dir).unwrap().document_count(), 3);
}

#[test]
fn cancelled_build_leaves_no_store() {
    let dir = tempdir().unwrap();
    let inputs = three_people(&dir);
    let token = CancellationToken::new();
    token.cancel();

    let err = build_index(&inputs, BuildOptions::default(), Some(&token), |_| {}).unwrap_err();
    assert!(err.is_cancelled());
    assert!(matches!(
        PersonStore::open(&inputs.index_dir),
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn query_ranks_resolves_and_writes_artifact() {
    let dir = tempdir().unwrap();
    let inputs = three_people(&dir);
    build_index(&inputs, BuildOptions::default(), None, |_| {}).unwrap();
    let store = PersonStore::open(&inputs.index_dir).unwrap();

    let out_dir = dir.path().join("out");
    let embedder = FixedEmbedder::new(one_hot(&[(0, 1.0)]));
    let request = QueryRequest {
        text: "lawyer",
        top_n: 30,
        metric: None,
        output_dir: &out_dir,
    };
    let outcome = run_query(&store, &embedder, &request, None).await.unwrap();

    let ranked: Vec<(u32, &str, f32)> = outcome
        .results
        .iter()
        .map(|r| (r.rank, r.id.as_str(), r.score))
        .collect();
    assert_eq!(ranked, vec![(1, "p1", 1.0), (2, "p3", 0.5), (3, "p2", 0.0)]);
    assert_eq!(outcome.results[0].resume_html, "<p>p1</p>");

    let artifact = outcome.artifact.unwrap();
    let written: Vec<core_types::SearchResult> =
        serde_json::from_slice(&fs::read(artifact).unwrap()).unwrap();
    assert_eq!(written, outcome.results);
}

#[tokio::test]
async fn identical_queries_are_bit_identical() {
    let dir = tempdir().unwrap();
    let inputs = three_people(&dir);
    build_index(&inputs, BuildOptions::default(), None, |_| {}).unwrap();
    let store = PersonStore::open(&inputs.index_dir).unwrap();

    let embedder = FixedEmbedder::new(one_hot(&[(0, 0.3), (1, 0.7)]));
    let request = QueryRequest {
        text: "chef",
        top_n: 2,
        metric: Some(Metric::Cosine),
        output_dir: dir.path(),
    };
    let a = run_query(&store, &embedder, &request, None).await.unwrap();
    let b = run_query(&store, &embedder, &request, None).await.unwrap();

    assert_eq!(a.results.len(), 2);
    let bits = |o: &service::QueryOutcome| -> Vec<(String, u32)> {
        o.results.iter().map(|r| (r.id.clone(), r.score.to_bits())).collect()
    };
    assert_eq!(bits(&a), bits(&b));
    assert_ne!(a.artifact, b.artifact);
}

#[tokio::test]
async fn embedding_failure_writes_nothing() {
    let dir = tempdir().unwrap();
    let inputs = three_people(&dir);
    build_index(&inputs, BuildOptions::default(), None, |_| {}).unwrap();
    let store = PersonStore::open(&inputs.index_dir).unwrap();

    let out_dir = dir.path().join("out");
    let request = QueryRequest {
        text: "lawyer",
        top_n: 30,
        metric: None,
        output_dir: &out_dir,
    };
    let err = run_query(&store, &DownEmbedder, &request, None).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Embedding(EmbeddingError::Unavailable { attempts: 3, .. })
    ));
    assert!(!out_dir.exists());
}

#[tokio::test]
async fn zero_top_n_is_rejected_before_embedding() {
    let dir = tempdir().unwrap();
    let inputs = three_people(&dir);
    build_index(&inputs, BuildOptions::default(), None, |_| {}).unwrap();
    let store = PersonStore::open(&inputs.index_dir).unwrap();

    let embedder = FixedEmbedder::new(one_hot(&[(0, 1.0)]));
    let request = QueryRequest {
        text: "lawyer",
        top_n: 0,
        metric: None,
        output_dir: dir.path(),
    };
    let err = run_query(&store, &embedder, &request, None).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Search(semantic_index::SearchError::InvalidArgument(_))
    ));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wrong_width_query_is_a_dimension_mismatch() {
    let dir = tempdir().unwrap();
    let inputs = three_people(&dir);
    build_index(&inputs, BuildOptions::default(), None, |_| {}).unwrap();
    let store = PersonStore::open(&inputs.index_dir).unwrap();

    let embedder = FixedEmbedder::new(vec![1.0; 10]);
    let request = QueryRequest {
        text: "lawyer",
        top_n: 3,
        metric: None,
        output_dir: dir.path(),
    };
    let err = run_query(&store, &embedder, &request, None).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Search(semantic_index::SearchError::DimensionMismatch {
            expected: EMBEDDING_DIM,
            actual: 10
        })
    ));
}
