//! Query Orchestrator: text -> embedding -> ranked neighbors -> stored fields.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use core_types::{Metric, SearchResult};
use embedding_client::Embedder;
use person_index::PersonStore;
use semantic_index::SearchError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::PipelineError;

const ARTIFACT_PREFIX: &str = "search_results_";

#[derive(Debug, Clone)]
pub struct QueryRequest<'a> {
    pub text: &'a str,
    pub top_n: usize,
    /// Overrides the metric the store was built with.
    pub metric: Option<Metric>,
    /// Directory receiving the JSON artifact.
    pub output_dir: &'a Path,
}

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Ranked hits, rank 1 first.
    pub results: Vec<SearchResult>,
    /// Written artifact; `None` when there was nothing to write.
    pub artifact: Option<PathBuf>,
    pub embed_ms: u64,
    pub search_ms: u64,
}

/// Run one query end to end.
///
/// Any failing step aborts the query before anything is written, so callers
/// either get the complete ranked list plus its artifact or an error.
pub async fn run_query<E: Embedder>(
    store: &PersonStore,
    embedder: &E,
    request: &QueryRequest<'_>,
    cancel: Option<&CancellationToken>,
) -> Result<QueryOutcome, PipelineError> {
    if request.top_n == 0 {
        return Err(SearchError::InvalidArgument("top_n must be at least 1".into()).into());
    }

    let started = Instant::now();
    let query = embedder.embed(request.text, cancel).await?;
    let embed_ms = started.elapsed().as_millis() as u64;

    let started = Instant::now();
    let neighbors = store.search(query.as_slice(), request.top_n, request.metric, cancel)?;
    let search_ms = started.elapsed().as_millis() as u64;
    debug!(hits = neighbors.len(), search_ms, "knn search finished");

    let mut results = Vec::with_capacity(neighbors.len());
    for (i, hit) in neighbors.iter().enumerate() {
        let fields = store.fields(hit.id)?;
        results.push(SearchResult {
            rank: u32::try_from(i + 1).unwrap_or(u32::MAX),
            id: fields.id,
            bio: fields.bio,
            category: fields.category,
            resume_html: fields.resume_html,
            score: hit.score,
        });
    }

    let artifact = publish(&results, request.output_dir)?;
    info!(
        query = request.text,
        results = results.len(),
        embed_ms,
        search_ms,
        artifact = ?artifact,
        "query finished"
    );
    Ok(QueryOutcome {
        results,
        artifact,
        embed_ms,
        search_ms,
    })
}

/// Write `results` as a pretty JSON array to a fresh file in `dir`.
///
/// Empty result sets are reported and produce no file. Existing artifacts are
/// never overwritten: a name collision gets a numeric suffix.
pub fn publish(results: &[SearchResult], dir: &Path) -> Result<Option<PathBuf>, PipelineError> {
    if results.is_empty() {
        info!("no results");
        return Ok(None);
    }

    let body = serde_json::to_vec_pretty(results)?;
    fs::create_dir_all(dir).map_err(PipelineError::output(dir))?;

    let stamp = chrono::Utc::now().timestamp_millis();

    let mut attempt = 0u32;
    loop {
        let path = artifact_path(dir, stamp, attempt);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(&body).and_then(|()| file.sync_all()) {
                    drop(file);
                    let _ = fs::remove_file(&path);
                    return Err(PipelineError::output(&path)(e));
                }
                debug!(path = %path.display(), bytes = body.len(), "results written");
                return Ok(Some(path));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(PipelineError::output(&path)(e)),
        }
    }
}

fn artifact_path(dir: &Path, stamp_ms: i64, attempt: u32) -> PathBuf {
    if attempt == 0 {
        dir.join(format!("{ARTIFACT_PREFIX}{stamp_ms}.json"))
    } else {
        dir.join(format!("{ARTIFACT_PREFIX}{stamp_ms}_{attempt}.json"))
    }
}
