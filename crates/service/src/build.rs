//! Batch build: input files -> validated pairs -> committed person store.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use core_serialization::{StoreManifest, read_embeddings, read_people};
use core_types::config::PathsConfig;
use person_index::{BuildOptions, IndexBuilder, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::PipelineError;
use crate::loader::{ValidationWarning, load_pairs};

/// Documents between two progress log lines.
pub const PROGRESS_EVERY: usize = 100;

/// Where a build reads from and writes to.
#[derive(Debug, Clone)]
pub struct BuildInputs {
    pub people: PathBuf,
    pub embeddings: PathBuf,
    pub index_dir: PathBuf,
}

impl From<&PathsConfig> for BuildInputs {
    fn from(paths: &PathsConfig) -> Self {
        Self {
            people: paths.people.clone(),
            embeddings: paths.embeddings.clone(),
            index_dir: paths.index_dir.clone(),
        }
    }
}

/// Observable build milestones, for progress bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildProgress {
    /// Inputs are validated; `total` documents will be written.
    Started { total: usize },
    Indexed { done: usize, total: usize },
    Committing,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub records_read: usize,
    pub embeddings_read: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub warnings: Vec<ValidationWarning>,
    pub manifest: StoreManifest,
    pub elapsed: Duration,
}

/// Read both input files, validate, and write a fresh store at `inputs.index_dir`.
///
/// A missing input file aborts before the existing store is touched. Once
/// writing starts the previous store is gone; a failure or cancellation
/// afterwards leaves no store at all rather than a partial one.
pub fn build_index(
    inputs: &BuildInputs,
    options: BuildOptions,
    cancel: Option<&CancellationToken>,
    mut progress: impl FnMut(BuildProgress),
) -> Result<BuildReport, PipelineError> {
    let started = Instant::now();

    let records = read_people(&inputs.people)?;
    let embeddings = read_embeddings(&inputs.embeddings)?;
    info!(
        people = %inputs.people.display(),
        records = records.len(),
        embeddings = embeddings.len(),
        "loaded build inputs"
    );

    let loaded = load_pairs(&records, &embeddings, options.dimension);
    let total = loaded.pairs.len();
    if !loaded.warnings.is_empty() {
        warn!(skipped = loaded.warnings.len(), "some records were excluded from the build");
    }
    progress(BuildProgress::Started { total });

    let mut builder = IndexBuilder::create(&inputs.index_dir, options)?;
    for (done, pair) in loaded.pairs.iter().enumerate() {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            warn!(indexed = done, total, "build cancelled");
            return Err(StoreError::Cancelled.into());
        }
        builder.add(pair.record, pair.vector)?;

        let done = done + 1;
        if done % PROGRESS_EVERY == 0 {
            info!(indexed = done, total, "indexing progress");
        }
        progress(BuildProgress::Indexed { done, total });
    }

    progress(BuildProgress::Committing);
    let manifest = builder.commit()?;

    let report = BuildReport {
        records_read: records.len(),
        embeddings_read: embeddings.len(),
        indexed: total,
        skipped: loaded.warnings.len(),
        warnings: loaded.warnings,
        manifest,
        elapsed: started.elapsed(),
    };
    info!(
        index = %inputs.index_dir.display(),
        indexed = report.indexed,
        skipped = report.skipped,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "build finished"
    );
    Ok(report)
}
