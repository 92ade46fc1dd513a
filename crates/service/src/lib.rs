//! Person-search pipelines: record loading, store builds, query orchestration
//! and the tracing bootstrap shared by the binaries.

pub mod build;
pub mod loader;
mod logging;
pub mod query;
pub mod status;

use std::path::{Path, PathBuf};

use core_serialization::SerializationError;
use embedding_client::EmbeddingError;
use person_index::StoreError;
use semantic_index::SearchError;
use thiserror::Error;

pub use build::{BuildInputs, BuildProgress, BuildReport, PROGRESS_EVERY, build_index};
pub use loader::{LoadOutcome, ValidatedPair, ValidationWarning, load_pairs};
pub use logging::{init_tracing, init_tracing_with_config};
pub use query::{QueryOutcome, QueryRequest, publish, run_query};
pub use status::{StoreStatus, store_status};

/// Any fatal failure of a build or query.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] SerializationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("cannot write results to {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode results: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PipelineError {
    /// True when the failure was a requested cancellation rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::Cancelled)
                | Self::Search(SearchError::Cancelled)
                | Self::Embedding(EmbeddingError::Cancelled)
        )
    }

    pub(crate) fn output(path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Output { path, source }
    }
}
