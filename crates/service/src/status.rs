use std::path::{Path, PathBuf};

use core_types::Metric;
use person_index::{PersonStore, StoreError};
use serde::Serialize;

/// Summary of a committed store, as shown by `person-search stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub path: PathBuf,
    pub document_count: u64,
    pub dimension: usize,
    pub metric: Metric,
    pub format_version: u32,
    pub built_at_ms: u64,
}

impl StoreStatus {
    pub fn of(store: &PersonStore) -> Self {
        let manifest = store.manifest();
        Self {
            path: store.path().to_path_buf(),
            document_count: store.document_count(),
            dimension: store.dimension(),
            metric: store.metric(),
            format_version: manifest.format_version,
            built_at_ms: manifest.built_at_ms,
        }
    }
}

/// Open the store at `path` read-only and summarize it.
pub fn store_status(path: &Path) -> Result<StoreStatus, StoreError> {
    PersonStore::open(path).map(|store| StoreStatus::of(&store))
}
