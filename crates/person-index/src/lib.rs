//! Persisted person document store.
//!
//! A store is one directory holding a tantivy index plus `manifest.json`.
//! Documents carry the searchable text fields (`id`, `bio`, `category`), the
//! stored-only `resume_html`, the packed embedding and a sequential
//! `internal_id`. The manifest is written last and its presence marks the
//! store as committed; [`IndexBuilder`] assembles everything in a staging
//! directory and only then moves it into place, so readers never see a
//! partial build.

mod analysis;
mod builder;
mod reader;

pub use analysis::{PERSON_ANALYZER, analyze, register_person_analyzer};
pub use builder::{BuildOptions, IndexBuilder, clear_store};
pub use reader::{PersonStore, TextField};

use std::path::PathBuf;

use core_serialization::SerializationError;
use core_types::InternalId;
use tantivy::schema::{
    FAST, Field, INDEXED, IndexRecordOption, STORED, Schema, TextFieldIndexing, TextOptions,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no committed person store at {0}")]
    NotFound(PathBuf),
    #[error("person store at {0} contains no documents")]
    EmptyIndex(PathBuf),
    #[error("another build holds the lock file {0}; remove it if no build is running")]
    Locked(PathBuf),
    #[error("storage I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("index engine error: {0}")]
    Engine(#[from] tantivy::TantivyError),
    #[error("corrupt person store: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error("vector has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("no document with internal id {0}")]
    UnknownDocument(InternalId),
    #[error("build cancelled; staging store discarded")]
    Cancelled,
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| StoreError::Io { path, source }
    }
}

pub(crate) const F_INTERNAL_ID: &str = "internal_id";
pub(crate) const F_ID: &str = "id";
pub(crate) const F_BIO: &str = "bio";
pub(crate) const F_CATEGORY: &str = "category";
pub(crate) const F_RESUME_HTML: &str = "resume_html";
pub(crate) const F_EMBEDDING: &str = "embedding";

/// Resolved field handles of the person schema.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PersonFields {
    pub internal_id: Field,
    pub id: Field,
    pub bio: Field,
    pub category: Field,
    pub resume_html: Field,
    pub embedding: Field,
}

impl PersonFields {
    pub fn from_schema(schema: &Schema) -> Result<Self, StoreError> {
        let get = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| StoreError::Corrupt(format!("schema lacks field '{name}'")))
        };
        Ok(Self {
            internal_id: get(F_INTERNAL_ID)?,
            id: get(F_ID)?,
            bio: get(F_BIO)?,
            category: get(F_CATEGORY)?,
            resume_html: get(F_RESUME_HTML)?,
            embedding: get(F_EMBEDDING)?,
        })
    }
}

pub(crate) fn person_schema() -> Schema {
    let searchable = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(PERSON_ANALYZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();

    let mut builder = Schema::builder();
    builder.add_u64_field(F_INTERNAL_ID, INDEXED | STORED | FAST);
    builder.add_text_field(F_ID, searchable.clone());
    builder.add_text_field(F_BIO, searchable.clone());
    builder.add_text_field(F_CATEGORY, searchable);
    builder.add_text_field(F_RESUME_HTML, STORED);
    builder.add_bytes_field(F_EMBEDDING, STORED);
    builder.build()
}
