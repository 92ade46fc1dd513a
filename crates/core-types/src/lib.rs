//! Core identifiers and shared lightweight types for person-search.
//!
//! These types intentionally avoid heavy dependencies so every crate in the
//! workspace (store, search engine, embedding client, CLI) can share them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod config;

/// Number of floats in every embedding handled by the system.
pub const EMBEDDING_DIM: usize = 384;

/// First `max_chars` characters of `s`, with `...` appended when something was cut.
///
/// Cuts on char boundaries, so multi-byte text is never split mid-character.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Store-assigned sequential document identifier (build-time position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InternalId(pub u64);

impl InternalId {
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for InternalId {
    fn from(value: usize) -> Self {
        InternalId(value as u64)
    }
}

impl fmt::Display for InternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One person as read from the build inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: String,
    pub bio: String,
    pub resume_html: String,
    pub category: String,
    /// Position of this person's vector in the embeddings sequence.
    pub embedding_index: i64,
}

/// Dense embedding as produced by the upstream provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(pub Vec<f32>);

impl EmbeddingVector {
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(value: Vec<f32>) -> Self {
        Self(value)
    }
}

/// Retrievable text fields of an indexed person.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoredFields {
    pub id: String,
    pub bio: String,
    pub category: String,
    pub resume_html: String,
}

impl From<&PersonRecord> for StoredFields {
    fn from(record: &PersonRecord) -> Self {
        Self {
            id: record.id.clone(),
            bio: record.bio.clone(),
            category: record.category.clone(),
            resume_html: record.resume_html.clone(),
        }
    }
}

/// A document as persisted in the committed store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub internal_id: InternalId,
    pub fields: StoredFields,
    pub vector: EmbeddingVector,
}

/// One ranked hit handed back to callers and written to the output artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub rank: u32,
    pub id: String,
    pub bio: String,
    pub category: String,
    pub resume_html: String,
    pub score: f32,
}

/// Similarity function used to score a query against stored vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Raw inner product; assumes vectors are normalized upstream.
    #[default]
    DotProduct,
    /// Inner product of the L2-normalized vectors.
    Cosine,
}

impl Metric {
    pub const fn as_str(self) -> &'static str {
        match self {
            Metric::DotProduct => "dot_product",
            Metric::Cosine => "cosine",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dot_product" | "dot-product" | "dot" => Ok(Metric::DotProduct),
            "cosine" | "cos" => Ok(Metric::Cosine),
            other => anyhow::bail!("unknown similarity metric '{other}'"),
        }
    }
}
