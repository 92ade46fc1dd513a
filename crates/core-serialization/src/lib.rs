//! Common serialization helpers shared across the workspace.
//!
//! - wire representation of the build inputs (`people_with_index.json`, `embeddings.json`)
//! - little-endian byte codec for vectors kept in the store
//! - the store manifest that marks a committed build

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use core_types::{EmbeddingVector, Metric, PersonRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the manifest written last into a committed store.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Bumped whenever the on-disk layout of the store changes.
pub const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("required input file not found: {0}")]
    MissingInput(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("vector payload of {0} bytes is not a whole number of f32 values")]
    VectorBytes(usize),
}

/// Wire-compatible representation of one person in the build input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonRecordWire {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Bio", default)]
    pub bio: String,
    #[serde(rename = "Resume_html", default)]
    pub resume_html: String,
    #[serde(rename = "Category", default)]
    pub category: String,
    /// Absent means "no embedding"; -1 is never a valid position.
    #[serde(default = "missing_embedding_index")]
    pub embedding_index: i64,
}

const fn missing_embedding_index() -> i64 {
    -1
}

impl From<PersonRecordWire> for PersonRecord {
    fn from(value: PersonRecordWire) -> Self {
        Self {
            id: value.id,
            bio: value.bio,
            resume_html: value.resume_html,
            category: value.category,
            embedding_index: value.embedding_index,
        }
    }
}

impl From<&PersonRecord> for PersonRecordWire {
    fn from(value: &PersonRecord) -> Self {
        Self {
            id: value.id.clone(),
            bio: value.bio.clone(),
            resume_html: value.resume_html.clone(),
            category: value.category.clone(),
            embedding_index: value.embedding_index,
        }
    }
}

/// Read the person records file (JSON array, original key spelling).
pub fn read_people(path: &Path) -> Result<Vec<PersonRecord>, SerializationError> {
    let wire: Vec<PersonRecordWire> = read_json(path)?;
    Ok(wire.into_iter().map(PersonRecord::from).collect())
}

/// Read the embeddings file (JSON array of float arrays).
pub fn read_embeddings(path: &Path) -> Result<Vec<EmbeddingVector>, SerializationError> {
    read_json(path)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, SerializationError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SerializationError::MissingInput(path.to_path_buf()));
        }
        Err(source) => {
            return Err(SerializationError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_reader(BufReader::new(file)).map_err(|source| SerializationError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode a vector as packed little-endian f32 values.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode packed little-endian f32 values, appending them to `out`.
pub fn decode_vector_into(bytes: &[u8], out: &mut Vec<f32>) -> Result<(), SerializationError> {
    if bytes.len() % 4 != 0 {
        return Err(SerializationError::VectorBytes(bytes.len()));
    }
    out.extend(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
    );
    Ok(())
}

pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, SerializationError> {
    let mut out = Vec::with_capacity(bytes.len() / 4);
    decode_vector_into(bytes, &mut out)?;
    Ok(out)
}

/// Summary written into a store once its documents are durably committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub format_version: u32,
    pub dimension: usize,
    pub metric: Metric,
    pub document_count: u64,
    pub built_at_ms: u64,
}

/// Write the manifest through a temp file + rename so it appears atomically.
pub fn write_manifest(dir: &Path, manifest: &StoreManifest) -> Result<(), SerializationError> {
    let final_path = dir.join(MANIFEST_FILE);
    let tmp_path = dir.join(format!("{MANIFEST_FILE}.tmp"));
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| SerializationError::Io { path, source }
    };

    let file = File::create(&tmp_path).map_err(io_err(&tmp_path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, manifest).map_err(|source| {
        SerializationError::Json {
            path: tmp_path.clone(),
            source,
        }
    })?;
    writer.flush().map_err(io_err(&tmp_path))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(io_err(&tmp_path))?;
    drop(writer);
    std::fs::rename(&tmp_path, &final_path).map_err(io_err(&final_path))?;
    Ok(())
}

/// Read the manifest of a committed store; `MissingInput` when it was never committed.
pub fn read_manifest(dir: &Path) -> Result<StoreManifest, SerializationError> {
    read_json(&dir.join(MANIFEST_FILE))
}
