//! Semantic / vector search over the embeddings of a committed person store.
//!
//! The search is an exact brute-force scan: every stored vector is scored
//! against the query and the best `k` are kept. Scoring is spread across the
//! rayon pool in fixed-size chunks; each chunk keeps its own top-k and the
//! partial lists are merged with the same total order, so the output is
//! identical to a sequential scan.

pub mod knn;
pub mod metric;
pub mod vectors;

pub use knn::{Neighbor, SCAN_CHUNK, search, search_sequential};
pub use metric::{cosine, dot_product, score};
pub use vectors::FlatVectors;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("dimension mismatch: store holds {expected}-d vectors, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("search cancelled")]
    Cancelled,
}
