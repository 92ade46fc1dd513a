//! Client for the external text-embedding provider.
//!
//! A query string is posted to the configured endpoint as `{"text": ...}` and
//! the response must be a JSON array of exactly `EMBEDDING_DIM` floats. Any
//! failed attempt (transport error, timeout, non-200 status, malformed body,
//! wrong width) is retried after a fixed delay until the attempt budget is
//! spent; the last failure is reported as [`EmbeddingError::Unavailable`].

mod client;
pub mod retry;
mod transport;

pub use client::{Embedder, EmbeddingClient, EmbeddingError};
pub use retry::{RetryError, RetryPolicy, Sleeper, TokioSleeper};
pub use transport::{AttemptError, EmbeddingTransport, HttpTransport};
