use std::future::Future;
use std::time::Duration;

use core_types::truncate_chars;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Failure of a single embedding attempt. Every variant is retryable.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("embedding server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed embedding response: {0}")]
    Malformed(String),
    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },
}

/// One round-trip to the embedding provider.
pub trait EmbeddingTransport: Send + Sync {
    fn request(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, AttemptError>> + Send;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

const MAX_ERROR_BODY: usize = 200;

/// `POST {"text": ...}` to the provider endpoint, expecting a JSON float array.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AttemptError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AttemptError::Transport)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(&self, err: reqwest::Error) -> AttemptError {
        if err.is_timeout() {
            AttemptError::Timeout(self.timeout)
        } else {
            AttemptError::Transport(err)
        }
    }
}

impl EmbeddingTransport for HttpTransport {
    async fn request(&self, text: &str) -> Result<Vec<f32>, AttemptError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;
        if status != StatusCode::OK {
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_ERROR_BODY),
            });
        }

        serde_json::from_str::<Vec<f32>>(&body).map_err(|e| {
            AttemptError::Malformed(format!("{e} (body starts with {:?})", truncate_chars(&body, 50)))
        })
    }
}
