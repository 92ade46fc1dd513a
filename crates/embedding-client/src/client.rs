use std::future::Future;
use std::time::{Duration, Instant};

use core_types::config::EmbeddingConfig;
use core_types::{EMBEDDING_DIM, EmbeddingVector};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::retry::{RetryError, RetryPolicy, Sleeper, TokioSleeper, retry};
use crate::transport::{AttemptError, EmbeddingTransport, HttpTransport};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding service unavailable after {attempts} attempt(s): {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: AttemptError,
    },
    #[error("embedding request cancelled")]
    Cancelled,
    #[error("cannot construct embedding client: {0}")]
    Setup(#[source] AttemptError),
}

/// Anything that turns query text into a query vector.
pub trait Embedder: Send + Sync {
    fn embed(
        &self,
        text: &str,
        cancel: Option<&CancellationToken>,
    ) -> impl Future<Output = Result<EmbeddingVector, EmbeddingError>> + Send;
}

/// Retrying embedding client over a pluggable transport and clock.
#[derive(Debug, Clone)]
pub struct EmbeddingClient<T = HttpTransport, S = TokioSleeper> {
    transport: T,
    sleeper: S,
    policy: RetryPolicy,
    dimension: usize,
}

impl EmbeddingClient {
    /// HTTP client with the configured endpoint, retry count, delay and per-attempt timeout.
    pub fn from_config(cfg: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let transport = HttpTransport::new(&cfg.endpoint, Duration::from_secs(cfg.timeout_secs.max(1)))
            .map_err(EmbeddingError::Setup)?;
        let policy = RetryPolicy::fixed(cfg.retries, Duration::from_millis(cfg.retry_delay_ms));
        Ok(Self::new(transport, TokioSleeper, policy, EMBEDDING_DIM))
    }
}

impl<T, S> EmbeddingClient<T, S> {
    pub const fn new(transport: T, sleeper: S, policy: RetryPolicy, dimension: usize) -> Self {
        Self {
            transport,
            sleeper,
            policy,
            dimension,
        }
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: EmbeddingTransport, S: Sleeper> Embedder for EmbeddingClient<T, S> {
    async fn embed(
        &self,
        text: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<EmbeddingVector, EmbeddingError> {
        let transport = &self.transport;
        let expected = self.dimension;

        let outcome = retry(&self.policy, &self.sleeper, cancel, move |attempt| async move {
            let started = Instant::now();
            info!(attempt, query = %text, "requesting embedding");

            let vector = transport.request(text).await?;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            if vector.len() != expected {
                debug!(attempt, elapsed_ms, dims = vector.len(), "embedding had wrong width");
                return Err(AttemptError::Dimension {
                    expected,
                    actual: vector.len(),
                });
            }

            info!(attempt, elapsed_ms, dims = vector.len(), "embedding received");
            Ok(EmbeddingVector(vector))
        })
        .await;

        match outcome {
            Ok(vector) => Ok(vector),
            Err(RetryError::Exhausted { attempts, last }) => Err(EmbeddingError::Unavailable {
                attempts,
                source: last,
            }),
            Err(RetryError::Cancelled { attempts, .. }) => {
                debug!(attempts, "embedding cancelled");
                Err(EmbeddingError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted per-attempt outcomes and records the request text.
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<Vec<f32>, AttemptError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<Vec<f32>, AttemptError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                seen: Mutex::default(),
            }
        }
    }

    impl EmbeddingTransport for ScriptedTransport {
        fn request(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, AttemptError>> + Send {
            self.seen.lock().unwrap().push(text.to_string());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AttemptError::Malformed("script exhausted".into())));
            std::future::ready(next)
        }
    }

    #[derive(Default)]
    struct InstantSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl Sleeper for InstantSleeper {
        fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
            self.slept.lock().unwrap().push(duration);
            std::future::ready(())
        }
    }

    fn client(
        script: Vec<Result<Vec<f32>, AttemptError>>,
        retries: u32,
    ) -> EmbeddingClient<ScriptedTransport, InstantSleeper> {
        EmbeddingClient::new(
            ScriptedTransport::new(script),
            InstantSleeper::default(),
            RetryPolicy::fixed(retries, Duration::from_secs(1)),
            4,
        )
    }

    #[tokio::test]
    async fn wrong_dimension_is_retried() {
        let c = client(
            vec![Ok(vec![1.0; 3]), Ok(vec![0.5; 4])],
            3,
        );
        let v = c.embed("lawyer", None).await.unwrap();
        assert_eq!(v.0, vec![0.5; 4]);
        assert_eq!(c.transport.seen.lock().unwrap().len(), 2);
        assert_eq!(*c.sleeper.slept.lock().unwrap(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn exhaustion_wraps_last_cause() {
        let c = client(
            vec![
                Err(AttemptError::Status {
                    status: 500,
                    body: "boom".into(),
                }),
                Err(AttemptError::Malformed("not json".into())),
            ],
            2,
        );
        let err = c.embed("lawyer", None).await.unwrap_err();
        match err {
            EmbeddingError::Unavailable { attempts, source } => {
                assert_eq!(attempts, 2);
                assert!(matches!(source, AttemptError::Malformed(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(c.sleeper.slept.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_sends_nothing() {
        let c = client(vec![Ok(vec![0.0; 4])], 3);
        let token = CancellationToken::new();
        token.cancel();
        let err = c.embed("lawyer", Some(&token)).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Cancelled));
        assert!(c.transport.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn config_controls_policy() {
        let cfg = EmbeddingConfig {
            retries: 0,
            retry_delay_ms: 250,
            ..EmbeddingConfig::default()
        };
        let c = EmbeddingClient::from_config(&cfg).unwrap();
        assert_eq!(c.policy().max_attempts(), 1);
        assert_eq!(c.policy().delay_after(1), Duration::from_millis(250));
        assert_eq!(c.transport().endpoint(), "http://127.0.0.1:5000/embed");
    }
}
