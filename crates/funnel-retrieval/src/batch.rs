//! Batch retrieval
//!
//! Several parameters are fetched concurrently; each parameter's own gaps
//! stay serial inside [`Retriever::retrieve`]. Atomicity is always
//! enforced, so a rate limit surfaces as a failure instead of a silently
//! incomplete result. After a cooldown every unfinished request restarts.
//! Gaps persisted before the failure are then served from cache.

use crate::adapter::{RemoteAdapter, RetrievalTarget};
use crate::error::RetrievalError;
use crate::orchestrator::{RetrievalOutcome, RetrieveOptions, Retriever};
use crate::registry::FileRegistry;
use futures::stream::{self, StreamExt};
use serde::Serialize;

/// One parameter to retrieve
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    /// Parameter id
    pub param_id: String,
    /// Graph element
    pub target: RetrievalTarget,
    /// Slice DSL
    pub dsl: String,
    /// Per-call options; atomicity is forced on
    pub options: RetrieveOptions,
}

impl BatchRequest {
    /// Create request with default options
    #[must_use]
    pub fn new(param_id: impl Into<String>, target: RetrievalTarget, dsl: impl Into<String>) -> Self {
        Self {
            param_id: param_id.into(),
            target,
            dsl: dsl.into(),
            options: RetrieveOptions::default(),
        }
    }

    /// With options
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: RetrieveOptions) -> Self {
        self.options = options;
        self
    }
}

/// Result of [`Retriever::retrieve_all`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// One outcome per request, in request order
    pub outcomes: Vec<RetrievalOutcome>,
    /// Cooldown restarts taken
    pub restarts: u32,
    /// Days persisted by passes that ended in a rate limit
    pub days_before_restart: usize,
}

impl BatchReport {
    /// Total days persisted across every pass, restarted ones included
    #[must_use]
    pub fn days_fetched(&self) -> usize {
        self.days_before_restart + self.outcomes.iter().map(|o| o.days_fetched).sum::<usize>()
    }
}

impl<R: FileRegistry, A: RemoteAdapter> Retriever<R, A> {
    /// Retrieve many parameters, restarting after rate limits
    ///
    /// # Errors
    /// - the first non-retryable failure
    /// - [`RetrievalError::RestartsExhausted`] once `max_restarts` cooldowns
    ///   have not cleared the rate limit
    pub async fn retrieve_all(
        &self,
        requests: &[BatchRequest],
    ) -> Result<BatchReport, RetrievalError> {
        let batch = self.config().batch;
        let mut outcomes: Vec<Option<RetrievalOutcome>> = requests.iter().map(|_| None).collect();
        let mut pending: Vec<usize> = (0..requests.len()).collect();
        let mut restarts = 0u32;
        let mut days_before_restart = 0usize;

        loop {
            let results: Vec<(usize, Result<RetrievalOutcome, RetrievalError>)> =
                stream::iter(pending.iter().copied())
                    .map(|index| {
                        let request = &requests[index];
                        let options = request.options.clone().enforce_atomicity(true);
                        async move {
                            let result = self
                                .retrieve(&request.param_id, &request.target, &request.dsl, &options)
                                .await;
                            (index, result)
                        }
                    })
                    .buffer_unordered(batch.max_concurrent_params.max(1))
                    .collect()
                    .await;

            let mut retry = Vec::new();
            let mut last_rate_limit = None;
            for (index, result) in results {
                match result {
                    Ok(outcome) => outcomes[index] = Some(outcome),
                    Err(err) if err.is_retryable() => {
                        days_before_restart += err.days_fetched().unwrap_or(0);
                        retry.push(index);
                        last_rate_limit = Some(err);
                    }
                    Err(err) => return Err(err),
                }
            }

            let Some(last) = last_rate_limit else {
                break;
            };
            if restarts >= batch.max_restarts {
                tracing::error!(restarts, "Rate limit persisted; giving up");
                return Err(RetrievalError::RestartsExhausted {
                    restarts,
                    last: Box::new(last),
                });
            }

            restarts += 1;
            retry.sort_unstable();
            tracing::warn!(
                restarts,
                unfinished = retry.len(),
                cooldown_secs = batch.rate_limit_cooldown_secs,
                "Rate limited; cooling down before restart"
            );
            tokio::time::sleep(batch.cooldown()).await;
            pending = retry;
        }

        Ok(BatchReport {
            outcomes: outcomes.into_iter().flatten().collect(),
            restarts,
            days_before_restart,
        })
    }
}
