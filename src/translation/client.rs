/*!
 * Rate-limited structured-output client.
 *
 * Wraps a `Provider` with admission control and the shared retry budget.
 * Every call reserves an inflated token estimate, waits for admission, and
 * returns its slot with the billed cost (or the reservation when the
 * provider does not report usage).
 */

use log::{info, warn};
use serde_json::Value;
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::providers::{Provider, ProviderResponse};

use super::admission::{AdmissionController, RetryBudget};
use super::prompts::chunk_batch_schema;
use super::tokens;

/// Provider behind the admission controller and the retry budget
#[derive(Debug)]
pub struct RateLimitedClient<P: Provider> {
    provider: Arc<P>,
    admission: AdmissionController,
    retries: Arc<RetryBudget>,
    schema: Value,
}

impl<P: Provider> Clone for RateLimitedClient<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            admission: self.admission.clone(),
            retries: Arc::clone(&self.retries),
            schema: self.schema.clone(),
        }
    }
}

impl<P: Provider> RateLimitedClient<P> {
    pub fn new(provider: Arc<P>, admission: AdmissionController, retries: Arc<RetryBudget>) -> Self {
        Self {
            provider,
            admission,
            retries,
            schema: chunk_batch_schema(),
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn retries(&self) -> &RetryBudget {
        &self.retries
    }

    /// Send `prompt`, resubmitting on retriable failures while the shared
    /// budget lasts.
    ///
    /// A retriable failure with no budget left comes back as `Fatal`.
    /// `Malformed` replies are returned as is, shrinking the request is the
    /// caller's decision.
    pub async fn structured_output(&self, request_id: &str, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        let cost = tokens::reserved_cost(self.provider.estimate_tokens(prompt));

        loop {
            let permit = self.admission.acquire(request_id, cost).await?;
            info!("{}: calling provider", request_id);

            let result = self.provider.structured_output(prompt, &self.schema).await;
            let actual = match &result {
                Ok(response) => response.total_tokens.unwrap_or(cost),
                Err(_) => cost,
            };
            permit.release(actual);

            match result {
                Err(ProviderError::Retriable(reason)) if self.retries.try_consume() => {
                    warn!("{}: rescheduling after - {}", request_id, reason);
                }
                Err(error) => return Err(error.into_fatal("retry budget exhausted")),
                Ok(response) => return Ok(response),
            }
        }
    }
}
