/*!
 * Provider implementations for structured-output translation services.
 *
 * - Gemini: Google Generative Language API with a response schema
 * - Mock: scripted provider used by tests
 */

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use crate::errors::ProviderError;
use crate::translation::tokens;

/// Raw reply of a structured-output call
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    /// JSON text produced by the model
    pub text: String,
    /// Tokens billed for the call, when the provider reports them
    pub total_tokens: Option<u64>,
}

/// Common trait for structured-output LLM providers
///
/// Every failure is classified as `Retriable`, `Fatal` or `Malformed`, timeouts
/// included, so callers never have to inspect transport errors.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Send `prompt` and ask for a reply matching `schema`
    async fn structured_output(&self, prompt: &str, schema: &Value) -> Result<ProviderResponse, ProviderError>;

    /// Heuristic token cost of `text`
    fn estimate_tokens(&self, text: &str) -> u64 {
        tokens::estimate(text)
    }
}

pub mod gemini;
pub mod mock;
