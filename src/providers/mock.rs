/*!
 * Mock provider implementations for testing.
 *
 * `MockProvider` answers with a responder closure that sees the prompt and
 * the chunk batch embedded in it:
 * - `MockProvider::uppercase()` - translates by upper-casing every line
 * - `MockProvider::scripted(..)` - replays a list of replies, then upper-cases
 * - `MockProvider::new(..)` - any custom behaviour
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{Provider, ProviderResponse};
use crate::translation::chunking::ChunkBatch;

/// One recorded call
#[derive(Debug, Clone)]
pub struct MockCall {
    /// Position of the call, starting at 0
    pub index: usize,
    /// Full prompt text
    pub prompt: String,
    /// Batch found in the prompt, if any
    pub batch: Option<ChunkBatch>,
}

impl MockCall {
    /// Number of chunks in the embedded batch
    pub fn chunk_count(&self) -> usize {
        self.batch.as_ref().map(|b| b.len()).unwrap_or(0)
    }
}

type Responder = dyn Fn(&MockCall) -> Result<String, ProviderError> + Send + Sync;

/// Mock provider for testing translation behavior
#[derive(Clone)]
pub struct MockProvider {
    responder: Arc<Responder>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    delay: Option<Duration>,
    reported_tokens: Option<u64>,
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("calls", &self.calls.lock().len())
            .field("delay", &self.delay)
            .finish()
    }
}

impl MockProvider {
    /// Create a mock answering with `responder`
    pub fn new(responder: impl Fn(&MockCall) -> Result<String, ProviderError> + Send + Sync + 'static) -> Self {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
            reported_tokens: None,
        }
    }

    /// Translate every line to upper case, keeping the structure intact
    pub fn uppercase() -> Self {
        Self::new(|call| match &call.batch {
            Some(batch) => Ok(Self::uppercase_reply(batch)),
            None => Err(ProviderError::Fatal("no batch in prompt".to_string())),
        })
    }

    /// Replay `replies` in call order, then behave like `uppercase()`
    pub fn scripted(replies: Vec<Result<String, ProviderError>>) -> Self {
        let replies = Mutex::new(VecDeque::from(replies));
        Self::new(move |call| match replies.lock().pop_front() {
            Some(reply) => reply,
            None => match &call.batch {
                Some(batch) => Ok(Self::uppercase_reply(batch)),
                None => Err(ProviderError::Fatal("no batch in prompt".to_string())),
            },
        })
    }

    /// Wait `delay` before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report `tokens` as the billed usage of every call
    pub fn with_reported_tokens(mut self, tokens: u64) -> Self {
        self.reported_tokens = Some(tokens);
        self
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Reply translating every line of `batch` to upper case
    pub fn uppercase_reply(batch: &ChunkBatch) -> String {
        let lines: Vec<Vec<String>> = batch
            .chunks
            .iter()
            .map(|chunk| chunk.dialogue.iter().map(|l| l.to_uppercase()).collect())
            .collect();
        Self::reply(&lines)
    }

    /// Reply holding exactly `chunks`
    pub fn reply<S: AsRef<str>>(chunks: &[Vec<S>]) -> String {
        let chunks: Vec<Value> = chunks
            .iter()
            .map(|lines| json!({ "dialogue": lines.iter().map(|l| l.as_ref()).collect::<Vec<_>>() }))
            .collect();
        json!({ "chunks": chunks }).to_string()
    }

    /// Extract the pretty-printed batch embedded in a prompt
    pub fn find_batch(prompt: &str) -> Option<ChunkBatch> {
        let start = prompt.find("{\n  \"chunks\"")?;
        let mut stream = serde_json::Deserializer::from_str(&prompt[start..]).into_iter::<ChunkBatch>();
        stream.next()?.ok()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn structured_output(&self, prompt: &str, _schema: &Value) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut calls = self.calls.lock();
            let call = MockCall {
                index: calls.len(),
                prompt: prompt.to_string(),
                batch: Self::find_batch(prompt),
            };
            calls.push(call.clone());
            call
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let text = (self.responder)(&call)?;
        Ok(ProviderResponse {
            text,
            total_tokens: self.reported_tokens,
        })
    }
}
