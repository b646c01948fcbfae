/*!
 * Chunked translation of one file.
 *
 * The reconciler walks a file through
 * `Loaded -> Dispatched -> Merged -> (Clean | Misaligned -> Correcting) -> Done`,
 * or `Failed` on the way:
 *
 * - chunks are packed into request-sized sub-batches sent concurrently;
 * - a malformed reply re-splits its sub-batch with the reduced budget, a
 *   malformed reply at the reduced size fails the file and cancels the
 *   sibling sub-batches;
 * - chunks whose translation has the wrong line count are repaired in place
 *   and sent once more in a single correction request.
 */

use futures::future::{try_join_all, BoxFuture, FutureExt};
use log::{debug, warn};
use std::fmt;

use crate::app_config::ChunkingConfig;
use crate::errors::{ProviderError, TranslationError};
use crate::providers::Provider;

use super::chunking::{chunk_dialogue, split, ChunkBatch, RequestBudget, TranslatedBatch};
use super::client::RateLimitedClient;
use super::prompts::PromptTemplate;

/// Chunk sizing used by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Dialogue lines per chunk
    pub chunk_lines: usize,
    /// Budget of a regular request, its chunk count is also the correction threshold
    pub request_budget: RequestBudget,
    /// Budget used after a malformed reply
    pub reduced_budget: RequestBudget,
}

impl From<&ChunkingConfig> for ReconcilerConfig {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            chunk_lines: config.chunk_lines,
            request_budget: RequestBudget::new(config.request_chunks, config.request_chars),
            reduced_budget: RequestBudget::new(config.reduced_request_chunks, config.reduced_request_chars),
        }
    }
}

/// Progress of a file through the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Loaded,
    Dispatched,
    Merged,
    Clean,
    Misaligned,
    Correcting,
    Done,
    Failed,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loaded => "loaded",
            Self::Dispatched => "dispatched",
            Self::Merged => "merged",
            Self::Clean => "clean",
            Self::Misaligned => "misaligned",
            Self::Correcting => "correcting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Translated dialogue of one file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranslationOutput {
    /// One translated line per original line, in order
    pub dialogue: Vec<String>,
    /// `(from_line, to_line)` of chunks still misaligned after correction
    pub misalignments: Vec<(usize, usize)>,
}

/// Chunks of one file together with the indices of misaligned chunks
#[derive(Debug, Clone)]
pub struct ChunkedTranslation {
    chunks: ChunkBatch,
    misaligned: Vec<usize>,
}

impl ChunkedTranslation {
    pub fn new(dialogue: &[String], chunk_lines: usize) -> Self {
        Self {
            chunks: chunk_dialogue(dialogue, chunk_lines),
            misaligned: Vec::new(),
        }
    }

    pub fn chunks(&self) -> &ChunkBatch {
        &self.chunks
    }

    pub fn misaligned(&self) -> &[usize] {
        &self.misaligned
    }

    /// Attach one translation per chunk, repairing and recording misaligned chunks
    pub fn add_translation(&mut self, translated: Vec<Vec<String>>) -> Result<(), ProviderError> {
        if translated.len() != self.chunks.len() {
            return Err(ProviderError::Malformed(format!(
                "the number of translated chunks returned does not match original chunks: expected {}, got {}",
                self.chunks.len(),
                translated.len()
            )));
        }

        self.misaligned.clear();
        for (index, (chunk, lines)) in self.chunks.chunks.iter_mut().zip(translated).enumerate() {
            if chunk.set_translation(lines) {
                self.misaligned.push(index);
            }
        }
        Ok(())
    }

    /// Misaligned chunks with their original dialogue, in order
    pub fn misaligned_batch(&self) -> ChunkBatch {
        ChunkBatch::new(
            self.misaligned
                .iter()
                .map(|&index| self.chunks.chunks[index].clone())
                .collect(),
        )
    }

    /// Apply a correction reply holding one translation per misaligned chunk.
    ///
    /// Chunks still misaligned keep their repaired lines and stay recorded.
    /// A reply with the wrong number of chunks is ignored and `false` returned.
    pub fn apply_corrections(&mut self, corrected: Vec<Vec<String>>) -> bool {
        if corrected.len() != self.misaligned.len() {
            return false;
        }

        let mut still_misaligned = Vec::new();
        for (&index, lines) in self.misaligned.iter().zip(corrected) {
            if self.chunks.chunks[index].set_translation(lines) {
                still_misaligned.push(index);
            }
        }
        self.misaligned = still_misaligned;
        true
    }

    /// Line ranges of the misaligned chunks
    pub fn misaligned_ranges(&self) -> Vec<(usize, usize)> {
        self.misaligned
            .iter()
            .map(|&index| {
                let chunk = &self.chunks.chunks[index];
                (chunk.from_line, chunk.to_line)
            })
            .collect()
    }

    /// Final dialogue, original lines stand in for chunks never translated
    pub fn into_output(self) -> TranslationOutput {
        let misalignments = self.misaligned_ranges();
        let dialogue = self
            .chunks
            .chunks
            .into_iter()
            .flat_map(|chunk| match chunk.translated() {
                Some(lines) => lines.to_vec(),
                None => chunk.dialogue,
            })
            .collect();
        TranslationOutput { dialogue, misalignments }
    }
}

/// Translates files chunk by chunk through a rate-limited client
#[derive(Debug)]
pub struct Reconciler<P: Provider> {
    client: RateLimitedClient<P>,
    prompt: PromptTemplate,
    config: ReconcilerConfig,
}

impl<P: Provider> Reconciler<P> {
    pub fn new(client: RateLimitedClient<P>, prompt: PromptTemplate, config: ReconcilerConfig) -> Self {
        Self { client, prompt, config }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Translate the dialogue of `filename`
    pub async fn translate(&self, filename: &str, dialogue: &[String]) -> Result<TranslationOutput, TranslationError> {
        let result = self.run(filename, dialogue).await;
        if result.is_err() {
            self.enter(filename, ReconcileState::Failed);
        }
        result
    }

    async fn run(&self, filename: &str, dialogue: &[String]) -> Result<TranslationOutput, TranslationError> {
        let mut translation = ChunkedTranslation::new(dialogue, self.config.chunk_lines);
        self.enter(filename, ReconcileState::Loaded);
        if translation.chunks().is_empty() {
            self.enter(filename, ReconcileState::Done);
            return Ok(TranslationOutput::default());
        }

        self.enter(filename, ReconcileState::Dispatched);
        let translated = self
            .split_and_translate(filename.to_string(), translation.chunks().clone(), self.config.request_budget)
            .await?;

        translation
            .add_translation(TranslatedBatch::merge(translated).into_lines())
            .map_err(|source| TranslationError::Provider {
                request_id: filename.to_string(),
                source,
            })?;
        self.enter(filename, ReconcileState::Merged);

        if translation.misaligned().is_empty() {
            self.enter(filename, ReconcileState::Clean);
        } else {
            self.enter(filename, ReconcileState::Misaligned);
            let limit = self.config.request_budget.max_chunks;
            if translation.misaligned().len() > limit {
                return Err(TranslationError::Misalignment {
                    filename: filename.to_string(),
                    misaligned: translation.misaligned().len(),
                    limit,
                });
            }

            warn!("{}: result translation has some line misalignment, trying correction", filename);
            self.enter(filename, ReconcileState::Correcting);
            self.correct(filename, &mut translation).await?;
        }

        self.enter(filename, ReconcileState::Done);
        Ok(translation.into_output())
    }

    /// Split `batch` within `budget` and translate the parts concurrently.
    ///
    /// The first failing part cancels the others.
    fn split_and_translate(
        &self,
        request_id: String,
        batch: ChunkBatch,
        budget: RequestBudget,
    ) -> BoxFuture<'_, Result<Vec<TranslatedBatch>, TranslationError>> {
        async move {
            let parts = split(&batch, budget);
            let numbered = parts.len() > 1;
            let requests = parts.into_iter().enumerate().map(|(i, part)| {
                let part_id = if numbered {
                    format!("{}.{}", request_id, i + 1)
                } else {
                    request_id.clone()
                };
                self.translate_block(part_id, part)
            });

            let results = try_join_all(requests).await?;
            Ok(results.into_iter().flatten().collect())
        }
        .boxed()
    }

    async fn translate_block(&self, request_id: String, batch: ChunkBatch) -> Result<Vec<TranslatedBatch>, TranslationError> {
        let prompt = self.prompt.render(&batch);
        let reply = self
            .client
            .structured_output(&request_id, &prompt)
            .await
            .and_then(|response| TranslatedBatch::parse(&response.text, batch.len()));

        match reply {
            Ok(translated) => Ok(vec![translated]),
            Err(ProviderError::Malformed(message)) => {
                if self.config.reduced_budget.fits(&batch) {
                    return Err(TranslationError::Malformed { request_id, message });
                }
                warn!(
                    "{}: provider returned an invalid json ({}), retrying with reduced context window",
                    request_id, message
                );
                self.split_and_translate(request_id, batch, self.config.reduced_budget).await
            }
            Err(source) => Err(TranslationError::Provider { request_id, source }),
        }
    }

    async fn correct(&self, filename: &str, translation: &mut ChunkedTranslation) -> Result<(), TranslationError> {
        let batch = translation.misaligned_batch();
        let request_id = format!("{} corrections", filename);
        let prompt = self.prompt.render(&batch);

        let reply = self
            .client
            .structured_output(&request_id, &prompt)
            .await
            .and_then(|response| TranslatedBatch::parse(&response.text, batch.len()));

        match reply {
            Ok(corrected) => {
                translation.apply_corrections(corrected.into_lines());
                Ok(())
            }
            Err(ProviderError::Malformed(message)) => {
                warn!("{}: correction discarded, {}", request_id, message);
                Ok(())
            }
            Err(source) => Err(TranslationError::Provider { request_id, source }),
        }
    }

    fn enter(&self, filename: &str, state: ReconcileState) {
        debug!("{}: {}", filename, state);
    }
}
