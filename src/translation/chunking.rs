/*!
 * Dialogue chunks and request batching.
 *
 * Dialogue is sliced into fixed-size chunks, and chunks are packed into
 * request-sized batches. Splitting and merging never reorder or drop a chunk,
 * so results can always be lined up with the original dialogue by position.
 */

use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

/// Contiguous slice of dialogue translated as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Index of the first line in the document dialogue
    pub from_line: usize,
    /// Index one past the last line
    pub to_line: usize,
    /// Original lines
    pub dialogue: Vec<String>,
    #[serde(skip)]
    translated: Option<Vec<String>>,
}

impl Chunk {
    pub fn new(from_line: usize, dialogue: Vec<String>) -> Self {
        Self {
            from_line,
            to_line: from_line + dialogue.len(),
            dialogue,
            translated: None,
        }
    }

    /// Translated lines, always as many as `dialogue` once set
    pub fn translated(&self) -> Option<&[String]> {
        self.translated.as_deref()
    }

    /// Store a translation, repairing its length.
    ///
    /// Returns `true` when the translation had to be repaired.
    pub fn set_translation(&mut self, lines: Vec<String>) -> bool {
        let (repaired, misaligned) = repair_lines(&self.dialogue, lines);
        self.translated = Some(repaired);
        misaligned
    }

    /// Serialized JSON length of the chunk as sent in a request
    pub fn serialized_len(&self) -> usize {
        serde_json::to_string(self).map(|json| json.len()).unwrap_or_default()
    }
}

/// Force `translated` to the length of `original`.
///
/// Missing trailing lines are taken from the original dialogue, extra
/// trailing lines are dropped. Returns the repaired lines and whether a
/// repair happened.
pub fn repair_lines(original: &[String], mut translated: Vec<String>) -> (Vec<String>, bool) {
    let expected = original.len();
    let actual = translated.len();
    if actual < expected {
        translated.extend_from_slice(&original[actual..]);
    } else {
        translated.truncate(expected);
    }
    (translated, actual != expected)
}

/// Ordered chunks sent in one request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChunkBatch {
    pub chunks: Vec<Chunk>,
}

impl ChunkBatch {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Pretty JSON body embedded in the prompt
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Upper bound on the size of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestBudget {
    /// Chunks per request
    pub max_chunks: usize,
    /// Serialized JSON characters per request
    pub max_chars: usize,
}

impl RequestBudget {
    pub fn new(max_chunks: usize, max_chars: usize) -> Self {
        Self {
            max_chunks: max_chunks.max(1),
            max_chars,
        }
    }

    /// Whether `batch` can be sent as a single request
    pub fn fits(&self, batch: &ChunkBatch) -> bool {
        split(batch, *self).len() <= 1
    }
}

// `{"chunks":[]}`
const EMPTY_BATCH_LEN: usize = 13;

/// Slice dialogue into chunks of `chunk_lines` lines, the last one may be shorter
pub fn chunk_dialogue(dialogue: &[String], chunk_lines: usize) -> ChunkBatch {
    let chunk_lines = chunk_lines.max(1);
    let chunks = dialogue
        .chunks(chunk_lines)
        .enumerate()
        .map(|(i, lines)| Chunk::new(i * chunk_lines, lines.to_vec()))
        .collect();
    ChunkBatch::new(chunks)
}

/// Partition `batch` into the fewest contiguous sub-batches within `budget`.
///
/// A chunk larger than the character budget on its own travels alone.
pub fn split(batch: &ChunkBatch, budget: RequestBudget) -> Vec<ChunkBatch> {
    let mut parts = Vec::new();
    let mut current: Vec<Chunk> = Vec::new();
    let mut current_len = EMPTY_BATCH_LEN;

    for chunk in &batch.chunks {
        // one separator per chunk
        let chunk_len = chunk.serialized_len() + 1;
        let full = current.len() >= budget.max_chunks || current_len + chunk_len > budget.max_chars;
        if !current.is_empty() && full {
            parts.push(ChunkBatch::new(std::mem::take(&mut current)));
            current_len = EMPTY_BATCH_LEN;
        }
        current.push(chunk.clone());
        current_len += chunk_len;
    }

    if !current.is_empty() {
        parts.push(ChunkBatch::new(current));
    }
    parts
}

/// Concatenate sub-batch results in submission order
pub fn merge(parts: Vec<ChunkBatch>) -> ChunkBatch {
    ChunkBatch::new(parts.into_iter().flat_map(|part| part.chunks).collect())
}

/// Chunk as returned by the provider, only the lines matter
#[derive(Debug, Clone, Deserialize)]
pub struct TranslatedChunk {
    pub dialogue: Vec<String>,
}

/// Provider reply to a `ChunkBatch` request
#[derive(Debug, Clone, Deserialize)]
pub struct TranslatedBatch {
    pub chunks: Vec<TranslatedChunk>,
}

impl TranslatedBatch {
    /// Parse a reply and check it has one chunk per requested chunk
    pub fn parse(text: &str, expected_chunks: usize) -> Result<Self, ProviderError> {
        let batch: TranslatedBatch = serde_json::from_str(strip_code_fence(text))
            .map_err(|e| ProviderError::Malformed(format!("invalid json: {}", e)))?;
        if batch.chunks.len() != expected_chunks {
            return Err(ProviderError::Malformed(format!(
                "number of translated chunks does not match: expected {}, got {}",
                expected_chunks,
                batch.chunks.len()
            )));
        }
        Ok(batch)
    }

    /// Concatenate replies of consecutive sub-batches
    pub fn merge(parts: Vec<TranslatedBatch>) -> Self {
        Self {
            chunks: parts.into_iter().flat_map(|part| part.chunks).collect(),
        }
    }

    pub fn into_lines(self) -> Vec<Vec<String>> {
        self.chunks.into_iter().map(|chunk| chunk.dialogue).collect()
    }
}

/// Models sometimes wrap JSON in a markdown fence even in JSON mode
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let body = rest.strip_prefix("json").unwrap_or(rest);
            body.strip_suffix("```").unwrap_or(body).trim()
        }
        None => trimmed,
    }
}
