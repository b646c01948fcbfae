/*!
 * Prompt template and response schema for chunk translation.
 */

use serde_json::{json, Value};

use super::chunking::ChunkBatch;

/// Translation prompt with `{source_language}`, `{target_language}`,
/// `{lines_per_chunk}` and `{json}` placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    source_language: String,
    target_language: String,
    lines_per_chunk: usize,
}

impl PromptTemplate {
    pub fn new(
        template: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        lines_per_chunk: usize,
    ) -> Self {
        Self {
            template: template.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            lines_per_chunk,
        }
    }

    /// Prompt asking to translate `batch`
    pub fn render(&self, batch: &ChunkBatch) -> String {
        // {json} last, dialogue text must never be treated as a placeholder
        self.template
            .replace("{source_language}", &self.source_language)
            .replace("{target_language}", &self.target_language)
            .replace("{lines_per_chunk}", &self.lines_per_chunk.to_string())
            .replace("{json}", &batch.to_prompt_json())
    }
}

/// Response schema matching `TranslatedBatch`
pub fn chunk_batch_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "chunks": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "from_line": { "type": "INTEGER" },
                        "to_line": { "type": "INTEGER" },
                        "dialogue": { "type": "ARRAY", "items": { "type": "STRING" } }
                    },
                    "required": ["from_line", "to_line", "dialogue"]
                }
            }
        },
        "required": ["chunks"]
    })
}
