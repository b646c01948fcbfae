/*!
 * SubRip (.srt) documents.
 *
 * Blocks are separated by blank lines. The first two lines of a block
 * (sequence number and timing) are kept verbatim, the remaining lines form
 * one dialogue line.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use super::{normalize, DocumentSource};
use crate::errors::DocumentError;

static TIMING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{2}:\d{2}:\d{2}[,.]\d{3} --> \d{2}:\d{2}:\d{2}[,.]\d{3}").unwrap()
});

static BLOCK_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

#[derive(Debug, Clone)]
struct SrtBlock {
    sequence: String,
    timing: String,
}

/// Parsed SubRip document
#[derive(Debug, Clone)]
pub struct SrtDocument {
    blocks: Vec<SrtBlock>,
    dialogue: Vec<String>,
}

impl SrtDocument {
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let text = normalize(text);
        let mut blocks = Vec::new();
        let mut dialogue = Vec::new();

        for (i, block) in BLOCK_SEPARATOR.split(text.trim()).enumerate() {
            if block.trim().is_empty() {
                continue;
            }
            let mut lines = block.splitn(3, '\n');
            let sequence = lines.next().unwrap_or_default().trim().to_string();
            let timing = lines.next().unwrap_or_default().trim().to_string();
            if !TIMING_REGEX.is_match(&timing) {
                return Err(DocumentError::InvalidFormat {
                    format: "srt",
                    message: format!("block {} has no timing line", i + 1),
                });
            }

            blocks.push(SrtBlock { sequence, timing });
            dialogue.push(lines.next().unwrap_or_default().to_string());
        }

        Ok(Self { blocks, dialogue })
    }
}

impl DocumentSource for SrtDocument {
    fn dialogue_lines(&self) -> &[String] {
        &self.dialogue
    }

    fn reassemble(&self, translated: &[String]) -> Result<String, DocumentError> {
        if translated.len() != self.blocks.len() {
            return Err(DocumentError::LineCountMismatch {
                expected: self.blocks.len(),
                actual: translated.len(),
            });
        }

        let blocks: Vec<String> = self
            .blocks
            .iter()
            .zip(translated)
            .map(|(block, text)| format!("{}\n{}\n{}", block.sequence, block.timing, text))
            .collect();
        Ok(format!("{}\n", blocks.join("\n\n")))
    }

    // entry numbers
    fn map_positions(&self, positions: &[usize]) -> Vec<usize> {
        positions.iter().map(|position| position + 1).collect()
    }
}
