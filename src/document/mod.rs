/*!
 * Subtitle documents.
 *
 * A document exposes the dialogue lines to translate, rebuilds the file from
 * translated lines, and maps dialogue positions to line numbers of the
 * rebuilt file for reporting. Everything that is not dialogue (timings,
 * headers, styling, ignored events) is kept verbatim.
 */

use std::path::Path;

use crate::app_config::AssSettings;
use crate::errors::DocumentError;

pub mod ass;
pub mod srt;

pub use ass::AssDocument;
pub use srt::SrtDocument;

/// Extensions of the supported subtitle formats
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["srt", "ass"];

/// Narrow interface between the translator and a subtitle format
pub trait DocumentSource {
    /// Dialogue lines to translate, in document order
    fn dialogue_lines(&self) -> &[String];

    /// Rebuild the document with `translated` in place of the dialogue
    fn reassemble(&self, translated: &[String]) -> Result<String, DocumentError>;

    /// Line numbers (1-based) in the rebuilt file of the given dialogue positions
    fn map_positions(&self, positions: &[usize]) -> Vec<usize>;
}

/// Any supported subtitle document
#[derive(Debug, Clone)]
pub enum SubtitleDocument {
    Srt(SrtDocument),
    Ass(AssDocument),
}

impl SubtitleDocument {
    /// Whether `path` has a supported subtitle extension
    pub fn is_supported<P: AsRef<Path>>(path: P) -> bool {
        Self::extension(path.as_ref())
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Parse `text`, picking the format from the extension of `path`
    pub fn parse(path: &Path, text: &str, settings: &AssSettings) -> Result<Self, DocumentError> {
        match Self::extension(path).as_deref() {
            Some("ass") => Ok(Self::Ass(AssDocument::parse(text, settings)?)),
            Some("srt") => Ok(Self::Srt(SrtDocument::parse(text)?)),
            _ => Err(DocumentError::InvalidFormat {
                format: "subtitle",
                message: format!("unsupported file extension: {:?}", path),
            }),
        }
    }

    fn extension(path: &Path) -> Option<String> {
        path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
    }

    fn source(&self) -> &dyn DocumentSource {
        match self {
            Self::Srt(document) => document,
            Self::Ass(document) => document,
        }
    }
}

impl DocumentSource for SubtitleDocument {
    fn dialogue_lines(&self) -> &[String] {
        self.source().dialogue_lines()
    }

    fn reassemble(&self, translated: &[String]) -> Result<String, DocumentError> {
        self.source().reassemble(translated)
    }

    fn map_positions(&self, positions: &[usize]) -> Vec<usize> {
        self.source().map_positions(positions)
    }
}

/// Normalize line endings and drop a leading byte order mark
pub(crate) fn normalize(text: &str) -> String {
    text.trim_start_matches('\u{feff}').replace("\r\n", "\n")
}
