/*!
 * Per-file translation tasks and the run across files.
 *
 * Each file runs as its own task: load the document, reconcile its dialogue,
 * rebuild it, report misaligned ranges and write the output next to the
 * input. A failing file never stops the others and never produces an
 * output file.
 */

use log::{error, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

use crate::app_config::AssSettings;
use crate::document::{DocumentSource, SubtitleDocument};
use crate::errors::AppError;
use crate::file_utils::FileManager;
use crate::providers::Provider;

use super::reconciler::Reconciler;

/// A successfully written translation
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedFile {
    pub output_path: PathBuf,
    /// Inclusive line ranges of the written file that may be misaligned
    pub misaligned_lines: Vec<(usize, usize)>,
}

/// Result of one input file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Translated(TranslatedFile),
    /// Output already exists or the input is itself a translation
    Skipped,
    Failed(String),
}

/// Outcome of every input of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub files: Vec<(PathBuf, FileOutcome)>,
    pub elapsed: std::time::Duration,
}

impl RunSummary {
    pub fn translated(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Translated(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn outcome<P: AsRef<Path>>(&self, input: P) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|(path, _)| path == input.as_ref())
            .map(|(_, outcome)| outcome)
    }

    fn count(&self, predicate: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|(_, outcome)| predicate(outcome)).count()
    }

    /// Events worth repeating at the end of a run, one per line
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for (path, outcome) in &self.files {
            let name = display_name(path);
            match outcome {
                FileOutcome::Failed(reason) => issues.push(format!("{} failed: {}", name, reason)),
                FileOutcome::Translated(file) if !file.misaligned_lines.is_empty() => {
                    issues.push(format!("{} - misalignments at lines [{}]", name, format_ranges(&file.misaligned_lines)))
                }
                _ => {}
            }
        }
        issues
    }

    /// Log the final report
    pub fn log(&self) {
        if self.has_failures() {
            error!("failed: {}", self.failed());
        }
        for (path, outcome) in &self.files {
            let name = display_name(path);
            match outcome {
                FileOutcome::Translated(file) => {
                    info!("{}: generated {}", name, file.output_path.display());
                    if !file.misaligned_lines.is_empty() {
                        warn!("{} - misalignments at lines [{}]", name, format_ranges(&file.misaligned_lines));
                    }
                }
                FileOutcome::Failed(reason) => error!("{} failed: {}", name, reason),
                FileOutcome::Skipped => {}
            }
        }
        info!("{}", self);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processing completed: {} translated, {} skipped, {} errors in {}",
            self.translated(),
            self.skipped(),
            self.failed(),
            format_duration(self.elapsed)
        )
    }
}

/// Runs one translation task per input file
#[derive(Debug)]
pub struct Orchestrator<P: Provider> {
    reconciler: Arc<Reconciler<P>>,
    ass: Arc<AssSettings>,
    suffix: Arc<str>,
}

impl<P: Provider> Clone for Orchestrator<P> {
    fn clone(&self) -> Self {
        Self {
            reconciler: Arc::clone(&self.reconciler),
            ass: Arc::clone(&self.ass),
            suffix: Arc::clone(&self.suffix),
        }
    }
}

impl<P: Provider + 'static> Orchestrator<P> {
    pub fn new(reconciler: Reconciler<P>, ass: AssSettings, suffix: &str) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            ass: Arc::new(ass),
            suffix: Arc::from(suffix),
        }
    }

    /// Whether `input` should be left alone
    pub fn should_skip(&self, input: &Path) -> bool {
        FileManager::is_translation(input, &self.suffix)
            || FileManager::file_exists(FileManager::translated_path(input, &self.suffix))
    }

    /// Translate every input concurrently, one task per file
    pub async fn run(&self, inputs: Vec<PathBuf>) -> RunSummary {
        let start = Instant::now();
        let mut summary = RunSummary::default();
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();

        for input in inputs {
            if self.should_skip(&input) {
                info!("{}: already translated, skipping", display_name(&input));
                summary.files.push((input, FileOutcome::Skipped));
                continue;
            }

            let orchestrator = self.clone();
            let path = input.clone();
            let handle = tasks.spawn(async move {
                match orchestrator.translate_file(&path).await {
                    Ok(file) => FileOutcome::Translated(file),
                    Err(e) => {
                        error!("{} failed: {}", display_name(&path), e);
                        FileOutcome::Failed(e.to_string())
                    }
                }
            });
            pending.insert(handle.id(), input);
        }

        if tasks.is_empty() {
            warn!("Found no file to translate, already translated files are ignored.");
        }

        // a panicked or cancelled task still counts as a failed file
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    let reason = if e.is_panic() { "translation task panicked" } else { "translation task was cancelled" };
                    if let Some(input) = pending.get(&e.id()) {
                        error!("{} failed: {}", display_name(input), reason);
                    }
                    (e.id(), FileOutcome::Failed(reason.to_string()))
                }
            };
            match pending.remove(&id) {
                Some(input) => summary.files.push((input, outcome)),
                None => error!("Finished translation task {} has no input", id),
            }
        }

        summary.elapsed = start.elapsed();
        summary
    }

    /// Translate one file and write the result next to it
    pub async fn translate_file(&self, input: &Path) -> Result<TranslatedFile, AppError> {
        let filename = display_name(input);
        let text = FileManager::read_to_string(input).map_err(|e| AppError::File(format!("{:#}", e)))?;
        let document = SubtitleDocument::parse(input, &text, &self.ass)?;
        info!("{}: {} dialogue lines", filename, document.dialogue_lines().len());

        let output = self.reconciler.translate(&filename, document.dialogue_lines()).await?;
        let translated = document.reassemble(&output.dialogue)?;

        // last line of each range, ranges are end-exclusive
        let bounds: Vec<usize> = output
            .misalignments
            .iter()
            .flat_map(|&(from, to)| [from, to.saturating_sub(1).max(from)])
            .collect();
        let misaligned_lines: Vec<(usize, usize)> = document
            .map_positions(&bounds)
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect();
        if !misaligned_lines.is_empty() {
            warn!("{} - misalignments at lines [{}]", filename, format_ranges(&misaligned_lines));
        }

        let output_path = FileManager::translated_path(input, &self.suffix);
        FileManager::write_to_file(&output_path, &translated).map_err(|e| AppError::File(format!("{:#}", e)))?;
        info!("{}: generated {}", filename, output_path.display());

        Ok(TranslatedFile {
            output_path,
            misaligned_lines,
        })
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_ranges(ranges: &[(usize, usize)]) -> String {
    ranges
        .iter()
        .map(|(from, to)| format!("{}-{}", from, to))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_duration(duration: std::time::Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, duration.subsec_millis())
    }
}
