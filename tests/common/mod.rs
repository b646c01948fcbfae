/*!
 * Common test utilities for the subtrans test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use subtrans::app_config::AssSettings;
use subtrans::providers::mock::MockProvider;
use subtrans::translation::{
    AdmissionConfig, AdmissionController, Orchestrator, PromptTemplate, RateLimitedClient, Reconciler,
    ReconcilerConfig, RequestBudget, RetryBudget,
};

pub const SUFFIX: &str = "_translated";

/// Five one-line entries: a, b, c, d, e
pub const FIVE_LINE_SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\na\n\n2\n00:00:02,000 --> 00:00:03,000\nb\n\n3\n00:00:03,000 --> 00:00:04,000\nc\n\n4\n00:00:04,000 --> 00:00:05,000\nd\n\n5\n00:00:05,000 --> 00:00:06,000\ne\n";

pub const SAMPLE_ASS: &str = "[Script Info]\nTitle: Test\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:02.00,Default,Mio,0,0,0,,{\\i1}good morning{\\i0}\nDialogue: 0,0:00:02.00,0:00:03.00,Signs,,0,0,0,,STATION\nDialogue: 0,0:00:03.00,0:00:04.00,Default,,0,0,0,,see you\n";

/// Send test logs through env_logger, once per process
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Limits that never queue a request
pub fn generous_limits() -> AdmissionConfig {
    AdmissionConfig {
        requests_per_window: 1000,
        tokens_per_window: 10_000_000,
        max_concurrent: None,
        window: Duration::from_secs(60),
        poll_interval: Duration::from_secs(2),
    }
}

/// Reconciler sizes: chunks of `chunk_lines`, `request_chunks` per request, one chunk when reduced
pub fn chunk_sizes(chunk_lines: usize, request_chunks: usize) -> ReconcilerConfig {
    ReconcilerConfig {
        chunk_lines,
        request_budget: RequestBudget::new(request_chunks, 300_000),
        reduced_budget: RequestBudget::new(1, 8_000),
    }
}

/// Orchestrator over a mock provider
pub fn orchestrator(
    provider: MockProvider,
    limits: AdmissionConfig,
    sizes: ReconcilerConfig,
    ass: AssSettings,
) -> Orchestrator<MockProvider> {
    let admission = AdmissionController::new(limits);
    let client = RateLimitedClient::new(Arc::new(provider), admission, Arc::new(RetryBudget::new(5)));
    let prompt = PromptTemplate::new(
        "Translate from {source_language} to {target_language}:\n{json}",
        "English",
        "Italian",
        sizes.chunk_lines,
    );
    Orchestrator::new(Reconciler::new(client, prompt, sizes), ass, SUFFIX)
}
