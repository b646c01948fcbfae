/*!
 * Quotas and retries shared by every file of a run
 */

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use subtrans::app_config::AssSettings;
use subtrans::errors::ProviderError;
use subtrans::providers::mock::MockProvider;
use subtrans::translation::{AdmissionConfig, FileOutcome};
use crate::common;

fn create_inputs(dir: &std::path::Path, count: usize) -> Result<Vec<PathBuf>> {
    (0..count)
        .map(|i| common::create_test_file(dir, &format!("ep{:02}.srt", i), common::FIVE_LINE_SRT))
        .collect()
}

/// Test that three files under rpm=2 and one slot take longer than a window
#[tokio::test(start_paused = true)]
async fn test_run_withRequestQuota_shouldSpreadFilesOverWindows() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let inputs = create_inputs(temp_dir.path(), 3)?;
    let provider = MockProvider::uppercase().with_delay(Duration::from_secs(1));
    let limits = AdmissionConfig {
        requests_per_window: 2,
        tokens_per_window: 1_000_000,
        max_concurrent: Some(1),
        window: Duration::from_secs(60),
        poll_interval: Duration::from_secs(2),
    };
    let orchestrator = common::orchestrator(provider.clone(), limits, common::chunk_sizes(10, 30), AssSettings::default());

    let start = Instant::now();
    let summary = orchestrator.run(inputs).await;

    assert_eq!(summary.translated(), 3);
    assert_eq!(provider.call_count(), 3);
    assert!(start.elapsed() > Duration::from_secs(60));
    Ok(())
}

/// Test that transient failures are retried transparently
#[tokio::test(start_paused = true)]
async fn test_run_withTransientFailures_shouldRetryAndSucceed() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let inputs = create_inputs(temp_dir.path(), 1)?;
    let provider = MockProvider::scripted(vec![
        Err(ProviderError::Retriable("429 RESOURCE_EXHAUSTED".to_string())),
        Err(ProviderError::Retriable("503 UNAVAILABLE".to_string())),
    ]);
    let orchestrator = common::orchestrator(
        provider.clone(),
        common::generous_limits(),
        common::chunk_sizes(10, 30),
        AssSettings::default(),
    );

    let summary = orchestrator.run(inputs).await;
    assert_eq!(summary.translated(), 1);
    assert_eq!(provider.call_count(), 3);
    Ok(())
}

/// Test that the retry budget is shared and exhaustion fails the files
#[tokio::test(start_paused = true)]
async fn test_run_withPersistentQuotaErrors_shouldExhaustSharedBudget() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let inputs = create_inputs(temp_dir.path(), 2)?;
    let provider = MockProvider::new(|_| Err(ProviderError::Retriable("429 RESOURCE_EXHAUSTED".to_string())));
    let orchestrator = common::orchestrator(
        provider.clone(),
        common::generous_limits(),
        common::chunk_sizes(10, 30),
        AssSettings::default(),
    );

    let summary = orchestrator.run(inputs.clone()).await;
    assert_eq!(summary.failed(), 2);
    // one first attempt per file plus the five shared retries
    assert_eq!(provider.call_count(), 7);
    for input in &inputs {
        assert!(matches!(
            summary.outcome(input),
            Some(FileOutcome::Failed(reason)) if reason.contains("retry budget exhausted")
        ));
    }
    Ok(())
}
