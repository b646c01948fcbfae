/*!
 * End-to-end translation of subtitle files with a mock provider
 */

use anyhow::Result;
use std::collections::HashSet;
use std::time::Duration;

use subtrans::app_config::{AssIgnoreRule, AssSettings};
use subtrans::errors::{AppError, ProviderError, TranslationError};
use subtrans::file_utils::FileManager;
use subtrans::providers::mock::MockProvider;
use subtrans::translation::FileOutcome;
use crate::common;

/// Test that a clean translation writes the output next to the input
#[tokio::test(start_paused = true)]
async fn test_translate_file_withCleanReply_shouldWriteOutput() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "ep01.srt", common::FIVE_LINE_SRT)?;
    let orchestrator = common::orchestrator(
        MockProvider::uppercase(),
        common::generous_limits(),
        common::chunk_sizes(2, 30),
        AssSettings::default(),
    );

    let file = orchestrator.translate_file(&input).await?;
    assert_eq!(file.output_path, temp_dir.path().join("ep01_translated.srt"));
    assert!(file.misaligned_lines.is_empty());

    let written = FileManager::read_to_string(&file.output_path)?;
    assert_eq!(written, common::FIVE_LINE_SRT.to_uppercase());
    Ok(())
}

/// Test that a short chunk is padded from the original and reported
#[tokio::test(start_paused = true)]
async fn test_translate_file_withShortChunk_shouldPadAndReportLines() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "ep01.srt", common::FIVE_LINE_SRT)?;
    let provider = MockProvider::scripted(vec![
        Ok(MockProvider::reply(&[vec!["A", "B"], vec!["C"], vec!["E"]])),
        Ok(MockProvider::reply(&[vec!["C"]])),
    ]);
    let orchestrator = common::orchestrator(
        provider.clone(),
        common::generous_limits(),
        common::chunk_sizes(2, 30),
        AssSettings::default(),
    );

    let file = orchestrator.translate_file(&input).await?;
    // entries 3 and 4
    assert_eq!(file.misaligned_lines, vec![(3, 4)]);
    assert_eq!(provider.call_count(), 2);

    let written = FileManager::read_to_string(&file.output_path)?;
    let dialogue: Vec<&str> = written.split("\n\n").map(|block| block.lines().nth(2).unwrap_or("")).collect();
    assert_eq!(dialogue, vec!["A", "B", "C", "d", "E"]);
    Ok(())
}

/// Test that a successful correction leaves nothing to report
#[tokio::test(start_paused = true)]
async fn test_translate_file_withCorrection_shouldBeClean() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "ep01.srt", common::FIVE_LINE_SRT)?;
    let provider = MockProvider::scripted(vec![
        Ok(MockProvider::reply(&[vec!["A", "B"], vec!["C"], vec!["E"]])),
        Ok(MockProvider::reply(&[vec!["C", "D"]])),
    ]);
    let orchestrator = common::orchestrator(
        provider,
        common::generous_limits(),
        common::chunk_sizes(2, 30),
        AssSettings::default(),
    );

    let file = orchestrator.translate_file(&input).await?;
    assert!(file.misaligned_lines.is_empty());
    assert_eq!(
        FileManager::read_to_string(&file.output_path)?,
        common::FIVE_LINE_SRT.to_uppercase()
    );
    Ok(())
}

/// Test that pervasive misalignment fails the file and writes nothing
#[tokio::test(start_paused = true)]
async fn test_translate_file_withPervasiveMisalignment_shouldNotWriteOutput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "ep01.srt", common::FIVE_LINE_SRT)?;
    let provider = MockProvider::new(|call| {
        let batch = call.batch.as_ref().expect("batch in prompt");
        let lines: Vec<Vec<String>> = batch.chunks.iter().map(|chunk| vec![chunk.dialogue[0].to_uppercase()]).collect();
        Ok(MockProvider::reply(&lines))
    });
    let orchestrator = common::orchestrator(
        provider,
        common::generous_limits(),
        common::chunk_sizes(2, 1),
        AssSettings::default(),
    );

    let error = orchestrator.translate_file(&input).await.unwrap_err();
    assert!(matches!(
        error,
        AppError::Translation(TranslationError::Misalignment { misaligned: 2, limit: 1, .. })
    ));
    assert!(!temp_dir.path().join("ep01_translated.srt").exists());
    Ok(())
}

/// Test that ASS formatting, speakers and ignored events survive translation
#[tokio::test(start_paused = true)]
async fn test_translate_file_withAss_shouldPreserveFormatting() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "ep01.ass", common::SAMPLE_ASS)?;
    let provider = MockProvider::new(|call| {
        let batch = call.batch.as_ref().expect("batch in prompt");
        let lines: Vec<Vec<String>> = batch
            .chunks
            .iter()
            .map(|chunk| chunk.dialogue.iter().map(|line| line.replace("good morning", "buongiorno").replace("see you", "a dopo")).collect())
            .collect();
        Ok(MockProvider::reply(&lines))
    });
    let ass = AssSettings {
        ignore: vec![AssIgnoreRule {
            field: "Style".to_string(),
            values: HashSet::from(["Signs".to_string()]),
        }],
    };
    let orchestrator = common::orchestrator(provider.clone(), common::generous_limits(), common::chunk_sizes(10, 30), ass);

    let file = orchestrator.translate_file(&input).await?;
    let written = FileManager::read_to_string(&file.output_path)?;
    assert!(written.contains("Default,Mio,0,0,0,,{\\i1}buongiorno{\\i0}\n"));
    assert!(written.contains("Signs,,0,0,0,,STATION\n"));
    assert!(written.contains("Default,,0,0,0,,a dopo\n"));

    // the ignored sign never reaches the provider
    let sent = &provider.calls()[0];
    assert!(!sent.prompt.contains("STATION"));
    assert!(sent.prompt.contains("Mio: {format 0}good morning{format 1}"));
    Ok(())
}

/// Test that a failing file does not stop the others
#[tokio::test(start_paused = true)]
async fn test_run_withOneFatalFile_shouldTranslateTheOthers() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let good = common::create_test_file(temp_dir.path(), "good.srt", common::FIVE_LINE_SRT)?;
    let bad = common::create_test_file(
        temp_dir.path(),
        "bad.srt",
        "1\n00:00:01,000 --> 00:00:02,000\nforbidden\n",
    )?;
    let provider = MockProvider::new(|call| {
        let batch = call.batch.as_ref().expect("batch in prompt");
        if batch.chunks[0].dialogue[0] == "forbidden" {
            Err(ProviderError::Fatal("403 PERMISSION_DENIED".to_string()))
        } else {
            Ok(MockProvider::uppercase_reply(batch))
        }
    })
    .with_delay(Duration::from_millis(200));
    let orchestrator = common::orchestrator(
        provider,
        common::generous_limits(),
        common::chunk_sizes(2, 30),
        AssSettings::default(),
    );

    let summary = orchestrator.run(vec![good.clone(), bad.clone()]).await;
    assert_eq!(summary.translated(), 1);
    assert_eq!(summary.failed(), 1);
    assert!(matches!(summary.outcome(&good), Some(FileOutcome::Translated(_))));
    assert!(matches!(summary.outcome(&bad), Some(FileOutcome::Failed(reason)) if reason.contains("403")));
    assert!(!temp_dir.path().join("bad_translated.srt").exists());
    Ok(())
}

/// Test that a panicking file task is still reported as a failed file
#[tokio::test(start_paused = true)]
async fn test_run_withPanickingTask_shouldRecordFailure() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let good = common::create_test_file(temp_dir.path(), "good.srt", common::FIVE_LINE_SRT)?;
    let broken = common::create_test_file(
        temp_dir.path(),
        "broken.srt",
        "1\n00:00:01,000 --> 00:00:02,000\nexplode\n",
    )?;
    let provider = MockProvider::new(|call| {
        let batch = call.batch.as_ref().expect("batch in prompt");
        if batch.chunks[0].dialogue[0] == "explode" {
            panic!("provider blew up");
        }
        Ok(MockProvider::uppercase_reply(batch))
    });
    let orchestrator = common::orchestrator(
        provider,
        common::generous_limits(),
        common::chunk_sizes(2, 30),
        AssSettings::default(),
    );

    let summary = orchestrator.run(vec![good.clone(), broken.clone()]).await;
    assert_eq!(summary.files.len(), 2);
    assert_eq!(summary.translated(), 1);
    assert!(summary.has_failures());
    assert!(matches!(summary.outcome(&broken), Some(FileOutcome::Failed(reason)) if reason.contains("panicked")));
    assert!(!temp_dir.path().join("broken_translated.srt").exists());
    Ok(())
}

/// Test that translated inputs and inputs with existing output are skipped
#[tokio::test(start_paused = true)]
async fn test_run_withExistingTranslations_shouldSkip() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let done = common::create_test_file(temp_dir.path(), "ep01.srt", common::FIVE_LINE_SRT)?;
    let output = common::create_test_file(temp_dir.path(), "ep01_translated.srt", "old")?;
    let fresh = common::create_test_file(temp_dir.path(), "ep02.srt", common::FIVE_LINE_SRT)?;
    let provider = MockProvider::uppercase();
    let orchestrator = common::orchestrator(
        provider.clone(),
        common::generous_limits(),
        common::chunk_sizes(10, 30),
        AssSettings::default(),
    );

    let summary = orchestrator.run(vec![done.clone(), output.clone(), fresh.clone()]).await;
    assert_eq!(summary.outcome(&done), Some(&FileOutcome::Skipped));
    assert_eq!(summary.outcome(&output), Some(&FileOutcome::Skipped));
    assert!(matches!(summary.outcome(&fresh), Some(FileOutcome::Translated(_))));
    assert_eq!(provider.call_count(), 1);
    assert_eq!(FileManager::read_to_string(&output)?, "old");
    Ok(())
}

/// Test that an unparseable input fails without calling the provider
#[tokio::test(start_paused = true)]
async fn test_run_withInvalidDocument_shouldFailThatFile() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let broken = common::create_test_file(temp_dir.path(), "broken.ass", "[Script Info]\nno events here\n")?;
    let provider = MockProvider::uppercase();
    let orchestrator = common::orchestrator(
        provider.clone(),
        common::generous_limits(),
        common::chunk_sizes(10, 30),
        AssSettings::default(),
    );

    let summary = orchestrator.run(vec![broken.clone()]).await;
    assert!(matches!(summary.outcome(&broken), Some(FileOutcome::Failed(reason)) if reason.contains("[Events]")));
    assert_eq!(provider.call_count(), 0);
    Ok(())
}
