/*!
 * Tests for subtitle documents through the public interface
 */

use std::collections::HashSet;
use std::path::Path;
use subtrans::app_config::{AssIgnoreRule, AssSettings};
use subtrans::document::{DocumentSource, SubtitleDocument};
use subtrans::errors::DocumentError;
use crate::common;

fn signs_ignored() -> AssSettings {
    AssSettings {
        ignore: vec![AssIgnoreRule {
            field: "Style".to_string(),
            values: HashSet::from(["Signs".to_string()]),
        }],
    }
}

/// Test that an SRT document exposes one line per entry
#[test]
fn test_srt_dialogue_shouldFollowEntries() {
    let document = SubtitleDocument::parse(Path::new("ep01.srt"), common::FIVE_LINE_SRT, &AssSettings::default()).unwrap();
    assert_eq!(document.dialogue_lines(), &["a", "b", "c", "d", "e"].map(String::from));
}

/// Test that ASS parsing honours ignore rules and speaker names
#[test]
fn test_ass_dialogue_shouldSkipIgnoredStyles() {
    let document = SubtitleDocument::parse(Path::new("ep01.ass"), common::SAMPLE_ASS, &signs_ignored()).unwrap();
    assert_eq!(
        document.dialogue_lines(),
        &["Mio: {format 0}good morning{format 1}", "Unknown: see you"].map(String::from)
    );
}

/// Test that reassembly keeps ignored events in place
#[test]
fn test_ass_reassemble_shouldInterleavePassedThroughEvents() {
    let document = SubtitleDocument::parse(Path::new("ep01.ass"), common::SAMPLE_ASS, &signs_ignored()).unwrap();
    let rebuilt = document
        .reassemble(&["Mio: {format 0}buongiorno{format 1}".to_string(), "Unknown: a dopo".to_string()])
        .unwrap();

    let events: Vec<&str> = rebuilt.lines().skip(5).collect();
    assert_eq!(
        events,
        vec![
            "Dialogue: 0,0:00:01.00,0:00:02.00,Default,Mio,0,0,0,,{\\i1}buongiorno{\\i0}",
            "Dialogue: 0,0:00:02.00,0:00:03.00,Signs,,0,0,0,,STATION",
            "Dialogue: 0,0:00:03.00,0:00:04.00,Default,,0,0,0,,a dopo",
        ]
    );
}

/// Test that positions map to lines of the rebuilt file
#[test]
fn test_ass_map_positions_shouldPointAtRebuiltLines() {
    let document = SubtitleDocument::parse(Path::new("ep01.ass"), common::SAMPLE_ASS, &signs_ignored()).unwrap();
    let rebuilt = document.reassemble(document.dialogue_lines()).unwrap();
    let lines: Vec<&str> = rebuilt.lines().collect();

    let positions = document.map_positions(&[0, 1]);
    assert_eq!(positions, vec![6, 8]);
    assert!(lines[positions[1] - 1].ends_with("see you"));
}

/// Test that reassembly refuses a wrong number of lines
#[test]
fn test_reassemble_withMissingLines_shouldFail() {
    let document = SubtitleDocument::parse(Path::new("ep01.srt"), common::FIVE_LINE_SRT, &AssSettings::default()).unwrap();
    let error = document.reassemble(&["A".to_string()]).unwrap_err();
    assert_eq!(error, DocumentError::LineCountMismatch { expected: 5, actual: 1 });
}
