/*!
 * Advanced SubStation Alpha (.ass) documents.
 *
 * The header, up to and including the `Format:` line of `[Events]`, is kept
 * verbatim. `Dialogue:` events with every field present and a non-empty text
 * are translated; other events and events matched by an ignore rule pass
 * through untouched.
 *
 * Override blocks such as `{\an8}` are swapped for `{format N}` placeholders
 * so the translator only sees plain text, and restored on reassembly. When
 * the events carry a `Name` field the speaker is sent as a `Name: ` prefix
 * and stripped again afterwards.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};

use super::{normalize, DocumentSource};
use crate::app_config::AssSettings;
use crate::errors::DocumentError;

static OVERRIDE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^{}]+\}").unwrap());

const EVENTS_SECTION: &str = "[Events]";
const UNKNOWN_SPEAKER: &str = "Unknown";

#[derive(Debug, Clone)]
enum EventLine {
    /// Copied as is
    Passthrough(String),
    /// Translated, `prefix` holds everything up to the text field
    Dialogue { prefix: String },
}

/// Parsed ASS document
#[derive(Debug, Clone)]
pub struct AssDocument {
    header: String,
    events: Vec<EventLine>,
    dialogue: Vec<String>,
    // event index of each dialogue line
    dialogue_events: Vec<usize>,
    overrides: HashMap<String, String>,
    has_speaker: bool,
}

impl AssDocument {
    pub fn parse(text: &str, settings: &AssSettings) -> Result<Self, DocumentError> {
        let text = normalize(text);
        let text = text.trim();
        let (before, events) = text.split_once(EVENTS_SECTION).ok_or_else(|| DocumentError::InvalidFormat {
            format: "ass",
            message: format!("{} section not found", EVENTS_SECTION),
        })?;

        let mut lines = events.split('\n').filter(|line| !line.trim().is_empty());
        let format_line = lines
            .next()
            .filter(|line| line.trim().to_lowercase().starts_with("format"))
            .ok_or_else(|| DocumentError::InvalidFormat {
                format: "ass",
                message: "'Format:' line not found".to_string(),
            })?;

        let fields: HashMap<String, usize> = format_line
            .split_once(':')
            .map(|(_, names)| names)
            .unwrap_or_default()
            .split(',')
            .enumerate()
            .map(|(i, name)| (name.trim().to_lowercase(), i))
            .collect();
        let field_count = fields.len();
        let speaker_index = fields.get("name").copied();

        let ignore: Vec<(usize, &HashSet<String>)> = settings
            .ignore
            .iter()
            .filter_map(|rule| fields.get(&rule.field.to_lowercase()).map(|&i| (i, &rule.values)))
            .collect();

        let mut document = Self {
            header: format!("{}{}\n{}", before, EVENTS_SECTION, format_line),
            events: Vec::new(),
            dialogue: Vec::new(),
            dialogue_events: Vec::new(),
            overrides: HashMap::new(),
            has_speaker: speaker_index.is_some(),
        };

        for line in lines {
            let values = Self::dialogue_fields(line, field_count);
            let ignored = values.as_ref().is_some_and(|(_, values)| {
                ignore
                    .iter()
                    .any(|(i, ignored_values)| ignored_values.contains(values[*i].trim()))
            });

            match values {
                Some((event, values)) if !ignored => {
                    let (text, leading) = values.split_last().map(|(t, l)| (*t, l)).unwrap_or_default();
                    let composed = match speaker_index {
                        Some(i) => {
                            let speaker = values[i].trim();
                            let speaker = if speaker.is_empty() { UNKNOWN_SPEAKER } else { speaker };
                            format!("{}: {}", speaker, text)
                        }
                        None => text.to_string(),
                    };

                    let placeholder_text = document.replace_overrides(&composed);
                    document.dialogue_events.push(document.events.len());
                    document.dialogue.push(placeholder_text);
                    document.events.push(EventLine::Dialogue {
                        prefix: format!("{}:{}", event, leading.join(",")),
                    });
                }
                _ => document.events.push(EventLine::Passthrough(line.to_string())),
            }
        }

        debug!(
            "ass: {} dialogue lines, {} passed through",
            document.dialogue.len(),
            document.events.len() - document.dialogue.len()
        );
        Ok(document)
    }

    /// `(event, fields)` of a complete `Dialogue:` line with non-empty text
    fn dialogue_fields(line: &str, field_count: usize) -> Option<(&str, Vec<&str>)> {
        let (event, value) = line.split_once(':')?;
        if !event.trim().eq_ignore_ascii_case("dialogue") || field_count == 0 {
            return None;
        }
        let values: Vec<&str> = value.splitn(field_count, ',').collect();
        let complete = values.len() == field_count && values.last().is_some_and(|text| !text.trim().is_empty());
        complete.then_some((event, values))
    }

    fn replace_overrides(&mut self, text: &str) -> String {
        OVERRIDE_BLOCK
            .replace_all(text, |caps: &Captures| {
                let token = format!("{{format {}}}", self.overrides.len());
                self.overrides.insert(token.clone(), caps[0].to_string());
                token
            })
            .into_owned()
    }

    fn restore_overrides(&self, text: &str) -> String {
        OVERRIDE_BLOCK
            .replace_all(text, |caps: &Captures| {
                self.overrides.get(&caps[0]).cloned().unwrap_or_else(|| "{}".to_string())
            })
            .into_owned()
    }

    fn header_lines(&self) -> usize {
        self.header.lines().count()
    }
}

impl DocumentSource for AssDocument {
    fn dialogue_lines(&self) -> &[String] {
        &self.dialogue
    }

    fn reassemble(&self, translated: &[String]) -> Result<String, DocumentError> {
        if translated.len() != self.dialogue.len() {
            return Err(DocumentError::LineCountMismatch {
                expected: self.dialogue.len(),
                actual: translated.len(),
            });
        }

        let mut translated = translated.iter();
        let mut output = vec![self.header.clone()];
        for event in &self.events {
            match event {
                EventLine::Passthrough(line) => output.push(line.clone()),
                EventLine::Dialogue { prefix } => {
                    let line = translated.next().map(String::as_str).unwrap_or_default();
                    let text = if self.has_speaker {
                        line.split_once(": ").map(|(_, text)| text).unwrap_or(line)
                    } else {
                        line
                    };
                    output.push(format!("{},{}", prefix, self.restore_overrides(text)));
                }
            }
        }

        Ok(format!("{}\n", output.join("\n")))
    }

    fn map_positions(&self, positions: &[usize]) -> Vec<usize> {
        let first_event_line = self.header_lines() + 1;
        positions
            .iter()
            .map(|&position| {
                let event = match self.dialogue_events.get(position) {
                    Some(&event) => event,
                    // past the end, count from the last known event
                    None => self.events.len() + position - self.dialogue_events.len(),
                };
                first_event_line + event
            })
            .collect()
    }
}
