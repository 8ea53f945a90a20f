//! Batch sheet parsing: `First,Last,Song,Artist,StartSeconds[,Jersey]`.
//!
//! The sheet usually comes out of a spreadsheet export, so the parser is
//! forgiving: an optional header row, an optional UTF-8 BOM, quoted cells,
//! blank lines, and unparseable numbers (start → 0, jersey → none) are all
//! accepted. Required-field validation happens later in the import pipeline
//! so that incomplete rows are still counted.

use std::path::Path;
use tracing::debug;

/// One data row of the batch sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportCandidate {
    pub first: String,
    pub last: String,
    pub song: String,
    pub artist: String,
    pub start_offset_secs: u32,
    pub jersey: Option<u32>,
}

impl ImportCandidate {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first, self.last)
    }

    pub fn is_complete(&self) -> bool {
        !self.first.is_empty() && !self.last.is_empty() && !self.song.is_empty()
    }
}

const HEADER_TOKENS: &[&str] = &["first", "first name", "firstname"];

pub fn load_candidates(path: &Path) -> anyhow::Result<Vec<ImportCandidate>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_candidates(&content))
}

pub fn parse_candidates(content: &str) -> Vec<ImportCandidate> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut rows = Vec::new();

    for line in content.lines() {
        let cells = split_row(line);
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }

        let cell = |i: usize| cells.get(i).map(|c| c.trim().to_string()).unwrap_or_default();

        if HEADER_TOKENS.contains(&cell(0).to_lowercase().as_str()) {
            debug!("batch: skipping header row");
            continue;
        }

        rows.push(ImportCandidate {
            first: cell(0),
            last: cell(1),
            song: cell(2),
            artist: cell(3),
            start_offset_secs: parse_start(&cell(4)),
            jersey: parse_jersey(&cell(5)),
        });
    }

    rows
}

/// Non-negative whole seconds; anything else is 0.
fn parse_start(raw: &str) -> u32 {
    raw.parse::<i64>()
        .ok()
        .and_then(|v| u32::try_from(v.max(0)).ok())
        .unwrap_or(0)
}

fn parse_jersey(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok()
}

/// Split one CSV line, honouring double-quoted cells and `""` escapes.
fn split_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.trim().is_empty() => {
                current.clear();
                in_quotes = true;
            }
            ',' if !in_quotes => cells.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    cells.push(current);
    cells
}
