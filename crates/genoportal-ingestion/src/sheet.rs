//! Sheet framing.
//!
//! Finds the header row in a raw cell matrix and zips every later row against
//! it. Row numbers are positions in the original input because they are shown
//! to submitters in error messages.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::error::{Result, SubmissionError};
use crate::models::FramedRow;

/// Column whose presence marks the header row.
pub const HEADER_SENTINEL: &str = "individual id";

/// Instruction rows carry this marker under yes/no columns.
const INSTRUCTION_MARKER: &str = "y/n";

lazy_static! {
    static ref PARENTHETICAL: Regex = Regex::new(r"\([^)]*\)").unwrap();
    static ref SEPARATORS: Regex = Regex::new(r"[/_\-]").unwrap();
    static ref PUNCTUATION: Regex = Regex::new(r"[^\w\s]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Normalise header text: drop parentheticals and punctuation, lower-case,
/// collapse whitespace. `Req Accepted Y/N` → `req accepted y n`.
pub fn normalize_header(raw: &str) -> String {
    let text = PARENTHETICAL.replace_all(raw, " ");
    let text = SEPARATORS.replace_all(&text, " ");
    let text = PUNCTUATION.replace_all(&text, "");
    WHITESPACE.replace_all(text.trim(), " ").to_lowercase()
}

/// Lazily frames rows after the header.
pub struct SheetFramer<I> {
    rows: I,
    header: Vec<String>,
    /// 1-based number of the last row pulled from `rows`.
    position: usize,
}

impl<I> SheetFramer<I>
where
    I: Iterator<Item = Vec<String>>,
{
    /// Scan for the header row. Fails if no row names `sentinel`.
    pub fn new<R>(rows: R, sentinel: &str) -> Result<Self>
    where
        R: IntoIterator<Item = Vec<String>, IntoIter = I>,
    {
        let mut rows = rows.into_iter();
        let mut position = 0usize;

        for raw in rows.by_ref() {
            position += 1;
            let header: Vec<String> = raw.iter().map(|c| normalize_header(c)).collect();
            if header.iter().any(|h| h == sentinel) {
                debug!(row = position, columns = header.len(), "Header row found");
                return Ok(Self { rows, header, position });
            }
        }

        Err(SubmissionError::HeaderNotFound { sentinel: sentinel.to_string() })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    fn is_skippable(raw: &[String]) -> bool {
        let blank = raw.iter().all(|c| c.trim().is_empty());
        let instruction = raw
            .iter()
            .any(|c| c.to_lowercase().contains(INSTRUCTION_MARKER));
        blank || instruction
    }
}

impl<I> Iterator for SheetFramer<I>
where
    I: Iterator<Item = Vec<String>>,
{
    type Item = FramedRow;

    fn next(&mut self) -> Option<FramedRow> {
        for raw in self.rows.by_ref() {
            self.position += 1;
            if Self::is_skippable(&raw) {
                continue;
            }
            let cells = self
                .header
                .iter()
                .enumerate()
                .filter(|(_, h)| !h.is_empty())
                .map(|(i, h)| (h.clone(), raw.get(i).cloned().unwrap_or_default()))
                .collect();
            return Some(FramedRow { number: self.position, cells });
        }
        None
    }
}
