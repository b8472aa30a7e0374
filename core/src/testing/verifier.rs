use std::{fmt, path::Path};

use serde::Serialize;

/// First point where the produced output departs from the expected one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    LineCount { produced: usize, expected: usize },
    Line { line_no: usize, produced: String, expected: String },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Mismatch::*;
        match self {
            LineCount { produced, expected } => write!(
                f,
                "Different number of lines (yours: {}, expected: {})",
                produced, expected
            ),
            Line {
                line_no,
                produced,
                expected,
            } => write!(
                f,
                "Difference at line {}: Your answer: '{}', Standard answer: '{}'",
                line_no, produced, expected
            ),
        }
    }
}

/// Split on `\n`, `\r\n` or a lone `\r`. A final terminator does not start a new line.
fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = text;
    while let Some(i) = rest.find(&['\r', '\n'][..]) {
        lines.push(&rest[..i]);
        let eol_len = if rest[i..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[i + eol_len..];
    }
    if !rest.is_empty() {
        lines.push(rest);
    }
    lines
}

/// Split into lines with trailing whitespace removed and trailing empty lines dropped.
pub fn normalize(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = split_lines(text).into_iter().map(str::trim_end).collect();
    while lines.last().map_or(false, |s| s.is_empty()) {
        lines.pop();
    }
    lines
}

/// `None` when both texts are equal after normalization.
pub fn compare(produced: &str, expected: &str) -> Option<Mismatch> {
    let produced = normalize(produced);
    let expected = normalize(expected);

    if produced.len() != expected.len() {
        return Some(Mismatch::LineCount {
            produced: produced.len(),
            expected: expected.len(),
        });
    }

    produced
        .iter()
        .zip(&expected)
        .enumerate()
        .find(|(_, (p, e))| p != e)
        .map(|(i, (p, e))| Mismatch::Line {
            line_no: i + 1,
            produced: p.to_string(),
            expected: e.to_string(),
        })
}

pub fn compare_files(
    produced: impl AsRef<Path>,
    expected: impl AsRef<Path>,
) -> fsutil::Result<Option<Mismatch>> {
    let produced = fsutil::read(produced)?;
    let expected = fsutil::read(expected)?;
    Ok(compare(
        &String::from_utf8_lossy(&produced),
        &String::from_utf8_lossy(&expected),
    ))
}

/// Compare, and remove the produced file when it matches. The expected file is only read.
pub fn verify(
    produced: impl AsRef<Path>,
    expected: impl AsRef<Path>,
) -> fsutil::Result<Option<Mismatch>> {
    let mismatch = self::compare_files(&produced, expected)?;
    if mismatch.is_none() {
        fsutil::remove_file(&produced)?;
    }
    Ok(mismatch)
}
