// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Byte-level comparison of a committed artifact with its regenerated form

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Most differing lines listed in a report
pub const MAX_LISTED_LINES: usize = 20;

/// First byte at which the two versions differ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ByteDifference {
    pub offset: usize,
    /// 1-based
    pub line: usize,
    /// 1-based, in bytes
    pub column: usize,
    /// `None` past the end of the committed artifact
    pub committed: Option<u8>,
    /// `None` past the end of the regenerated artifact
    pub regenerated: Option<u8>,
}

/// A line that differs between the two versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineChange {
    /// 1-based
    pub line: usize,
    pub committed: Option<String>,
    pub regenerated: Option<String>,
}

/// Result of comparing a committed artifact against a regenerated one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub artifact: PathBuf,
    /// `None` when the artifact is not committed
    pub committed_size: Option<usize>,
    /// `None` when regeneration did not produce the artifact
    pub regenerated_size: Option<usize>,
    pub first_difference: Option<ByteDifference>,
    pub changed_lines: Vec<LineChange>,
    /// Differing lines beyond [`MAX_LISTED_LINES`]
    pub omitted_lines: usize,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.first_difference.is_none() && self.committed_size == self.regenerated_size
    }
}

/// Compare two versions of `artifact`. Neither side is modified.
pub fn compare(artifact: &Path, committed: Option<&[u8]>, regenerated: Option<&[u8]>) -> DriftReport {
    let mut report = DriftReport {
        artifact: artifact.to_path_buf(),
        committed_size: committed.map(<[u8]>::len),
        regenerated_size: regenerated.map(<[u8]>::len),
        first_difference: None,
        changed_lines: Vec::new(),
        omitted_lines: 0,
    };

    let (old, new) = match (committed, regenerated) {
        (None, None) => return report,
        (old, new) => (old.unwrap_or_default(), new.unwrap_or_default()),
    };

    let offset = old
        .iter()
        .zip(new)
        .position(|(a, b)| a != b)
        .or_else(|| (old.len() != new.len()).then(|| old.len().min(new.len())));

    if let Some(offset) = offset {
        let before = &old[..offset];
        let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = before.iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1);

        report.first_difference = Some(ByteDifference {
            offset,
            line,
            column: offset - line_start + 1,
            committed: old.get(offset).copied(),
            regenerated: new.get(offset).copied(),
        });
    } else if committed.is_some() != regenerated.is_some() {
        // One side is absent, the other empty: nothing to point at, still drift
        report.first_difference = Some(ByteDifference {
            offset: 0,
            line: 1,
            column: 1,
            committed: None,
            regenerated: None,
        });
    }

    if report.first_difference.is_some() {
        let (changed, omitted) = changed_lines(old, new);
        report.changed_lines = changed;
        report.omitted_lines = omitted;
    }

    report
}

fn changed_lines(old: &[u8], new: &[u8]) -> (Vec<LineChange>, usize) {
    let old_text = String::from_utf8_lossy(old);
    let new_text = String::from_utf8_lossy(new);
    let old_lines: Vec<&str> = old_text.lines().collect();
    let new_lines: Vec<&str> = new_text.lines().collect();

    let mut changed = Vec::new();
    let mut omitted = 0;

    for i in 0..old_lines.len().max(new_lines.len()) {
        let a = old_lines.get(i).copied();
        let b = new_lines.get(i).copied();
        if a == b {
            continue;
        }
        if changed.len() < MAX_LISTED_LINES {
            changed.push(LineChange {
                line: i + 1,
                committed: a.map(str::to_string),
                regenerated: b.map(str::to_string),
            });
        } else {
            omitted += 1;
        }
    }

    (changed, omitted)
}

fn describe_byte(byte: Option<u8>) -> String {
    match byte {
        None => "end of file".to_string(),
        Some(b) if b.is_ascii_graphic() || b == b' ' => format!("0x{:02x} '{}'", b, b as char),
        Some(b) => format!("0x{:02x} {:?}", b, b as char),
    }
}

fn describe_size(size: Option<usize>) -> String {
    match size {
        Some(n) => format!("{} bytes", n),
        None => "missing".to_string(),
    }
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let artifact = self.artifact.display();

        let Some(diff) = &self.first_difference else {
            return write!(f, "{} is up to date", artifact);
        };

        writeln!(f, "drift detected in {}", artifact)?;
        writeln!(
            f,
            "  committed: {}, regenerated: {}",
            describe_size(self.committed_size),
            describe_size(self.regenerated_size)
        )?;
        write!(
            f,
            "  first difference at byte {} (line {}, column {}): committed {}, regenerated {}",
            diff.offset,
            diff.line,
            diff.column,
            describe_byte(diff.committed),
            describe_byte(diff.regenerated)
        )?;

        for change in &self.changed_lines {
            write!(f, "\n  line {}:", change.line)?;
            match &change.committed {
                Some(line) => write!(f, "\n    - {}", line)?,
                None => write!(f, "\n    - (no line)")?,
            }
            match &change.regenerated {
                Some(line) => write!(f, "\n    + {}", line)?,
                None => write!(f, "\n    + (no line)")?,
            }
        }

        if self.omitted_lines > 0 {
            write!(f, "\n  ... {} more differing line(s)", self.omitted_lines)?;
        }

        Ok(())
    }
}
