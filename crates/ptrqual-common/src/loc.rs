use std::fmt;

use serde::{Deserialize, Serialize};

/// Persistent identity of a declaration.
///
/// Derived from where the declaration is written rather than from any
/// in-memory AST node, so the same declaration seen in two separate passes
/// (or two translation units including the same header) maps to the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeclKey {
    pub file: String,
    pub line: u32,
    #[serde(default)]
    pub col: u32,
    pub name: String,
}

impl DeclKey {
    pub fn new(file: impl Into<String>, line: u32, col: u32, name: impl Into<String>) -> Self {
        DeclKey {
            file: file.into(),
            line,
            col,
            name: name.into(),
        }
    }

    /// The `file:line:name` key used to pair function definitions with
    /// their declarations. Column is deliberately left out.
    pub fn unique_key(&self) -> String {
        format!("{}:{}:{}", self.file, self.line, self.name)
    }

    /// Location of the declaration itself.
    pub fn loc(&self) -> SourceLoc {
        SourceLoc {
            file: self.file.clone(),
            line: self.line,
            col: self.col,
        }
    }
}

impl fmt::Display for DeclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.file, self.line, self.col, self.name)
    }
}

/// A (file, line, column) position. Line and column are 1-based; a zero
/// line means "unknown".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
    #[serde(default)]
    pub col: u32,
}

impl SourceLoc {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        SourceLoc {
            file: file.into(),
            line,
            col,
        }
    }

    /// Whether this location points at something real.
    pub fn is_valid(&self) -> bool {
        !self.file.is_empty() && self.line != 0
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// Pre-computed index of line start positions.
///
/// Constructed once per source file. Turns the 1-based (line, column) pairs
/// carried by facts back into byte offsets for diagnostics.
#[derive(Debug)]
pub struct LineIndex {
    /// Byte offset of the start of each line. The first entry is always 0.
    line_starts: Vec<u32>,
    len: u32,
}

impl LineIndex {
    /// Build a line index by scanning the source text for newline characters.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self {
            line_starts,
            len: source.len() as u32,
        }
    }

    /// Convert a 1-based (line, column) pair back to a byte offset.
    ///
    /// A column of 0 is treated as the start of the line. Returns `None`
    /// when the line does not exist; columns past the end of the line are
    /// clamped to the line's terminating newline (or the end of the source
    /// on the last line).
    pub fn offset(&self, line: u32, col: u32) -> Option<u32> {
        if line == 0 {
            return None;
        }
        let idx = line as usize - 1;
        let start = *self.line_starts.get(idx)?;
        let end = self
            .line_starts
            .get(idx + 1)
            .map_or(self.len, |next| next - 1);
        Some((start + col.saturating_sub(1)).min(end))
    }
}
