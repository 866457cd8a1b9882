//! Positions, source maps, and the per-branch message log

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A 1-based line and 0-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }

    /// Start of file.
    pub fn start() -> Self {
        Position { line: 1, column: 0 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Maps byte offsets in one source file to line/column positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMap {
    file: String,
    line_starts: Vec<usize>,
}

impl SourceMap {
    /// Build a map for `source`, remembering the offset of every line start.
    pub fn new(file: impl Into<String>, source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        SourceMap {
            file: file.into(),
            line_starts,
        }
    }

    /// A map for a unit with no source text (everything is `1:0`).
    pub fn empty(file: impl Into<String>) -> Self {
        SourceMap {
            file: file.into(),
            line_starts: vec![0],
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Position of a byte offset. Offsets past the end land on the last line.
    pub fn position(&self, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Position {
            line: line as u32 + 1,
            column: (offset - self.line_starts[line]) as u32,
        }
    }
}

/// Message severity, ordered by weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Information,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Information => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One diagnostic produced by a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub file: Arc<str>,
    pub pos: Position,
    pub severity: Severity,
    pub text: String,
    /// Whether the message has been surfaced to the driver already.
    pub reported: bool,
}

impl Message {
    pub fn new(
        file: impl Into<Arc<str>>,
        pos: Position,
        severity: Severity,
        text: impl Into<String>,
    ) -> Self {
        Message {
            file: file.into(),
            pos,
            severity,
            text: text.into(),
            reported: false,
        }
    }

    /// A message with no useful source location.
    pub fn plain(severity: Severity, text: impl Into<String>) -> Self {
        Message::new("<session>", Position::start(), severity, text)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.file, self.pos, self.severity, self.text
        )
    }
}

/// Insertion-ordered log of one branch's messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        MessageLog::default()
    }

    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Error)
    }

    pub fn mark_all_reported(&mut self) {
        for m in &mut self.messages {
            m.reported = true;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Move the messages out, leaving the log empty.
    pub fn take(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_map_positions() {
        let map = SourceMap::new("demo.qll", "ab\ncd\n\nefg");
        assert_eq!(map.position(0), Position::new(1, 0));
        assert_eq!(map.position(1), Position::new(1, 1));
        assert_eq!(map.position(3), Position::new(2, 0));
        assert_eq!(map.position(6), Position::new(3, 0));
        assert_eq!(map.position(8), Position::new(4, 1));
    }

    #[test]
    fn test_message_display() {
        let msg = Message::new(
            "demo.qll",
            Position::new(3, 7),
            Severity::Error,
            "unknown identifier",
        );
        assert_eq!(msg.to_string(), "demo.qll:3:7: error: unknown identifier");
    }

    #[test]
    fn test_log_has_errors_and_order() {
        let mut log = MessageLog::new();
        log.add(Message::plain(Severity::Warning, "first"));
        assert!(!log.has_errors());
        log.add(Message::plain(Severity::Error, "second"));
        assert!(log.has_errors());

        let texts: Vec<_> = log.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_mark_all_reported() {
        let mut log = MessageLog::new();
        log.add(Message::plain(Severity::Information, "hello"));
        assert!(!log.iter().next().unwrap().reported);
        log.mark_all_reported();
        assert!(log.iter().all(|m| m.reported));
    }
}
