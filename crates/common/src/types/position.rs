// SnapTrace - Snippet Execution Tracer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Source coordinates.
//!
//! Two coordinate systems coexist:
//!
//! - [`SourceRange`]: byte offsets into the document, used by the AST and the
//!   rewriter.
//! - [`LinePosition`] / [`LineSpan`] / [`FilePosition`]: zero-based line and
//!   character, where the character is counted in Unicode scalar values from
//!   the start of the line. This is what clients receive.
//!
//! [`LineIndex`] converts from the first to the second.

use serde::{Deserialize, Serialize};

/// A source range is a range of bytes in a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    /// The start index of this source range.
    pub start: usize,
    /// The length of this source range.
    pub length: usize,
}

impl SourceRange {
    /// Creates a source range from a start and an exclusive end offset.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, length: end.saturating_sub(start) }
    }

    /// A zero-length range at `offset`.
    pub fn empty_at(offset: usize) -> Self {
        Self { start: offset, length: 0 }
    }

    /// The next source location (the byte index in the current source file) after this source range.
    pub fn next_loc(&self) -> usize {
        self.start + self.length
    }

    /// Returns `true` if the range covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns `true` if `offset` lies within the range. The end is exclusive,
    /// so the offset right after a closing brace is outside its block.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.next_loc()
    }

    /// Returns `true` if `other` lies entirely within this range.
    pub fn encloses(&self, other: &Self) -> bool {
        self.start <= other.start && other.next_loc() <= self.next_loc()
    }

    /// Returns `true` if the two ranges share at least one byte. A zero-length
    /// range intersects any range it touches.
    pub fn intersects(&self, other: &Self) -> bool {
        if self.is_empty() {
            return other.start <= self.start && self.start <= other.next_loc();
        }
        if other.is_empty() {
            return self.start <= other.start && other.start <= self.next_loc();
        }
        self.start < other.next_loc() && other.start < self.next_loc()
    }

    /// The smallest range covering both `self` and `other`.
    pub fn cover(&self, other: &Self) -> Self {
        Self::new(self.start.min(other.start), self.next_loc().max(other.next_loc()))
    }
}

/// A zero-based line/character position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinePosition {
    /// Zero-based line.
    pub line: usize,
    /// Zero-based character within the line.
    pub character: usize,
}

/// A span expressed in line/character positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineSpan {
    /// Position of the first character.
    pub start: LinePosition,
    /// Position just past the last character.
    pub end: LinePosition,
}

/// The position of an instrumented statement as reported to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePosition {
    /// Zero-based line.
    pub line: usize,
    /// Zero-based character within the line.
    pub character: usize,
    /// The file the position refers to.
    pub file: String,
}

/// Maps byte offsets of one document to line/character positions.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    /// Byte offset at which each line starts. Always contains at least `0`.
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    /// Builds the index for `text`. Lines are separated by `\n`; a preceding
    /// `\r` belongs to the line it terminates.
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { text, line_starts }
    }

    /// The indexed text.
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Number of lines in the document. An empty document has one line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// The zero-based line containing `offset`. Offsets past the end map to
    /// the last line.
    pub fn line_of(&self, offset: usize) -> usize {
        let offset = offset.min(self.text.len());
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        }
    }

    /// Converts a byte offset into a line/character position.
    pub fn position(&self, offset: usize) -> LinePosition {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = self.line_of(offset);
        let character = self.text[self.line_starts[line]..offset].chars().count();
        LinePosition { line, character }
    }

    /// Converts a byte range into a line span.
    pub fn span(&self, range: SourceRange) -> LineSpan {
        LineSpan { start: self.position(range.start), end: self.position(range.next_loc()) }
    }

    /// Converts a byte offset into a [`FilePosition`] within `file`.
    pub fn file_position(&self, offset: usize, file: &str) -> FilePosition {
        let LinePosition { line, character } = self.position(offset);
        FilePosition { line, character, file: file.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_positions() {
        let text = "int a = 0;\nConsole.WriteLine(a);\n";
        let index = LineIndex::new(text);

        assert_eq!(index.line_count(), 3);
        assert_eq!(index.position(0), LinePosition { line: 0, character: 0 });
        assert_eq!(index.position(4), LinePosition { line: 0, character: 4 });
        assert_eq!(index.position(11), LinePosition { line: 1, character: 0 });
        assert_eq!(index.position(text.len()), LinePosition { line: 2, character: 0 });
    }

    #[test]
    fn test_line_index_counts_characters_not_bytes() {
        let text = "var s = \"héllo\"; x = 1;";
        let index = LineIndex::new(text);
        let x = text.find("x =").unwrap();
        assert_eq!(index.position(x).character, text[..x].chars().count());
        assert_ne!(index.position(x).character, x);
    }

    #[test]
    fn test_line_index_clamps_out_of_bounds() {
        let index = LineIndex::new("a\nb");
        assert_eq!(index.position(100), LinePosition { line: 1, character: 1 });
        assert_eq!(index.line_of(100), 1);
    }

    #[test]
    fn test_source_range_intersection() {
        let stmt = SourceRange::new(10, 20);
        assert!(stmt.intersects(&SourceRange::new(0, 11)));
        assert!(stmt.intersects(&SourceRange::new(19, 30)));
        assert!(!stmt.intersects(&SourceRange::new(20, 30)));
        assert!(!stmt.intersects(&SourceRange::new(0, 10)));
        assert!(stmt.intersects(&SourceRange::empty_at(15)));
        assert!(SourceRange::empty_at(10).intersects(&stmt));
        assert!(!stmt.intersects(&SourceRange::empty_at(25)));
    }

    #[test]
    fn test_source_range_end_is_exclusive() {
        let block = SourceRange::new(10, 20);
        assert!(block.contains(10));
        assert!(block.contains(19));
        assert!(!block.contains(20));
        assert!(!SourceRange::empty_at(5).contains(5));
    }

    #[test]
    fn test_source_range_cover_and_encloses() {
        let a = SourceRange::new(4, 8);
        let b = SourceRange::new(6, 12);
        let c = a.cover(&b);
        assert_eq!(c, SourceRange::new(4, 12));
        assert!(c.encloses(&a));
        assert!(c.encloses(&b));
        assert!(!a.encloses(&b));
    }
}
