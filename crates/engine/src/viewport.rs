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

//! Viewport-relative coordinates.
//!
//! A client may show only part of a document, e.g. the body of a
//! `#region`. Positions reported to such a client are relative to the first
//! displayed line. Only line numbers are remapped; byte ranges and columns
//! keep their document values.

use std::collections::BTreeSet;

use snaptrace_common::{LineIndex, LineSpan, SourceRange, VariableLocation};
use tracing::debug;

use crate::analysis::{AugmentationMap, VariableLocationMap};

/// The displayed part of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Byte range of the displayed text.
    pub range: SourceRange,
}

impl Viewport {
    /// A viewport showing `range`.
    pub fn new(range: SourceRange) -> Self {
        Self { range }
    }

    /// The lines strictly between `#region name` and its `#endregion`.
    ///
    /// Nested regions are skipped when looking for the end marker. Returns
    /// `None` if the region is missing, unterminated or has no lines.
    pub fn from_region_name(text: &str, name: &str) -> Option<Self> {
        let mut lines = text.split_inclusive('\n').scan(0, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some((start, line))
        });

        lines.by_ref().find(|(_, line)| {
            line.trim()
                .strip_prefix("#region")
                .is_some_and(|rest| rest.starts_with(char::is_whitespace) && rest.trim() == name)
        })?;

        let mut depth = 0usize;
        let mut body: Option<SourceRange> = None;
        for (start, line) in lines {
            let trimmed = line.trim();
            if trimmed.starts_with("#endregion") {
                if depth == 0 {
                    return body.map(Self::new);
                }
                depth -= 1;
            } else if trimmed.starts_with("#region") {
                depth += 1;
            }
            let content = line.trim_end_matches(['\n', '\r']);
            let range = SourceRange::new(start, start + content.len());
            body = Some(body.map_or(range, |body| body.cover(&range)));
        }
        None
    }

    /// First and last displayed line.
    pub fn lines(&self, index: &LineIndex<'_>) -> (usize, usize) {
        let first = index.line_of(self.range.start);
        let last = index.line_of(self.range.next_loc().saturating_sub(1).max(self.range.start));
        (first, last)
    }
}

/// Maps document positions into positions relative to `viewport`.
///
/// Without a viewport the inputs are returned unchanged. Otherwise entries on
/// lines outside the viewport are dropped, the remaining lines are shifted so
/// that the first displayed line becomes line 0, and variables without any
/// remaining occurrence are dropped.
pub fn map_relative_to_viewport(
    augmentations: AugmentationMap,
    locations: VariableLocationMap,
    text: &str,
    viewport: Option<&Viewport>,
) -> (AugmentationMap, VariableLocationMap) {
    let Some(viewport) = viewport else {
        return (augmentations, locations);
    };
    let index = LineIndex::new(text);
    let (first, last) = viewport.lines(&index);
    let visible = |line: usize| (first..=last).contains(&line);

    let augmentations: AugmentationMap = augmentations
        .into_iter()
        .filter(|(_, augmentation)| visible(augmentation.file_position.line))
        .map(|(id, mut augmentation)| {
            augmentation.file_position.line -= first;
            (id, augmentation)
        })
        .collect();

    let locations: VariableLocationMap = locations
        .into_iter()
        .filter_map(|(symbol, occurrences)| {
            let occurrences: BTreeSet<VariableLocation> = occurrences
                .into_iter()
                .filter(|location| visible(location.start_line))
                .map(|location| shift_location(location, first))
                .collect();
            (!occurrences.is_empty()).then_some((symbol, occurrences))
        })
        .collect();

    debug!(
        first,
        last,
        augmentations = augmentations.len(),
        variables = locations.len(),
        "mapped to viewport"
    );
    (augmentations, locations)
}

fn shift_location(mut location: VariableLocation, first: usize) -> VariableLocation {
    location.start_line -= first;
    location.end_line = location.end_line.saturating_sub(first);
    location.variable.declared_at = shift_span(location.variable.declared_at, first);
    location
}

/// Declarations above the viewport clamp to line 0.
fn shift_span(mut span: LineSpan, first: usize) -> LineSpan {
    span.start.line = span.start.line.saturating_sub(first);
    span.end.line = span.end.line.saturating_sub(first);
    span
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::analyze,
        frontend::{parse, LexicalResolver},
    };

    const SOURCE: &str = "int a = 1;\n#region body\nint b = a;\na = b + a;\n#endregion\nUse(a);\n";

    #[test]
    fn test_region_viewport() {
        let viewport = Viewport::from_region_name(SOURCE, "body").unwrap();
        let body = &SOURCE[viewport.range.start..viewport.range.next_loc()];
        assert_eq!(body, "int b = a;\na = b + a;");
        assert_eq!(viewport.lines(&LineIndex::new(SOURCE)), (2, 3));

        assert!(Viewport::from_region_name(SOURCE, "missing").is_none());
        assert!(Viewport::from_region_name("#region empty\n#endregion\n", "empty").is_none());
    }

    #[test]
    fn test_nested_region_is_part_of_the_body() {
        let text = "#region outer\nx();\n#region inner\ny();\n#endregion\n#endregion\n";
        let outer = Viewport::from_region_name(text, "outer").unwrap();
        assert_eq!(outer.lines(&LineIndex::new(text)), (1, 4));
        let inner = Viewport::from_region_name(text, "inner").unwrap();
        assert_eq!(inner.lines(&LineIndex::new(text)), (3, 3));
    }

    #[test]
    fn test_mapping_keeps_boundary_lines() {
        let program = parse("main.cs", SOURCE).unwrap();
        let resolver = LexicalResolver::new(&program);
        let (augmentations, locations) = analyze(&program, &resolver, None);
        let viewport = Viewport::from_region_name(SOURCE, "body").unwrap();

        let (augmentations, locations) =
            map_relative_to_viewport(augmentations, locations, SOURCE, Some(&viewport));

        let lines: Vec<_> = augmentations.values().map(|a| a.file_position.line).collect();
        assert_eq!(lines, [0, 1]);

        let a = locations.iter().find(|(symbol, _)| symbol.name == "a").unwrap().1;
        let a: Vec<_> = a.iter().map(|l| (l.start_line, l.start_column)).collect();
        // `a` on the first line, then twice on the last line in column order
        assert_eq!(a, [(0, 8), (1, 0), (1, 8)]);
        assert!(locations.values().flatten().all(|l| l.variable.declared_at.start.line <= 1));
    }
}
