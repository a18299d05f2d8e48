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

use std::{collections::BTreeMap, fmt::Display};

use tracing::trace;

use super::Anchor;
use crate::{
    analysis::AugmentationMap,
    ast::{Program, StmtKind},
};

/// Base priority of material closing a statement. Anything closing sorts
/// before anything opening at the same offset.
const CLOSING_PRIORITY: u32 = 1 << 16;
/// Base priority of braces opening a wrapped embedded statement.
const OPENING_PRIORITY: u32 = CLOSING_PRIORITY - 1;

/// The collection of textual insertions into one source file.
///
/// Insertions never contain line breaks, so every original statement keeps
/// its line in the instrumented text.
#[derive(Debug, Default)]
pub struct SourceModifications {
    /// Insertions keyed by byte offset into the original text, each list
    /// ordered by descending priority.
    modifications: BTreeMap<usize, Vec<InstrumentAction>>,
}

impl SourceModifications {
    /// An empty set of insertions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an insertion. Among insertions at the same offset, higher
    /// priority is placed first; equal priorities keep insertion order.
    pub fn add_modification(&mut self, action: InstrumentAction) {
        let actions = self.modifications.entry(action.loc).or_default();
        let pos = actions.partition_point(|existing| existing.priority >= action.priority);
        actions.insert(pos, action);
    }

    /// Adds every action of `actions`, see [`Self::add_modification`].
    pub fn extend_modifications(&mut self, actions: impl IntoIterator<Item = InstrumentAction>) {
        for action in actions {
            self.add_modification(action);
        }
    }

    /// Number of insertions.
    pub fn len(&self) -> usize {
        self.modifications.values().map(Vec::len).sum()
    }

    /// Whether there is nothing to insert.
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    /// Collects the insertions that materialize `anchors` of a rewritten
    /// program: the emission after each anchor and, for embedded anchors, a
    /// pair of braces around anchor and emission.
    pub fn collect_modifications(
        &mut self,
        rewritten: &Program,
        anchors: &[Anchor],
        augmentations: &AugmentationMap,
    ) {
        for anchor in anchors {
            let Some(augmentation) = augmentations.get(&anchor.anchor) else { continue };
            let StmtKind::Expr(call) = &rewritten.stmt(anchor.emission).kind else { continue };
            let depth = augmentation.depth as u32;
            let embedded = augmentation.is_embedded();

            let closing = if embedded { format!(" {call}; }}") } else { format!(" {call};") };
            self.add_modification(InstrumentAction {
                loc: augmentation.src.next_loc(),
                content: InstrumentContent::Emission(closing),
                priority: CLOSING_PRIORITY + depth,
            });
            if embedded {
                self.add_modification(InstrumentAction {
                    loc: augmentation.src.start,
                    content: InstrumentContent::OpenBrace,
                    priority: OPENING_PRIORITY - depth,
                });
            }
        }
        trace!(insertions = self.len(), "collected source modifications");
    }

    /// Applies every insertion to `source`.
    pub fn modify_source(&self, source: &str) -> String {
        let mut modified_source = source.to_string();
        // back to front, so earlier offsets stay valid
        for (loc, actions) in self.modifications.iter().rev() {
            let content: String = actions.iter().map(|action| action.content.to_string()).collect();
            modified_source.insert_str(*loc, &content);
        }
        modified_source
    }
}

/// One insertion into the source file.
#[derive(Debug, Clone)]
pub struct InstrumentAction {
    /// Byte offset in the original text at which `content` is inserted.
    pub loc: usize,
    /// The inserted text.
    pub content: InstrumentContent,
    /// Ordering among insertions at the same offset, higher first.
    pub priority: u32,
}

/// Text inserted by an [`InstrumentAction`].
#[derive(Debug, Clone)]
pub enum InstrumentContent {
    /// `{ ` before a wrapped embedded statement.
    OpenBrace,
    /// The rendered emission statement, possibly followed by a closing brace.
    Emission(String),
}

impl Display for InstrumentContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenBrace => f.write_str("{ "),
            Self::Emission(content) => f.write_str(content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(loc: usize, content: &str, priority: u32) -> InstrumentAction {
        InstrumentAction { loc, content: InstrumentContent::Emission(content.into()), priority }
    }

    #[test]
    fn test_same_offset_ordering() {
        let mut modifications = SourceModifications::new();
        modifications.extend_modifications([
            action(3, "[outer]", CLOSING_PRIORITY),
            action(3, "[inner]", CLOSING_PRIORITY + 1),
            action(3, "[open]", OPENING_PRIORITY),
            action(0, "<", OPENING_PRIORITY),
        ]);
        assert_eq!(modifications.len(), 4);
        assert_eq!(modifications.modify_source("abc;d"), "<abc[inner][outer][open];d");
    }

    fn instrument_text(source: &str) -> (String, Vec<String>) {
        use snaptrace_common::LineIndex;

        use crate::{
            analysis::analyze,
            frontend::{parse, LexicalResolver},
            instrumentation::{ArgumentBuilder, AstRewriter},
            InstrumentationConfig,
        };

        let program = parse("main.cs", source).unwrap();
        let resolver = LexicalResolver::new(&program);
        let (augmentations, _) = analyze(&program, &resolver, None);
        let index = LineIndex::new(source);
        let config = InstrumentationConfig::default();
        let output = AstRewriter::new(ArgumentBuilder::new(&config, &index))
            .rewrite(&program, &augmentations)
            .unwrap();

        let mut modifications = SourceModifications::new();
        modifications.collect_modifications(&output.program, &output.anchors, &augmentations);
        let calls = output
            .anchors
            .iter()
            .map(|anchor| match &output.program.stmt(anchor.emission).kind {
                StmtKind::Expr(call) => call.to_string(),
                other => panic!("unexpected emission {other:?}"),
            })
            .collect();
        (modifications.modify_source(source), calls)
    }

    #[test]
    fn test_nested_embedded_statements() {
        let source = "bool a = true;\nif (a) if (a) a = false;";
        let (instrumented, calls) = instrument_text(source);
        let [c0, c1, c2, c3] = calls.as_slice() else { panic!("expected four emissions") };
        assert_eq!(
            instrumented,
            format!("bool a = true; {c0};\nif (a) {{ if (a) {{ a = false; {c3}; }} {c2}; }} {c1};")
        );
    }

    #[test]
    fn test_line_numbers_are_preserved() {
        let source = "int total = 0;\nfor (int i = 0; i < 3; i++)\n    total += i;\n\nConsole.WriteLine(total);\n";
        let (instrumented, calls) = instrument_text(source);
        assert_eq!(calls.len(), 4);
        assert_eq!(instrumented.lines().count(), source.lines().count());
        for (original, modified) in source.lines().zip(instrumented.lines()) {
            assert!(modified.starts_with(original.trim_end()) || modified.contains(original.trim()));
        }
    }
}
