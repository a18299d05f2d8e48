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

use snaptrace_common::SourceRange;
use tracing::debug;

use super::{ArgumentBuilder, InstrumentationError};
use crate::{
    analysis::{AugmentationMap, Placement},
    ast::{Item, Program, Stmt, StmtId, StmtKind},
};

/// An instrumented statement and the emission statement inserted after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    /// The original statement.
    pub anchor: StmtId,
    /// The synthesized `Expr` statement holding the emission call.
    pub emission: StmtId,
}

/// The rewritten program and where emissions were inserted.
#[derive(Debug, Clone)]
pub struct RewriteOutput {
    /// The program with emission statements spliced in.
    pub program: Program,
    /// In document order of the anchors.
    pub anchors: Vec<Anchor>,
}

/// Splices an emission statement after every augmented statement.
///
/// The input program is left untouched. Original statements keep their ids;
/// synthesized statements are appended to the arena and carry zero-length
/// source ranges at the end of their anchor.
pub struct AstRewriter<'a> {
    builder: ArgumentBuilder<'a>,
}

impl<'a> AstRewriter<'a> {
    /// A rewriter building its calls with `builder`.
    pub fn new(builder: ArgumentBuilder<'a>) -> Self {
        Self { builder }
    }

    /// Returns a copy of `program` with one emission per augmentation.
    /// Embedded statements are wrapped in a block together with their
    /// emission.
    pub fn rewrite(
        &self,
        program: &Program,
        augmentations: &AugmentationMap,
    ) -> Result<RewriteOutput, InstrumentationError> {
        let mut rewritten = program.clone();
        let mut anchors = Vec::with_capacity(augmentations.len());

        for augmentation in augmentations.values() {
            let anchor = augmentation.stmt;
            let at = augmentation.src.next_loc();
            let call = self.builder.emission_call(augmentation, at)?;
            let emission =
                rewritten.alloc(Stmt { src: SourceRange::empty_at(at), kind: StmtKind::Expr(call) });

            let inserted = match augmentation.placement {
                Placement::TopLevel => {
                    match rewritten.items.iter().position(|item| *item == Item::TopLevel(anchor)) {
                        Some(pos) => {
                            rewritten.items.insert(pos + 1, Item::TopLevel(emission));
                            true
                        }
                        None => false,
                    }
                }
                Placement::InBlock(block) => match &mut rewritten.stmt_mut(block).kind {
                    StmtKind::Block(stmts) => match stmts.iter().position(|id| *id == anchor) {
                        Some(pos) => {
                            stmts.insert(pos + 1, emission);
                            true
                        }
                        None => false,
                    },
                    _ => false,
                },
                Placement::Embedded(parent) => {
                    let wrapper = rewritten.alloc(Stmt {
                        src: augmentation.src,
                        kind: StmtKind::Block(vec![anchor, emission]),
                    });
                    rewritten.stmt_mut(parent).replace_embedded(anchor, wrapper)
                }
                Placement::MethodBody => false,
            };
            if !inserted {
                return Err(InstrumentationError::Rewrite { stmt: anchor });
            }
            anchors.push(Anchor { anchor, emission });
        }

        debug!(
            file = %program.file,
            emissions = anchors.len(),
            statements = rewritten.statement_count(),
            "rewrote program"
        );
        Ok(RewriteOutput { program: rewritten, anchors })
    }
}

#[cfg(test)]
mod tests {
    use snaptrace_common::LineIndex;

    use super::*;
    use crate::{
        analysis::analyze,
        frontend::{parse, LexicalResolver},
        InstrumentationConfig,
    };

    fn rewrite_source(source: &str) -> (Program, RewriteOutput, usize) {
        let program = parse("main.cs", source).unwrap();
        let resolver = LexicalResolver::new(&program);
        let (augmentations, _) = analyze(&program, &resolver, None);
        let index = LineIndex::new(source);
        let config = InstrumentationConfig::default();
        let rewriter = AstRewriter::new(ArgumentBuilder::new(&config, &index));
        let output = rewriter.rewrite(&program, &augmentations).unwrap();
        (program, output, augmentations.len())
    }

    #[test]
    fn test_each_augmentation_adds_one_statement() {
        let source = r#"
int a = 0;
if (a > 0) a++; else { a--; }
for (int i = 0; i < 2; i++) Use(i);
return;
"#;
        let (program, output, count) = rewrite_source(source);
        assert_eq!(count, 6);
        assert_eq!(output.anchors.len(), count);
        assert_eq!(output.program.statement_count(), program.statement_count() + count);

        // statements keep their ranges; only blocks and embedded slots gain children
        for id in program.reachable() {
            let before = program.stmt(id);
            let after = output.program.stmt(id);
            assert_eq!(before.src, after.src);
            if !before.is_block() && before.embedded_children().is_empty() {
                assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn test_embedded_statements_are_wrapped() {
        let source = "while (x) x--;";
        let (program, output, _) = rewrite_source(source);
        let root = program.top_level().next().unwrap();
        let StmtKind::While { body, .. } = &output.program.stmt(root).kind else {
            panic!("expected while")
        };
        let StmtKind::Block(stmts) = &output.program.stmt(*body).kind else {
            panic!("expected wrapper block")
        };
        assert_eq!(stmts.len(), 2);
        assert_eq!(output.program.stmt(*body).src, program.stmt(stmts[0]).src);
        assert!(output.program.stmt(stmts[1]).src.is_empty());
    }

    #[test]
    fn test_nothing_to_rewrite() {
        let program = parse("main.cs", "int a = 0;").unwrap();
        let index = LineIndex::new(&program.source);
        let config = InstrumentationConfig::default();
        let rewriter = AstRewriter::new(ArgumentBuilder::new(&config, &index));
        let output = rewriter.rewrite(&program, &AugmentationMap::new()).unwrap();
        assert_eq!(output.program, program);
        assert!(output.anchors.is_empty());
    }
}
