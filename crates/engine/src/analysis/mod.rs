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

//! Scope analysis.
//!
//! [`analyze`] walks a [`Program`] once and computes, for every instrumented
//! statement, the variables that can be observed right before it executes
//! (an [`Augmentation`]), and, for every variable, where it occurs in the
//! document. The analysis is driven by a [`SymbolResolver`] supplied by the
//! front end; it never looks at types.

mod flow;
pub use flow::*;

mod symbols;
pub use symbols::*;

mod visitor;
pub use visitor::*;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use snaptrace_common::{
    FilePosition, ProgramDescriptor, SourceRange, VariableLocation, VariableSymbol,
};

use crate::ast::{Program, StmtId};

/// Where a statement sits relative to its parent, which decides how code can
/// be inserted after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// A top-level statement.
    TopLevel,
    /// The body block of a method.
    MethodBody,
    /// An element of the given block.
    InBlock(StmtId),
    /// The embedded statement of the given `if`, loop or `try`.
    Embedded(StmtId),
}

/// The variables observable right before one statement executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Augmentation {
    /// The instrumented statement.
    pub stmt: StmtId,
    /// Source range of the statement.
    pub src: SourceRange,
    /// Start of the statement, in document coordinates.
    pub file_position: FilePosition,
    /// Locals declared before the statement and definitely assigned.
    pub locals: BTreeSet<VariableSymbol>,
    /// Parameters of the enclosing method.
    pub parameters: BTreeSet<VariableSymbol>,
    /// Fields accessible from the enclosing body and not shadowed.
    pub fields: BTreeSet<VariableSymbol>,
    /// How the statement is nested in its parent.
    pub placement: Placement,
    /// Number of statements enclosing this one within its body.
    pub depth: usize,
}

impl Augmentation {
    /// Locals, then parameters, then fields, each in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = &VariableSymbol> {
        self.locals.iter().chain(&self.parameters).chain(&self.fields)
    }

    /// Whether the statement sits in an embedded-statement slot and must be
    /// wrapped in a block before anything can follow it.
    pub fn is_embedded(&self) -> bool {
        matches!(self.placement, Placement::Embedded(_))
    }
}

/// Augmentations keyed by statement; iteration is in document order.
pub type AugmentationMap = BTreeMap<StmtId, Augmentation>;

/// Every occurrence of every variable, keyed by variable.
pub type VariableLocationMap = BTreeMap<VariableSymbol, BTreeSet<VariableLocation>>;

/// Runs the scope analysis over `program`.
///
/// With `regions`, only statements intersecting one of the regions are
/// augmented; variable occurrences are always collected for the whole
/// document.
pub fn analyze<R: SymbolResolver + ?Sized>(
    program: &Program,
    resolver: &R,
    regions: Option<&[SourceRange]>,
) -> (AugmentationMap, VariableLocationMap) {
    ScopeVisitor::new(program, resolver, regions).run()
}

/// Flattens the occurrence map into the descriptor emitted ahead of every
/// trace: variables in declaration order, occurrences in document order.
pub fn program_descriptor(locations: &VariableLocationMap) -> ProgramDescriptor {
    ProgramDescriptor { variable_locations: locations.values().flatten().cloned().collect() }
}

#[cfg(test)]
mod tests {
    use snaptrace_common::VariableKind;

    use super::*;
    use crate::frontend::{parse, LexicalResolver};

    fn analyze_source(
        source: &str,
        regions: Option<&[SourceRange]>,
    ) -> (Program, AugmentationMap, VariableLocationMap) {
        let program = parse("main.cs", source).unwrap();
        let resolver = LexicalResolver::new(&program);
        let (augmentations, locations) = analyze(&program, &resolver, regions);
        (program, augmentations, locations)
    }

    /// Names of the locals recorded for the statement starting with `prefix`.
    fn locals_at(source: &str, augmentations: &AugmentationMap, prefix: &str) -> Vec<String> {
        let offset = source.find(prefix).unwrap();
        let augmentation = augmentations
            .values()
            .find(|a| a.src.start == offset)
            .unwrap_or_else(|| panic!("no augmentation for `{prefix}`"));
        augmentation.locals.iter().map(|s| s.name.clone()).collect()
    }

    #[test]
    fn test_locals_need_declaration_and_assignment() {
        let source = "int a = 0;\nint b;\nUse(a);\nb = a;\nUse(b);";
        let (_, augmentations, _) = analyze_source(source, None);

        assert_eq!(augmentations.len(), 5);
        assert!(locals_at(source, &augmentations, "int a").is_empty());
        assert_eq!(locals_at(source, &augmentations, "int b"), vec!["a"]);
        assert_eq!(locals_at(source, &augmentations, "Use(a)"), vec!["a"]);
        assert_eq!(locals_at(source, &augmentations, "Use(b)"), vec!["a", "b"]);
    }

    #[test]
    fn test_branches_join() {
        let source = r#"
int x;
int y;
if (flag) { x = 1; y = 1; } else { x = 2; }
Use(x);
if (flag) { y = 3; } else { return; }
Done();
"#;
        let (_, augmentations, _) = analyze_source(source, None);
        assert_eq!(locals_at(source, &augmentations, "Use(x)"), vec!["x"]);
        assert_eq!(locals_at(source, &augmentations, "Done"), vec!["x", "y"]);
    }

    #[test]
    fn test_loops() {
        let source = r#"
int total = 0;
for (int i = 0; i < 3; i++) { total += i; }
int found;
while (true) { found = 1; break; }
Use(found);
int seen;
do { seen = 1; } while (seen < 0);
Use(seen);
"#;
        let (program, augmentations, locations) = analyze_source(source, None);
        assert_eq!(locals_at(source, &augmentations, "total +="), vec!["total", "i"]);
        assert_eq!(locals_at(source, &augmentations, "int found"), vec!["total"]);
        assert_eq!(locals_at(source, &augmentations, "Use(found)"), vec!["total", "found"]);
        assert_eq!(locals_at(source, &augmentations, "Use(seen)"), vec!["total", "found", "seen"]);

        // jumps are never instrumented
        let breaks = program
            .reachable()
            .into_iter()
            .filter(|id| matches!(program.stmt(*id).kind, crate::ast::StmtKind::Break))
            .count();
        assert_eq!(breaks, 1);
        assert!(augmentations.values().all(|a| !program.stmt(a.stmt).is_jump()));

        let i = locations.keys().find(|s| s.name == "i").unwrap();
        // declaration, condition, increment and body
        assert_eq!(locations[i].len(), 4);
    }

    #[test]
    fn test_patterns_and_out_arguments() {
        let source = r#"
if (o is string s) { Use(s); }
if (!int.TryParse(text, out var n)) { return; }
Use(n);
"#;
        let (_, augmentations, _) = analyze_source(source, None);
        assert_eq!(locals_at(source, &augmentations, "Use(s)"), vec!["s"]);
        // `s` stays in scope but is not definitely assigned after the `if`
        assert_eq!(locals_at(source, &augmentations, "Use(n)"), vec!["n"]);
    }

    #[test]
    fn test_try_catch_finally() {
        let source = r#"
int a;
int b;
try { a = 1; } catch (Exception e) { Log(e); a = 2; } finally { b = 3; }
Use(a);
"#;
        let (_, augmentations, _) = analyze_source(source, None);
        assert_eq!(locals_at(source, &augmentations, "Log(e)"), vec!["e"]);
        assert_eq!(locals_at(source, &augmentations, "Use(a)"), vec!["a", "b"]);
    }

    #[test]
    fn test_fields_parameters_and_static_context() {
        let source = r#"
class Counter
{
    static int total;
    int count;

    void Add(int count)
    {
        this.count += count;
    }

    static void Reset()
    {
        total = 0;
    }
}
"#;
        let (_, augmentations, locations) = analyze_source(source, None);
        let add = augmentations
            .values()
            .find(|a| a.src.start == source.find("this.count").unwrap())
            .unwrap();
        assert_eq!(add.parameters.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), ["count"]);
        assert_eq!(add.fields.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), ["total"]);

        let reset = augmentations
            .values()
            .find(|a| a.src.start == source.find("total = 0").unwrap())
            .unwrap();
        assert!(reset.parameters.is_empty());
        assert_eq!(reset.fields.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), ["total"]);

        let field = locations
            .keys()
            .find(|s| s.name == "count" && s.kind == VariableKind::Field)
            .unwrap();
        // declaration and `this.count`
        assert_eq!(locations[field].len(), 2);
    }

    #[test]
    fn test_regions_restrict_augmentations_only() {
        let source = "int a = 0;\nint b = a;\nUse(b);";
        let second = source.find("int b").unwrap();
        let regions = [SourceRange::empty_at(second + 2), SourceRange::new(0, source.len() + 10)];
        let (_, augmentations, locations) = analyze_source(source, Some(&regions[..]));

        assert_eq!(augmentations.len(), 1);
        assert_eq!(augmentations.values().next().unwrap().src.start, second);
        // occurrences are collected outside the regions too
        assert_eq!(locations.len(), 2);

        let (_, augmentations, _) = analyze_source(source, Some(&[][..]));
        assert!(augmentations.is_empty());
    }

    #[test]
    fn test_descriptor_groups_by_variable() {
        let source = "int a = 0;\nint b = a;\nUse(a);";
        let (_, _, locations) = analyze_source(source, None);
        let descriptor = program_descriptor(&locations);
        let names: Vec<_> =
            descriptor.variable_locations.iter().map(|l| l.variable.name.as_str()).collect();
        assert_eq!(names, ["a", "a", "a", "b"]);
    }
}
