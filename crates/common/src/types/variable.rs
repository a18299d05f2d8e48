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

//! Variable identities and occurrences.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::{LineIndex, LineSpan, SourceRange};

/// Represents the kind/category of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// Local variable, including loop, pattern, `out` and catch variables
    Local,
    /// Method parameter
    Parameter,
    /// Field of the enclosing type
    Field,
}

impl Display for VariableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Parameter => write!(f, "parameter"),
            Self::Field => write!(f, "field"),
        }
    }
}

/// Identifies a variable independently of any one use-site.
///
/// Two symbols are the same variable iff their declarations coincide, which is
/// why the declaration range leads the derived ordering: symbols sort in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSymbol {
    /// Byte range of the declaring identifier.
    pub declaration: SourceRange,
    /// The name of the variable.
    pub name: String,
    /// The kind of variable.
    pub kind: VariableKind,
    /// Whether the variable is a static field. Always `false` for locals and parameters.
    pub is_static: bool,
}

impl VariableSymbol {
    /// Creates a local variable symbol.
    pub fn local(name: impl Into<String>, declaration: SourceRange) -> Self {
        Self { declaration, name: name.into(), kind: VariableKind::Local, is_static: false }
    }

    /// Creates a parameter symbol.
    pub fn parameter(name: impl Into<String>, declaration: SourceRange) -> Self {
        Self { declaration, name: name.into(), kind: VariableKind::Parameter, is_static: false }
    }

    /// Creates a field symbol.
    pub fn field(name: impl Into<String>, declaration: SourceRange, is_static: bool) -> Self {
        Self { declaration, name: name.into(), kind: VariableKind::Field, is_static }
    }

    /// The static, JSON-serializable description of this variable.
    pub fn descriptor(&self, index: &LineIndex<'_>) -> VariableDescriptor {
        VariableDescriptor {
            name: self.name.clone(),
            kind: self.kind,
            declared_at: index.span(self.declaration),
        }
    }
}

/// Static description of a variable, computed at instrumentation time and
/// carried verbatim through the instrumented program.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDescriptor {
    /// The name of the variable.
    pub name: String,
    /// The kind of variable.
    pub kind: VariableKind,
    /// Where the variable is declared.
    pub declared_at: LineSpan,
}

/// One occurrence of a variable in the document.
///
/// The derived ordering is document order: start line, then start column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableLocation {
    /// Zero-based line of the first character.
    pub start_line: usize,
    /// Zero-based column of the first character.
    pub start_column: usize,
    /// Zero-based line just past the occurrence.
    pub end_line: usize,
    /// Zero-based column just past the occurrence.
    pub end_column: usize,
    /// The variable this occurrence refers to.
    pub variable: VariableDescriptor,
}

impl VariableLocation {
    /// Builds the location of an occurrence of `symbol` at `range`.
    pub fn new(symbol: &VariableSymbol, range: SourceRange, index: &LineIndex<'_>) -> Self {
        let span = index.span(range);
        Self {
            start_line: span.start.line,
            start_column: span.start.character,
            end_line: span.end.line,
            end_column: span.end.character,
            variable: symbol.descriptor(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_sort_in_declaration_order() {
        let b = VariableSymbol::local("b", SourceRange::new(20, 21));
        let a = VariableSymbol::local("a", SourceRange::new(4, 5));
        let mut symbols = vec![b.clone(), a.clone()];
        symbols.sort();
        assert_eq!(symbols, vec![a, b]);
    }

    #[test]
    fn test_variable_location_serializes_camel_case() {
        let text = "int a = 0;\na = 1;";
        let index = LineIndex::new(text);
        let a = VariableSymbol::local("a", SourceRange::new(4, 5));
        let location = VariableLocation::new(&a, SourceRange::new(11, 12), &index);

        assert_eq!(location.start_line, 1);
        assert_eq!(location.start_column, 0);
        assert_eq!(location.end_column, 1);

        let json = serde_json::to_value(&location).unwrap();
        assert_eq!(json["startLine"], 1);
        assert_eq!(json["variable"]["name"], "a");
        assert_eq!(json["variable"]["kind"], "local");
        assert_eq!(json["variable"]["declaredAt"]["start"]["character"], 4);
    }
}
