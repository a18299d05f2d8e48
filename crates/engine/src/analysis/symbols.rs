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

use snaptrace_common::{SourceRange, VariableSymbol};

/// Semantic queries the analysis needs from a front end.
///
/// Offsets are byte offsets into the analyzed document. A symbol is
/// *visible* at an offset when the offset lies in the symbol's lexical scope;
/// whether it is also declared and assigned there is decided by the
/// [`super::ScopeVisitor`].
pub trait SymbolResolver {
    /// All variables whose scope contains `offset`, innermost scope first.
    fn symbols_visible_at(&self, offset: usize) -> Vec<VariableSymbol>;

    /// The variable declared by the identifier at `range`, if any.
    fn declaration_at(&self, range: SourceRange) -> Option<VariableSymbol>;

    /// Resolves a simple name at `offset`, honouring shadowing.
    fn resolve_name(&self, name: &str, offset: usize) -> Option<VariableSymbol> {
        self.symbols_visible_at(offset).into_iter().find(|symbol| symbol.name == name)
    }
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for &R {
    fn symbols_visible_at(&self, offset: usize) -> Vec<VariableSymbol> {
        (**self).symbols_visible_at(offset)
    }

    fn declaration_at(&self, range: SourceRange) -> Option<VariableSymbol> {
        (**self).declaration_at(range)
    }

    fn resolve_name(&self, name: &str, offset: usize) -> Option<VariableSymbol> {
        (**self).resolve_name(name, offset)
    }
}
