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

use snaptrace_common::LineIndex;
use tracing::{debug, error};

use super::{emitted_names, Anchor, InstrumentationError};
use crate::{
    analysis::{AugmentationMap, SymbolResolver},
    ast::{Program, StmtKind},
};

/// Re-resolves the identifiers of every emission call.
///
/// Each name is looked up at the last byte of its anchor statement, right
/// before the emission runs. It must denote exactly the symbol the analysis put in
/// the augmentation, otherwise the instrumented program would either fail to
/// compile or report the wrong variable.
pub struct ReferenceValidator<'a, R: SymbolResolver + ?Sized> {
    resolver: &'a R,
    index: &'a LineIndex<'a>,
}

impl<'a, R: SymbolResolver + ?Sized> ReferenceValidator<'a, R> {
    /// A validator resolving names with `resolver`.
    pub fn new(resolver: &'a R, index: &'a LineIndex<'a>) -> Self {
        Self { resolver, index }
    }

    /// Checks every emission of `rewritten`. Fails on the first name that
    /// resolves to anything but its captured variable.
    pub fn validate(
        &self,
        rewritten: &Program,
        anchors: &[Anchor],
        augmentations: &AugmentationMap,
    ) -> Result<(), InstrumentationError> {
        let mut checked = 0;
        for anchor in anchors {
            let Some(augmentation) = augmentations.get(&anchor.anchor) else {
                return Err(InstrumentationError::Rewrite { stmt: anchor.anchor });
            };
            let StmtKind::Expr(call) = &rewritten.stmt(anchor.emission).kind else {
                return Err(InstrumentationError::Rewrite { stmt: anchor.emission });
            };

            let names = emitted_names(call);
            if names.len() != augmentation.variables().count() {
                return Err(InstrumentationError::Rewrite { stmt: anchor.anchor });
            }

            // last byte of the statement: still inside an embedded scope
            let at = augmentation.src.next_loc().saturating_sub(1);
            for (ident, expected) in names.into_iter().zip(augmentation.variables()) {
                let resolved = self.resolver.resolve_name(&ident.name, at);
                if resolved.as_ref() != Some(expected) {
                    let position = self.index.position(augmentation.src.start);
                    error!(
                        name = %ident.name,
                        line = position.line,
                        character = position.character,
                        ?resolved,
                        "synthesized reference does not resolve to the captured variable"
                    );
                    return Err(InstrumentationError::UnresolvedReference {
                        name: ident.name.clone(),
                        line: position.line,
                        character: position.character,
                    });
                }
                checked += 1;
            }
        }
        debug!(references = checked, "validated synthesized references");
        Ok(())
    }
}
