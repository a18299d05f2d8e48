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

//! Construction of emission calls.
//!
//! An emission call reads
//!
//! ```text
//! Emitter.EmitProgramState("<file position json>", ("<variable json>", name), ...)
//! ```
//!
//! The JSON fragments are computed at instrumentation time and embedded as
//! string literals; only the values are read at run time.

use serde_json::Error;
use snaptrace_common::{FilePosition, LineIndex, VariableSymbol};

use crate::{
    analysis::Augmentation,
    ast::{Argument, Expr, ExprKind, Ident, Literal},
    InstrumentationConfig,
};

/// Builds the emission call for one [`Augmentation`].
pub struct ArgumentBuilder<'a> {
    config: &'a InstrumentationConfig,
    index: &'a LineIndex<'a>,
}

impl<'a> ArgumentBuilder<'a> {
    /// A builder emitting calls configured by `config`, with positions taken
    /// from `index`.
    pub fn new(config: &'a InstrumentationConfig, index: &'a LineIndex<'a>) -> Self {
        Self { config, index }
    }

    /// JSON text of a [`FilePosition`].
    pub fn file_position_json(&self, position: &FilePosition) -> Result<String, Error> {
        serde_json::to_string(position)
    }

    /// JSON text of the descriptor of `symbol`.
    pub fn variable_json(&self, symbol: &VariableSymbol) -> Result<String, Error> {
        serde_json::to_string(&symbol.descriptor(self.index))
    }

    /// The argument list: the file position, then one `(descriptor, value)`
    /// tuple per variable, locals first, then parameters, then fields.
    /// Synthesized nodes are anchored at `at`.
    pub fn arguments(&self, augmentation: &Augmentation, at: usize) -> Result<Vec<Argument>, Error> {
        let position = self.file_position_json(&augmentation.file_position)?;
        let mut args = vec![Argument::plain(string_literal(&position, at))];
        for symbol in augmentation.variables() {
            let descriptor = self.variable_json(symbol)?;
            let value = Expr::synthesized(at, ExprKind::Ident(Ident::synthesized(&symbol.name, at)));
            let tuple = ExprKind::Tuple(vec![string_literal(&descriptor, at), value]);
            args.push(Argument::plain(Expr::synthesized(at, tuple)));
        }
        Ok(args)
    }

    /// The complete emission call for `augmentation`.
    pub fn emission_call(&self, augmentation: &Augmentation, at: usize) -> Result<Expr, Error> {
        let args = self.arguments(augmentation, at)?;
        let callee = self.callee(at);
        Ok(Expr::synthesized(at, ExprKind::Call { callee: Box::new(callee), args }))
    }

    /// `A.B.Emitter.Method` as a chain of member accesses.
    fn callee(&self, at: usize) -> Expr {
        let mut segments = self.config.emitter_type.split('.');
        let root = segments.next().unwrap_or_default();
        let mut callee = Expr::synthesized(at, ExprKind::Ident(Ident::synthesized(root, at)));
        for segment in segments.chain(std::iter::once(self.config.emit_method.as_str())) {
            callee = Expr::synthesized(
                at,
                ExprKind::Member {
                    target: Box::new(callee),
                    name: Ident::synthesized(segment, at),
                },
            );
        }
        callee
    }
}

fn string_literal(value: &str, at: usize) -> Expr {
    Expr::synthesized(at, ExprKind::Literal(Literal::string(value)))
}

/// Names of the variables passed by an emission call, in argument order.
pub fn emitted_names(call: &Expr) -> Vec<&Ident> {
    let ExprKind::Call { args, .. } = &call.kind else {
        return vec![];
    };
    args.iter()
        .filter_map(|arg| match &arg.expr.kind {
            ExprKind::Tuple(items) => match items.as_slice() {
                [_, Expr { kind: ExprKind::Ident(ident), .. }] => Some(ident),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use snaptrace_common::SourceRange;

    use super::*;
    use crate::{analysis::Placement, ast::StmtId};

    #[test]
    fn test_emission_call_shape() {
        let text = "int a = 0;\nUse(a);";
        let index = LineIndex::new(text);
        let config = InstrumentationConfig::default();
        let builder = ArgumentBuilder::new(&config, &index);

        let a = VariableSymbol::local("a", SourceRange::new(4, 5));
        let augmentation = Augmentation {
            stmt: StmtId(1),
            src: SourceRange::new(11, 18),
            file_position: index.file_position(11, "main.cs"),
            locals: BTreeSet::from([a]),
            parameters: BTreeSet::new(),
            fields: BTreeSet::new(),
            placement: Placement::TopLevel,
            depth: 0,
        };

        let call = builder.emission_call(&augmentation, 18).unwrap();
        assert_eq!(
            call.to_string(),
            concat!(
                r#"SnapTrace.Emitter.EmitProgramState("{\"line\":1,\"character\":0,\"file\":\"main.cs\"}", "#,
                r#"("{\"name\":\"a\",\"kind\":\"local\",\"declaredAt\":{\"start\":{\"line\":0,\"character\":4},\"end\":{\"line\":0,\"character\":5}}}", a))"#
            )
        );
        assert_eq!(emitted_names(&call).iter().map(|i| i.name.as_str()).collect::<Vec<_>>(), ["a"]);
        assert!(call.src.is_empty());
    }
}
