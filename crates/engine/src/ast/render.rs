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

//! Source rendering of expressions.
//!
//! Parenthesization is never added: parsed trees carry their parentheses as
//! [`ExprKind::Paren`] nodes, and synthesized trees consist of calls, member
//! accesses, literals and tuples only.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use super::{ArgModifier, Argument, Expr, ExprKind, Pattern, QueryClause, QueryExpr};

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(literal) => f.write_str(&literal.text),
            ExprKind::Interpolated { text, .. } => f.write_str(text),
            ExprKind::Ident(ident) => write!(f, "{ident}"),
            ExprKind::This => f.write_str("this"),
            ExprKind::Member { target, name } => write!(f, "{target}.{name}"),
            ExprKind::Call { callee, args } => write!(f, "{callee}({})", args.iter().join(", ")),
            ExprKind::Index { target, args } => write!(f, "{target}[{}]", args.iter().join(", ")),
            ExprKind::Unary { op, operand } if op.is_postfix() => write!(f, "{operand}{op}"),
            ExprKind::Unary { op, operand } => write!(f, "{op}{operand}"),
            ExprKind::Binary { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
            ExprKind::Assign { op, target, value } => write!(f, "{target} {op} {value}"),
            ExprKind::Conditional { cond, then, otherwise } => {
                write!(f, "{cond} ? {then} : {otherwise}")
            }
            ExprKind::Is { expr, pattern } => write!(f, "{expr} is {pattern}"),
            ExprKind::As { expr, ty } => write!(f, "{expr} as {ty}"),
            ExprKind::Cast { ty, expr } => write!(f, "({ty}){expr}"),
            ExprKind::New { ty, args, initializer } => {
                f.write_str("new")?;
                if let Some(ty) = ty {
                    write!(f, " {ty}")?;
                }
                if let Some(args) = args {
                    write!(f, "({})", args.iter().join(", "))?;
                }
                write_initializer(f, initializer.as_deref())
            }
            ExprKind::NewArray { elem, sizes, initializer } => {
                f.write_str("new")?;
                if let Some(elem) = elem {
                    write!(f, " {elem}")?;
                }
                write!(f, "[{}]", sizes.iter().join(", "))?;
                write_initializer(f, initializer.as_deref())
            }
            ExprKind::Lambda { params, body } => match params.as_slice() {
                [single] => write!(f, "{single} => {body}"),
                params => write!(f, "({}) => {body}", params.iter().join(", ")),
            },
            ExprKind::Query(query) => write!(f, "{query}"),
            ExprKind::Tuple(items) => write!(f, "({})", items.iter().join(", ")),
            ExprKind::Paren(inner) => write!(f, "({inner})"),
            ExprKind::Declaration { ty, name } => write!(f, "{ty} {name}"),
        }
    }
}

fn write_initializer(f: &mut Formatter<'_>, initializer: Option<&[Expr]>) -> fmt::Result {
    match initializer {
        Some([]) => f.write_str(" { }"),
        Some(items) => write!(f, " {{ {} }}", items.iter().join(", ")),
        None => Ok(()),
    }
}

impl Display for Argument {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.modifier {
            Some(ArgModifier::Out) => write!(f, "out {}", self.expr),
            Some(ArgModifier::Ref) => write!(f, "ref {}", self.expr),
            Some(ArgModifier::In) => write!(f, "in {}", self.expr),
            None => write!(f, "{}", self.expr),
        }
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { ty, binding: Some(binding) } => write!(f, "{ty} {binding}"),
            Self::Type { ty, binding: None } => write!(f, "{ty}"),
            Self::Constant(expr) => write!(f, "{expr}"),
        }
    }
}

impl Display for QueryExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for clause in &self.clauses {
            match clause {
                QueryClause::From { var, source } => write!(f, "from {var} in {source} ")?,
                QueryClause::Let { var, value } => write!(f, "let {var} = {value} ")?,
                QueryClause::Where(cond) => write!(f, "where {cond} ")?,
                QueryClause::OrderBy(keys) => {
                    let keys = keys.iter().format_with(", ", |(key, descending), g| {
                        if *descending {
                            g(&format_args!("{key} descending"))
                        } else {
                            g(key)
                        }
                    });
                    write!(f, "orderby {keys} ")?;
                }
            }
        }
        write!(f, "select {}", self.select)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ident, Literal};

    #[test]
    fn test_render_synthesized_call() {
        let at = 10;
        let ident = |name: &str| Expr::synthesized(at, ExprKind::Ident(Ident::synthesized(name, at)));
        let callee = Expr::synthesized(
            at,
            ExprKind::Member { target: Box::new(ident("Emitter")), name: Ident::synthesized("Emit", at) },
        );
        let tuple = Expr::synthesized(
            at,
            ExprKind::Tuple(vec![
                Expr::synthesized(at, ExprKind::Literal(Literal::string(r#"{"name":"a"}"#))),
                ident("a"),
            ]),
        );
        let call = Expr::synthesized(
            at,
            ExprKind::Call { callee: Box::new(callee), args: vec![Argument::plain(tuple)] },
        );

        assert_eq!(call.to_string(), r#"Emitter.Emit(("{\"name\":\"a\"}", a))"#);
    }
}
