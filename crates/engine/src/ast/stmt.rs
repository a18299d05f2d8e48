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

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use snaptrace_common::SourceRange;

use super::{Expr, Ident, TypeName};

/// Index of a statement in the [`super::Program`] arena.
///
/// Ids are handed out in pre-order while parsing, so for the statements of a
/// parsed program, id order is document order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From,
)]
#[display("#{_0}")]
pub struct StmtId(pub u32);

impl StmtId {
    /// The arena slot of this id.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Abstracted statement AST node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stmt {
    /// The source range of the statement, terminator included.
    pub src: SourceRange,
    /// The kind of statement.
    pub kind: StmtKind,
}

/// The different kinds of statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StmtKind {
    /// `{ .. }`
    Block(Vec<StmtId>),
    /// A local variable declaration.
    LocalDecl(LocalDecl),
    /// An expression statement.
    Expr(Expr),
    /// `if (cond) then else otherwise`
    If {
        /// The condition.
        cond: Expr,
        /// The embedded statement run when the condition holds.
        then: StmtId,
        /// The `else` branch.
        otherwise: Option<StmtId>,
    },
    /// `while (cond) body`
    While {
        /// The loop condition.
        cond: Expr,
        /// The loop body.
        body: StmtId,
    },
    /// `do body while (cond);`
    DoWhile {
        /// The loop body.
        body: StmtId,
        /// The loop condition.
        cond: Expr,
    },
    /// `for (init; cond; step) body`
    For {
        /// The initializer section.
        init: ForInit,
        /// The condition, absent for `for (;;)`.
        cond: Option<Expr>,
        /// The iterator section.
        step: Vec<Expr>,
        /// The loop body.
        body: StmtId,
    },
    /// `foreach (ty var in iterable) body`
    ForEach {
        /// The declared iteration type.
        ty: TypeName,
        /// The iteration variable.
        var: Ident,
        /// The enumerated expression.
        iterable: Expr,
        /// The loop body.
        body: StmtId,
    },
    /// `return [value];`
    Return(Option<Expr>),
    /// `break;`
    Break,
    /// `continue;`
    Continue,
    /// `throw [value];`
    Throw(Option<Expr>),
    /// `try body catch .. finally ..`
    Try {
        /// The protected block.
        body: StmtId,
        /// The catch clauses in order.
        catches: Vec<CatchClause>,
        /// The `finally` block.
        finally: Option<StmtId>,
    },
    /// `;`
    Empty,
}

impl Stmt {
    /// Jump statements transfer control unconditionally; code right after
    /// them is unreachable.
    pub fn is_jump(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::Return(_) | StmtKind::Break | StmtKind::Continue | StmtKind::Throw(_)
        )
    }

    /// Whether this is a `{ .. }` block.
    pub fn is_block(&self) -> bool {
        matches!(self.kind, StmtKind::Block(_))
    }

    /// Whether a snapshot can be taken right after this statement.
    pub fn is_instrumentable(&self) -> bool {
        !self.is_block() && !self.is_jump() && !matches!(self.kind, StmtKind::Empty)
    }

    /// Statement children in document order.
    pub fn children(&self) -> Vec<StmtId> {
        match &self.kind {
            StmtKind::Block(stmts) => stmts.clone(),
            StmtKind::If { then, otherwise, .. } => {
                std::iter::once(*then).chain(*otherwise).collect()
            }
            StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::For { body, .. }
            | StmtKind::ForEach { body, .. } => vec![*body],
            StmtKind::Try { body, catches, finally } => std::iter::once(*body)
                .chain(catches.iter().map(|c| c.body))
                .chain(*finally)
                .collect(),
            StmtKind::LocalDecl(_)
            | StmtKind::Expr(_)
            | StmtKind::Return(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Throw(_)
            | StmtKind::Empty => vec![],
        }
    }

    /// Children that sit in an embedded-statement slot, i.e. that may be a
    /// single statement instead of a block.
    pub fn embedded_children(&self) -> Vec<StmtId> {
        match &self.kind {
            StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::DoWhile { .. }
            | StmtKind::For { .. }
            | StmtKind::ForEach { .. } => self.children(),
            _ => vec![],
        }
    }

    /// Replaces the embedded child `from` with `to`. Returns `false` if
    /// `from` is not an embedded child of this statement.
    pub fn replace_embedded(&mut self, from: StmtId, to: StmtId) -> bool {
        let slot = match &mut self.kind {
            StmtKind::If { then, otherwise, .. } => {
                if *then == from {
                    Some(then)
                } else {
                    otherwise.as_mut().filter(|o| **o == from)
                }
            }
            StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::For { body, .. }
            | StmtKind::ForEach { body, .. } => Some(body).filter(|b| **b == from),
            _ => None,
        };
        match slot {
            Some(slot) => {
                *slot = to;
                true
            }
            None => false,
        }
    }
}

/// `T a = 1, b;`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDecl {
    /// The declared type, possibly `var`.
    pub ty: TypeName,
    /// One entry per declared variable.
    pub declarators: Vec<Declarator>,
}

/// `a = 1` in a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declarator {
    /// The declared variable.
    pub name: Ident,
    /// The initializer, if any.
    pub init: Option<Expr>,
}

/// The initializer section of a `for` statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForInit {
    /// Empty section.
    None,
    /// A variable declaration.
    Decl(LocalDecl),
    /// Comma-separated expressions.
    Exprs(Vec<Expr>),
}

/// `catch (ty var) body`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchClause {
    /// The whole clause.
    pub src: SourceRange,
    /// The caught type, absent for a bare `catch`.
    pub ty: Option<TypeName>,
    /// The exception variable.
    pub var: Option<Ident>,
    /// The handler block.
    pub body: StmtId,
}
