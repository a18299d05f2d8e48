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

use serde::{Deserialize, Serialize};
use snaptrace_common::SourceRange;

use super::{Expr, Ident, Stmt, StmtId, StmtKind, TypeName};

/// A parsed compilation unit.
///
/// Statements live in an arena and refer to each other by [`StmtId`]. The
/// program keeps the text it was parsed from; all [`SourceRange`]s index into
/// it, including those of a rewritten program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Name of the document, as reported in file positions.
    pub file: String,
    /// The document text.
    pub source: String,
    /// Top-level items in document order.
    pub items: Vec<Item>,
    stmts: Vec<Stmt>,
}

/// A top-level item of a snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Item {
    /// A top-level statement.
    TopLevel(StmtId),
    /// A class or struct declaration.
    Class(ClassDecl),
}

/// A class or struct declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDecl {
    /// The type name.
    pub name: Ident,
    /// The whole declaration, braces included.
    pub src: SourceRange,
    /// Fields and methods in declaration order.
    pub members: Vec<Member>,
}

/// A modelled class member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Member {
    /// A field declarator.
    Field(FieldDecl),
    /// A method or constructor.
    Method(MethodDecl),
}

/// One declarator of a field declaration; `int a, b;` yields two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    /// The field name.
    pub name: Ident,
    /// The declared type.
    pub ty: TypeName,
    /// The declarator, initializer included.
    pub src: SourceRange,
    /// Whether the field is `static` or `const`.
    pub is_static: bool,
    /// The initializer, if any.
    pub init: Option<Expr>,
}

/// A method or constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDecl {
    /// The method name; the type name for constructors.
    pub name: Ident,
    /// The whole declaration, parameters and body included.
    pub src: SourceRange,
    /// Whether the method is `static`.
    pub is_static: bool,
    /// Formal parameters.
    pub params: Vec<Param>,
    /// The body.
    pub body: MethodBody,
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// The parameter name.
    pub name: Ident,
    /// The declared type.
    pub ty: TypeName,
}

/// The body of a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodBody {
    /// `{ .. }`
    Block(StmtId),
    /// `=> expr;`
    Expr(Expr),
    /// Abstract, extern or partial.
    None,
}

impl Program {
    /// An empty program over `source`.
    pub fn new(file: impl Into<String>, source: impl Into<String>) -> Self {
        Self { file: file.into(), source: source.into(), items: vec![], stmts: vec![] }
    }

    /// The statement with the given id.
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    /// Mutable access to the statement with the given id.
    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.index()]
    }

    /// Appends a statement to the arena.
    pub fn alloc(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    /// Reserves an id before the statement's children are parsed, keeping ids
    /// in pre-order. The slot must be filled with [`Self::fill`].
    pub(crate) fn reserve(&mut self) -> StmtId {
        self.alloc(Stmt { src: SourceRange::default(), kind: StmtKind::Empty })
    }

    pub(crate) fn fill(&mut self, id: StmtId, stmt: Stmt) {
        self.stmts[id.index()] = stmt;
    }

    /// Number of slots in the arena, reachable or not.
    pub fn arena_len(&self) -> usize {
        self.stmts.len()
    }

    /// Ids of the top-level statements, in order.
    pub fn top_level(&self) -> impl Iterator<Item = StmtId> + '_ {
        self.items.iter().filter_map(|item| match item {
            Item::TopLevel(id) => Some(*id),
            Item::Class(_) => None,
        })
    }

    /// The class declarations, in order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassDecl> + '_ {
        self.items.iter().filter_map(|item| match item {
            Item::Class(class) => Some(class),
            Item::TopLevel(_) => None,
        })
    }

    /// The range covering all top-level statements, if there are any.
    pub fn top_level_range(&self) -> Option<SourceRange> {
        self.top_level().map(|id| self.stmt(id).src).reduce(|a, b| a.cover(&b))
    }

    /// Root statements: top-level statements and method bodies, in document order.
    pub fn roots(&self) -> Vec<StmtId> {
        let mut roots = vec![];
        for item in &self.items {
            match item {
                Item::TopLevel(id) => roots.push(*id),
                Item::Class(class) => {
                    for member in &class.members {
                        if let Member::Method(MethodDecl { body: MethodBody::Block(id), .. }) =
                            member
                        {
                            roots.push(*id);
                        }
                    }
                }
            }
        }
        roots
    }

    /// Every statement reachable from the roots, in pre-order.
    pub fn reachable(&self) -> Vec<StmtId> {
        let mut order = vec![];
        let mut stack: Vec<StmtId> = self.roots().into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.stmt(id).children().into_iter().rev());
        }
        order
    }

    /// Number of reachable statements that are not blocks.
    pub fn statement_count(&self) -> usize {
        self.reachable().into_iter().filter(|id| !self.stmt(*id).is_block()).count()
    }
}
