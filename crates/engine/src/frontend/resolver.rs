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

//! Scope resolution from lexical structure alone.
//!
//! Every declaration is recorded together with the range of the scope that
//! declares it. A symbol is visible at an offset when that range contains the
//! offset; the [`crate::analysis::ScopeVisitor`] then filters by declaration
//! order and definite assignment.
//!
//! Scopes, by declaration kind:
//!
//! | declaration                         | scope                                   |
//! |-------------------------------------|-----------------------------------------|
//! | field                               | the declaring class                     |
//! | parameter                           | the declaring method                    |
//! | local, `out var`, pattern variable  | the enclosing block or embedded statement |
//! | `for` initializer                   | the `for` statement                     |
//! | `foreach` iteration variable        | the loop body                           |
//! | catch variable                      | the catch clause                        |
//! | lambda parameter                    | the lambda                              |
//! | query range variable                | the query expression                    |

use snaptrace_common::{SourceRange, VariableSymbol};
use tracing::debug;

use crate::{
    analysis::SymbolResolver,
    ast::{Expr, ExprKind, ForInit, Item, LocalDecl, Member, MethodBody, Program, QueryClause, StmtId, StmtKind},
};

/// A [`SymbolResolver`] computed from a parsed [`Program`].
#[derive(Debug, Clone, Default)]
pub struct LexicalResolver {
    /// Declared symbols with the range of their declaring scope.
    declarations: Vec<(SourceRange, VariableSymbol)>,
}

impl LexicalResolver {
    /// Collects the declarations of `program`.
    pub fn new(program: &Program) -> Self {
        let mut builder = ScopeBuilder { program, scope_stack: vec![], declarations: vec![] };
        builder.walk_program();
        debug!(
            file = %program.file,
            declarations = builder.declarations.len(),
            "resolved lexical scopes"
        );
        Self { declarations: builder.declarations }
    }

    /// All declared symbols, in declaration order.
    pub fn symbols(&self) -> Vec<&VariableSymbol> {
        let mut symbols: Vec<_> = self.declarations.iter().map(|(_, symbol)| symbol).collect();
        symbols.sort();
        symbols
    }
}

impl SymbolResolver for LexicalResolver {
    fn symbols_visible_at(&self, offset: usize) -> Vec<VariableSymbol> {
        let mut visible: Vec<_> =
            self.declarations.iter().filter(|(scope, _)| scope.contains(offset)).collect();
        visible.sort_by_key(|(scope, _)| scope.length);
        visible.into_iter().map(|(_, symbol)| symbol.clone()).collect()
    }

    fn declaration_at(&self, range: SourceRange) -> Option<VariableSymbol> {
        self.declarations
            .iter()
            .find(|(_, symbol)| symbol.declaration == range)
            .map(|(_, symbol)| symbol.clone())
    }
}

struct ScopeBuilder<'a> {
    program: &'a Program,
    scope_stack: Vec<SourceRange>,
    declarations: Vec<(SourceRange, VariableSymbol)>,
}

impl<'a> ScopeBuilder<'a> {
    fn enter_scope(&mut self, src: SourceRange) {
        self.scope_stack.push(src);
    }

    fn exit_scope(&mut self) {
        self.scope_stack.pop();
    }

    fn declare(&mut self, symbol: VariableSymbol) {
        if let Some(scope) = self.scope_stack.last() {
            self.declarations.push((*scope, symbol));
        }
    }

    fn walk_program(&mut self) {
        let program = self.program;
        let top_level = program.top_level_range();
        for item in &program.items {
            match item {
                Item::TopLevel(id) => {
                    if let Some(range) = top_level {
                        self.enter_scope(range);
                        self.walk_stmt(*id);
                        self.exit_scope();
                    }
                }
                Item::Class(class) => {
                    self.enter_scope(class.src);
                    for member in &class.members {
                        if let Member::Field(field) = member {
                            self.declare(VariableSymbol::field(
                                &field.name.name,
                                field.name.src,
                                field.is_static,
                            ));
                        }
                    }
                    for member in &class.members {
                        match member {
                            Member::Field(field) => {
                                if let Some(init) = &field.init {
                                    self.enter_scope(field.src);
                                    self.walk_expr(init);
                                    self.exit_scope();
                                }
                            }
                            Member::Method(method) => {
                                self.enter_scope(method.src);
                                for param in &method.params {
                                    self.declare(VariableSymbol::parameter(
                                        &param.name.name,
                                        param.name.src,
                                    ));
                                }
                                match &method.body {
                                    MethodBody::Block(id) => self.walk_stmt(*id),
                                    MethodBody::Expr(expr) => self.walk_expr(expr),
                                    MethodBody::None => {}
                                }
                                self.exit_scope();
                            }
                        }
                    }
                    self.exit_scope();
                }
            }
        }
    }

    fn walk_local_decl(&mut self, decl: &'a LocalDecl) {
        for declarator in &decl.declarators {
            self.declare(VariableSymbol::local(&declarator.name.name, declarator.name.src));
            if let Some(init) = &declarator.init {
                self.walk_expr(init);
            }
        }
    }

    /// Walks a statement in an embedded slot, which forms its own scope.
    fn walk_embedded(&mut self, id: StmtId) {
        let stmt = self.program.stmt(id);
        if stmt.is_block() {
            self.walk_stmt(id);
        } else {
            self.enter_scope(stmt.src);
            self.walk_stmt(id);
            self.exit_scope();
        }
    }

    fn walk_stmt(&mut self, id: StmtId) {
        let program = self.program;
        let stmt = program.stmt(id);
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                self.enter_scope(stmt.src);
                for child in stmts {
                    self.walk_stmt(*child);
                }
                self.exit_scope();
            }
            StmtKind::LocalDecl(decl) => self.walk_local_decl(decl),
            StmtKind::Expr(expr) => self.walk_expr(expr),
            StmtKind::If { cond, then, otherwise } => {
                self.walk_expr(cond);
                self.walk_embedded(*then);
                if let Some(otherwise) = otherwise {
                    self.walk_embedded(*otherwise);
                }
            }
            StmtKind::While { cond, body } => {
                self.enter_scope(stmt.src);
                self.walk_expr(cond);
                self.walk_embedded(*body);
                self.exit_scope();
            }
            StmtKind::DoWhile { body, cond } => {
                self.enter_scope(stmt.src);
                self.walk_embedded(*body);
                self.walk_expr(cond);
                self.exit_scope();
            }
            StmtKind::For { init, cond, step, body } => {
                self.enter_scope(stmt.src);
                match init {
                    ForInit::None => {}
                    ForInit::Decl(decl) => self.walk_local_decl(decl),
                    ForInit::Exprs(exprs) => exprs.iter().for_each(|e| self.walk_expr(e)),
                }
                if let Some(cond) = cond {
                    self.walk_expr(cond);
                }
                step.iter().for_each(|e| self.walk_expr(e));
                self.walk_embedded(*body);
                self.exit_scope();
            }
            StmtKind::ForEach { var, iterable, body, .. } => {
                self.walk_expr(iterable);
                self.enter_scope(program.stmt(*body).src);
                self.declare(VariableSymbol::local(&var.name, var.src));
                self.walk_embedded(*body);
                self.exit_scope();
            }
            StmtKind::Return(value) | StmtKind::Throw(value) => {
                if let Some(value) = value {
                    self.walk_expr(value);
                }
            }
            StmtKind::Try { body, catches, finally } => {
                self.walk_stmt(*body);
                for catch in catches {
                    self.enter_scope(catch.src);
                    if let Some(var) = &catch.var {
                        self.declare(VariableSymbol::local(&var.name, var.src));
                    }
                    self.walk_stmt(catch.body);
                    self.exit_scope();
                }
                if let Some(finally) = finally {
                    self.walk_stmt(*finally);
                }
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {}
        }
    }

    fn walk_expr(&mut self, expr: &'a Expr) {
        match &expr.kind {
            ExprKind::Declaration { name, .. } => {
                self.declare(VariableSymbol::local(&name.name, name.src));
            }
            ExprKind::Is { pattern, .. } => {
                expr.children().into_iter().for_each(|e| self.walk_expr(e));
                if let Some(binding) = pattern.binding() {
                    self.declare(VariableSymbol::local(&binding.name, binding.src));
                }
            }
            ExprKind::Lambda { params, body } => {
                self.enter_scope(expr.src);
                for param in params {
                    self.declare(VariableSymbol::parameter(&param.name, param.src));
                }
                self.walk_expr(body);
                self.exit_scope();
            }
            ExprKind::Query(query) => {
                self.enter_scope(expr.src);
                for clause in &query.clauses {
                    match clause {
                        QueryClause::From { var, source: value } | QueryClause::Let { var, value } => {
                            self.walk_expr(value);
                            self.declare(VariableSymbol::local(&var.name, var.src));
                        }
                        QueryClause::Where(cond) => self.walk_expr(cond),
                        QueryClause::OrderBy(keys) => {
                            keys.iter().for_each(|(key, _)| self.walk_expr(key));
                        }
                    }
                }
                self.walk_expr(&query.select);
                self.exit_scope();
            }
            _ => expr.children().into_iter().for_each(|e| self.walk_expr(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use snaptrace_common::VariableKind;

    use super::*;
    use crate::frontend::parse;

    fn names_at(resolver: &LexicalResolver, offset: usize) -> Vec<String> {
        resolver.symbols_visible_at(offset).into_iter().map(|s| s.name).collect()
    }

    #[test]
    fn test_loop_variables_stay_in_loop() {
        let source = "int n = 3;\nfor (int i = 0; i < n; i++) { Use(i); }\nforeach (var x in xs) Use(x);\nDone();";
        let program = parse("main.cs", source).unwrap();
        let resolver = LexicalResolver::new(&program);

        let in_for = source.find("Use(i)").unwrap();
        assert_eq!(names_at(&resolver, in_for), vec!["i", "n"]);

        let in_foreach = source.find("Use(x)").unwrap();
        assert_eq!(names_at(&resolver, in_foreach), vec!["x", "n"]);

        // the iterable is evaluated outside the iteration variable's scope
        let iterable = source.find("xs").unwrap();
        assert_eq!(names_at(&resolver, iterable), vec!["n"]);

        let after = source.find("Done").unwrap();
        assert_eq!(names_at(&resolver, after), vec!["n"]);
    }

    #[test]
    fn test_scope_ends_at_closing_brace() {
        let source = "{ int x = 1; }Done();";
        let program = parse("main.cs", source).unwrap();
        let resolver = LexicalResolver::new(&program);
        let close = source.find('}').unwrap();
        assert_eq!(names_at(&resolver, close), vec!["x"]);
        assert!(names_at(&resolver, close + 1).is_empty());
    }

    #[test]
    fn test_parameters_shadow_fields() {
        let source = r#"
class Counter
{
    static int total;
    int count;

    void Set(int count)
    {
        this.count = count;
        total++;
    }
}
"#;
        let program = parse("main.cs", source).unwrap();
        let resolver = LexicalResolver::new(&program);
        let body = source.find("this.count").unwrap();

        let count = resolver.resolve_name("count", body).unwrap();
        assert_eq!(count.kind, VariableKind::Parameter);
        let total = resolver.resolve_name("total", body).unwrap();
        assert_eq!(total.kind, VariableKind::Field);
        assert!(total.is_static);

        assert_eq!(resolver.symbols().len(), 3);
        assert!(resolver.resolve_name("count", 0).is_none());
    }

    #[test]
    fn test_declaration_lookup() {
        let source = "if (int.TryParse(s, out var n)) { Use(n); }\ntry { } catch (Exception e) { Log(e); }";
        let program = parse("main.cs", source).unwrap();
        let resolver = LexicalResolver::new(&program);

        let n_at = source.find("n))").unwrap();
        let n = resolver.declaration_at(SourceRange::new(n_at, n_at + 1)).unwrap();
        assert_eq!(n.name, "n");
        assert_eq!(n.kind, VariableKind::Local);

        let log = source.find("Log").unwrap();
        assert_eq!(resolver.resolve_name("e", log).map(|s| s.name), Some("e".to_string()));
        assert!(resolver.resolve_name("e", 0).is_none());
    }
}
