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

use std::collections::{BTreeSet, HashSet};

use snaptrace_common::{LineIndex, SourceRange, VariableKind, VariableLocation, VariableSymbol};
use tracing::{debug, trace, warn};

use super::{
    Augmentation, AugmentationMap, FlowState, LoopFrame, Placement, SymbolResolver,
    VariableLocationMap,
};
use crate::ast::{
    ArgModifier, BinaryOp, Expr, ExprKind, ForInit, Ident, Item, LocalDecl, Member, MethodBody,
    Pattern, Program, QueryClause, Stmt, StmtId, StmtKind, UnaryOp,
};

/// Walks a program once, producing one [`Augmentation`] per instrumented
/// statement and the occurrences of every variable.
///
/// Definite assignment is tracked with a [`FlowState`] that is threaded
/// through statements and conditions; loops collect their `break` and
/// `continue` states in a [`LoopFrame`].
pub struct ScopeVisitor<'a, R: SymbolResolver + ?Sized> {
    program: &'a Program,
    resolver: &'a R,
    index: LineIndex<'a>,
    /// `None` instruments everything.
    regions: Option<Vec<SourceRange>>,
    /// Whether the code being walked has no `this`.
    static_context: bool,
    state: FlowState,
    loops: Vec<LoopFrame>,
    augmentations: AugmentationMap,
    locations: VariableLocationMap,
}

impl<'a, R: SymbolResolver + ?Sized> ScopeVisitor<'a, R> {
    /// Prepares a walk of `program`. Regions reaching past the end of the
    /// document are dropped with a warning.
    pub fn new(program: &'a Program, resolver: &'a R, regions: Option<&[SourceRange]>) -> Self {
        let len = program.source.len();
        let regions = regions.map(|regions| {
            regions
                .iter()
                .filter(|region| {
                    let in_bounds = region.next_loc() <= len;
                    if !in_bounds {
                        warn!(
                            start = region.start,
                            length = region.length,
                            document_length = len,
                            "ignoring region outside the document"
                        );
                    }
                    in_bounds
                })
                .copied()
                .collect()
        });
        Self {
            program,
            resolver,
            index: LineIndex::new(&program.source),
            regions,
            static_context: true,
            state: FlowState::default(),
            loops: vec![],
            augmentations: AugmentationMap::new(),
            locations: VariableLocationMap::new(),
        }
    }

    /// Walks every top-level statement, field initializer and method body.
    pub fn run(mut self) -> (AugmentationMap, VariableLocationMap) {
        let program = self.program;
        // top-level statements form one static body; classes may sit between them
        let mut top_level_state = FlowState::default();
        for item in &program.items {
            match item {
                Item::TopLevel(id) => {
                    self.static_context = true;
                    self.state = std::mem::take(&mut top_level_state);
                    self.visit_stmt(*id, Placement::TopLevel, 0);
                    top_level_state = std::mem::take(&mut self.state);
                }
                Item::Class(class) => {
                    trace!(class = %class.name, "visiting class");
                    for member in &class.members {
                        self.state = FlowState::default();
                        self.loops.clear();
                        match member {
                            Member::Field(field) => {
                                self.static_context = field.is_static;
                                self.record_declaration(&field.name);
                                if let Some(init) = &field.init {
                                    self.visit_expr(init);
                                }
                            }
                            Member::Method(method) => {
                                self.static_context = method.is_static;
                                for param in &method.params {
                                    self.record_declaration(&param.name);
                                }
                                match &method.body {
                                    MethodBody::Block(id) => {
                                        self.visit_stmt(*id, Placement::MethodBody, 0)
                                    }
                                    MethodBody::Expr(expr) => self.visit_expr(expr),
                                    MethodBody::None => {}
                                }
                            }
                        }
                    }
                }
            }
        }
        debug!(
            file = %program.file,
            augmentations = self.augmentations.len(),
            variables = self.locations.len(),
            "scope analysis finished"
        );
        (self.augmentations, self.locations)
    }

    fn in_regions(&self, src: &SourceRange) -> bool {
        match &self.regions {
            None => true,
            Some(regions) => regions.iter().any(|region| region.intersects(src)),
        }
    }

    /// Records the variables observable right before `stmt` executes.
    fn augment(&mut self, id: StmtId, stmt: &Stmt, placement: Placement, depth: usize) {
        if !stmt.is_instrumentable() || !self.in_regions(&stmt.src) {
            return;
        }
        let offset = stmt.src.start;
        let mut seen = HashSet::new();
        let (mut locals, mut parameters, mut fields) =
            (BTreeSet::new(), BTreeSet::new(), BTreeSet::new());

        // innermost first: the first symbol of a name shadows the rest
        for symbol in self.resolver.symbols_visible_at(offset) {
            if !seen.insert(symbol.name.clone()) {
                continue;
            }
            match symbol.kind {
                VariableKind::Local => {
                    if symbol.declaration.start < offset
                        && self.state.is_assigned(&symbol.declaration)
                    {
                        locals.insert(symbol);
                    }
                }
                VariableKind::Parameter => {
                    parameters.insert(symbol);
                }
                VariableKind::Field => {
                    if symbol.is_static || !self.static_context {
                        fields.insert(symbol);
                    }
                }
            }
        }

        let file_position = self.index.file_position(offset, &self.program.file);
        trace!(
            stmt = %id,
            line = file_position.line,
            locals = locals.len(),
            parameters = parameters.len(),
            fields = fields.len(),
            "augmenting statement"
        );
        self.augmentations.insert(
            id,
            Augmentation {
                stmt: id,
                src: stmt.src,
                file_position,
                locals,
                parameters,
                fields,
                placement,
                depth,
            },
        );
    }

    fn visit_stmt(&mut self, id: StmtId, placement: Placement, depth: usize) {
        let program = self.program;
        let stmt = program.stmt(id);
        self.augment(id, stmt, placement, depth);

        let embedded = Placement::Embedded(id);
        let depth = depth + 1;
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                for child in stmts {
                    self.visit_stmt(*child, Placement::InBlock(id), depth);
                }
            }
            StmtKind::LocalDecl(decl) => self.visit_local_decl(decl),
            StmtKind::Expr(expr) => self.visit_expr(expr),
            StmtKind::If { cond, then, otherwise } => {
                let (when_true, when_false) = self.visit_condition(cond);
                self.state = when_true;
                self.visit_stmt(*then, embedded, depth);
                let after_then = std::mem::replace(&mut self.state, when_false);
                if let Some(otherwise) = otherwise {
                    self.visit_stmt(*otherwise, embedded, depth);
                }
                self.state = after_then.meet(&self.state);
            }
            StmtKind::While { cond, body } => {
                let (when_true, when_false) = self.visit_condition(cond);
                self.state = when_true;
                let frame = self.visit_loop_body(*body, embedded, depth);
                self.state = when_false.meet(&frame.breaks);
            }
            StmtKind::DoWhile { body, cond } => {
                let frame = self.visit_loop_body(*body, embedded, depth);
                self.state = self.state.meet(&frame.continues);
                let (_, when_false) = self.visit_condition(cond);
                self.state = when_false.meet(&frame.breaks);
            }
            StmtKind::For { init, cond, step, body } => {
                match init {
                    ForInit::None => {}
                    ForInit::Decl(decl) => self.visit_local_decl(decl),
                    ForInit::Exprs(exprs) => exprs.iter().for_each(|e| self.visit_expr(e)),
                }
                let (when_true, when_false) = match cond {
                    Some(cond) => self.visit_condition(cond),
                    None => (self.state.clone(), FlowState::unreachable()),
                };
                self.state = when_true;
                let frame = self.visit_loop_body(*body, embedded, depth);
                self.state = self.state.meet(&frame.continues);
                step.iter().for_each(|e| self.visit_expr(e));
                self.state = when_false.meet(&frame.breaks);
            }
            StmtKind::ForEach { var, iterable, body, .. } => {
                self.visit_expr(iterable);
                let entry = self.state.clone();
                self.record_declaration(var);
                self.state.assign(var.src);
                let frame = self.visit_loop_body(*body, embedded, depth);
                self.state = entry.meet(&frame.breaks);
            }
            StmtKind::Return(value) | StmtKind::Throw(value) => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
                self.state = FlowState::unreachable();
            }
            StmtKind::Break => {
                if let Some(frame) = self.loops.last_mut() {
                    frame.breaks = frame.breaks.meet(&self.state);
                }
                self.state = FlowState::unreachable();
            }
            StmtKind::Continue => {
                if let Some(frame) = self.loops.last_mut() {
                    frame.continues = frame.continues.meet(&self.state);
                }
                self.state = FlowState::unreachable();
            }
            StmtKind::Try { body, catches, finally } => {
                let entry = self.state.clone();
                self.visit_stmt(*body, embedded, depth);
                let mut exit = std::mem::take(&mut self.state);
                for catch in catches {
                    self.state = entry.clone();
                    if let Some(var) = &catch.var {
                        self.record_declaration(var);
                        self.state.assign(var.src);
                    }
                    self.visit_stmt(catch.body, embedded, depth);
                    exit = exit.meet(&self.state);
                }
                if let Some(finally) = finally {
                    self.state = entry;
                    self.visit_stmt(*finally, embedded, depth);
                    exit.include(&self.state);
                }
                self.state = exit;
            }
            StmtKind::Empty => {}
        }
    }

    fn visit_loop_body(&mut self, body: StmtId, placement: Placement, depth: usize) -> LoopFrame {
        self.loops.push(LoopFrame::default());
        self.visit_stmt(body, placement, depth);
        self.loops.pop().unwrap_or_default()
    }

    fn visit_local_decl(&mut self, decl: &LocalDecl) {
        for declarator in &decl.declarators {
            self.record_declaration(&declarator.name);
            if let Some(init) = &declarator.init {
                self.visit_expr(init);
                self.state.assign(declarator.name.src);
            }
        }
    }

    /// Walks a boolean expression and returns the states in which it
    /// evaluates to `true` and to `false`.
    fn visit_condition(&mut self, cond: &Expr) -> (FlowState, FlowState) {
        match &cond.kind {
            ExprKind::Paren(inner) => self.visit_condition(inner),
            ExprKind::Unary { op: UnaryOp::Not, operand } => {
                let (when_true, when_false) = self.visit_condition(operand);
                (when_false, when_true)
            }
            ExprKind::Binary { op: BinaryOp::And, lhs, rhs } => {
                let (lhs_true, lhs_false) = self.visit_condition(lhs);
                self.state = lhs_true;
                let (rhs_true, rhs_false) = self.visit_condition(rhs);
                (rhs_true, lhs_false.meet(&rhs_false))
            }
            ExprKind::Binary { op: BinaryOp::Or, lhs, rhs } => {
                let (lhs_true, lhs_false) = self.visit_condition(lhs);
                self.state = lhs_false;
                let (rhs_true, rhs_false) = self.visit_condition(rhs);
                (lhs_true.meet(&rhs_true), rhs_false)
            }
            ExprKind::Is { expr, pattern: Pattern::Type { binding: Some(binding), .. } } => {
                self.visit_expr(expr);
                self.record_declaration(binding);
                let mut when_true = self.state.clone();
                when_true.assign(binding.src);
                (when_true, self.state.clone())
            }
            _ => match cond.as_bool_literal() {
                Some(true) => (self.state.clone(), FlowState::unreachable()),
                Some(false) => (FlowState::unreachable(), self.state.clone()),
                None => {
                    self.visit_expr(cond);
                    (self.state.clone(), self.state.clone())
                }
            },
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(ident) => {
                self.record_use(ident);
            }
            ExprKind::Member { target, name } if matches!(target.kind, ExprKind::This) => {
                self.record_field_access(name)
            }
            ExprKind::Member { target, .. } => self.visit_expr(target),
            ExprKind::Assign { op, target, value } => {
                match &target.unparenthesized().kind {
                    ExprKind::Ident(ident) => {
                        let symbol = self.record_use(ident);
                        self.visit_expr(value);
                        if let Some(symbol) = symbol {
                            if !op.reads_target() || self.state.is_assigned(&symbol.declaration) {
                                self.state.assign(symbol.declaration);
                            }
                        }
                    }
                    _ => {
                        self.visit_expr(target);
                        self.visit_expr(value);
                    }
                }
            }
            ExprKind::Call { callee, args } => {
                self.visit_expr(callee);
                let mut assigned = vec![];
                for arg in args {
                    match (&arg.modifier, &arg.expr.kind) {
                        (Some(ArgModifier::Out), ExprKind::Declaration { name, .. }) => {
                            self.record_declaration(name);
                            assigned.push(name.src);
                        }
                        (Some(ArgModifier::Out), ExprKind::Ident(ident)) => {
                            if let Some(symbol) = self.record_use(ident) {
                                assigned.push(symbol.declaration);
                            }
                        }
                        _ => self.visit_expr(&arg.expr),
                    }
                }
                // out arguments are written by the callee, after every argument
                for declaration in assigned {
                    self.state.assign(declaration);
                }
            }
            ExprKind::Declaration { name, .. } => self.record_declaration(name),
            ExprKind::Is { expr: subject, pattern } => {
                self.visit_expr(subject);
                match pattern {
                    Pattern::Type { binding: Some(binding), .. } => {
                        self.record_declaration(binding)
                    }
                    Pattern::Type { binding: None, .. } => {}
                    Pattern::Constant(constant) => self.visit_expr(constant),
                }
            }
            ExprKind::Conditional { cond, then, otherwise } => {
                let (when_true, when_false) = self.visit_condition(cond);
                self.state = when_true;
                self.visit_expr(then);
                let after_then = std::mem::replace(&mut self.state, when_false);
                self.visit_expr(otherwise);
                self.state = after_then.meet(&self.state);
            }
            ExprKind::Binary { op: BinaryOp::And | BinaryOp::Or, .. } => {
                let (when_true, when_false) = self.visit_condition(expr);
                self.state = when_true.meet(&when_false);
            }
            ExprKind::Binary { op: BinaryOp::Coalesce, lhs, rhs } => {
                self.visit_expr(lhs);
                let skipped = self.state.clone();
                self.visit_expr(rhs);
                self.state = skipped.meet(&self.state);
            }
            ExprKind::Lambda { params, body } => {
                for param in params {
                    self.record_declaration(param);
                }
                // the body runs later, if at all
                let saved = self.state.clone();
                self.visit_expr(body);
                self.state = saved;
            }
            ExprKind::Query(query) => {
                let saved = self.state.clone();
                for clause in &query.clauses {
                    match clause {
                        QueryClause::From { var, source: value }
                        | QueryClause::Let { var, value } => {
                            self.visit_expr(value);
                            self.record_declaration(var);
                        }
                        QueryClause::Where(cond) => self.visit_expr(cond),
                        QueryClause::OrderBy(keys) => {
                            keys.iter().for_each(|(key, _)| self.visit_expr(key))
                        }
                    }
                }
                self.visit_expr(&query.select);
                self.state = saved;
            }
            _ => expr.children().into_iter().for_each(|e| self.visit_expr(e)),
        }
    }

    /// Records a read or write of a simple name. Returns the variable, if
    /// the name denotes one.
    fn record_use(&mut self, ident: &Ident) -> Option<VariableSymbol> {
        let symbol = self.resolver.resolve_name(&ident.name, ident.src.start)?;
        self.record(&symbol, ident.src);
        Some(symbol)
    }

    /// Records `this.name`, which always denotes a field.
    fn record_field_access(&mut self, name: &Ident) {
        let field = self
            .resolver
            .symbols_visible_at(name.src.start)
            .into_iter()
            .find(|symbol| symbol.kind == VariableKind::Field && symbol.name == name.name);
        if let Some(field) = field {
            self.record(&field, name.src);
        }
    }

    fn record_declaration(&mut self, ident: &Ident) {
        if let Some(symbol) = self.resolver.declaration_at(ident.src) {
            self.record(&symbol, ident.src);
        }
    }

    fn record(&mut self, symbol: &VariableSymbol, range: SourceRange) {
        let location = VariableLocation::new(symbol, range, &self.index);
        self.locations.entry(symbol.clone()).or_default().insert(location);
    }
}
