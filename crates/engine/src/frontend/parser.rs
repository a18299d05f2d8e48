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

//! Recursive-descent parser.
//!
//! Statement ids are reserved before a statement's children are parsed so
//! that ids come out in pre-order. Local declarations are told apart from
//! expression statements by speculatively parsing a type and backtracking.

use snaptrace_common::SourceRange;
use tracing::trace;

use super::{tokenize, ParseError, Token, TokenKind};
use crate::ast::*;

type PResult<T> = Result<T, ParseError>;

/// Contextual keywords that end an expression inside a query or a pattern.
const CONTEXTUAL_STOPS: &[&str] =
    &["select", "where", "orderby", "let", "from", "ascending", "descending", "and", "or", "when"];

/// Parser state for one compilation unit.
pub struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    program: Program,
}

impl<'s> Parser<'s> {
    /// Tokenizes `source` and prepares an empty program for `file`.
    pub fn new(file: &str, source: &'s str) -> PResult<Self> {
        Ok(Self { source, tokens: tokenize(source, 0)?, pos: 0, program: Program::new(file, source) })
    }

    /// Parses the whole unit.
    pub fn parse_program(mut self) -> PResult<Program> {
        self.parse_items(false)?;
        self.expect(TokenKind::Eof, "end of input")?;
        trace!(
            file = %self.program.file,
            statements = self.program.arena_len(),
            "parsed program"
        );
        Ok(self.program)
    }

    // ---------------------------------------------------------------------
    // Token cursor
    // ---------------------------------------------------------------------

    fn token(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> TokenKind {
        self.tokens.get(self.pos + n).map_or(TokenKind::Eof, |t| t.kind)
    }

    fn text(&self, token: Token) -> &'s str {
        &self.source[token.src.start..token.src.next_loc()]
    }

    fn at_word(&self, word: &str) -> bool {
        self.at_word_at(0, word)
    }

    fn at_word_at(&self, n: usize, word: &str) -> bool {
        match self.tokens.get(self.pos + n) {
            Some(t) => {
                matches!(t.kind, TokenKind::Ident | TokenKind::Modifier) && self.text(*t) == word
            }
            None => false,
        }
    }

    /// Whether the current token starts right where the previous one ends.
    fn adjacent_to_previous(&self) -> bool {
        self.pos > 0 && self.prev_end() == self.token().src.start
    }

    /// Whether the token after the current one starts right where it ends.
    fn next_is_adjacent(&self) -> bool {
        match self.tokens.get(self.pos + 1) {
            Some(next) => self.token().src.next_loc() == next.src.start,
            None => false,
        }
    }

    fn start(&self) -> usize {
        self.token().src.start
    }

    fn prev_end(&self) -> usize {
        self.tokens[self.pos.saturating_sub(1)].src.next_loc()
    }

    fn range_from(&self, start: usize) -> SourceRange {
        SourceRange::new(start, self.prev_end())
    }

    fn bump(&mut self) -> Token {
        let token = self.token();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> PResult<Token> {
        if self.peek() == kind {
            Ok(self.bump())
        } else {
            Err(self.error_expected(expected))
        }
    }

    fn expect_ident(&mut self) -> PResult<Ident> {
        if self.peek() != TokenKind::Ident {
            return Err(self.error_expected("identifier"));
        }
        let token = self.bump();
        let name = self.text(token).trim_start_matches('@');
        Ok(Ident::new(name, token.src))
    }

    fn error_expected(&self, expected: &'static str) -> ParseError {
        let token = self.token();
        let found = match token.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => self.text(token).to_string(),
        };
        ParseError::Expected { expected, found, offset: token.src.start }
    }

    fn unsupported(&self, what: &'static str) -> ParseError {
        ParseError::Unsupported { what, offset: self.start() }
    }

    /// Skips a balanced `open ... close` group. The current token must be `open`.
    fn skip_balanced(&mut self, open: TokenKind, close: TokenKind) -> PResult<()> {
        let mut depth = 0usize;
        loop {
            let kind = self.bump().kind;
            if kind == open {
                depth += 1;
            } else if kind == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            } else if kind == TokenKind::Eof {
                return Err(self.error_expected("closing delimiter"));
            }
        }
    }

    fn skip_attributes(&mut self) -> PResult<()> {
        while self.peek() == TokenKind::LBracket {
            self.skip_balanced(TokenKind::LBracket, TokenKind::RBracket)?;
        }
        Ok(())
    }

    fn skip_past_semicolon(&mut self) {
        while !matches!(self.bump().kind, TokenKind::Semi | TokenKind::Eof) {}
    }

    /// Index of the token closing the parenthesis at `open`.
    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                TokenKind::Eof | TokenKind::Semi | TokenKind::LBrace => return None,
                _ => {}
            }
        }
        None
    }

    // ---------------------------------------------------------------------
    // Items and members
    // ---------------------------------------------------------------------

    fn parse_items(&mut self, in_namespace_block: bool) -> PResult<()> {
        loop {
            match self.peek() {
                TokenKind::Eof => return Ok(()),
                TokenKind::RBrace if in_namespace_block => return Ok(()),
                TokenKind::Using if self.at_using_directive() => self.skip_past_semicolon(),
                TokenKind::Namespace => {
                    self.bump();
                    self.parse_qualified_name()?;
                    if !self.eat(TokenKind::Semi) {
                        self.expect(TokenKind::LBrace, "`{` or `;` after namespace name")?;
                        self.parse_items(true)?;
                        self.expect(TokenKind::RBrace, "`}`")?;
                    }
                }
                TokenKind::LBracket => self.skip_attributes()?,
                _ if self.at_type_decl() => self.parse_type_decl()?,
                _ => {
                    let id = self.parse_statement()?;
                    self.program.items.push(Item::TopLevel(id));
                }
            }
        }
    }

    fn at_using_directive(&self) -> bool {
        match self.peek_at(1) {
            TokenKind::Static => true,
            TokenKind::Ident => !self.at_word_at(1, "var"),
            _ => false,
        }
    }

    fn at_type_decl(&self) -> bool {
        let mut n = 0;
        while self.peek_at(n).is_modifier() {
            n += 1;
        }
        matches!(self.peek_at(n), TokenKind::Class | TokenKind::OtherTypeDecl)
    }

    fn parse_qualified_name(&mut self) -> PResult<String> {
        let mut name = self.expect_ident()?.name;
        while self.eat(TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_ident()?.name);
        }
        Ok(name)
    }

    fn parse_type_decl(&mut self) -> PResult<()> {
        let start = self.start();
        while self.peek().is_modifier() {
            self.bump();
        }
        if self.bump().kind == TokenKind::OtherTypeDecl {
            // enums, interfaces, records and delegates declare no variables
            // the snippet body can observe
            while !matches!(self.peek(), TokenKind::LBrace | TokenKind::Semi | TokenKind::Eof) {
                if self.peek() == TokenKind::LParen {
                    self.skip_balanced(TokenKind::LParen, TokenKind::RParen)?;
                } else {
                    self.bump();
                }
            }
            if self.peek() == TokenKind::LBrace {
                self.skip_balanced(TokenKind::LBrace, TokenKind::RBrace)?;
                self.eat(TokenKind::Semi);
            } else {
                self.expect(TokenKind::Semi, "`;`")?;
            }
            return Ok(());
        }

        let name = self.expect_ident()?;
        if self.peek() == TokenKind::Lt {
            self.skip_balanced(TokenKind::Lt, TokenKind::Gt)?;
        }
        if self.peek() == TokenKind::LParen {
            return Err(self.unsupported("primary constructor"));
        }
        // base list and constraints
        while !matches!(self.peek(), TokenKind::LBrace | TokenKind::Eof) {
            self.bump();
        }
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut members = vec![];
        while !matches!(self.peek(), TokenKind::RBrace | TokenKind::Eof) {
            self.parse_member(&name.name, &mut members)?;
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        self.eat(TokenKind::Semi);

        let src = self.range_from(start);
        self.program.items.push(Item::Class(ClassDecl { name, src, members }));
        Ok(())
    }

    fn parse_member(&mut self, class_name: &str, members: &mut Vec<Member>) -> PResult<()> {
        if self.peek() == TokenKind::LBracket {
            return self.skip_attributes();
        }
        let start = self.start();
        let mut is_static = false;
        loop {
            match self.peek() {
                TokenKind::Static | TokenKind::Const => is_static = true,
                TokenKind::Modifier => {}
                TokenKind::New if self.peek_at(1) != TokenKind::LParen => {}
                _ => break,
            }
            self.bump();
        }
        match self.peek() {
            TokenKind::Class | TokenKind::OtherTypeDecl => {
                return Err(self.unsupported("nested type declaration"))
            }
            TokenKind::Tilde => return Err(self.unsupported("finalizer")),
            TokenKind::Unsupported => return Err(self.unsupported("member kind")),
            _ => {}
        }

        // constructor
        if self.at_word(class_name) && self.peek_at(1) == TokenKind::LParen {
            let name = self.expect_ident()?;
            let params = self.parse_params()?;
            if self.eat(TokenKind::Colon) {
                // `: base(..)` / `: this(..)`
                self.bump();
                self.skip_balanced(TokenKind::LParen, TokenKind::RParen)?;
            }
            let body = self.parse_method_body()?;
            let src = self.range_from(start);
            members.push(Member::Method(MethodDecl { name, src, is_static, params, body }));
            return Ok(());
        }

        let ty = self.try_parse_type().ok_or_else(|| self.error_expected("member type"))?;
        if self.peek() == TokenKind::This {
            return Err(self.unsupported("indexer"));
        }
        let name = self.expect_ident()?;
        if self.peek() == TokenKind::Lt {
            self.skip_balanced(TokenKind::Lt, TokenKind::Gt)?;
        }

        match self.peek() {
            TokenKind::LParen => {
                let params = self.parse_params()?;
                // generic constraints
                while self.at_word("where") {
                    while !matches!(
                        self.peek(),
                        TokenKind::LBrace | TokenKind::Arrow | TokenKind::Semi | TokenKind::Eof
                    ) {
                        self.bump();
                    }
                }
                let body = self.parse_method_body()?;
                let src = self.range_from(start);
                members.push(Member::Method(MethodDecl { name, src, is_static, params, body }));
            }
            TokenKind::LBrace => {
                // properties are observed like fields
                self.skip_balanced(TokenKind::LBrace, TokenKind::RBrace)?;
                let init = if self.eat(TokenKind::Eq) {
                    let init = self.parse_expr()?;
                    self.expect(TokenKind::Semi, "`;`")?;
                    Some(init)
                } else {
                    None
                };
                let src = self.range_from(start);
                members.push(Member::Field(FieldDecl { name, ty, src, is_static, init }));
            }
            TokenKind::Arrow => {
                self.bump();
                let init = Some(self.parse_expr()?);
                self.expect(TokenKind::Semi, "`;`")?;
                let src = self.range_from(start);
                members.push(Member::Field(FieldDecl { name, ty, src, is_static, init }));
            }
            _ => {
                let mut declared = vec![];
                let mut name = name;
                loop {
                    let init = if self.eat(TokenKind::Eq) { Some(self.parse_expr()?) } else { None };
                    declared.push((name, init));
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                    name = self.expect_ident()?;
                }
                self.expect(TokenKind::Semi, "`;` after field declaration")?;
                let src = self.range_from(start);
                for (name, init) in declared {
                    members.push(Member::Field(FieldDecl {
                        name,
                        ty: ty.clone(),
                        src,
                        is_static,
                        init,
                    }));
                }
            }
        }
        Ok(())
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut params = vec![];
        if self.eat(TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            self.skip_attributes()?;
            while matches!(
                self.peek(),
                TokenKind::This | TokenKind::Params | TokenKind::Ref | TokenKind::Out | TokenKind::In
            ) {
                self.bump();
            }
            let ty = self.try_parse_type().ok_or_else(|| self.error_expected("parameter type"))?;
            let name = self.expect_ident()?;
            if self.eat(TokenKind::Eq) {
                self.parse_expr()?;
            }
            params.push(Param { name, ty });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(params)
    }

    fn parse_method_body(&mut self) -> PResult<MethodBody> {
        match self.peek() {
            TokenKind::LBrace => Ok(MethodBody::Block(self.parse_statement()?)),
            TokenKind::Arrow => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi, "`;`")?;
                Ok(MethodBody::Expr(expr))
            }
            TokenKind::Semi => {
                self.bump();
                Ok(MethodBody::None)
            }
            _ => Err(self.error_expected("method body")),
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn parse_statement(&mut self) -> PResult<StmtId> {
        let id = self.program.reserve();
        let start = self.start();
        let kind = match self.peek() {
            TokenKind::LBrace => {
                self.bump();
                let mut stmts = vec![];
                while !matches!(self.peek(), TokenKind::RBrace | TokenKind::Eof) {
                    stmts.push(self.parse_statement()?);
                }
                self.expect(TokenKind::RBrace, "`}`")?;
                StmtKind::Block(stmts)
            }
            TokenKind::Semi => {
                self.bump();
                StmtKind::Empty
            }
            TokenKind::If => {
                self.bump();
                let cond = self.parse_paren_condition()?;
                let then = self.parse_statement()?;
                let otherwise =
                    if self.eat(TokenKind::Else) { Some(self.parse_statement()?) } else { None };
                StmtKind::If { cond, then, otherwise }
            }
            TokenKind::While => {
                self.bump();
                let cond = self.parse_paren_condition()?;
                let body = self.parse_statement()?;
                StmtKind::While { cond, body }
            }
            TokenKind::Do => {
                self.bump();
                let body = self.parse_statement()?;
                self.expect(TokenKind::While, "`while`")?;
                let cond = self.parse_paren_condition()?;
                self.expect(TokenKind::Semi, "`;`")?;
                StmtKind::DoWhile { body, cond }
            }
            TokenKind::For => self.parse_for()?,
            TokenKind::Foreach => {
                self.bump();
                self.expect(TokenKind::LParen, "`(`")?;
                let ty =
                    self.try_parse_type().ok_or_else(|| self.error_expected("iteration type"))?;
                let var = self.expect_ident()?;
                self.expect(TokenKind::In, "`in`")?;
                let iterable = self.parse_expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                let body = self.parse_statement()?;
                StmtKind::ForEach { ty, var, iterable, body }
            }
            TokenKind::Return | TokenKind::Throw => {
                let is_return = self.bump().kind == TokenKind::Return;
                let value = if self.peek() == TokenKind::Semi { None } else { Some(self.parse_expr()?) };
                self.expect(TokenKind::Semi, "`;`")?;
                if is_return {
                    StmtKind::Return(value)
                } else {
                    StmtKind::Throw(value)
                }
            }
            TokenKind::Break => {
                self.bump();
                self.expect(TokenKind::Semi, "`;`")?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.bump();
                self.expect(TokenKind::Semi, "`;`")?;
                StmtKind::Continue
            }
            TokenKind::Try => self.parse_try()?,
            TokenKind::Using => return Err(self.unsupported("using statement")),
            TokenKind::Unsupported => return Err(self.unsupported("statement kind")),
            _ => {
                let kind = if self.at_local_decl() {
                    StmtKind::LocalDecl(self.parse_local_decl()?)
                } else {
                    StmtKind::Expr(self.parse_expr()?)
                };
                self.expect(TokenKind::Semi, "`;`")?;
                kind
            }
        };
        let src = self.range_from(start);
        self.program.fill(id, Stmt { src, kind });
        Ok(id)
    }

    fn parse_block(&mut self) -> PResult<StmtId> {
        if self.peek() != TokenKind::LBrace {
            return Err(self.error_expected("`{`"));
        }
        self.parse_statement()
    }

    fn parse_paren_condition(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::LParen, "`(`")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(cond)
    }

    fn parse_for(&mut self) -> PResult<StmtKind> {
        self.bump();
        self.expect(TokenKind::LParen, "`(`")?;
        let init = if self.peek() == TokenKind::Semi {
            ForInit::None
        } else if self.at_local_decl() {
            ForInit::Decl(self.parse_local_decl()?)
        } else {
            ForInit::Exprs(self.parse_expr_list(TokenKind::Semi)?)
        };
        self.expect(TokenKind::Semi, "`;`")?;
        let cond = if self.peek() == TokenKind::Semi { None } else { Some(self.parse_expr()?) };
        self.expect(TokenKind::Semi, "`;`")?;
        let step = if self.peek() == TokenKind::RParen {
            vec![]
        } else {
            self.parse_expr_list(TokenKind::RParen)?
        };
        self.expect(TokenKind::RParen, "`)`")?;
        let body = self.parse_statement()?;
        Ok(StmtKind::For { init, cond, step, body })
    }

    fn parse_try(&mut self) -> PResult<StmtKind> {
        self.bump();
        let body = self.parse_block()?;
        let mut catches = vec![];
        while self.peek() == TokenKind::Catch {
            let start = self.bump().src.start;
            let (mut ty, mut var) = (None, None);
            if self.eat(TokenKind::LParen) {
                ty = Some(
                    self.try_parse_type().ok_or_else(|| self.error_expected("exception type"))?,
                );
                if self.peek() == TokenKind::Ident {
                    var = Some(self.expect_ident()?);
                }
                self.expect(TokenKind::RParen, "`)`")?;
            }
            if self.at_word("when") {
                return Err(self.unsupported("exception filter"));
            }
            let body = self.parse_block()?;
            catches.push(CatchClause { src: self.range_from(start), ty, var, body });
        }
        let finally = if self.eat(TokenKind::Finally) { Some(self.parse_block()?) } else { None };
        if catches.is_empty() && finally.is_none() {
            return Err(self.error_expected("`catch` or `finally`"));
        }
        Ok(StmtKind::Try { body, catches, finally })
    }

    /// Speculatively checks for `T name [= | , | ;]` without consuming input.
    fn at_local_decl(&mut self) -> bool {
        if self.peek() == TokenKind::Const {
            return true;
        }
        let save = self.pos;
        let is_decl = match self.try_parse_type() {
            Some(ty) => {
                ty.text != "await"
                    && self.peek() == TokenKind::Ident
                    && matches!(
                        self.peek_at(1),
                        TokenKind::Eq | TokenKind::Semi | TokenKind::Comma
                    )
            }
            None => false,
        };
        self.pos = save;
        is_decl
    }

    fn parse_local_decl(&mut self) -> PResult<LocalDecl> {
        self.eat(TokenKind::Const);
        let ty = self.try_parse_type().ok_or_else(|| self.error_expected("type"))?;
        let mut declarators = vec![];
        loop {
            let name = self.expect_ident()?;
            let init = if self.eat(TokenKind::Eq) {
                if self.peek() == TokenKind::LBrace {
                    let start = self.start();
                    let items = self.parse_initializer()?;
                    Some(Expr::new(
                        self.range_from(start),
                        ExprKind::NewArray { elem: None, sizes: vec![], initializer: Some(items) },
                    ))
                } else {
                    Some(self.parse_expr()?)
                }
            } else {
                None
            };
            declarators.push(Declarator { name, init });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(LocalDecl { ty, declarators })
    }

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------

    /// Parses a type if one starts here; otherwise consumes nothing.
    fn try_parse_type(&mut self) -> Option<TypeName> {
        let save = self.pos;
        let start = self.start();
        let mut text = String::new();

        if self.peek() == TokenKind::LParen {
            self.bump();
            let mut elems = vec![];
            loop {
                let Some(elem) = self.try_parse_type() else {
                    self.pos = save;
                    return None;
                };
                if self.peek() == TokenKind::Ident {
                    self.bump();
                }
                elems.push(elem.text);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            if elems.len() < 2 || !self.eat(TokenKind::RParen) {
                self.pos = save;
                return None;
            }
            text = format!("({})", elems.join(", "));
        } else {
            loop {
                if self.peek() != TokenKind::Ident {
                    self.pos = save;
                    return None;
                }
                let token = self.bump();
                text.push_str(self.text(token));
                if self.peek() == TokenKind::Lt {
                    if let Some(args) = self.try_parse_type_args() {
                        text.push_str(&format!("<{}>", args.join(", ")));
                    }
                }
                if self.peek() == TokenKind::Dot && self.peek_at(1) == TokenKind::Ident {
                    self.bump();
                    text.push('.');
                    continue;
                }
                break;
            }
        }

        if self.peek() == TokenKind::Question && self.adjacent_to_previous() {
            self.bump();
            text.push('?');
        }
        while self.peek() == TokenKind::LBracket
            && matches!(self.peek_at(1), TokenKind::RBracket | TokenKind::Comma)
        {
            self.bump();
            text.push('[');
            while self.eat(TokenKind::Comma) {
                text.push(',');
            }
            if !self.eat(TokenKind::RBracket) {
                self.pos = save;
                return None;
            }
            text.push(']');
        }
        Some(TypeName { text, src: self.range_from(start) })
    }

    fn try_parse_type_args(&mut self) -> Option<Vec<String>> {
        let save = self.pos;
        self.bump();
        let mut args = vec![];
        loop {
            let Some(arg) = self.try_parse_type() else {
                self.pos = save;
                return None;
            };
            args.push(arg.text);
            if self.eat(TokenKind::Comma) {
                continue;
            }
            if self.eat(TokenKind::Gt) {
                return Some(args);
            }
            self.pos = save;
            return None;
        }
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn parse_expr_list(&mut self, end: TokenKind) -> PResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.peek() != end && self.eat(TokenKind::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self) -> PResult<Expr> {
        if let Some(lambda) = self.try_parse_lambda()? {
            return Ok(lambda);
        }
        if self.at_word("from")
            && self.peek_at(1) == TokenKind::Ident
            && self.peek_at(2) == TokenKind::In
        {
            return self.parse_query();
        }

        let start = self.start();
        let target = self.parse_conditional()?;
        let op = match self.peek() {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::CompoundAssign => match self.text(self.token()) {
                "+=" => AssignOp::Add,
                "-=" => AssignOp::Sub,
                "*=" => AssignOp::Mul,
                "/=" => AssignOp::Div,
                "%=" => AssignOp::Rem,
                "&=" => AssignOp::And,
                "|=" => AssignOp::Or,
                "^=" => AssignOp::Xor,
                "??=" => AssignOp::Coalesce,
                _ => AssignOp::Shl,
            },
            _ => return Ok(target),
        };
        self.bump();
        let value = self.parse_expr()?;
        Ok(Expr::new(
            self.range_from(start),
            ExprKind::Assign { op, target: Box::new(target), value: Box::new(value) },
        ))
    }

    fn try_parse_lambda(&mut self) -> PResult<Option<Expr>> {
        let save = self.pos;
        let start = self.start();
        if self.at_word("async") {
            self.bump();
        }
        let params = if self.peek() == TokenKind::Ident && self.peek_at(1) == TokenKind::Arrow {
            vec![self.expect_ident()?]
        } else if self.peek() == TokenKind::LParen
            && self
                .matching_paren(self.pos)
                .and_then(|close| self.tokens.get(close + 1))
                .is_some_and(|t| t.kind == TokenKind::Arrow)
        {
            self.parse_lambda_params()?
        } else {
            self.pos = save;
            return Ok(None);
        };
        self.expect(TokenKind::Arrow, "`=>`")?;
        if self.peek() == TokenKind::LBrace {
            return Err(self.unsupported("block-bodied lambda"));
        }
        let body = self.parse_expr()?;
        Ok(Some(Expr::new(
            self.range_from(start),
            ExprKind::Lambda { params, body: Box::new(body) },
        )))
    }

    /// `()`, `(a, b)` or `(int a, List<int> b)`; the last identifier of each
    /// group names the parameter.
    fn parse_lambda_params(&mut self) -> PResult<Vec<Ident>> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut params = vec![];
        let mut last: Option<Ident> = None;
        let mut angle = 0usize;
        loop {
            match self.peek() {
                TokenKind::RParen => {
                    self.bump();
                    break;
                }
                TokenKind::Comma if angle == 0 => {
                    self.bump();
                    params.extend(last.take());
                }
                TokenKind::Lt => {
                    angle += 1;
                    self.bump();
                }
                TokenKind::Gt => {
                    angle = angle.saturating_sub(1);
                    self.bump();
                }
                TokenKind::Ident => last = Some(self.expect_ident()?),
                TokenKind::Eof => return Err(self.error_expected("`)`")),
                _ => {
                    self.bump();
                }
            }
        }
        params.extend(last);
        Ok(params)
    }

    fn parse_query(&mut self) -> PResult<Expr> {
        let start = self.start();
        let mut clauses = vec![];
        loop {
            let token = self.token();
            let word = if token.kind == TokenKind::Ident { self.text(token) } else { "" };
            match word {
                "from" => {
                    self.bump();
                    let var = self.expect_ident()?;
                    self.expect(TokenKind::In, "`in`")?;
                    let source = self.parse_expr()?;
                    clauses.push(QueryClause::From { var, source });
                }
                "let" => {
                    self.bump();
                    let var = self.expect_ident()?;
                    self.expect(TokenKind::Eq, "`=`")?;
                    let value = self.parse_expr()?;
                    clauses.push(QueryClause::Let { var, value });
                }
                "where" => {
                    self.bump();
                    clauses.push(QueryClause::Where(self.parse_expr()?));
                }
                "orderby" => {
                    self.bump();
                    let mut keys = vec![];
                    loop {
                        let key = self.parse_expr()?;
                        let descending = self.at_word("descending");
                        if descending || self.at_word("ascending") {
                            self.bump();
                        }
                        keys.push((key, descending));
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    clauses.push(QueryClause::OrderBy(keys));
                }
                "select" => {
                    self.bump();
                    let select = Box::new(self.parse_expr()?);
                    return Ok(Expr::new(
                        self.range_from(start),
                        ExprKind::Query(QueryExpr { clauses, select }),
                    ));
                }
                "group" | "join" | "into" => return Err(self.unsupported("query clause")),
                _ => return Err(self.error_expected("query clause")),
            }
        }
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let start = self.start();
        let cond = self.parse_binary(0)?;
        if self.peek() != TokenKind::Question {
            return Ok(cond);
        }
        self.bump();
        let then = self.parse_expr()?;
        self.expect(TokenKind::Colon, "`:`")?;
        let otherwise = self.parse_expr()?;
        Ok(Expr::new(
            self.range_from(start),
            ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
        ))
    }

    /// The binary operator at the cursor and how many tokens spell it.
    fn peek_binary_op(&self) -> Option<(BinaryOp, usize)> {
        let op = match self.peek() {
            TokenKind::PipePipe => BinaryOp::Or,
            TokenKind::AmpAmp => BinaryOp::And,
            TokenKind::QuestionQuestion => BinaryOp::Coalesce,
            TokenKind::Pipe => BinaryOp::BitOr,
            TokenKind::Caret => BinaryOp::BitXor,
            TokenKind::Amp => BinaryOp::BitAnd,
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::Gt if self.peek_at(1) == TokenKind::Gt && self.next_is_adjacent() => {
                return Some((BinaryOp::Shr, 2))
            }
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Shl => BinaryOp::Shl,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Rem,
            _ => return None,
        };
        Some((op, 1))
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        const RELATIONAL: u8 = 8;

        let start = self.start();
        let mut lhs = self.parse_unary()?;
        loop {
            if matches!(self.peek(), TokenKind::Is | TokenKind::As) && RELATIONAL >= min_prec {
                let kind = if self.bump().kind == TokenKind::Is {
                    ExprKind::Is { expr: Box::new(lhs), pattern: self.parse_pattern()? }
                } else {
                    let ty = self.try_parse_type().ok_or_else(|| self.error_expected("type"))?;
                    ExprKind::As { expr: Box::new(lhs), ty }
                };
                lhs = Expr::new(self.range_from(start), kind);
                continue;
            }

            let Some((op, width)) = self.peek_binary_op() else { break };
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            for _ in 0..width {
                self.bump();
            }
            let next_min = if op.is_right_associative() { prec } else { prec + 1 };
            let rhs = self.parse_binary(next_min)?;
            lhs = Expr::new(
                self.range_from(start),
                ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            );
        }
        Ok(lhs)
    }

    fn parse_pattern(&mut self) -> PResult<Pattern> {
        match self.peek() {
            TokenKind::Null
            | TokenKind::Number
            | TokenKind::String
            | TokenKind::Char
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Minus => Ok(Pattern::Constant(Box::new(self.parse_unary()?))),
            _ if self.at_word("not") => Err(self.unsupported("negated pattern")),
            _ => {
                let ty = self.try_parse_type().ok_or_else(|| self.error_expected("pattern"))?;
                let binding = if self.peek() == TokenKind::Ident
                    && !CONTEXTUAL_STOPS.contains(&self.text(self.token()))
                {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                Ok(Pattern::Type { ty, binding })
            }
        }
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let start = self.start();
        let op = match self.peek() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::PlusPlus => Some(UnaryOp::PreInc),
            TokenKind::MinusMinus => Some(UnaryOp::PreDec),
            TokenKind::Ident
                if self.at_word("await")
                    && !matches!(
                        self.peek_at(1),
                        TokenKind::Semi
                            | TokenKind::Dot
                            | TokenKind::LParen
                            | TokenKind::Eq
                            | TokenKind::RParen
                    ) =>
            {
                Some(UnaryOp::Await)
            }
            TokenKind::LParen => {
                if let Some(cast) = self.try_parse_cast()? {
                    return Ok(cast);
                }
                None
            }
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                self.range_from(start),
                ExprKind::Unary { op, operand: Box::new(operand) },
            ));
        }
        let primary = self.parse_primary()?;
        self.parse_postfix(start, primary)
    }

    fn try_parse_cast(&mut self) -> PResult<Option<Expr>> {
        let save = self.pos;
        let start = self.start();
        self.bump();
        let is_cast = match self.try_parse_type() {
            Some(ty) if self.eat(TokenKind::RParen) => matches!(
                self.peek(),
                TokenKind::Ident
                    | TokenKind::Number
                    | TokenKind::String
                    | TokenKind::Char
                    | TokenKind::Interpolated
                    | TokenKind::LParen
                    | TokenKind::This
                    | TokenKind::New
                    | TokenKind::Bang
                    | TokenKind::Tilde
                    | TokenKind::True
                    | TokenKind::False
                    | TokenKind::Null
            )
            .then_some(ty),
            _ => None,
        };
        let Some(ty) = is_cast else {
            self.pos = save;
            return Ok(None);
        };
        let expr = self.parse_unary()?;
        Ok(Some(Expr::new(self.range_from(start), ExprKind::Cast { ty, expr: Box::new(expr) })))
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.token();
        let literal = |kind| ExprKind::Literal(Literal { kind, text: self.text(token).to_string() });
        let kind = match token.kind {
            TokenKind::Number => literal(LiteralKind::Number),
            TokenKind::String => literal(LiteralKind::String),
            TokenKind::Char => literal(LiteralKind::Char),
            TokenKind::True => literal(LiteralKind::Bool(true)),
            TokenKind::False => literal(LiteralKind::Bool(false)),
            TokenKind::Null => literal(LiteralKind::Null),
            TokenKind::This => ExprKind::This,
            TokenKind::Interpolated => {
                self.bump();
                return self.parse_interpolated(token);
            }
            TokenKind::New => return self.parse_new(),
            TokenKind::LParen => return self.parse_paren_or_tuple(),
            TokenKind::Ident => {
                let mut ident = self.expect_ident()?;
                if self.peek() == TokenKind::Lt {
                    let save = self.pos;
                    match self.try_parse_type_args() {
                        Some(args) if self.peek() == TokenKind::LParen => {
                            ident.name = format!("{}<{}>", ident.name, args.join(", "));
                            ident.src = self.range_from(token.src.start);
                        }
                        _ => self.pos = save,
                    }
                }
                return Ok(Expr::new(ident.src, ExprKind::Ident(ident)));
            }
            TokenKind::LBracket => return Err(self.unsupported("collection expression")),
            _ => return Err(self.error_expected("expression")),
        };
        self.bump();
        Ok(Expr::new(token.src, kind))
    }

    fn parse_paren_or_tuple(&mut self) -> PResult<Expr> {
        let start = self.start();
        self.bump();
        let first = self.parse_expr()?;
        if self.eat(TokenKind::Comma) {
            let mut items = vec![first];
            items.extend(self.parse_expr_list(TokenKind::RParen)?);
            self.expect(TokenKind::RParen, "`)`")?;
            return Ok(Expr::new(self.range_from(start), ExprKind::Tuple(items)));
        }
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(Expr::new(self.range_from(start), ExprKind::Paren(Box::new(first))))
    }

    fn parse_postfix(&mut self, start: usize, mut expr: Expr) -> PResult<Expr> {
        loop {
            let kind = match self.peek() {
                TokenKind::Dot => {
                    self.bump();
                    let name = self.parse_member_name()?;
                    ExprKind::Member { target: Box::new(expr), name }
                }
                // null-conditional member access
                TokenKind::Question
                    if self.peek_at(1) == TokenKind::Dot && self.next_is_adjacent() =>
                {
                    self.bump();
                    self.bump();
                    let name = self.parse_member_name()?;
                    ExprKind::Member { target: Box::new(expr), name }
                }
                TokenKind::LParen => {
                    let args = self.parse_args()?;
                    ExprKind::Call { callee: Box::new(expr), args }
                }
                TokenKind::LBracket => {
                    self.bump();
                    let args = self.parse_expr_list(TokenKind::RBracket)?;
                    self.expect(TokenKind::RBracket, "`]`")?;
                    ExprKind::Index { target: Box::new(expr), args }
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let op = if self.bump().kind == TokenKind::PlusPlus {
                        UnaryOp::PostInc
                    } else {
                        UnaryOp::PostDec
                    };
                    ExprKind::Unary { op, operand: Box::new(expr) }
                }
                // null-forgiving
                TokenKind::Bang if self.adjacent_to_previous() => {
                    self.bump();
                    continue;
                }
                _ => return Ok(expr),
            };
            expr = Expr::new(self.range_from(start), kind);
        }
    }

    fn parse_member_name(&mut self) -> PResult<Ident> {
        let mut name = self.expect_ident()?;
        if self.peek() == TokenKind::Lt {
            let save = self.pos;
            match self.try_parse_type_args() {
                Some(args) if self.peek() == TokenKind::LParen => {
                    name.name = format!("{}<{}>", name.name, args.join(", "));
                    name.src = self.range_from(name.src.start);
                }
                _ => self.pos = save,
            }
        }
        Ok(name)
    }

    fn parse_args(&mut self) -> PResult<Vec<Argument>> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut args = vec![];
        if self.eat(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_argument()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(args)
    }

    fn parse_argument(&mut self) -> PResult<Argument> {
        if self.peek() == TokenKind::Ident && self.peek_at(1) == TokenKind::Colon {
            self.bump();
            self.bump();
        }
        let modifier = match self.peek() {
            TokenKind::Out => Some(ArgModifier::Out),
            TokenKind::Ref => Some(ArgModifier::Ref),
            TokenKind::In => Some(ArgModifier::In),
            _ => None,
        };
        if modifier.is_some() {
            self.bump();
        }
        if modifier == Some(ArgModifier::Out) {
            let save = self.pos;
            let start = self.start();
            if let Some(ty) = self.try_parse_type() {
                if self.peek() == TokenKind::Ident
                    && matches!(self.peek_at(1), TokenKind::Comma | TokenKind::RParen)
                {
                    let name = self.expect_ident()?;
                    let expr =
                        Expr::new(self.range_from(start), ExprKind::Declaration { ty, name });
                    return Ok(Argument { modifier, expr });
                }
            }
            self.pos = save;
        }
        Ok(Argument { modifier, expr: self.parse_expr()? })
    }

    fn parse_new(&mut self) -> PResult<Expr> {
        let start = self.start();
        self.bump();
        let kind = match self.peek() {
            TokenKind::LBracket => {
                self.bump();
                self.expect(TokenKind::RBracket, "`]`")?;
                let initializer = Some(self.parse_initializer()?);
                ExprKind::NewArray { elem: None, sizes: vec![], initializer }
            }
            TokenKind::LParen => {
                let args = Some(self.parse_args()?);
                let initializer = self.parse_optional_initializer()?;
                ExprKind::New { ty: None, args, initializer }
            }
            TokenKind::LBrace => {
                let initializer = Some(self.parse_initializer()?);
                ExprKind::New { ty: None, args: None, initializer }
            }
            _ => {
                let ty = self.try_parse_type().ok_or_else(|| self.error_expected("type"))?;
                if self.peek() == TokenKind::LBracket {
                    self.bump();
                    let sizes = self.parse_expr_list(TokenKind::RBracket)?;
                    self.expect(TokenKind::RBracket, "`]`")?;
                    let initializer = self.parse_optional_initializer()?;
                    ExprKind::NewArray { elem: Some(ty), sizes, initializer }
                } else if let Some(rank) = ty.text.rfind('[') {
                    let elem = TypeName { text: ty.text[..rank].to_string(), src: ty.src };
                    let initializer = Some(self.parse_initializer()?);
                    ExprKind::NewArray { elem: Some(elem), sizes: vec![], initializer }
                } else {
                    let args = if self.peek() == TokenKind::LParen {
                        Some(self.parse_args()?)
                    } else {
                        None
                    };
                    let initializer = self.parse_optional_initializer()?;
                    ExprKind::New { ty: Some(ty), args, initializer }
                }
            }
        };
        Ok(Expr::new(self.range_from(start), kind))
    }

    fn parse_optional_initializer(&mut self) -> PResult<Option<Vec<Expr>>> {
        if self.peek() == TokenKind::LBrace {
            Ok(Some(self.parse_initializer()?))
        } else {
            Ok(None)
        }
    }

    fn parse_initializer(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut items = vec![];
        while !matches!(self.peek(), TokenKind::RBrace | TokenKind::Eof) {
            if self.peek() == TokenKind::LBrace {
                return Err(self.unsupported("nested initializer"));
            }
            items.push(self.parse_expr()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(items)
    }

    /// Parses the holes of an interpolated string literal.
    fn parse_interpolated(&mut self, token: Token) -> PResult<Expr> {
        let text = self.text(token);
        let base = token.src.start;
        let end = text.len() - 1;
        let mut holes = vec![];
        let mut chars = text.char_indices().skip(2).peekable();
        while let Some((i, c)) = chars.next() {
            if i >= end {
                break;
            }
            match c {
                '\\' => {
                    chars.next();
                }
                '{' if chars.peek().is_some_and(|(_, next)| *next == '{') => {
                    chars.next();
                }
                '{' => {
                    let (hole, close) = hole_extent(text, i + 1).ok_or(ParseError::Expected {
                        expected: "`}` closing interpolation hole",
                        found: text.to_string(),
                        offset: base + i,
                    })?;
                    holes.push(self.parse_fragment(SourceRange::new(base + hole.0, base + hole.1))?);
                    while chars.peek().is_some_and(|(j, _)| *j <= close) {
                        chars.next();
                    }
                }
                _ => {}
            }
        }
        Ok(Expr::new(token.src, ExprKind::Interpolated { text: text.to_string(), holes }))
    }

    /// Parses `range` of the source as a standalone expression.
    fn parse_fragment(&mut self, range: SourceRange) -> PResult<Expr> {
        let tokens = tokenize(&self.source[range.start..range.next_loc()], range.start)?;
        let saved_tokens = std::mem::replace(&mut self.tokens, tokens);
        let saved_pos = std::mem::replace(&mut self.pos, 0);
        let result = match self.parse_expr() {
            Ok(expr) => self.expect(TokenKind::Eof, "end of interpolation hole").map(|_| expr),
            Err(e) => Err(e),
        };
        self.tokens = saved_tokens;
        self.pos = saved_pos;
        result
    }
}

/// Finds the expression part of an interpolation hole starting at `from`
/// (just past `{`): returns its byte range within `text` and the offset of
/// the closing `}`. Alignment and format specifiers are excluded.
fn hole_extent(text: &str, from: usize) -> Option<((usize, usize), usize)> {
    let mut depth = 0usize;
    let mut expr_end = None;
    for (i, c) in text[from..].char_indices() {
        let at = from + i;
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '}' if depth > 0 => depth -= 1,
            '}' => return Some(((from, expr_end.unwrap_or(at)), at)),
            ':' | ',' if depth == 0 && expr_end.is_none() => expr_end = Some(at),
            _ => {}
        }
    }
    None
}
