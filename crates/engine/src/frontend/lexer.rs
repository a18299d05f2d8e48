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

//! Token definitions for the snippet language.
//!
//! Contextual keywords (`var`, `from`, `select`, ...) and predefined type
//! names are plain identifiers; the parser looks at their text. `>` is never
//! fused into `>>` so that nested generic argument lists close properly.

use logos::Logos;
use snaptrace_common::SourceRange;

use super::ParseError;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"#[^\n]*")]
#[logos(skip r"/\*[^*]*\*+([^/*][^*]*\*+)*/")]
pub enum TokenKind {
    // Keywords
    #[token("using")]
    Using,
    #[token("namespace")]
    Namespace,
    #[token("class")]
    #[token("struct")]
    Class,
    #[token("interface")]
    #[token("enum")]
    #[token("record")]
    #[token("delegate")]
    OtherTypeDecl,
    #[token("public")]
    #[token("private")]
    #[token("protected")]
    #[token("internal")]
    #[token("readonly")]
    #[token("abstract")]
    #[token("virtual")]
    #[token("override")]
    #[token("sealed")]
    #[token("partial")]
    #[token("async")]
    #[token("extern")]
    #[token("unsafe")]
    #[token("volatile")]
    Modifier,
    #[token("static")]
    Static,
    #[token("const")]
    Const,
    #[token("new")]
    New,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("for")]
    For,
    #[token("foreach")]
    Foreach,
    #[token("in")]
    In,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("throw")]
    Throw,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("this")]
    This,
    #[token("out")]
    Out,
    #[token("ref")]
    Ref,
    #[token("params")]
    Params,
    #[token("is")]
    Is,
    #[token("as")]
    As,
    #[token("switch")]
    #[token("lock")]
    #[token("yield")]
    #[token("goto")]
    #[token("fixed")]
    #[token("checked")]
    #[token("unchecked")]
    #[token("event")]
    #[token("operator")]
    Unsupported,

    // Literals and names
    #[regex(r"@?[A-Za-z_][A-Za-z0-9_]*")]
    Ident,
    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?([eE][+-]?[0-9]+)?[mMfFdDlLuU]*")]
    #[regex(r"0[xX][0-9a-fA-F_]+[uUlL]*")]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?[mMfFdD]?")]
    Number,
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[regex(r#"@"([^"]|"")*""#)]
    String,
    #[regex(r#"\$"([^"\\\n]|\\.)*""#)]
    Interpolated,
    #[regex(r"'([^'\\\n]|\\.[^'\n]*)'")]
    Char,

    // Punctuation
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("::")]
    ColonColon,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,
    #[token("??")]
    QuestionQuestion,
    #[token("=>")]
    Arrow,
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("<<")]
    Shl,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("%=")]
    #[token("&=")]
    #[token("|=")]
    #[token("^=")]
    #[token("??=")]
    #[token("<<=")]
    CompoundAssign,

    /// Synthetic end-of-input marker, never produced by logos.
    Eof,
}

impl TokenKind {
    /// Tokens that may appear in a member or local modifier list.
    pub fn is_modifier(self) -> bool {
        matches!(self, Self::Modifier | Self::Static | Self::Const)
    }
}

/// A token and where it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub src: SourceRange,
}

/// Tokenizes `source`. Offsets of the returned tokens are shifted by `base`,
/// which lets the parser re-lex slices such as interpolation holes.
pub fn tokenize(source: &str, base: usize) -> Result<Vec<Token>, ParseError> {
    let mut tokens = vec![];
    let mut lexer = TokenKind::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let src = SourceRange::new(base + span.start, base + span.end);
        match result {
            Ok(kind) => tokens.push(Token { kind, src }),
            Err(()) => return Err(ParseError::InvalidToken { offset: src.start }),
        }
    }
    tokens.push(Token { kind: TokenKind::Eof, src: SourceRange::empty_at(base + source.len()) });
    Ok(tokens)
}
