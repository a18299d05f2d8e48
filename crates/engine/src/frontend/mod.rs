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

//! Reference front end for C#-flavoured snippets.
//!
//! The engine only needs two things from a front end: a [`Program`] and a
//! [`crate::analysis::SymbolResolver`]. This module provides both for the
//! statement subset snippets typically use:
//!
//! - [`parse`] turns source text into a [`Program`]
//! - [`LexicalResolver`] answers which variables are in scope at an offset,
//!   from the lexical structure of the parsed program alone

mod lexer;
use lexer::*;

mod parser;
pub use parser::*;

mod resolver;
pub use resolver::*;

use thiserror::Error;

use crate::ast::Program;

/// Errors raised while reading a snippet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A character sequence that starts no token
    #[error("invalid token at offset {offset}")]
    InvalidToken {
        /// Byte offset of the offending input
        offset: usize,
    },

    /// The parser needed something else than what it found
    #[error("expected {expected} at offset {offset}, found `{found}`")]
    Expected {
        /// What would have been accepted
        expected: &'static str,
        /// The text that was found instead
        found: String,
        /// Byte offset of the found token
        offset: usize,
    },

    /// Valid syntax the reference front end does not model
    #[error("unsupported syntax at offset {offset}: {what}")]
    Unsupported {
        /// The construct that was rejected
        what: &'static str,
        /// Byte offset of the construct
        offset: usize,
    },
}

impl ParseError {
    /// Byte offset at which the error was detected.
    pub fn offset(&self) -> usize {
        match self {
            Self::InvalidToken { offset }
            | Self::Expected { offset, .. }
            | Self::Unsupported { offset, .. } => *offset,
        }
    }
}

/// Parses `source` as the contents of `file`.
pub fn parse(file: &str, source: &str) -> Result<Program, ParseError> {
    Parser::new(file, source)?.parse_program()
}
