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

//! SnapTrace Engine - Scope analysis, instrumentation and trace decoding
//!
//! The engine turns a code snippet into a program that reports its own
//! state, and turns the output of that program back into an ordered trace:
//!
//! - [`analysis`] finds the variables observable before every statement
//! - [`instrumentation`] splices emission calls into the tree and the text
//! - [`trace`] separates program output from snapshots
//! - [`viewport`] remaps positions for a partially displayed document
//! - [`host`] drives a request through a [`ProcessHost`]
//!
//! [`frontend`] is a reference front end for brace-language snippets; any
//! other front end can produce an [`ast::Program`] and implement
//! [`SymbolResolver`] instead.

pub mod analysis;
pub use analysis::*;

pub mod ast;

pub mod config;
pub use config::*;

pub mod frontend;

pub mod host;
pub use host::*;

pub mod instrumentation;
pub use instrumentation::*;

pub mod trace;
pub use trace::*;

pub mod viewport;
pub use viewport::*;
