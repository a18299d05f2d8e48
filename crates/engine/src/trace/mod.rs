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

//! Trace reconstruction.
//!
//! An instrumented program writes its own output and structured blocks to
//! the same stream. Structured blocks are framed by the per-request
//! [`Sentinel`]:
//!
//! ```text
//! S
//! {descriptor}
//! S
//! S
//! {state 1}
//! S
//! program output ...
//! S
//! {state 2}
//! S
//! program output ...
//! S
//! S
//! ```
//!
//! Every sentinel toggles between plain output and a structured block, and a
//! line made of `k` sentinels counts as `k` of them. Two adjacent sentinels
//! enclose an empty block, which only marks a boundary.

mod decoder;
pub use decoder::*;

use snaptrace_common::{ProgramOutputStreams, Sentinel};

/// Decodes the captured standard output of one run.
pub fn decode_trace<I, L>(lines: I, sentinel: &Sentinel) -> ProgramOutputStreams
where
    I: IntoIterator<Item = L>,
    L: AsRef<str>,
{
    TraceDecoder::new(sentinel).decode(lines)
}
