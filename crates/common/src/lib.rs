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

//! SnapTrace Common - Shared functionality for SnapTrace components
//!
//! This crate provides the pieces shared by the instrumentation engine and by
//! the runtime side of an instrumented program: source coordinates, the wire
//! types exchanged through standard output, the sentinel token and the
//! runtime emitter that writes snapshots.

/// Wire and coordinate types used throughout SnapTrace
pub mod types;

/// Runtime emitter that writes descriptor and snapshot blocks to an output stream
pub mod emitter;
/// Logging setup and utilities for consistent logging across SnapTrace components
pub mod logging;
/// Per-request sentinel tokens delimiting structured blocks in captured output
pub mod sentinel;

pub use emitter::*;
pub use logging::*;
pub use sentinel::*;
pub use types::*;
