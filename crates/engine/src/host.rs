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

//! Running instrumented programs.
//!
//! Compiling and executing a program is left to a [`ProcessHost`]; this
//! module drives one request from snippet to decoded trace around it.

use eyre::Result;
use snaptrace_common::{ProgramOutputStreams, SourceRange};
use tracing::info;

use crate::{
    instrument, map_relative_to_viewport, trace::decode_trace, InstrumentationConfig,
    InstrumentedProgram, Viewport,
};

/// Compiles and runs an instrumented program.
pub trait ProcessHost {
    /// Runs `program.source` to completion and returns its standard output,
    /// one entry per line, without line terminators.
    fn compile_and_run(&self, program: &InstrumentedProgram) -> Result<Vec<String>>;
}

impl<H: ProcessHost + ?Sized> ProcessHost for &H {
    fn compile_and_run(&self, program: &InstrumentedProgram) -> Result<Vec<String>> {
        (**self).compile_and_run(program)
    }
}

/// A traced snippet: what was run and what it reported.
#[derive(Debug, Clone)]
pub struct SnippetTrace {
    /// The program handed to the host, with viewport-relative augmentations
    /// and locations when a viewport was given.
    pub instrumented: InstrumentedProgram,
    /// The decoded run.
    pub trace: ProgramOutputStreams,
}

/// Runs an instrumented program on `host` and decodes its output.
pub fn run_and_decode<H: ProcessHost + ?Sized>(
    host: &H,
    program: &InstrumentedProgram,
) -> Result<ProgramOutputStreams> {
    let lines = host.compile_and_run(program)?;
    info!(file = %program.program.file, lines = lines.len(), "program finished");
    Ok(decode_trace(&lines, &program.sentinel))
}

/// Instruments, runs and decodes one snippet.
///
/// With a viewport, the augmentations and variable locations of the result
/// are relative to it. Snapshot positions are left in document coordinates.
pub fn trace_snippet<H: ProcessHost + ?Sized>(
    host: &H,
    file: &str,
    source: &str,
    regions: Option<&[SourceRange]>,
    config: &InstrumentationConfig,
    viewport: Option<&Viewport>,
) -> Result<SnippetTrace> {
    // Step 1: instrument the snippet
    info!(file, "Instrumenting snippet");
    let mut instrumented = instrument(file, source, regions, config)?;

    // Step 2: run it and decode the captured output
    info!(file, "Running instrumented snippet");
    let trace = run_and_decode(host, &instrumented)?;

    // Step 3: remap static positions for the displayed part of the document
    if viewport.is_some() {
        let augmentations = std::mem::take(&mut instrumented.augmentations);
        let locations = std::mem::take(&mut instrumented.locations);
        (instrumented.augmentations, instrumented.locations) =
            map_relative_to_viewport(augmentations, locations, source, viewport);
    }

    info!(file, states = trace.states.len(), "Traced snippet");
    Ok(SnippetTrace { instrumented, trace })
}

#[cfg(test)]
mod tests {
    use eyre::eyre;

    use super::*;

    struct FailingHost;

    impl ProcessHost for FailingHost {
        fn compile_and_run(&self, _program: &InstrumentedProgram) -> Result<Vec<String>> {
            Err(eyre!("compilation failed"))
        }
    }

    struct Silent;

    impl ProcessHost for Silent {
        fn compile_and_run(&self, _program: &InstrumentedProgram) -> Result<Vec<String>> {
            Ok(vec!["no instrumentation output".to_string()])
        }
    }

    #[test]
    fn test_host_errors_propagate() {
        let config = InstrumentationConfig::default();
        let err = trace_snippet(&FailingHost, "main.cs", "int a = 0;", None, &config, None)
            .unwrap_err();
        assert!(err.to_string().contains("compilation failed"));
    }

    #[test]
    fn test_instrumentation_errors_propagate() {
        let config = InstrumentationConfig::default();
        assert!(trace_snippet(&Silent, "main.cs", "int a = ;", None, &config, None).is_err());
    }

    #[test]
    fn test_output_without_blocks() {
        let config = InstrumentationConfig::default();
        let traced = trace_snippet(&Silent, "main.cs", "int a = 0;", None, &config, None).unwrap();
        assert!(traced.trace.states.is_empty());
        assert_eq!(traced.trace.std_out, ["no instrumentation output"]);
        assert_eq!(traced.instrumented.augmentations.len(), 1);
    }
}
