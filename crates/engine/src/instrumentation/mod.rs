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

//! Source instrumentation.
//!
//! Instrumentation turns a snippet into a program that reports its own state.
//! The pipeline runs in four passes over one request:
//!
//! 1. scope analysis ([`crate::analysis::analyze`]) decides which statements
//!    are instrumented and which variables each of them can observe
//! 2. [`AstRewriter`] splices an emission call after every such statement,
//!    with arguments built by [`ArgumentBuilder`]
//! 3. [`ReferenceValidator`] checks that every synthesized name denotes the
//!    captured variable
//! 4. [`SourceModifications`] renders the same insertions into the source
//!    text, keeping every original statement on its line

mod codegen;
pub use codegen::*;

mod modification;
pub use modification::*;

mod rewriter;
pub use rewriter::*;

mod validate;
pub use validate::*;

use snaptrace_common::{LineIndex, ProgramDescriptor, Sentinel, SourceRange};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    analysis::{analyze, program_descriptor, AugmentationMap, SymbolResolver, VariableLocationMap},
    ast::{Program, StmtId},
    frontend::{parse, LexicalResolver, ParseError},
    InstrumentationConfig,
};

/// Errors that abort an instrumentation request.
#[derive(Debug, Error)]
pub enum InstrumentationError {
    /// The snippet could not be parsed
    #[error("failed to parse snippet: {0}")]
    Parse(#[from] ParseError),

    /// A synthesized identifier does not denote the variable it was built for
    #[error("unresolved reference `{name}` at {line}:{character}")]
    UnresolvedReference {
        /// The identifier
        name: String,
        /// Zero-based line of the anchor statement
        line: usize,
        /// Zero-based character of the anchor statement
        character: usize,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The program shape does not allow an emission after the statement
    #[error("cannot insert an emission after statement {stmt}")]
    Rewrite {
        /// The anchor statement
        stmt: StmtId,
    },

    /// Serializing a static descriptor failed
    #[error("failed to serialize descriptor: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The outcome of one instrumentation request.
#[derive(Debug, Clone)]
pub struct InstrumentedProgram {
    /// The rewritten syntax tree.
    pub program: Program,
    /// The instrumented source text.
    pub source: String,
    /// Static variable metadata, written once ahead of every trace.
    pub descriptor: ProgramDescriptor,
    /// Per-statement scope information, in document order.
    pub augmentations: AugmentationMap,
    /// Every variable occurrence in the document.
    pub locations: VariableLocationMap,
    /// The token the runtime emitter must use for this run.
    pub sentinel: Sentinel,
}

/// Parses and instruments `source` with the reference front end.
pub fn instrument(
    file: &str,
    source: &str,
    regions: Option<&[SourceRange]>,
    config: &InstrumentationConfig,
) -> Result<InstrumentedProgram, InstrumentationError> {
    config.validate()?;
    let program = parse(file, source)?;
    let resolver = LexicalResolver::new(&program);
    instrument_program(program, &resolver, regions, config)
}

/// Instruments an already parsed program, asking `resolver` about scopes.
pub fn instrument_program<R: SymbolResolver + ?Sized>(
    program: Program,
    resolver: &R,
    regions: Option<&[SourceRange]>,
    config: &InstrumentationConfig,
) -> Result<InstrumentedProgram, InstrumentationError> {
    config.validate()?;
    let index = LineIndex::new(&program.source);

    let (augmentations, locations) = analyze(&program, resolver, regions);
    debug!(
        file = %program.file,
        augmentations = augmentations.len(),
        variables = locations.len(),
        "analyzed scopes"
    );

    let rewriter = AstRewriter::new(ArgumentBuilder::new(config, &index));
    let output = rewriter.rewrite(&program, &augmentations)?;

    if config.validate_references {
        ReferenceValidator::new(resolver, &index).validate(
            &output.program,
            &output.anchors,
            &augmentations,
        )?;
    }

    let mut modifications = SourceModifications::new();
    modifications.collect_modifications(&output.program, &output.anchors, &augmentations);
    let source = modifications.modify_source(&program.source);

    let descriptor = program_descriptor(&locations);
    let sentinel = Sentinel::with_prefix(&config.sentinel_prefix);
    info!(
        file = %program.file,
        statements = augmentations.len(),
        occurrences = descriptor.variable_locations.len(),
        "instrumented program"
    );

    Ok(InstrumentedProgram {
        program: output.program,
        source,
        descriptor,
        augmentations,
        locations,
        sentinel,
    })
}
