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

//! Runtime side of the trace protocol.
//!
//! An instrumented program owns one [`RuntimeEmitter`] over its standard
//! output. Every injected emission call ends up in
//! [`RuntimeEmitter::emit_program_state`], which writes one structured block
//! between two sentinel lines. Anything else the program prints goes through
//! untouched and is recovered as plain output by the decoder.

use std::{backtrace::Backtrace, io::Write};

use serde::Serialize;
use tracing::warn;

use crate::{
    FilePosition, ProgramDescriptor, ProgramStateRecord, Sentinel, VariableDescriptor,
    VariableKind, VariableValue,
};

/// Placeholder recorded when a value cannot be serialized.
pub const UNAVAILABLE_VALUE: &str = "unavailable";

/// A live value that can be captured in a snapshot.
pub trait RuntimeValue {
    /// Serializes the current value as JSON text.
    fn to_json(&self) -> Result<String, serde_json::Error>;
}

impl<T: Serialize + ?Sized> RuntimeValue for T {
    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Writes descriptor and snapshot blocks to an output stream.
#[derive(Debug)]
pub struct RuntimeEmitter<W: Write> {
    out: W,
    sentinel: Sentinel,
    capture_stack_trace: bool,
    emitted: usize,
}

impl<W: Write> RuntimeEmitter<W> {
    /// Starts a run: writes the descriptor block exactly once.
    pub fn start(
        mut out: W,
        sentinel: Sentinel,
        descriptor: &ProgramDescriptor,
    ) -> std::io::Result<Self> {
        let payload = serde_json::to_string(descriptor)?;
        write_block(&mut out, &sentinel, &payload)?;
        Ok(Self { out, sentinel, capture_stack_trace: false, emitted: 0 })
    }

    /// Enables best-effort stack trace capture for every snapshot.
    pub fn with_stack_trace(mut self, enabled: bool) -> Self {
        self.capture_stack_trace = enabled;
        self
    }

    /// Number of snapshots written so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Captures one snapshot.
    ///
    /// `file_position` and each variable descriptor are the JSON literals the
    /// rewriter baked into the emission call; the values are read now.
    pub fn emit_program_state(
        &mut self,
        file_position: &str,
        variables: &[(&str, &dyn RuntimeValue)],
    ) -> std::io::Result<()> {
        let file_position: FilePosition = serde_json::from_str(file_position)?;
        let mut record = ProgramStateRecord {
            file_position,
            stack_trace: self.capture_stack_trace.then(|| Backtrace::force_capture().to_string()),
            ..Default::default()
        };

        for (descriptor, value) in variables {
            let descriptor: VariableDescriptor = match serde_json::from_str(descriptor) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(error = %e, "Skipping variable with malformed descriptor");
                    continue;
                }
            };
            let value = value.to_json().unwrap_or_else(|e| {
                warn!(variable = %descriptor.name, error = %e, "Value is not serializable");
                UNAVAILABLE_VALUE.to_string()
            });
            let entry = VariableValue {
                name: descriptor.name,
                kind: descriptor.kind,
                value,
                declared_at: descriptor.declared_at,
            };
            match entry.kind {
                VariableKind::Local => record.locals.push(entry),
                VariableKind::Parameter => record.parameters.push(entry),
                VariableKind::Field => record.fields.push(entry),
            }
        }

        let payload = serde_json::to_string(&record)?;
        write_block(&mut self.out, &self.sentinel, &payload)?;
        self.emitted += 1;
        Ok(())
    }

    /// Writes one line of ordinary program output.
    pub fn write_output(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self.out, "{line}")
    }

    /// Ends the run with an empty boundary block and returns the stream.
    pub fn finish(mut self) -> std::io::Result<W> {
        writeln!(self.out, "{}", self.sentinel)?;
        writeln!(self.out, "{}", self.sentinel)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

fn write_block<W: Write>(out: &mut W, sentinel: &Sentinel, payload: &str) -> std::io::Result<()> {
    writeln!(out, "{sentinel}")?;
    writeln!(out, "{payload}")?;
    writeln!(out, "{sentinel}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{LinePosition, LineSpan};

    fn descriptor_json(name: &str, kind: VariableKind) -> String {
        serde_json::to_string(&VariableDescriptor {
            name: name.to_string(),
            kind,
            declared_at: LineSpan {
                start: LinePosition { line: 0, character: 4 },
                end: LinePosition { line: 0, character: 5 },
            },
        })
        .unwrap()
    }

    fn lines(buf: Vec<u8>) -> Vec<String> {
        String::from_utf8(buf).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_emitter_framing() {
        let sentinel = Sentinel::from_token("<<S>>");
        let mut emitter =
            RuntimeEmitter::start(Vec::new(), sentinel, &ProgramDescriptor::default()).unwrap();
        let fp = r#"{"line":1,"character":0,"file":"main.cs"}"#;
        emitter.emit_program_state(fp, &[]).unwrap();
        emitter.write_output("hello").unwrap();
        assert_eq!(emitter.emitted(), 1);

        let out = lines(emitter.finish().unwrap());
        assert_eq!(out.len(), 9);
        assert_eq!(out[0], "<<S>>");
        assert_eq!(out[1], r#"{"variableLocations":[]}"#);
        assert_eq!(out[2], "<<S>>");
        assert_eq!(out[3], "<<S>>");
        assert!(out[4].starts_with(r#"{"filePosition":{"line":1"#));
        assert_eq!(out[5], "<<S>>");
        assert_eq!(out[6], "hello");
        assert_eq!(out[7], "<<S>>");
        assert_eq!(out[8], "<<S>>");
    }

    #[test]
    fn test_values_grouped_by_kind() {
        let sentinel = Sentinel::from_token("<<S>>");
        let mut emitter =
            RuntimeEmitter::start(Vec::new(), sentinel, &ProgramDescriptor::default()).unwrap();
        let a = descriptor_json("a", VariableKind::Local);
        let p = descriptor_json("p", VariableKind::Parameter);
        let f = descriptor_json("f", VariableKind::Field);
        let fp = r#"{"line":0,"character":0,"file":"main.cs"}"#;
        emitter
            .emit_program_state(fp, &[(&a, &42), (&p, &"text"), (&f, &vec![1, 2])])
            .unwrap();

        let out = lines(emitter.finish().unwrap());
        let record: ProgramStateRecord = serde_json::from_str(&out[4]).unwrap();
        assert_eq!(record.locals[0].value, "42");
        assert_eq!(record.parameters[0].value, "\"text\"");
        assert_eq!(record.fields[0].value, "[1,2]");
        assert_eq!(record.locals[0].declared_at.start.character, 4);
    }

    #[test]
    fn test_unserializable_value_is_unavailable() {
        let sentinel = Sentinel::from_token("<<S>>");
        let mut emitter =
            RuntimeEmitter::start(Vec::new(), sentinel, &ProgramDescriptor::default()).unwrap();
        let bad = descriptor_json("bad", VariableKind::Local);
        let good = descriptor_json("good", VariableKind::Local);
        // JSON object keys must be strings
        let map: HashMap<(i32, i32), i32> = HashMap::from([((1, 2), 3)]);
        let fp = r#"{"line":0,"character":0,"file":"main.cs"}"#;
        emitter.emit_program_state(fp, &[(&bad, &map), (&good, &true)]).unwrap();

        let out = lines(emitter.finish().unwrap());
        let record: ProgramStateRecord = serde_json::from_str(&out[4]).unwrap();
        assert_eq!(record.locals.len(), 2);
        assert_eq!(record.locals[0].value, UNAVAILABLE_VALUE);
        assert_eq!(record.locals[1].value, "true");
    }

    #[test]
    fn test_stack_trace_capture() {
        let sentinel = Sentinel::from_token("<<S>>");
        let mut emitter =
            RuntimeEmitter::start(Vec::new(), sentinel, &ProgramDescriptor::default())
                .unwrap()
                .with_stack_trace(true);
        let fp = r#"{"line":0,"character":0,"file":"main.cs"}"#;
        emitter.emit_program_state(fp, &[]).unwrap();

        let out = lines(emitter.finish().unwrap());
        let record: ProgramStateRecord = serde_json::from_str(&out[4]).unwrap();
        assert!(record.stack_trace.is_some());
    }
}
