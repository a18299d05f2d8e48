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

//! Execution trace types: what the runtime writes and what the decoder returns.

use serde::{Deserialize, Serialize};

use super::{FilePosition, LineSpan, VariableKind, VariableLocation};

/// Statically computed metadata, emitted once per run before any snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramDescriptor {
    /// Every occurrence of every variable, grouped by variable in declaration order.
    pub variable_locations: Vec<VariableLocation>,
}

/// The runtime value of one variable in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableValue {
    /// The name of the variable.
    pub name: String,
    /// The kind of variable.
    pub kind: VariableKind,
    /// JSON text of the value, or [`crate::UNAVAILABLE_VALUE`].
    pub value: String,
    /// Where the variable is declared.
    pub declared_at: LineSpan,
}

/// The payload of one snapshot block on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStateRecord {
    /// Start of the statement after which the snapshot was taken.
    pub file_position: FilePosition,
    /// Best-effort stack trace, diagnostic only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Live local variables.
    #[serde(default)]
    pub locals: Vec<VariableValue>,
    /// Parameters of the enclosing method.
    #[serde(default)]
    pub parameters: Vec<VariableValue>,
    /// Accessible fields.
    #[serde(default)]
    pub fields: Vec<VariableValue>,
}

/// A range of characters within the reconstructed standard output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputSpan {
    /// Offset of the first character.
    pub start: usize,
    /// Offset just past the last character.
    pub end: usize,
}

impl OutputSpan {
    /// Number of characters covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` if the span covers no output.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The covered characters of `text`.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        let mut chars = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len()));
        let start = chars.nth(self.start).unwrap_or(text.len());
        let end = if self.is_empty() {
            start
        } else {
            chars.nth(self.len() - 1).unwrap_or(text.len())
        };
        &text[start..end]
    }
}

/// One decoded snapshot of program state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramState {
    /// Start of the statement after which the snapshot was taken.
    pub file_position: FilePosition,
    /// Best-effort stack trace, diagnostic only.
    pub stack_trace: Option<String>,
    /// Live local variables.
    pub locals: Vec<VariableValue>,
    /// Parameters of the enclosing method.
    pub parameters: Vec<VariableValue>,
    /// Accessible fields.
    pub fields: Vec<VariableValue>,
    /// Program output produced after this snapshot and before the next one.
    pub output: OutputSpan,
}

impl ProgramState {
    /// Attaches an output span to a decoded wire record.
    pub fn from_record(record: ProgramStateRecord, output: OutputSpan) -> Self {
        let ProgramStateRecord { file_position, stack_trace, locals, parameters, fields } = record;
        Self { file_position, stack_trace, locals, parameters, fields, output }
    }

    /// Looks up a variable of any kind by name.
    pub fn variable(&self, name: &str) -> Option<&VariableValue> {
        self.locals
            .iter()
            .chain(self.parameters.iter())
            .chain(self.fields.iter())
            .find(|v| v.name == name)
    }
}

/// The result of decoding one captured standard output buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramOutputStreams {
    /// Genuine program output, sentinel framing removed.
    pub std_out: Vec<String>,
    /// The descriptor block.
    pub descriptor: ProgramDescriptor,
    /// Snapshots in emission order.
    pub states: Vec<ProgramState>,
}

impl ProgramOutputStreams {
    /// The reconstructed standard output as one string, lines joined by `\n`.
    /// Output spans index into this string.
    pub fn std_out_text(&self) -> String {
        self.std_out.join("\n")
    }

    /// The output attributed to the `index`-th snapshot.
    pub fn output_of(&self, index: usize) -> Option<String> {
        let text = self.std_out_text();
        self.states.get(index).map(|state| state.output.slice(&text).to_string())
    }
}
