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

use snaptrace_common::{
    OutputSpan, ProgramDescriptor, ProgramOutputStreams, ProgramState, ProgramStateRecord,
    Sentinel,
};
use tracing::{debug, warn};

/// Splits a captured output buffer into program output, the descriptor and
/// the snapshots.
///
/// Decoding is best effort and never fails:
///
/// - the first non-empty block that parses as a descriptor is the
///   descriptor; without one, the descriptor is empty
/// - any other block that parses as a snapshot is a snapshot
/// - blocks that parse as neither are dropped with a warning
/// - a trailing block without closing sentinel is kept if it parses
pub struct TraceDecoder<'a> {
    sentinel: &'a Sentinel,
}

/// One segment of the captured stream.
#[derive(Debug, PartialEq, Eq)]
enum Segment {
    /// A line of program output.
    Plain(String),
    /// The lines between an opening and a closing sentinel.
    Structured { payload: String, terminated: bool },
}

/// What a block turned out to contain.
enum Block {
    Descriptor(ProgramDescriptor),
    State(ProgramStateRecord),
}

impl<'a> TraceDecoder<'a> {
    /// A decoder for streams framed with `sentinel`.
    pub fn new(sentinel: &'a Sentinel) -> Self {
        Self { sentinel }
    }

    /// Separates the program output from the structured blocks and attributes
    /// the output to the states. Unparsable blocks are dropped.
    pub fn decode<I, L>(&self, lines: I) -> ProgramOutputStreams
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        let mut descriptor = None;
        let mut std_out = Vec::new();
        // each record with the number of output lines preceding it
        let mut records: Vec<(ProgramStateRecord, usize)> = Vec::new();

        for segment in self.segments(lines) {
            let (payload, terminated) = match segment {
                Segment::Plain(line) => {
                    std_out.push(line);
                    continue;
                }
                Segment::Structured { payload, terminated } => (payload, terminated),
            };
            if payload.trim().is_empty() {
                continue;
            }

            match self.parse_block(&payload, descriptor.is_none()) {
                Some(Block::Descriptor(parsed)) => descriptor = Some(parsed),
                Some(Block::State(record)) => records.push((record, std_out.len())),
                None if terminated => {
                    warn!(payload = %truncated(&payload), "Dropping unparsable trace block");
                }
                None => {
                    warn!(payload = %truncated(&payload), "Dropping unterminated trace block");
                }
            }
        }

        if descriptor.is_none() {
            warn!("Trace carries no program descriptor");
        }
        let states = attribute_output(records, &std_out);
        debug!(lines = std_out.len(), states = states.len(), "decoded trace");

        ProgramOutputStreams { std_out, descriptor: descriptor.unwrap_or_default(), states }
    }

    /// Splits `lines` into plain lines and structured blocks.
    fn segments<I, L>(&self, lines: I) -> Vec<Segment>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        let mut segments = Vec::new();
        let mut block: Option<Vec<String>> = None;

        for line in lines {
            let line = line.as_ref();
            let Some(count) = self.sentinel.repetitions(line) else {
                match &mut block {
                    Some(payload) => payload.push(line.to_string()),
                    None => segments.push(Segment::Plain(line.to_string())),
                }
                continue;
            };
            for _ in 0..count {
                block = match block.take() {
                    Some(payload) => {
                        segments.push(Segment::Structured {
                            payload: payload.join("\n"),
                            terminated: true,
                        });
                        None
                    }
                    None => Some(Vec::new()),
                };
            }
        }

        if let Some(payload) = block {
            segments.push(Segment::Structured { payload: payload.join("\n"), terminated: false });
        }
        segments
    }

    fn parse_block(&self, payload: &str, expect_descriptor: bool) -> Option<Block> {
        if expect_descriptor {
            if let Ok(descriptor) = serde_json::from_str::<ProgramDescriptor>(payload) {
                return Some(Block::Descriptor(descriptor));
            }
        }
        serde_json::from_str::<ProgramStateRecord>(payload).ok().map(Block::State)
    }
}

/// Assigns each state the output written after it and before the next state.
///
/// Output spans count characters of `std_out.join("\n")`; every line owns its
/// separator except the last. Output before the first state belongs to the
/// first state, so the spans tile the whole text.
fn attribute_output(
    records: Vec<(ProgramStateRecord, usize)>,
    std_out: &[String],
) -> Vec<ProgramState> {
    let mut line_starts = Vec::with_capacity(std_out.len() + 1);
    let mut offset = 0;
    for line in std_out {
        line_starts.push(offset);
        offset += line.chars().count() + 1;
    }
    let total = offset.saturating_sub(1);
    line_starts.push(total);
    let start_of = |line: usize| line_starts[line].min(total);

    let boundaries: Vec<usize> = records
        .iter()
        .enumerate()
        .map(|(i, (_, first_line))| if i == 0 { 0 } else { start_of(*first_line) })
        .chain(std::iter::once(total))
        .collect();

    records
        .into_iter()
        .enumerate()
        .map(|(i, (record, _))| {
            let output = OutputSpan { start: boundaries[i], end: boundaries[i + 1] };
            ProgramState::from_record(record, output)
        })
        .collect()
}

fn truncated(payload: &str) -> &str {
    match payload.char_indices().nth(80) {
        Some((end, _)) => &payload[..end],
        None => payload,
    }
}
