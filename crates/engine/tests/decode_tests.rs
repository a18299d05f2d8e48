use snaptrace_common::{ProgramDescriptor, ProgramStateRecord, Sentinel};
use snaptrace_engine::decode_trace;
use tracing::info;

fn sentinel() -> Sentinel {
    Sentinel::from_token("<<snaptrace:0123456789abcdef0123456789abcdef>>")
}

fn descriptor_json() -> String {
    serde_json::to_string(&ProgramDescriptor::default()).unwrap()
}

fn state_json(line: usize) -> String {
    let mut record = ProgramStateRecord::default();
    record.file_position.line = line;
    record.file_position.file = "main.cs".to_string();
    serde_json::to_string(&record).unwrap()
}

#[test]
fn test_states_and_output() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let s = sentinel();
    let s = s.as_str();
    let double = format!("{s}{s}");
    let double = double.as_str();
    let (desc, st1, st2) = (descriptor_json(), state_json(0), state_json(1));
    let (desc, st1, st2) = (desc.as_str(), st1.as_str(), st2.as_str());
    let lines = [s, desc, double, st1, s, "hello", s, st2, s];

    let trace = decode_trace(lines, &sentinel());

    assert_eq!(trace.std_out, ["hello"]);
    assert_eq!(trace.states.len(), 2);
    assert_eq!(trace.states[0].file_position.line, 0);
    assert_eq!(trace.states[1].file_position.line, 1);
    assert_eq!((trace.states[0].output.start, trace.states[0].output.end), (0, 5));
    assert_eq!((trace.states[1].output.start, trace.states[1].output.end), (5, 5));
    assert_eq!(trace.output_of(0).unwrap(), "hello");
    assert!(trace.states[1].output.is_empty());
}

#[test]
fn test_sentinels_on_separate_lines() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let s = sentinel();
    let s = s.as_str();
    let double = format!("{s}{s}");
    let double = double.as_str();
    let (desc, st1) = (descriptor_json(), state_json(3));
    let (desc, st1) = (desc.as_str(), st1.as_str());
    let joined = decode_trace([s, desc, double, st1, s, "out", s, s], &sentinel());
    let split = decode_trace([s, desc, s, s, st1, s, "out", s, s], &sentinel());
    assert_eq!(joined, split);
    assert_eq!(split.states.len(), 1);
    assert_eq!(split.std_out, ["out"]);
}

#[test]
fn test_zero_states() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let s = sentinel();
    let s = s.as_str();
    let double = format!("{s}{s}");
    let double = double.as_str();
    let desc = descriptor_json();
    let desc = desc.as_str();

    let trace = decode_trace([s, desc, double, s], &sentinel());
    assert!(trace.states.is_empty());
    assert!(trace.std_out.is_empty());

    let trace = decode_trace(["before", s, desc, s, "after"], &sentinel());
    assert!(trace.states.is_empty());
    assert_eq!(trace.std_out, ["before", "after"]);
}

#[test]
fn test_unparsable_payloads_are_dropped() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let s = sentinel();
    let s = s.as_str();
    let (desc, st1, st2) = (descriptor_json(), state_json(0), state_json(2));
    let (desc, st1, st2) = (desc.as_str(), st1.as_str(), st2.as_str());
    let lines =
        [s, desc, s, s, st1, s, "one", s, "{not json", s, "two", s, st2, s, "three"];

    let trace = decode_trace(lines, &sentinel());

    assert_eq!(trace.std_out, ["one", "two", "three"]);
    assert_eq!(trace.states.len(), 2);
    // the output after the dropped block stays with the preceding state
    assert_eq!(trace.output_of(0).unwrap(), "one\ntwo\n");
    assert_eq!(trace.output_of(1).unwrap(), "three");
    assert_eq!(trace.states[1].output.end, trace.std_out_text().chars().count());
}

#[test]
fn test_unicode_spans_count_characters() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let s = sentinel();
    let s = s.as_str();
    let (desc, st1, st2) = (descriptor_json(), state_json(0), state_json(1));
    let (desc, st1, st2) = (desc.as_str(), st1.as_str(), st2.as_str());
    let trace = decode_trace([s, desc, s, s, st1, s, "héllo ✓", s, st2, s, "end"], &sentinel());

    assert_eq!((trace.states[0].output.start, trace.states[0].output.end), (0, 8));
    assert_eq!((trace.states[1].output.start, trace.states[1].output.end), (8, 11));
    assert_eq!(trace.output_of(0).unwrap(), "héllo ✓\n");
}

#[test]
fn test_foreign_sentinel_is_plain_output() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let other = Sentinel::generate();
    let trace = decode_trace([other.as_str(), "x", other.as_str()], &sentinel());
    assert!(trace.states.is_empty());
    assert_eq!(trace.std_out.len(), 3);
}
