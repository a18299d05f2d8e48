use std::collections::HashMap;

use snaptrace_common::{LineIndex, RuntimeEmitter, RuntimeValue, VariableKind};
use snaptrace_engine::{
    instrument, run_and_decode, trace_snippet, InstrumentationConfig, InstrumentedProgram,
    ProcessHost, Viewport,
};
use tracing::info;

/// Pretends to run straight-line snippets: every instrumented statement
/// executes once, in document order, with variable values taken from a table.
/// `Console.WriteLine("...")` statements print their literal.
struct ScriptedHost {
    values: HashMap<&'static str, i64>,
}

impl ProcessHost for ScriptedHost {
    fn compile_and_run(&self, program: &InstrumentedProgram) -> eyre::Result<Vec<String>> {
        let source = &program.program.source;
        let index = LineIndex::new(source);
        let mut emitter =
            RuntimeEmitter::start(Vec::new(), program.sentinel.clone(), &program.descriptor)?;

        for augmentation in program.augmentations.values() {
            let text = &source[augmentation.src.start..augmentation.src.next_loc()];
            if let Some(message) = text
                .strip_prefix("Console.WriteLine(\"")
                .and_then(|rest| rest.strip_suffix("\");"))
            {
                emitter.write_output(message)?;
            }

            let position = serde_json::to_string(&augmentation.file_position)?;
            let descriptors = augmentation
                .variables()
                .map(|symbol| serde_json::to_string(&symbol.descriptor(&index)))
                .collect::<Result<Vec<_>, _>>()?;
            let values: Vec<i64> =
                augmentation.variables().map(|symbol| self.values[symbol.name.as_str()]).collect();
            let variables: Vec<(&str, &dyn RuntimeValue)> = descriptors
                .iter()
                .zip(&values)
                .map(|(descriptor, value)| (descriptor.as_str(), value as &dyn RuntimeValue))
                .collect();
            emitter.emit_program_state(&position, &variables)?;
        }

        let out = emitter.finish()?;
        Ok(String::from_utf8(out)?.lines().map(str::to_string).collect())
    }
}

const SOURCE: &str = r#"int a = 1;
#region shown
int b = a + 1;
Console.WriteLine("sum");
#endregion
"#;

fn host() -> ScriptedHost {
    ScriptedHost { values: HashMap::from([("a", 1), ("b", 2)]) }
}

#[test]
fn test_instrument_run_decode() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let instrumented =
        instrument("main.cs", SOURCE, None, &InstrumentationConfig::default()).unwrap();
    let trace = run_and_decode(&host(), &instrumented).unwrap();

    assert_eq!(trace.descriptor, instrumented.descriptor);
    assert_eq!(trace.std_out, ["sum"]);
    assert_eq!(trace.states.len(), 3);

    let lines: Vec<_> = trace.states.iter().map(|s| s.file_position.line).collect();
    assert_eq!(lines, [0, 2, 3]);

    assert!(trace.states[0].locals.is_empty());
    assert_eq!(trace.states[1].variable("a").unwrap().value, "1");
    assert!(trace.states[1].variable("b").is_none());
    assert_eq!(trace.states[2].variable("b").unwrap().value, "2");
    assert_eq!(trace.states[2].locals[0].kind, VariableKind::Local);
    assert_eq!(trace.states[2].locals[0].declared_at.start.line, 0);

    // `Console.WriteLine` prints before its own snapshot is taken
    assert_eq!(trace.output_of(0).unwrap(), "");
    assert_eq!(trace.output_of(1).unwrap(), "sum");
    assert!(trace.states[2].output.is_empty());
}

#[test]
fn test_descriptor_lists_occurrences() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let instrumented =
        instrument("main.cs", SOURCE, None, &InstrumentationConfig::default()).unwrap();
    let occurrences: Vec<_> = instrumented
        .descriptor
        .variable_locations
        .iter()
        .map(|l| (l.variable.name.as_str(), l.start_line, l.start_column))
        .collect();
    assert_eq!(occurrences, [("a", 0, 4), ("a", 2, 8), ("b", 2, 4)]);
}

#[test]
fn test_trace_with_viewport() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let viewport = Viewport::from_region_name(SOURCE, "shown").unwrap();
    let traced = trace_snippet(
        &host(),
        "main.cs",
        SOURCE,
        None,
        &InstrumentationConfig::default(),
        Some(&viewport),
    )
    .unwrap();

    let lines: Vec<_> =
        traced.instrumented.augmentations.values().map(|a| a.file_position.line).collect();
    assert_eq!(lines, [0, 1]);
    assert_eq!(traced.instrumented.locations.len(), 2);
    assert_eq!(traced.trace.states.len(), 3);
}

#[test]
fn test_trace_without_viewport_is_unmapped() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let config = InstrumentationConfig::default();
    let traced = trace_snippet(&host(), "main.cs", SOURCE, None, &config, None).unwrap();
    let instrumented = instrument("main.cs", SOURCE, None, &config).unwrap();
    assert_eq!(traced.instrumented.augmentations, instrumented.augmentations);
    assert_eq!(traced.instrumented.locations, instrumented.locations);
}
