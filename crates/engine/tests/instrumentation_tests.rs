use snaptrace_common::{SourceRange, VariableKind};
use snaptrace_engine::{
    instrument, Augmentation, InstrumentationConfig, InstrumentationError, InstrumentedProgram,
};
use tracing::info;

fn instrument_default(source: &str) -> InstrumentedProgram {
    instrument("main.cs", source, None, &InstrumentationConfig::default()).unwrap()
}

fn names<'a>(symbols: impl IntoIterator<Item = &'a snaptrace_common::VariableSymbol>) -> Vec<&'a str> {
    symbols.into_iter().map(|s| s.name.as_str()).collect()
}

/// The augmentation of the statement starting with `prefix`.
fn augmentation_at<'a>(program: &'a InstrumentedProgram, source: &str, prefix: &str) -> &'a Augmentation {
    let offset = source.find(prefix).unwrap();
    program
        .augmentations
        .values()
        .find(|a| a.src.start == offset)
        .unwrap_or_else(|| panic!("no augmentation for `{prefix}`"))
}

#[test]
fn test_entry_point() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = r#"int a = 0; Console.WriteLine("Entry Point");"#;
    let instrumented = instrument_default(source);

    let augmentations: Vec<_> = instrumented.augmentations.values().collect();
    assert_eq!(augmentations.len(), 2);
    assert!(augmentations[0].locals.is_empty());
    assert_eq!(names(&augmentations[1].locals), ["a"]);
    assert!(augmentations[0].src.start < augmentations[1].src.start);
    assert_eq!(augmentations[1].file_position.character, 11);
}

#[test]
fn test_instrumented_source_shape() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = "int a = 0;\nif (a == 0)\n    a = 1;\nConsole.WriteLine(a);\n";
    let instrumented = instrument_default(source);
    let text = &instrumented.source;

    assert_eq!(text.lines().count(), source.lines().count());
    assert_eq!(text.matches("SnapTrace.Emitter.EmitProgramState(").count(), 4);
    // the embedded assignment is wrapped together with its emission
    let third = text.lines().nth(2).unwrap();
    assert!(third.starts_with("    { a = 1; SnapTrace.Emitter.EmitProgramState("));
    // followed by the emission of the enclosing `if`
    assert!(third.contains("); } SnapTrace.Emitter.EmitProgramState("));
}

#[test]
fn test_assignment_before_use() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = "int x;\nint y = 1;\nx = y + 1;\nUse(x);\n";
    let instrumented = instrument_default(source);

    assert!(names(&augmentation_at(&instrumented, source, "int y").locals).is_empty());
    assert_eq!(names(&augmentation_at(&instrumented, source, "x = y").locals), ["y"]);
    assert_eq!(names(&augmentation_at(&instrumented, source, "Use(x)").locals), ["x", "y"]);
}

#[test]
fn test_loop_variables_never_leak() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = r#"
int sum = 0;
for (int i = 0; i < 3; i++)
{
    int square = i * i;
    sum += square;
}
foreach (var item in new[] { 1, 2 })
    sum += item;
Console.WriteLine(sum);
"#;
    let instrumented = instrument_default(source);
    let loop_range = SourceRange::new(source.find("for (").unwrap(), source.find("Console").unwrap());

    for augmentation in instrumented.augmentations.values() {
        let locals = names(&augmentation.locals);
        let inside = loop_range.contains(augmentation.src.start) && augmentation.depth > 0;
        if !inside {
            assert!(locals.iter().all(|name| *name == "sum"), "at {:?}", augmentation.file_position);
        }
    }
    assert_eq!(names(&augmentation_at(&instrumented, source, "int square").locals), ["sum", "i"]);
    assert_eq!(names(&augmentation_at(&instrumented, source, "sum += square").locals), [
        "sum", "i", "square"
    ]);
    assert_eq!(names(&augmentation_at(&instrumented, source, "sum += item").locals), ["sum", "item"]);
}

#[test]
fn test_scope_closes_at_brace() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = "{ int x = 1; }Done();";
    let instrumented = instrument_default(source);
    assert!(augmentation_at(&instrumented, source, "Done").locals.is_empty());

    let source = "int n = 3;\nfor (int i = 0; i < n; i++) { Use(i); }Done();";
    let instrumented = instrument_default(source);
    assert_eq!(names(&augmentation_at(&instrumented, source, "Use(i)").locals), ["n", "i"]);
    assert_eq!(names(&augmentation_at(&instrumented, source, "Done").locals), ["n"]);
}

#[test]
fn test_comments_in_snippet() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = "/* setup */ int a = 1;\n/** doc\n **/ a++; // bump\nUse(a);";
    let instrumented = instrument_default(source);

    assert_eq!(instrumented.augmentations.len(), 3);
    assert!(augmentation_at(&instrumented, source, "int a").locals.is_empty());
    assert_eq!(names(&augmentation_at(&instrumented, source, "a++").locals), ["a"]);
    assert_eq!(instrumented.source.lines().count(), source.lines().count());
    assert!(instrumented.source.contains("/** doc"));
}

#[test]
fn test_class_members() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = r#"
class Counter
{
    static int created = 0;
    int count;

    public void Add(int step)
    {
        int before = count;
        count = before + step;
    }

    public static void Reset()
    {
        created = 0;
    }
}
"#;
    let instrumented = instrument_default(source);

    let first = augmentation_at(&instrumented, source, "int before");
    assert!(first.locals.is_empty());
    assert_eq!(names(&first.parameters), ["step"]);
    assert_eq!(names(&first.fields), ["created", "count"]);
    assert!(first.parameters.iter().all(|p| p.kind == VariableKind::Parameter));

    let second = augmentation_at(&instrumented, source, "count = before");
    assert_eq!(names(&second.locals), ["before"]);

    let reset = augmentation_at(&instrumented, source, "created = 0;\n    }");
    assert!(reset.parameters.is_empty());
    assert_eq!(names(&reset.fields), ["created"]);
}

#[test]
fn test_locals_shadow_fields() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = r#"
class Shadow
{
    int value;

    void Run()
    {
        int value = 1;
        Use(value);
    }
}
"#;
    let instrumented = instrument_default(source);
    let use_value = augmentation_at(&instrumented, source, "Use(value)");
    assert_eq!(names(&use_value.locals), ["value"]);
    assert!(use_value.fields.is_empty());
}

#[test]
fn test_pattern_variables() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = r#"
object o = 5;
if (o is int n)
{
    Console.WriteLine(n);
}
else
{
    Console.WriteLine(o);
}
"#;
    let instrumented = instrument_default(source);
    assert_eq!(names(&augmentation_at(&instrumented, source, "Console.WriteLine(n)").locals), [
        "o", "n"
    ]);
    assert_eq!(names(&augmentation_at(&instrumented, source, "Console.WriteLine(o)").locals), ["o"]);
}

#[test]
fn test_out_variables() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = "string text = \"42\";\nParse(text, out var parsed);\nUse(parsed);\n";
    let instrumented = instrument_default(source);
    assert_eq!(names(&augmentation_at(&instrumented, source, "Parse(text").locals), ["text"]);
    assert_eq!(names(&augmentation_at(&instrumented, source, "Use(parsed)").locals), [
        "text", "parsed"
    ]);
}

#[test]
fn test_regions_restrict_instrumentation() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = "int a = 0;\nint b = a;\nint c = b;\n";
    let second = source.find("int b").unwrap();
    let regions = [SourceRange::new(second, second + 3)];
    let instrumented =
        instrument("main.cs", source, Some(&regions), &InstrumentationConfig::default()).unwrap();

    assert_eq!(instrumented.augmentations.len(), 1);
    assert_eq!(instrumented.augmentations.values().next().unwrap().src.start, second);
    // occurrences are collected for the whole document regardless
    assert_eq!(instrumented.locations.len(), 3);
}

#[test]
fn test_out_of_bounds_region() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = "int a = 0;\n";
    let regions = [SourceRange::new(1000, 1010)];
    let instrumented =
        instrument("main.cs", source, Some(&regions), &InstrumentationConfig::default()).unwrap();
    assert!(instrumented.augmentations.is_empty());
    assert_eq!(instrumented.source, source);
}

#[test]
fn test_jumps_are_not_instrumented() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = "while (true)\n{\n    Work();\n    break;\n}\nreturn;\n";
    let instrumented = instrument_default(source);
    let starts: Vec<_> = instrumented.augmentations.values().map(|a| a.src.start).collect();
    assert_eq!(starts, [0, source.find("Work").unwrap()]);
}

#[test]
fn test_dead_code_sees_all_locals() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = "int a;\nreturn;\nUse(a);\n";
    let instrumented = instrument_default(source);
    assert_eq!(names(&augmentation_at(&instrumented, source, "Use(a)").locals), ["a"]);
}

#[test]
fn test_custom_emitter_and_fresh_sentinels() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let config = InstrumentationConfig::default()
        .with_emitter_type("Docs.Trace")
        .with_emit_method("Record")
        .with_sentinel_prefix("docs");
    let first = instrument("main.cs", "int a = 0;", None, &config).unwrap();
    let second = instrument("main.cs", "int a = 0;", None, &config).unwrap();

    assert!(first.source.contains("Docs.Trace.Record("));
    assert!(first.sentinel.as_str().starts_with("<<docs:"));
    assert_ne!(first.sentinel, second.sentinel);
}

#[test]
fn test_parse_errors() {
    snaptrace_common::logging::ensure_test_logging(None);
    info!("Running test");
    let err = instrument("main.cs", "int a = ;", None, &InstrumentationConfig::default())
        .unwrap_err();
    assert!(matches!(err, InstrumentationError::Parse(_)));

    let config = InstrumentationConfig::default().with_emit_method("not a name");
    let err = instrument("main.cs", "int a = 0;", None, &config).unwrap_err();
    assert!(matches!(err, InstrumentationError::Config(_)));
}
