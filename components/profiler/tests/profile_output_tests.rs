//! End-to-end profiler output tests.
//!
//! Runs a deterministic workload of three named functions at known source
//! lines under the sampling profiler and validates the written profile:
//! header, file table and sample-line syntax.

use std::rc::Rc;
use std::time::{Duration, Instant};

use builtins::install_builtins;
use core_types::{Node, SourceSection, Signature, Value};
use interpreter::{Context, Interpreter, RuntimeOptions};
use profiler::{ProfParams, Profiler};
use regex::Regex;

const WORKLOAD_PATH: &str = "workload.st";

/// fa -> fb -> fc, with fc allocating vectors. Returns the statements
/// defining the functions and the driver function `run`.
fn workload() -> Vec<Rc<Node>> {
    let fc_body = Node::block(vec![
        Node::call_named("numeric", vec![Node::arg(Node::constant(Value::Int(64)))])
            .with_source(SourceSection::new(WORKLOAD_PATH, 10, 5)),
        Node::call_named(
            "duplicate",
            vec![Node::arg(Node::call_named(
                "numeric",
                vec![Node::arg(Node::constant(Value::Int(2)))],
            ))],
        )
        .with_source(SourceSection::new(WORKLOAD_PATH, 11, 5)),
    ]);
    let fc = Node::function_def(Some("fc"), Signature::of(&[]), fc_body);

    let fb_body = Node::block(vec![Node::call_named("fc", vec![])
        .with_source(SourceSection::new(WORKLOAD_PATH, 6, 5))]);
    let fb = Node::function_def(Some("fb"), Signature::of(&[]), fb_body);

    let fa_body = Node::block(vec![Node::call_named("fb", vec![])
        .with_source(SourceSection::new(WORKLOAD_PATH, 2, 5))]);
    let fa = Node::function_def(Some("fa"), Signature::of(&[]), fa_body);

    // run(): a long block of fa() calls so samples land inside functions.
    let fa_call =
        Node::call_named("fa", vec![]).with_source(SourceSection::new(WORKLOAD_PATH, 14, 5));
    let run_body = Node::block(vec![fa_call; 64]);
    let run = Node::function_def(Some("run"), Signature::of(&[]), run_body);

    vec![
        Node::assign("fc", fc, false),
        Node::assign("fb", fb, false),
        Node::assign("fa", fa, false),
        Node::assign("run", run, false),
    ]
}

#[test]
fn test_profile_output_format() {
    let ctx = Context::new(RuntimeOptions::new());
    install_builtins(&ctx);
    let mut interp = Interpreter::new(ctx.clone());
    interp.eval_program(&workload()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.out");
    let profiler = Profiler::new();
    let params = ProfParams {
        filename: path.to_string_lossy().to_string(),
        append: false,
        interval: 0.02,
        mem_profiling: true,
        gc_profiling: false,
        line_profiling: true,
    };
    profiler.start(&ctx, params).unwrap();

    let run_call = Node::call_named("run", vec![]);
    let global = ctx.global_frame();
    let started = Instant::now();
    while started.elapsed() < Duration::from_millis(300) {
        interp.eval(&run_call, &global).unwrap();
    }
    profiler.stop(&ctx).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(
        content.starts_with("memory profiling: line profiling: sample.interval=20000\n"),
        "unexpected header: {:?}",
        content.lines().next()
    );

    let file_lines: Vec<&str> = content
        .lines()
        .filter(|l| l.starts_with("#File"))
        .collect();
    assert_eq!(file_lines, vec![format!("#File 1: {}", WORKLOAD_PATH)]);

    let sample_re = Regex::new(r#"^:\d+:\d+:\d+:\d+:( \d+#\d+)? "[^"]+"( "[^"]+")*$"#).unwrap();
    let samples: Vec<&str> = content
        .lines()
        .skip(1)
        .filter(|l| !l.starts_with("#File"))
        .collect();
    assert!(!samples.is_empty(), "no samples captured");
    for sample in &samples {
        assert!(sample_re.is_match(sample), "malformed sample line: {:?}", sample);
    }

    // The innermost functions appear in some captured stack.
    assert!(content.contains("\"fa\""));
    assert!(content.contains("\"fb\""));
}

#[test]
fn test_profile_restart_overwrites_and_append_appends() {
    let ctx = Context::new(RuntimeOptions::new());
    install_builtins(&ctx);
    let mut interp = Interpreter::new(ctx.clone());
    interp.eval_program(&workload()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.out");
    let profiler = Profiler::new();

    profiler
        .start(&ctx, ProfParams::new(&path.to_string_lossy(), 0.01))
        .unwrap();
    profiler.stop(&ctx).unwrap();
    let first = std::fs::read_to_string(&path).unwrap();
    assert_eq!(first, "sample.interval=10000\n");

    let mut params = ProfParams::new(&path.to_string_lossy(), 0.01);
    params.append = true;
    profiler.start(&ctx, params).unwrap();
    profiler.stop(&ctx).unwrap();
    let second = std::fs::read_to_string(&path).unwrap();
    assert_eq!(second, "sample.interval=10000\nsample.interval=10000\n");
}

#[test]
fn test_profiling_leaves_environment_unchanged() {
    // Starting and stopping the profiler is observationally transparent
    // except for the written file.
    let ctx = Context::new(RuntimeOptions::new());
    install_builtins(&ctx);
    let mut interp = Interpreter::new(ctx.clone());
    interp.eval_program(&workload()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.out");
    let profiler = Profiler::new();
    let mut params = ProfParams::new(&path.to_string_lossy(), 0.01);
    params.mem_profiling = true;
    profiler.start(&ctx, params).unwrap();

    let program = vec![
        Node::assign("x", Node::constant(Value::Int(5)), false),
        Node::call_named("fa", vec![]),
        Node::lookup("x"),
    ];
    let under_profile = interp.eval_program(&program).unwrap();
    profiler.stop(&ctx).unwrap();

    let after = interp.eval_program(&[Node::lookup("x")]).unwrap();
    assert_eq!(under_profile, Value::Int(5));
    assert_eq!(after, Value::Int(5));
}
