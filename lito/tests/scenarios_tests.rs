mod common;

use common::{VmError, run, run_err};

#[test]
fn arithmetic_respects_precedence() {
    assert_eq!(run("println 1 + 2 * 3"), "7\n");
}

#[test]
fn keyword_arguments_fall_back_to_defaults() {
    let output = run("def f(x, y: 10) { x + y }; println f(1); println f(1, y: 2)");
    assert_eq!(output, "11\n3\n");
}

#[test]
fn init_receives_the_arguments_given_to_new() {
    let output =
        run("class C { def init(n) { @n = n }; def value { @n } }; println C.new(5).value");
    assert_eq!(output, "5\n");
}

#[test]
fn rendezvous_channel_hands_a_value_between_threads() {
    let output = run("ch = Channel.new(0); go { ch <- 42 }; println ch.receive");
    assert_eq!(output, "42\n");
}

#[test]
fn try_and_catch_deliver_the_raised_error() {
    let output = run(
        r#"try { raise ArgumentError.new("x") }.catch(ArgumentError) { |e| println e.message }"#,
    );
    assert_eq!(output, "ArgumentError: 'x'\n");
}

#[test]
fn switch_runs_the_first_matching_case() {
    let output = run(
        r#"switch 3 { case 1, 2 { println "small" } case 3, 4 { println "mid" } default { println "big" } }"#,
    );
    assert_eq!(output, "mid\n");
}

#[test]
fn switch_falls_through_to_default() {
    let output = run(
        r#"switch 9 { case 1, 2 { println "small" } case 3, 4 { println "mid" } default { println "big" } }"#,
    );
    assert_eq!(output, "big\n");
}

#[test]
fn uncaught_errors_carry_a_trace_per_frame() {
    let source = "def boom {\n  raise(\"bad\")\n}\nprintln(\"before\")\nboom\n";
    let (err, output) = run_err(source);
    assert_eq!(output, "before\n");
    let VmError::Raised(err) = err else {
        panic!("expected a raised error");
    };
    assert_eq!(err.message, "Error: 'bad'");
    let traces = err.traces();
    assert_eq!(traces.len(), 2);
    assert!(traces.iter().all(|trace| trace.starts_with("from test.lito:")));
}
