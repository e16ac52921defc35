mod common;

use common::{ParserMode, parse, parse_err};
use lito::compiler::ParseErrorKind;
use lito::compiler::ast::{ExprKind, StmtKind};
use lito::compiler::parse_program;

fn assert_round_trip(source: &str) {
    let program = parse(source);
    let printed = program.to_string();
    let reparsed = parse(&printed);
    assert_eq!(
        program.without_lines(),
        reparsed.without_lines(),
        "printed form did not parse back:\n{printed}"
    );
}

#[test]
fn printed_programs_parse_back_to_the_same_tree() {
    assert_round_trip(
        r#"
x = [1, 2, 3]
h = { a: 1, "b c": 2.5 }
def add(a, b) { a + b }
class Point < Object {
  def init(x, y: 0) {
    @x = x
    @y = y
  }
}
if x > 1 { puts(x) } elsif x == 0 { puts("zero") } else { puts(nil) }
i = 0
while i < 3 { i = i + 1 }
r = (1..5)
first, second = [true, false]
"#,
    );
}

#[test]
fn printed_calls_with_blocks_parse_back() {
    assert_round_trip("[1, 2].each(1) { |a, b|\n  puts(a * b)\n}\nitems[0] = -items[1]");
}

#[test]
fn parameters_must_keep_their_order() {
    let err = parse_err("def f(a: 1, b) {}");
    assert_eq!(err.kind, ParseErrorKind::Argument);
    assert!(
        err.message
            .contains("Normal argument \"b\" should be defined before Optioned keyword argument"),
        "{}",
        err.message
    );

    let err = parse_err("def f(a = 1, b) {}");
    assert_eq!(err.kind, ParseErrorKind::Argument);
    assert!(err.message.contains("should be defined before"), "{}", err.message);
}

#[test]
fn parameters_reject_duplicates_and_double_splats() {
    let err = parse_err("def f(a, a) {}");
    assert_eq!(err.kind, ParseErrorKind::Argument);
    assert!(err.message.starts_with("Duplicate argument name: \"a\""), "{}", err.message);

    let err = parse_err("def f(*a, *b) {}");
    assert!(
        err.message.starts_with("Can't define splat argument more than once"),
        "{}",
        err.message
    );
}

#[test]
fn parameters_without_parentheses_are_rejected() {
    let err = parse_err("def f a { a }");
    assert_eq!(err.kind, ParseErrorKind::MethodDefinition);
    assert!(
        err.message
            .starts_with("Please add parentheses around method \"f\"'s parameters"),
        "{}",
        err.message
    );
}

#[test]
fn invalid_assignment_and_constant_calls_fail() {
    assert_eq!(parse_err("1 = 2").kind, ParseErrorKind::InvalidAssignment);

    let err = parse_err("Foo(1)");
    assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
    assert!(err.message.starts_with("cannot call CONSTANT with ("), "{}", err.message);
}

#[test]
fn switch_lowers_to_an_if_chain() {
    let program = parse("switch 3 { case 1, 2 { 10 } default { 0 } }");
    let StmtKind::Expression(expression) = &program.statements[0].kind else {
        panic!("expected an expression statement");
    };
    let ExprKind::If {
        conditionals,
        alternative,
    } = &expression.kind
    else {
        panic!("switch should become an if");
    };
    assert_eq!(conditionals.len(), 1);
    assert!(alternative.is_some());

    let ExprKind::Infix { left, operator, .. } = &conditionals[0].condition.kind else {
        panic!("case values should be joined");
    };
    assert_eq!(operator, "||");
    assert!(matches!(&left.kind, ExprKind::Infix { operator, .. } if operator == "==="));
}

#[test]
fn unfinished_input_is_reported_as_incomplete() {
    let err = parse_err("def f(x) {\n  x");
    assert_eq!(err.kind, ParseErrorKind::UnexpectedEof);
    assert!(err.is_incomplete());

    let err = parse_err("}");
    assert_eq!(err.kind, ParseErrorKind::UnexpectedEnd);
    assert!(err.is_incomplete());

    assert!(!parse_err("1 = 2").is_incomplete());
}

#[test]
fn modes_decide_which_statements_keep_their_value() {
    let source = "1\n2\n3";
    let kept = |mode| -> Vec<bool> {
        parse_program(source, mode)
            .expect("source should parse")
            .statements
            .iter()
            .map(|statement| match &statement.kind {
                StmtKind::Expression(expression) => !expression.is_stmt,
                _ => false,
            })
            .collect()
    };
    assert_eq!(kept(ParserMode::Normal), vec![false, false, false]);
    assert_eq!(kept(ParserMode::Test), vec![false, false, true]);
    assert_eq!(kept(ParserMode::Repl), vec![true, true, true]);
}

#[test]
fn repeated_hash_keys_keep_the_last_value() {
    let program = parse("h = { a: 1, a: 2 }\n# trailing comment");
    assert_eq!(program.statements.len(), 1);
    let StmtKind::Expression(expression) = &program.statements[0].kind else {
        panic!("expected an expression statement");
    };
    let ExprKind::Assign { value, .. } = &expression.kind else {
        panic!("expected an assignment");
    };
    let ExprKind::Hash(pairs) = &value.kind else {
        panic!("expected a hash literal");
    };
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].1.kind, ExprKind::Integer(2));
}
