mod common;

use common::{Value, error_message, eval, run, run_err};

#[test]
fn defers_run_last_in_first_out_after_the_body() {
    let source = "\
def f {
  defer { println(1) }
  defer { println(2) }
  println(0)
}
f
";
    assert_eq!(run(source), "0\n2\n1\n");
}

#[test]
fn defer_arguments_are_captured_when_registered() {
    let source = "\
def g {
  x = 1
  defer(x) { |v| println(v) }
  x = 2
  println(x)
}
g
";
    assert_eq!(run(source), "2\n1\n");
}

#[test]
fn defers_run_when_the_body_raises() {
    let source = "\
def risky {
  defer { println(\"cleanup\") }
  raise(ArgumentError, \"boom\")
  println(\"unreachable\")
}
try { risky }.catch(ArgumentError) { |e| println(e.message) }
";
    assert_eq!(run(source), "cleanup\nArgumentError: 'boom'\n");
}

#[test]
fn defers_do_not_change_the_return_value() {
    let source = "\
def h {
  defer { 99 }
  42
}
println(h)
";
    assert_eq!(run(source), "42\n");
}

#[test]
fn lookup_receives_the_missing_method_name_first() {
    let source = "\
class Ghost {
  def lookup!(name, *args) {
    name + \":\" + args.length.string
  }
}
println(Ghost.new.boo(1, 2))
";
    assert_eq!(run(source), "boo:2\n");
}

#[test]
fn subclasses_use_lookup_only_after_opting_in() {
    let definitions = "\
class Ghost {
  def lookup!(name) {
    \"ghost \" + name
  }
}
class Phantom < Ghost {}
";
    let message = error_message(&format!("{definitions}Phantom.new.wail\n"));
    assert!(
        message.starts_with("NoMethodError: Undefined Method 'wail'"),
        "{message}"
    );

    let output = run(&format!(
        "{definitions}Phantom.inherits_lookup!\nprintln(Phantom.new.wail)\n"
    ));
    assert_eq!(output, "ghost wail\n");
}

#[test]
fn undefined_methods_name_the_receiver() {
    assert_eq!(
        error_message("1.foo"),
        "NoMethodError: Undefined Method 'foo' for 1"
    );
}

#[test]
fn unknown_constants_are_name_errors() {
    assert_eq!(
        error_message("println(Missing)"),
        "NameError: uninitialized constant Missing"
    );
}

#[test]
fn raise_formats_its_message_from_the_arguments() {
    assert_eq!(error_message("raise"), "Error: ");
    assert_eq!(error_message("raise(\"text\")"), "Error: 'text'");
    assert_eq!(
        error_message("raise(TypeError, \"wrong\")"),
        "TypeError: 'wrong'"
    );
}

#[test]
fn catch_with_another_class_lets_the_error_continue() {
    let source = "try { raise(TypeError, \"t\") }.catch(ArgumentError) { |e| println(\"caught\") }";
    let (err, output) = run_err(source);
    assert_eq!(output, "");
    assert_eq!(err.to_string(), "TypeError: 't'");
}

#[test]
fn catch_without_classes_takes_any_error() {
    let source = "try { raise(\"x\") }.catch { |e| println(e.type) }";
    assert_eq!(run(source), "Error\n");
}

#[test]
fn finally_runs_and_the_error_keeps_going() {
    let (err, output) = run_err("try { raise(\"x\") }.finally { |e| println(\"done\") }");
    assert_eq!(output, "done\n");
    assert_eq!(err.to_string(), "Error: 'x'");
}

#[test]
fn new_errors_are_not_raised_until_asked() {
    let source = "\
err = ArgumentError.new(\"later\")
println(err.message)
println(\"still running\")
";
    assert_eq!(run(source), "ArgumentError: 'later'\nstill running\n");
}

#[test]
fn division_by_zero_is_reported() {
    assert_eq!(error_message("10 / 0"), "ZeroDivisionError: Divided by 0");
}

#[test]
fn properties_define_readers_and_writers() {
    let source = "\
class Animal {
  property(\"name\")
  def init(name) {
    @name = name
  }
}
class Dog < Animal {}
d = Dog.new(\"rex\")
println(d.name)
d.name = \"max\"
println(d.name)
println(d.is_a?(Animal))
println(Dog < Animal)
println(Dog.superclass)
println(d.class)
";
    assert_eq!(run(source), "rex\nmax\ntrue\ntrue\nAnimal\nDog\n");
}

#[test]
fn modules_join_the_ancestor_chain() {
    let source = "\
module Loud {
  def shout {
    \"HEY\"
  }
}
class Speaker {
  include(Loud)
}
println(Speaker.new.shout)
println(Speaker.ancestors.first(2))
";
    assert_eq!(run(source), "HEY\n[Speaker, Loud]\n");
}

#[test]
fn user_string_methods_drive_printing() {
    let source = "\
class Point {
  def init(x) {
    @x = x
  }
  def string {
    \"P(\" + @x.string + \")\"
  }
}
println(Point.new(3))
";
    assert_eq!(run(source), "P(3)\n");
}

#[test]
fn inspect_shows_instance_variables() {
    let source = "\
class Box {
  def init(n) {
    @n = n
  }
}
println(Box.new(5).inspect)
";
    assert_eq!(run(source), "#<Box:instance @n=5 >\n");
}

#[test]
fn blocks_update_enclosing_locals() {
    let source = "\
total = 0
[1, 2, 3].each { |n| total = total + n }
total
";
    assert_eq!(eval(source).as_int(), Some(6));
}

#[test]
fn while_loops_and_conditionals_evaluate() {
    let source = "\
i = 0
seen = []
while i < 5 {
  if i % 2 == 0 {
    seen.push(i)
  }
  i = i + 1
}
seen
";
    let Value::Array(seen) = eval(source) else {
        panic!("expected an array");
    };
    let values: Vec<_> = seen.snapshot().iter().filter_map(Value::as_int).collect();
    assert_eq!(values, vec![0, 2, 4]);
}

#[test]
fn yield_passes_values_to_the_block() {
    let source = "\
def twice {
  yield(1)
  yield(2)
}
twice { |n| println(n * 10) }
";
    assert_eq!(run(source), "10\n20\n");
}

#[test]
fn splat_parameters_collect_the_rest() {
    let source = "\
def count(first, *rest) {
  rest.length
}
println(count(1, 2, 3, 4))
";
    assert_eq!(run(source), "3\n");
}

#[test]
fn array_literals_build_on_an_empty_stack() {
    let source = "\
a = [1]
println(a.length)
first, second = [1, 2]
println(first + second)
[7].each { |n| println(n) }
";
    assert_eq!(run(source), "1\n3\n7\n");
}

#[test]
fn break_stops_the_iterating_method() {
    let source = "\
5.times { |i|
  if i == 2 {
    break
  }
  println(i)
}
println(\"after\")
";
    assert_eq!(run(source), "0\n1\nafter\n");
}

#[test]
fn while_loops_honour_break_and_continue() {
    let source = "\
i = 0
while i < 10 {
  i = i + 1
  if i == 2 {
    continue
  }
  if i == 4 {
    break
  }
  println(i)
}
println(i)
";
    assert_eq!(run(source), "1\n3\n4\n");
}
