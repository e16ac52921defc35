mod common;

use common::{error_message, run};

#[test]
fn array_transformations() {
    let source = "\
doubled = [1, 2, 3].map { |n| n * 2 }
println(doubled)
evens = [1, 2, 3, 4].filter { |n| n % 2 == 0 }
println(evens)
sum = [1, 2, 3].reduce(10) { |acc, n| acc + n }
println(sum)
println([1, [2, [3]]].flatten.join(\"-\"))
println([3, 1, 2].sort)
println([\"b\", \"c\", \"a\"].sort)
";
    assert_eq!(
        run(source),
        "[2, 4, 6]\n[2, 4]\n16\n1-2-3\n[1, 2, 3]\n[\"a\", \"b\", \"c\"]\n"
    );
}

#[test]
fn array_indexing_and_mutation() {
    let source = "\
a = [1, 2, 3, 4]
println(a[-1])
println(a[1..2])
println(a[10])
a.push(5)
println(a.pop)
a[0] = 9
println(a.first(2))
println(a.length)
println(a.include?(3))
";
    assert_eq!(run(source), "4\n[2, 3]\n\n5\n[9, 2]\n4\ntrue\n");
}

#[test]
fn hashes_keep_keys_sorted() {
    let source = "\
h = { b: 2, a: 1 }
h[\"c\"] = 3
println(h.keys)
println(h.length)
println(h)
other = { a: 9 }
println(h.merge(other)[\"a\"])
println(h[\"missing\"].nil?)
";
    assert_eq!(
        run(source),
        "[\"a\", \"b\", \"c\"]\n3\n{ a: 1, b: 2, c: 3 }\n9\ntrue\n"
    );
}

#[test]
fn string_helpers() {
    let source = "\
println(\"a,b,c\".split(\",\"))
println(\"Lito\".upper)
println(\"  pad \".strip + \"|\")
println(\"hello\".reverse)
println(\"hello\"[1..3])
println(\"ab\" * 3)
println(\"42\".int + 1)
println(String.fmt(\"%s-%s\", 1, \"x\"))
";
    assert_eq!(
        run(source),
        "[\"a\", \"b\", \"c\"]\nLITO\npad|\nolleh\nell\nababab\n43\n1-x\n"
    );
}

#[test]
fn numbers_stay_integral_until_a_float_appears() {
    let source = "\
println(7 / 2)
println(7 / 2.0)
println(2 ** 10)
println(1.0 + 2)
println(3.times.array)
";
    assert_eq!(run(source), "3\n3.5\n1024\n3.0\n[0, 1, 2]\n");
}

#[test]
fn ranges_enumerate_their_values() {
    let source = "\
println((1..4).array)
println((1...4).size)
seen = []
(1..10).step(3) { |n| seen.push(n) }
println(seen)
";
    assert_eq!(run(source), "[1, 2, 3, 4]\n3\n[1, 4, 7, 10]\n");
}

#[test]
fn regexps_match_strings() {
    let source = "\
re = Regexp.new(\"l+\")
println(re.match?(\"hello\"))
println(re.match?(\"abc\"))
";
    assert_eq!(run(source), "true\nfalse\n");
    assert_eq!(
        error_message("Regexp.new(\"a(\")"),
        "ArgumentError: Invalid regexp: a("
    );
}

#[test]
fn json_parses_and_renders() {
    let source = "\
require \"json\"
h = JSON.parse('{\"a\": [1, 2.5, null], \"b\": \"x\"}')
println(h[\"a\"])
println(h[\"b\"])
data = { b: [true, nil], a: 1 }
println(data.json)
";
    assert_eq!(run(source), "[1, 2.5, nil]\nx\n{\"a\":1,\"b\":[true, null]}\n");
}

#[test]
fn json_needs_to_be_required() {
    assert_eq!(
        error_message("JSON.parse(\"1\")"),
        "NameError: uninitialized constant JSON"
    );
}

#[test]
fn wrong_argument_counts_are_reported() {
    assert_eq!(
        error_message("[1].include?"),
        "ArgumentError: Expect 1 argument(s). got: 0"
    );
}
