mod common;

use common::{FILE, ParserMode, compile};
use lito::OpCode;
use lito::assembler::optimize_jumps;
use lito::bytecode::{Constant, SetKind};
use lito::compiler::{Generator, parse_program};

#[test]
fn arithmetic_uses_the_fast_opcodes() {
    let set = compile("1 + 2 * 3");
    assert_eq!(
        set.opcodes(),
        vec![
            OpCode::PutInt,
            OpCode::PutInt,
            OpCode::PutInt,
            OpCode::BinOp,
            OpCode::Add,
            OpCode::Pop,
            OpCode::Leave
        ]
    );
}

#[test]
fn locals_and_unknown_names_lower_differently() {
    let set = compile("x = 1\nx\nfoo");
    assert_eq!(
        set.opcodes(),
        vec![
            OpCode::PutInt,
            OpCode::SetLocal,
            OpCode::Pop,
            OpCode::GetLocal,
            OpCode::Pop,
            OpCode::PutSelf,
            OpCode::Send,
            OpCode::Pop,
            OpCode::Leave
        ]
    );
}

#[test]
fn branches_are_patched_to_their_targets() {
    let set = compile("if true { 1 } else { 2 }");
    let instructions: Vec<_> = set.instructions().collect();
    let ops: Vec<OpCode> = instructions.iter().map(|i| i.op).collect();
    assert_eq!(
        ops,
        vec![
            OpCode::PutTrue,
            OpCode::BranchUnless,
            OpCode::PutInt,
            OpCode::Jump,
            OpCode::PutInt,
            OpCode::Pop,
            OpCode::Leave
        ]
    );
    // else branch starts at the second putint, the jump lands on the pop
    assert_eq!(instructions[1].operand(0) as usize, instructions[4].pc);
    assert_eq!(instructions[3].operand(0) as usize, instructions[5].pc);
}

#[test]
fn jumps_to_leave_are_folded_and_the_pass_is_idempotent() {
    let set = compile("def f(x) { if x { 1 } else { 2 } }");
    let method = set.children().next().expect("method body");
    assert_eq!(method.kind, SetKind::Method);
    assert_eq!(
        method.opcodes(),
        vec![
            OpCode::GetLocal,
            OpCode::BranchUnless,
            OpCode::PutInt,
            OpCode::Leave,
            OpCode::NoOp,
            OpCode::PutInt,
            OpCode::Leave
        ]
    );

    let mut again = (**method).clone();
    optimize_jumps(&mut again);
    assert_eq!(again.code, method.code);
}

#[test]
fn while_loops_check_the_condition_at_the_bottom() {
    let set = compile("i = 0\nwhile i < 3 { i += 1 }");
    let instructions: Vec<_> = set.instructions().collect();
    let jump = instructions
        .iter()
        .find(|i| i.op == OpCode::Jump)
        .expect("loop entry jump");
    let branch = instructions
        .iter()
        .find(|i| i.op == OpCode::BranchIf)
        .expect("loop back edge");
    assert_eq!(branch.operand(0) as usize, jump.pc + OpCode::Jump.width());
    assert!(jump.operand(0) as usize > branch.operand(0) as usize);
    assert!(instructions.iter().any(|i| i.op == OpCode::Less));
}

#[test]
fn large_integers_go_through_the_constant_pool() {
    let set = compile("x = 5000000000");
    assert_eq!(set.opcodes()[0], OpCode::PutObject);
    assert!(set.constants.contains(&Constant::Int(5_000_000_000)));
}

#[test]
fn nested_sets_carry_the_file_name() {
    let set = compile("class C { def value { [1].each { |x| x } } }");
    assert_eq!(set.filename, FILE);
    let class_body = set.children().next().expect("class body");
    assert_eq!(class_body.kind, SetKind::Class);
    assert_eq!(class_body.filename, FILE);
    let method = class_body.children().next().expect("method body");
    assert_eq!(method.name, "value");
    let block = method.children().next().expect("block body");
    assert_eq!(block.kind, SetKind::Block);
    assert_eq!(block.filename, FILE);
}

#[test]
fn disassembly_lists_nested_sets() {
    let listing = compile("def f(a) { a }\nf(1)").disassemble();
    assert!(listing.starts_with("<Program:ProgramStart>"), "{listing}");
    assert!(listing.contains("def_method"), "{listing}");
    assert!(listing.contains("\"f\""), "{listing}");
    assert!(listing.contains("<Method:f>"), "{listing}");
    assert!(listing.contains("; line 2"), "{listing}");
}

#[test]
fn repl_generator_keeps_top_level_slots() {
    let mut generator = Generator::new(true);
    let first = parse_program("a = 1", ParserMode::Repl).expect("parse");
    let set = generator.generate(&first).expect("generate");
    assert_ne!(set.opcodes().last(), Some(&OpCode::Leave));

    let second = parse_program("b = a", ParserMode::Repl).expect("parse");
    let set = generator.generate(&second).expect("generate");
    assert_eq!(set.opcodes(), vec![OpCode::GetLocal, OpCode::SetLocal]);
    let load = set.instructions().next().expect("getlocal");
    assert_eq!(load.operands, &[0, 0]);
    assert_eq!(generator.top_level_slots(), 2);

    generator.reset();
    assert_eq!(generator.top_level_slots(), 0);
}
