#![allow(dead_code, unused_imports)]

use std::sync::Arc;

pub use lito::compiler::ast::Program;
pub use lito::compiler::lexer::Lexer;
pub use lito::compiler::token::TokenKind;
pub use lito::{
    CompileError, InstructionSet, OutputSink, ParseError, ParserMode, Value, Vm, VmConfig,
    VmError, compile_source,
};

pub const FILE: &str = "test.lito";

pub fn lex_kinds(source: &str) -> Vec<TokenKind> {
    Lexer::tokenize(source)
        .into_iter()
        .map(|token| token.kind)
        .collect()
}

pub fn parse(source: &str) -> Program {
    lito::compiler::parse_program(source, ParserMode::Normal).expect("source should parse")
}

pub fn parse_err(source: &str) -> ParseError {
    lito::compiler::parse_program(source, ParserMode::Normal).expect_err("source should not parse")
}

pub fn compile(source: &str) -> Arc<InstructionSet> {
    compile_source(source, FILE, ParserMode::Normal).expect("source should compile")
}

fn sandbox() -> (Arc<Vm>, lito::vm::CapturedOutput) {
    let (sink, captured) = OutputSink::capture();
    (Vm::new(VmConfig::sandbox().with_output(sink)), captured)
}

/// Runs `source` on a sandbox machine and returns what it printed.
pub fn run(source: &str) -> String {
    let (vm, captured) = sandbox();
    if let Err(err) = vm.run(compile(source)) {
        panic!("program failed: {err}\noutput so far: {}", captured.contents());
    }
    captured.contents()
}

/// Value of the last expression statement.
pub fn eval(source: &str) -> Value {
    let (vm, _) = sandbox();
    let set = compile_source(source, FILE, ParserMode::Test).expect("source should compile");
    vm.run(set).expect("program should run")
}

/// Runs `source` expecting an uncaught error; returns the error and the output.
pub fn run_err(source: &str) -> (VmError, String) {
    let (vm, captured) = sandbox();
    match vm.run(compile(source)) {
        Ok(value) => panic!("program should fail, returned {value:?}"),
        Err(err) => (err, captured.contents()),
    }
}

/// Message of the uncaught error raised by `source`.
pub fn error_message(source: &str) -> String {
    match run_err(source).0 {
        VmError::Raised(err) => err.message.clone(),
        other => panic!("expected a raised error, got {other}"),
    }
}
