use std::path::Path;
use std::sync::Arc;

use crate::assembler::AssemblerError;
use crate::bytecode::InstructionSet;

pub mod ast;
pub mod diagnostics;
pub mod fsm;
pub mod generator;
pub mod lexer;
pub mod parser;
pub mod token;

pub use generator::Generator;
pub use parser::{ParseError, ParseErrorKind, Parser, ParserMode, parse_program};

#[derive(Debug)]
pub enum CompileError {
    Parse(ParseError),
    Assembler(AssemblerError),
    Io(std::io::Error),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Parse(err) => write!(f, "{err}"),
            CompileError::Assembler(err) => write!(f, "bytecode error: {err}"),
            CompileError::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<ParseError> for CompileError {
    fn from(value: ParseError) -> Self {
        CompileError::Parse(value)
    }
}

impl From<AssemblerError> for CompileError {
    fn from(value: AssemblerError) -> Self {
        CompileError::Assembler(value)
    }
}

impl From<std::io::Error> for CompileError {
    fn from(value: std::io::Error) -> Self {
        CompileError::Io(value)
    }
}

impl CompileError {
    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            CompileError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

/// Parses and lowers `source` into its program instruction set.
pub fn compile_source(
    source: &str,
    filename: &str,
    mode: ParserMode,
) -> Result<Arc<InstructionSet>, CompileError> {
    let program = parse_program(source, mode)?;
    let mut generator = Generator::new(mode == ParserMode::Repl);
    let set = generator.generate(&program)?;
    tracing::debug!(
        file = filename,
        statements = program.statements.len(),
        words = set.code.len(),
        "compiled"
    );
    Ok(Arc::new(set.with_filename(filename)))
}

pub fn compile_file(
    path: impl AsRef<Path>,
    mode: ParserMode,
) -> Result<Arc<InstructionSet>, CompileError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)?;
    compile_source(&source, &path.to_string_lossy(), mode)
}
