pub mod assembler;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod logging;
pub mod vm;

pub use assembler::{Assembler, AssemblerError};
pub use bytecode::{InstructionSet, OpCode};
pub use compiler::{CompileError, ParseError, ParserMode, compile_file, compile_source};
pub use vm::{
    MachineKind, OutputSink, RunMode, Thread, Value, Vm, VmConfig, VmError, VmResult,
};

pub const VERSION: &str = "0.2.1";

/// Extension of script files and `require` targets.
pub const FILE_EXT: &str = "lito";

#[derive(Debug)]
pub enum LitoError {
    Compile(CompileError),
    Runtime(VmError),
}

impl std::fmt::Display for LitoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LitoError::Compile(err) => write!(f, "{err}"),
            LitoError::Runtime(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LitoError {}

impl From<CompileError> for LitoError {
    fn from(value: CompileError) -> Self {
        LitoError::Compile(value)
    }
}

impl From<VmError> for LitoError {
    fn from(value: VmError) -> Self {
        LitoError::Runtime(value)
    }
}

/// Compiles `source` and runs it on a fresh machine built from `config`.
pub fn run_source(source: &str, filename: &str, config: VmConfig) -> Result<Value, LitoError> {
    let set = compile_source(source, filename, ParserMode::Normal)?;
    let vm = Vm::new(config);
    Ok(vm.run(set)?)
}

#[cfg(feature = "runtime")]
pub fn run_file(path: impl AsRef<std::path::Path>, config: VmConfig) -> Result<Value, LitoError> {
    let path = path.as_ref();
    let set = compile_file(path, ParserMode::Normal)?;
    let vm = Vm::new(config);
    vm.mark_loaded(&path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
    Ok(vm.run(set)?)
}
