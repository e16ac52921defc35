use std::fmt::{self, Write as _};
use std::sync::Arc;

/// Marks an optional operand (block, argument set) that is absent.
pub const NO_OPERAND: u32 = u32::MAX;

/// Superclass name used by `def_class` when the class declares no parent.
pub const NO_SUPER_CLASS: &str = "__none__";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    /// Inline integer.
    Int,
    /// Index into the owning set's constant pool.
    Const,
    /// Absolute code position.
    Jump,
}

#[derive(Clone, Copy, Debug)]
pub struct Descriptor {
    pub mnemonic: &'static str,
    pub operands: &'static [OperandKind],
}

use OperandKind::{Const, Int, Jump};

const NONE: &[OperandKind] = &[];
const LOCAL: &[OperandKind] = &[Int, Int];
const CONST: &[OperandKind] = &[Const];
const INT: &[OperandKind] = &[Int];
const JUMP: &[OperandKind] = &[Jump];
const DEF_METHOD: &[OperandKind] = &[Int, Const, Const];
const DEF_CLASS: &[OperandKind] = &[Const, Const, Const, Const];
const SEND: &[OperandKind] = &[Const, Int, Const, Const];
const DEFER: &[OperandKind] = &[Int, Const];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    NoOp = 0,
    GetLocal,
    GetConstant,
    GetConstantNamespace,
    GetInstanceVariable,
    SetLocal,
    SetOptional,
    SetConstant,
    SetInstanceVariable,
    PutTrue,
    PutFalse,
    PutString,
    PutFloat,
    PutSelf,
    PutSuper,
    PutInt,
    PutObject,
    PutNil,
    NewArray,
    ExpandArray,
    SplatArray,
    SplatBlock,
    NewHash,
    NewRange,
    NewRangeExcl,
    BranchUnless,
    BranchIf,
    Jump,
    Break,
    DefMethod,
    DefMetaMethod,
    DefClass,
    Send,
    BinOp,
    Add,
    Subtract,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    InvokeBlock,
    GetBlock,
    HasBlock,
    Pop,
    Dup,
    Defer,
    Leave,
}

impl OpCode {
    pub const ALL: [OpCode; 47] = [
        OpCode::NoOp,
        OpCode::GetLocal,
        OpCode::GetConstant,
        OpCode::GetConstantNamespace,
        OpCode::GetInstanceVariable,
        OpCode::SetLocal,
        OpCode::SetOptional,
        OpCode::SetConstant,
        OpCode::SetInstanceVariable,
        OpCode::PutTrue,
        OpCode::PutFalse,
        OpCode::PutString,
        OpCode::PutFloat,
        OpCode::PutSelf,
        OpCode::PutSuper,
        OpCode::PutInt,
        OpCode::PutObject,
        OpCode::PutNil,
        OpCode::NewArray,
        OpCode::ExpandArray,
        OpCode::SplatArray,
        OpCode::SplatBlock,
        OpCode::NewHash,
        OpCode::NewRange,
        OpCode::NewRangeExcl,
        OpCode::BranchUnless,
        OpCode::BranchIf,
        OpCode::Jump,
        OpCode::Break,
        OpCode::DefMethod,
        OpCode::DefMetaMethod,
        OpCode::DefClass,
        OpCode::Send,
        OpCode::BinOp,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Greater,
        OpCode::Less,
        OpCode::GreaterEqual,
        OpCode::LessEqual,
        OpCode::InvokeBlock,
        OpCode::GetBlock,
        OpCode::HasBlock,
        OpCode::Pop,
        OpCode::Dup,
        OpCode::Defer,
        OpCode::Leave,
    ];

    pub fn descriptor(self) -> Descriptor {
        let (mnemonic, operands) = match self {
            OpCode::NoOp => ("no_op", NONE),
            OpCode::GetLocal => ("getlocal", LOCAL),
            OpCode::GetConstant => ("getconstant", CONST),
            OpCode::GetConstantNamespace => ("getconstantnamespace", CONST),
            OpCode::GetInstanceVariable => ("getinstancevariable", CONST),
            OpCode::SetLocal => ("setlocal", LOCAL),
            OpCode::SetOptional => ("setoptional", LOCAL),
            OpCode::SetConstant => ("setconstant", CONST),
            OpCode::SetInstanceVariable => ("setinstancevariable", CONST),
            OpCode::PutTrue => ("puttrue", NONE),
            OpCode::PutFalse => ("putfalse", NONE),
            OpCode::PutString => ("putstring", CONST),
            OpCode::PutFloat => ("putfloat", CONST),
            OpCode::PutSelf => ("putself", NONE),
            OpCode::PutSuper => ("putsuper", NONE),
            OpCode::PutInt => ("putint", INT),
            OpCode::PutObject => ("putobject", CONST),
            OpCode::PutNil => ("putnil", NONE),
            OpCode::NewArray => ("newarray", INT),
            OpCode::ExpandArray => ("expand_array", INT),
            OpCode::SplatArray => ("splat_array", NONE),
            OpCode::SplatBlock => ("splat_block", NONE),
            OpCode::NewHash => ("newhash", INT),
            OpCode::NewRange => ("newrange", NONE),
            OpCode::NewRangeExcl => ("newrangeexcl", NONE),
            OpCode::BranchUnless => ("branchunless", JUMP),
            OpCode::BranchIf => ("branchif", JUMP),
            OpCode::Jump => ("jump", JUMP),
            OpCode::Break => ("break", NONE),
            OpCode::DefMethod => ("def_method", DEF_METHOD),
            OpCode::DefMetaMethod => ("def_meta_method", DEF_METHOD),
            OpCode::DefClass => ("def_class", DEF_CLASS),
            OpCode::Send => ("send", SEND),
            OpCode::BinOp => ("bin_op", CONST),
            OpCode::Add => ("add", CONST),
            OpCode::Subtract => ("subtract", CONST),
            OpCode::Greater => ("greater", CONST),
            OpCode::Less => ("less", CONST),
            OpCode::GreaterEqual => ("greater_equal", CONST),
            OpCode::LessEqual => ("less_equal", CONST),
            OpCode::InvokeBlock => ("invokeblock", INT),
            OpCode::GetBlock => ("getblock", NONE),
            OpCode::HasBlock => ("hasblock", NONE),
            OpCode::Pop => ("pop", NONE),
            OpCode::Dup => ("dup", NONE),
            OpCode::Defer => ("defer", DEFER),
            OpCode::Leave => ("leave", NONE),
        };
        Descriptor { mnemonic, operands }
    }

    pub fn mnemonic(self) -> &'static str {
        self.descriptor().mnemonic
    }

    pub fn parse_mnemonic(op: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|code| code.mnemonic() == op)
    }

    pub fn from_u32(word: u32) -> Option<Self> {
        Self::ALL.get(word as usize).copied()
    }

    /// Number of code words taken by the opcode and its operands.
    pub fn width(self) -> usize {
        1 + self.descriptor().operands.len()
    }

    pub fn is_jump(self) -> bool {
        matches!(self, OpCode::BranchUnless | OpCode::BranchIf | OpCode::Jump)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArgType {
    Normal,
    Optioned,
    Splat,
    RequiredKeyword,
    OptionalKeyword,
}

impl ArgType {
    pub fn is_keyword(self) -> bool {
        matches!(self, ArgType::RequiredKeyword | ArgType::OptionalKeyword)
    }
}

/// Parameter kinds of a method, or argument kinds at a call site.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArgSet {
    pub names: Vec<String>,
    pub types: Vec<ArgType>,
}

impl ArgSet {
    pub fn push(&mut self, name: impl Into<String>, kind: ArgType) {
        self.names.push(name.into());
        self.types.push(kind);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn find_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }

    pub fn has_keywords(&self) -> bool {
        self.types.iter().any(|kind| kind.is_keyword())
    }

    pub fn count(&self, kind: ArgType) -> usize {
        self.types.iter().filter(|candidate| **candidate == kind).count()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    String(String),
    InstructionSet(Arc<InstructionSet>),
    ArgSet(ArgSet),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(value) => write!(f, "{value}"),
            Constant::Float(value) => write!(f, "{value:?}"),
            Constant::String(value) => f.write_str(value),
            Constant::InstructionSet(set) => write!(f, "<{}:{}>", set.kind, set.name),
            Constant::ArgSet(args) => {
                f.write_str("(")?;
                for (index, name) in args.names.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(name)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetKind {
    Program,
    Method,
    Class,
    Block,
}

impl fmt::Display for SetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetKind::Program => "Program",
            SetKind::Method => "Method",
            SetKind::Class => "Class",
            SetKind::Block => "Block",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstructionSet {
    pub name: String,
    pub filename: String,
    pub kind: SetKind,
    pub code: Vec<u32>,
    pub constants: Vec<Constant>,
    /// One source line per code word.
    pub source_map: Vec<usize>,
    pub arg_types: ArgSet,
}

/// Decoded view of one instruction.
#[derive(Clone, Copy, Debug)]
pub struct Instruction<'a> {
    pub pc: usize,
    pub op: OpCode,
    pub operands: &'a [u32],
    pub line: usize,
}

impl<'a> Instruction<'a> {
    pub fn operand(&self, index: usize) -> u32 {
        self.operands.get(index).copied().unwrap_or(NO_OPERAND)
    }
}

impl InstructionSet {
    pub fn new(name: impl Into<String>, kind: SetKind) -> Self {
        Self {
            name: name.into(),
            filename: String::new(),
            kind,
            code: Vec::new(),
            constants: Vec::new(),
            source_map: Vec::new(),
            arg_types: ArgSet::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn decode(&self, pc: usize) -> Option<Instruction<'_>> {
        let op = OpCode::from_u32(*self.code.get(pc)?)?;
        let end = pc + op.width();
        let operands = self.code.get(pc + 1..end)?;
        Some(Instruction {
            pc,
            op,
            operands,
            line: self.line_at(pc),
        })
    }

    pub fn instructions(&self) -> Instructions<'_> {
        Instructions { set: self, pc: 0 }
    }

    pub fn line_at(&self, pc: usize) -> usize {
        self.source_map
            .get(pc)
            .or_else(|| self.source_map.last())
            .copied()
            .unwrap_or(0)
    }

    pub fn constant(&self, index: u32) -> Option<&Constant> {
        if index == NO_OPERAND {
            return None;
        }
        self.constants.get(index as usize)
    }

    pub fn string(&self, index: u32) -> Option<&str> {
        match self.constant(index)? {
            Constant::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn child(&self, index: u32) -> Option<&Arc<InstructionSet>> {
        match self.constant(index)? {
            Constant::InstructionSet(set) => Some(set),
            _ => None,
        }
    }

    pub fn arg_set(&self, index: u32) -> Option<&ArgSet> {
        match self.constant(index)? {
            Constant::ArgSet(args) => Some(args),
            _ => None,
        }
    }

    /// Nested sets referenced from the pool, in pool order.
    pub fn children(&self) -> impl Iterator<Item = &Arc<InstructionSet>> {
        self.constants.iter().filter_map(|constant| match constant {
            Constant::InstructionSet(set) => Some(set),
            _ => None,
        })
    }

    pub fn opcodes(&self) -> Vec<OpCode> {
        self.instructions().map(|instruction| instruction.op).collect()
    }

    /// Recursively stamps `filename` on this set and every nested set.
    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = filename.to_string();
        for constant in &mut self.constants {
            if let Constant::InstructionSet(child) = constant {
                let renamed = (**child).clone().with_filename(filename);
                *child = Arc::new(renamed);
            }
        }
        self
    }

    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out);
        out
    }

    fn disassemble_into(&self, out: &mut String) {
        let _ = writeln!(out, "<{}:{}>", self.kind, self.name);
        for instruction in self.instructions() {
            let _ = write!(out, "{:04} {:<22}", instruction.pc, instruction.op.mnemonic());
            let kinds = instruction.op.descriptor().operands;
            for (kind, word) in kinds.iter().zip(instruction.operands) {
                out.push(' ');
                self.render_operand(out, *kind, *word);
            }
            let _ = writeln!(out, "  ; line {}", instruction.line);
        }
        for child in self.children() {
            out.push('\n');
            child.disassemble_into(out);
        }
    }

    fn render_operand(&self, out: &mut String, kind: OperandKind, word: u32) {
        if word == NO_OPERAND {
            out.push('-');
            return;
        }
        match kind {
            OperandKind::Int => {
                let _ = write!(out, "{word}");
            }
            OperandKind::Jump => {
                let _ = write!(out, "@{word:04}");
            }
            OperandKind::Const => match self.constant(word) {
                Some(Constant::String(value)) => {
                    let _ = write!(out, "{value:?}");
                }
                Some(constant) => {
                    let _ = write!(out, "{constant}");
                }
                None => {
                    let _ = write!(out, "#{word}?");
                }
            },
        }
    }
}

pub struct Instructions<'a> {
    set: &'a InstructionSet,
    pc: usize,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Instruction<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let instruction = self.set.decode(self.pc)?;
        self.pc += instruction.op.width();
        Some(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_round_trip_through_the_table() {
        for op in OpCode::ALL {
            assert_eq!(OpCode::parse_mnemonic(op.mnemonic()), Some(op));
            assert_eq!(OpCode::from_u32(op as u32), Some(op));
        }
        assert_eq!(OpCode::from_u32(OpCode::ALL.len() as u32), None);
    }

    #[test]
    fn widths_follow_descriptor() {
        assert_eq!(OpCode::Send.width(), 5);
        assert_eq!(OpCode::DefClass.width(), 5);
        assert_eq!(OpCode::GetLocal.width(), 3);
        assert_eq!(OpCode::Leave.width(), 1);
    }
}
