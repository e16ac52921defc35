use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::bytecode::{
    ArgSet, Constant, InstructionSet, NO_OPERAND, OpCode, SetKind,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    AnchorRebound(usize),
    UnboundAnchor(usize),
}

impl fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblerError::AnchorRebound(id) => write!(f, "anchor {id} bound twice"),
            AssemblerError::UnboundAnchor(id) => write!(f, "anchor {id} was never bound"),
        }
    }
}

impl std::error::Error for AssemblerError {}

/// Forward-referenceable jump target inside one set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Anchor(usize);

struct Fixup {
    at: usize,
    anchor: Anchor,
}

/// Builds one instruction set. Jumps name anchors and are patched in `finish`.
pub struct Assembler {
    name: String,
    kind: SetKind,
    code: Vec<u32>,
    source_map: Vec<usize>,
    line: usize,
    constants: Vec<Constant>,
    int_constants: HashMap<i64, u32>,
    float_constants: HashMap<u64, u32>,
    string_constants: HashMap<String, u32>,
    anchors: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
    arg_types: ArgSet,
}

impl Assembler {
    pub fn new(name: impl Into<String>, kind: SetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            code: Vec::new(),
            source_map: Vec::new(),
            line: 0,
            constants: Vec::new(),
            int_constants: HashMap::new(),
            float_constants: HashMap::new(),
            string_constants: HashMap::new(),
            anchors: Vec::new(),
            fixups: Vec::new(),
            arg_types: ArgSet::default(),
        }
    }

    pub fn kind(&self) -> SetKind {
        self.kind
    }

    pub fn position(&self) -> u32 {
        self.code.len() as u32
    }

    /// Line recorded for every word emitted from now on.
    pub fn set_line(&mut self, line: usize) {
        self.line = line;
    }

    pub fn arg_types_mut(&mut self) -> &mut ArgSet {
        &mut self.arg_types
    }

    pub fn new_anchor(&mut self) -> Anchor {
        self.anchors.push(None);
        Anchor(self.anchors.len() - 1)
    }

    pub fn bind(&mut self, anchor: Anchor) -> Result<(), AssemblerError> {
        let position = self.position();
        match self.anchors.get_mut(anchor.0) {
            Some(slot) if slot.is_none() => {
                *slot = Some(position);
                Ok(())
            }
            _ => Err(AssemblerError::AnchorRebound(anchor.0)),
        }
    }

    pub fn add_constant(&mut self, value: Constant) -> u32 {
        match value {
            Constant::Int(number) => {
                if let Some(index) = self.int_constants.get(&number).copied() {
                    return index;
                }
                let index = self.push_constant(Constant::Int(number));
                self.int_constants.insert(number, index);
                index
            }
            Constant::Float(number) => {
                let bits = number.to_bits();
                if let Some(index) = self.float_constants.get(&bits).copied() {
                    return index;
                }
                let index = self.push_constant(Constant::Float(number));
                self.float_constants.insert(bits, index);
                index
            }
            Constant::String(text) => {
                if let Some(index) = self.string_constants.get(&text).copied() {
                    return index;
                }
                let index = self.push_constant(Constant::String(text.clone()));
                self.string_constants.insert(text, index);
                index
            }
            other => self.push_constant(other),
        }
    }

    fn push_constant(&mut self, value: Constant) -> u32 {
        let index = self.constants.len() as u32;
        self.constants.push(value);
        index
    }

    fn string(&mut self, text: &str) -> u32 {
        self.add_constant(Constant::String(text.to_string()))
    }

    fn emit(&mut self, op: OpCode, operands: &[u32]) {
        self.code.push(op as u32);
        self.code.extend_from_slice(operands);
        for _ in 0..op.width() {
            self.source_map.push(self.line);
        }
    }

    fn emit_jump(&mut self, op: OpCode, anchor: Anchor) {
        let at = self.code.len() + 1;
        self.emit(op, &[NO_OPERAND]);
        self.fixups.push(Fixup { at, anchor });
    }

    /// Patches anchors, runs the peephole pass and seals the set.
    pub fn finish(mut self) -> Result<InstructionSet, AssemblerError> {
        for fixup in self.fixups.drain(..) {
            let target = self
                .anchors
                .get(fixup.anchor.0)
                .copied()
                .flatten()
                .ok_or(AssemblerError::UnboundAnchor(fixup.anchor.0))?;
            self.code[fixup.at] = target;
        }
        let mut set = InstructionSet {
            name: self.name,
            filename: String::new(),
            kind: self.kind,
            code: self.code,
            constants: self.constants,
            source_map: self.source_map,
            arg_types: self.arg_types,
        };
        optimize_jumps(&mut set);
        Ok(set)
    }

    pub fn no_op(&mut self) {
        self.emit(OpCode::NoOp, &[]);
    }

    pub fn get_local(&mut self, depth: usize, index: usize) {
        self.emit(OpCode::GetLocal, &[depth as u32, index as u32]);
    }

    pub fn set_local(&mut self, depth: usize, index: usize) {
        self.emit(OpCode::SetLocal, &[depth as u32, index as u32]);
    }

    pub fn set_optional(&mut self, depth: usize, index: usize) {
        self.emit(OpCode::SetOptional, &[depth as u32, index as u32]);
    }

    pub fn get_constant(&mut self, name: &str, is_namespace: bool) {
        let index = self.string(name);
        let op = if is_namespace {
            OpCode::GetConstantNamespace
        } else {
            OpCode::GetConstant
        };
        self.emit(op, &[index]);
    }

    pub fn set_constant(&mut self, name: &str) {
        let index = self.string(name);
        self.emit(OpCode::SetConstant, &[index]);
    }

    pub fn get_instance_variable(&mut self, name: &str) {
        let index = self.string(name);
        self.emit(OpCode::GetInstanceVariable, &[index]);
    }

    pub fn set_instance_variable(&mut self, name: &str) {
        let index = self.string(name);
        self.emit(OpCode::SetInstanceVariable, &[index]);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.emit(
            if value {
                OpCode::PutTrue
            } else {
                OpCode::PutFalse
            },
            &[],
        );
    }

    pub fn put_string(&mut self, value: &str) {
        let index = self.string(value);
        self.emit(OpCode::PutString, &[index]);
    }

    pub fn put_float(&mut self, value: f64) {
        let index = self.add_constant(Constant::Float(value));
        self.emit(OpCode::PutFloat, &[index]);
    }

    /// Small non-negative integers are inlined; anything else goes through the pool.
    pub fn put_int(&mut self, value: i64) {
        match u32::try_from(value) {
            Ok(inline) if inline != NO_OPERAND => self.emit(OpCode::PutInt, &[inline]),
            _ => {
                let index = self.add_constant(Constant::Int(value));
                self.emit(OpCode::PutObject, &[index]);
            }
        }
    }

    pub fn put_self(&mut self) {
        self.emit(OpCode::PutSelf, &[]);
    }

    pub fn put_super(&mut self) {
        self.emit(OpCode::PutSuper, &[]);
    }

    pub fn put_nil(&mut self) {
        self.emit(OpCode::PutNil, &[]);
    }

    pub fn new_array(&mut self, count: usize) {
        self.emit(OpCode::NewArray, &[count as u32]);
    }

    pub fn expand_array(&mut self, count: usize) {
        self.emit(OpCode::ExpandArray, &[count as u32]);
    }

    pub fn splat_array(&mut self) {
        self.emit(OpCode::SplatArray, &[]);
    }

    pub fn splat_block(&mut self) {
        self.emit(OpCode::SplatBlock, &[]);
    }

    pub fn new_hash(&mut self, words: usize) {
        self.emit(OpCode::NewHash, &[words as u32]);
    }

    pub fn new_range(&mut self, exclusive: bool) {
        let op = if exclusive {
            OpCode::NewRangeExcl
        } else {
            OpCode::NewRange
        };
        self.emit(op, &[]);
    }

    pub fn branch_unless(&mut self, anchor: Anchor) {
        self.emit_jump(OpCode::BranchUnless, anchor);
    }

    pub fn branch_if(&mut self, anchor: Anchor) {
        self.emit_jump(OpCode::BranchIf, anchor);
    }

    pub fn jump(&mut self, anchor: Anchor) {
        self.emit_jump(OpCode::Jump, anchor);
    }

    pub fn break_frame(&mut self) {
        self.emit(OpCode::Break, &[]);
    }

    pub fn def_method(&mut self, argc: usize, name: &str, body: Arc<InstructionSet>, meta: bool) {
        let name = self.string(name);
        let body = self.add_constant(Constant::InstructionSet(body));
        let op = if meta {
            OpCode::DefMetaMethod
        } else {
            OpCode::DefMethod
        };
        self.emit(op, &[argc as u32, name, body]);
    }

    pub fn def_class(
        &mut self,
        kind: &str,
        name: &str,
        body: Arc<InstructionSet>,
        super_name: &str,
    ) {
        let kind = self.string(kind);
        let name = self.string(name);
        let body = self.add_constant(Constant::InstructionSet(body));
        let super_name = self.string(super_name);
        self.emit(OpCode::DefClass, &[kind, name, body, super_name]);
    }

    pub fn send(
        &mut self,
        name: &str,
        argc: usize,
        block: Option<Arc<InstructionSet>>,
        args: Option<ArgSet>,
    ) {
        let name = self.string(name);
        let block = block
            .map(|set| self.add_constant(Constant::InstructionSet(set)))
            .unwrap_or(NO_OPERAND);
        let args = args
            .filter(|args| !args.is_empty())
            .map(|args| self.add_constant(Constant::ArgSet(args)))
            .unwrap_or(NO_OPERAND);
        self.emit(OpCode::Send, &[name, argc as u32, block, args]);
    }

    /// `add`/`subtract`/comparisons for their operators, `bin_op` for the rest.
    pub fn binary(&mut self, operator: &str) {
        let op = match operator {
            "+" => OpCode::Add,
            "-" => OpCode::Subtract,
            ">" => OpCode::Greater,
            "<" => OpCode::Less,
            ">=" => OpCode::GreaterEqual,
            "<=" => OpCode::LessEqual,
            _ => OpCode::BinOp,
        };
        let name = self.string(operator);
        self.emit(op, &[name]);
    }

    pub fn invoke_block(&mut self, argc: usize) {
        self.emit(OpCode::InvokeBlock, &[argc as u32]);
    }

    pub fn get_block(&mut self) {
        self.emit(OpCode::GetBlock, &[]);
    }

    pub fn has_block(&mut self) {
        self.emit(OpCode::HasBlock, &[]);
    }

    pub fn pop(&mut self) {
        self.emit(OpCode::Pop, &[]);
    }

    pub fn dup(&mut self) {
        self.emit(OpCode::Dup, &[]);
    }

    pub fn defer(&mut self, argc: usize, block: Option<Arc<InstructionSet>>) {
        let block = block
            .map(|set| self.add_constant(Constant::InstructionSet(set)))
            .unwrap_or(NO_OPERAND);
        self.emit(OpCode::Defer, &[argc as u32, block]);
    }

    pub fn leave(&mut self) {
        self.emit(OpCode::Leave, &[]);
    }
}

/// Collapses jump chains. A `jump` landing on `leave` becomes `leave` padded
/// with `no_op`; branches are redirected to the end of their chain.
/// Running it twice changes nothing.
pub fn optimize_jumps(set: &mut InstructionSet) {
    let original = set.code.clone();
    let decode = |pc: usize| original.get(pc).copied().and_then(OpCode::from_u32);

    let mut pc = 0;
    while let Some(op) = decode(pc) {
        let width = op.width();
        if op.is_jump() && pc + 1 < original.len() {
            let target = final_target(&original, pc, original[pc + 1] as usize);
            if op == OpCode::Jump && decode(target) == Some(OpCode::Leave) {
                set.code[pc] = OpCode::Leave as u32;
                set.code[pc + 1] = OpCode::NoOp as u32;
            } else {
                set.code[pc + 1] = target as u32;
            }
        }
        pc += width;
    }
}

fn final_target(code: &[u32], origin: usize, mut target: usize) -> usize {
    let mut seen = HashSet::from([origin]);
    while code.get(target).copied() == Some(OpCode::Jump as u32) && seen.insert(target) {
        match code.get(target + 1) {
            Some(next) => target = *next as usize,
            None => break,
        }
    }
    target
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(build: impl FnOnce(&mut Assembler)) -> InstructionSet {
        let mut asm = Assembler::new("test", SetKind::Method);
        build(&mut asm);
        asm.finish().expect("assemble")
    }

    #[test]
    fn forward_jumps_are_patched() {
        let set = finished(|asm| {
            let end = asm.new_anchor();
            asm.put_bool(true);
            asm.branch_unless(end);
            asm.put_int(1);
            asm.bind(end).expect("bind");
            asm.put_nil();
            asm.leave();
        });
        let branch = set.decode(1).expect("branch");
        assert_eq!(branch.op, OpCode::BranchUnless);
        assert_eq!(branch.operands, &[5]);
    }

    #[test]
    fn unbound_anchor_is_an_error() {
        let mut asm = Assembler::new("test", SetKind::Block);
        let anchor = asm.new_anchor();
        asm.jump(anchor);
        assert_eq!(asm.finish().err(), Some(AssemblerError::UnboundAnchor(0)));
    }

    #[test]
    fn anchors_bind_once() {
        let mut asm = Assembler::new("test", SetKind::Block);
        let anchor = asm.new_anchor();
        asm.bind(anchor).expect("first bind");
        assert_eq!(asm.bind(anchor), Err(AssemblerError::AnchorRebound(0)));
    }

    #[test]
    fn jump_to_leave_becomes_leave() {
        let set = finished(|asm| {
            let end = asm.new_anchor();
            asm.jump(end);
            asm.put_nil();
            asm.bind(end).expect("bind");
            asm.leave();
        });
        assert_eq!(
            set.opcodes(),
            vec![OpCode::Leave, OpCode::NoOp, OpCode::PutNil, OpCode::Leave]
        );
    }

    #[test]
    fn jump_chains_collapse_and_cycles_terminate() {
        let set = finished(|asm| {
            let first = asm.new_anchor();
            let second = asm.new_anchor();
            asm.jump(first);
            asm.bind(first).expect("bind");
            asm.jump(second);
            asm.bind(second).expect("bind");
            asm.put_nil();
            asm.leave();
        });
        assert_eq!(set.code[1], 4);
        assert_eq!(set.code[3], 4);

        let mut looping = InstructionSet::new("loop", SetKind::Block);
        looping.code = vec![OpCode::Jump as u32, 2, OpCode::Jump as u32, 0];
        looping.source_map = vec![1; 4];
        optimize_jumps(&mut looping);
        let once = looping.code.clone();
        optimize_jumps(&mut looping);
        assert_eq!(looping.code, once);
    }

    #[test]
    fn small_ints_inline_and_large_ints_pool() {
        let set = finished(|asm| {
            asm.put_int(7);
            asm.put_int(-1);
            asm.put_int(1 << 40);
            asm.put_int(1 << 40);
        });
        assert_eq!(
            set.opcodes(),
            vec![
                OpCode::PutInt,
                OpCode::PutObject,
                OpCode::PutObject,
                OpCode::PutObject
            ]
        );
        assert_eq!(set.constants.len(), 2);
        assert_eq!(set.source_map.len(), set.code.len());
    }
}
