use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::value::{Pointer, Value};
use crate::bytecode::InstructionSet;

/// Activation of a method, block, class body or program.
#[derive(Debug)]
pub struct CallFrame {
    pub set: Arc<InstructionSet>,
    pub self_value: Value,
    /// Block template passed by the caller.
    pub block: Option<Arc<CallFrame>>,
    /// Frame whose locals this block closes over.
    pub ep: Option<Arc<CallFrame>>,
    pub is_block: bool,
    pub file: String,
    pub line: usize,
    locals: RwLock<Vec<Option<Arc<Pointer>>>>,
    removed: AtomicBool,
    pc: AtomicUsize,
}

impl CallFrame {
    pub fn new(set: Arc<InstructionSet>, self_value: Value) -> Self {
        let file = set.filename.clone();
        let line = set.source_map.first().copied().unwrap_or(0);
        Self {
            set,
            self_value,
            block: None,
            ep: None,
            is_block: false,
            file,
            line,
            locals: RwLock::new(Vec::new()),
            removed: AtomicBool::new(false),
            pc: AtomicUsize::new(0),
        }
    }

    pub fn with_ep(mut self, ep: Option<Arc<CallFrame>>) -> Self {
        self.ep = ep;
        self
    }

    pub fn with_block(mut self, block: Option<Arc<CallFrame>>) -> Self {
        self.block = block;
        self
    }

    pub fn as_block(mut self) -> Self {
        self.is_block = true;
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn with_locals(self, values: impl IntoIterator<Item = Value>) -> Self {
        *self.locals.write() = values.into_iter().map(|v| Some(Pointer::new(v))).collect();
        self
    }

    /// Shares `other`'s variable cells; used to carry REPL state across inputs.
    pub fn sharing_locals(self, other: &CallFrame) -> Self {
        *self.locals.write() = other.locals.read().clone();
        self
    }

    /// Reserves `size` unset slots.
    pub fn reserve_locals(&self, size: usize) {
        let mut locals = self.locals.write();
        if locals.len() < size {
            locals.resize(size, None);
        }
    }

    pub fn pc(&self) -> usize {
        self.pc.load(Ordering::Relaxed)
    }

    pub fn set_pc(&self, pc: usize) {
        self.pc.store(pc, Ordering::Relaxed);
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Marks the frame, and for block frames their template, as finished.
    pub fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
        if self.is_block
            && let Some(template) = &self.block
        {
            template.removed.store(true, Ordering::Release);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            || self.set.code.first() == Some(&(crate::bytecode::OpCode::Leave as u32))
    }

    /// Follows the environment chain `depth` times.
    fn resolve(self: &Arc<Self>, depth: usize) -> Option<Arc<CallFrame>> {
        let mut frame = self.clone();
        for _ in 0..depth {
            frame = frame.ep.clone()?;
        }
        Some(frame)
    }

    pub fn local_pointer(self: &Arc<Self>, depth: usize, index: usize) -> Option<Arc<Pointer>> {
        let frame = self.resolve(depth)?;
        let locals = frame.locals.read();
        locals.get(index).cloned().flatten()
    }

    pub fn get_local(self: &Arc<Self>, depth: usize, index: usize) -> Value {
        self.local_pointer(depth, index)
            .map(|pointer| pointer.get())
            .unwrap_or_default()
    }

    pub fn set_local(self: &Arc<Self>, depth: usize, index: usize, value: Value) {
        if let Some(pointer) = self.local_pointer(depth, index) {
            pointer.set(value);
            return;
        }
        let target = self.resolve(depth).unwrap_or_else(|| self.clone());
        target.insert_local(index, value);
    }

    /// Writes only when no argument was bound to the slot.
    pub fn set_optional(self: &Arc<Self>, depth: usize, index: usize, value: Value) {
        if self.local_pointer(depth, index).is_none() {
            self.set_local(depth, index, value);
        }
    }

    pub fn insert_local(&self, index: usize, value: Value) {
        let mut locals = self.locals.write();
        if index >= locals.len() {
            locals.resize(index + 1, None);
        }
        match &locals[index] {
            Some(pointer) => pointer.set(value),
            None => locals[index] = Some(Pointer::new(value)),
        }
    }

    pub fn local_count(&self) -> usize {
        self.locals.read().len()
    }

    /// Source line of the instruction most recently started.
    pub fn current_line(&self) -> usize {
        let pc = self.pc();
        let len = self.set.len();
        if len == 0 {
            return self.line;
        }
        if pc >= len {
            return self.set.line_at(len - 1);
        }
        self.set.line_at(pc.saturating_sub(1))
    }
}

/// First-class block value (`Block.new`, `get_block`, `&blk`).
#[derive(Debug)]
pub struct BlockObject {
    pub set: Arc<InstructionSet>,
    pub ep: Option<Arc<CallFrame>>,
    pub self_value: Value,
}

impl BlockObject {
    pub fn from_template(template: &CallFrame, self_value: Value) -> Self {
        Self {
            set: template.set.clone(),
            ep: template.ep.clone(),
            self_value,
        }
    }

    /// Template frame suitable for yielding.
    pub fn to_frame(&self) -> Arc<CallFrame> {
        Arc::new(
            CallFrame::new(self.set.clone(), self.self_value.clone())
                .with_ep(self.ep.clone())
                .as_block(),
        )
    }
}

#[derive(Debug)]
pub struct BuiltinFrame {
    pub name: Arc<str>,
    pub block: Option<Arc<CallFrame>>,
    pub file: String,
    pub line: usize,
}

#[derive(Debug)]
pub enum Frame {
    Normal(Arc<CallFrame>),
    Builtin(BuiltinFrame),
}

impl Frame {
    pub fn block(&self) -> Option<&Arc<CallFrame>> {
        match self {
            Frame::Normal(frame) => frame.block.as_ref(),
            Frame::Builtin(frame) => frame.block.as_ref(),
        }
    }

    pub fn file(&self) -> &str {
        match self {
            Frame::Normal(frame) => &frame.file,
            Frame::Builtin(frame) => &frame.file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::SetKind;

    fn frame() -> Arc<CallFrame> {
        Arc::new(CallFrame::new(
            Arc::new(InstructionSet::new("t", SetKind::Block)),
            Value::Nil,
        ))
    }

    #[test]
    fn locals_resolve_through_the_environment_chain() {
        let outer = frame();
        outer.insert_local(0, Value::Int(1));
        let inner = Arc::new(
            CallFrame::new(outer.set.clone(), Value::Nil)
                .with_ep(Some(outer.clone()))
                .as_block(),
        );
        assert_eq!(inner.get_local(1, 0).as_int(), Some(1));
        inner.set_local(1, 0, Value::Int(5));
        assert_eq!(outer.get_local(0, 0).as_int(), Some(5));
        assert!(inner.get_local(3, 0).is_nil());
    }

    #[test]
    fn optional_slots_keep_explicit_values() {
        let frame = frame();
        frame.reserve_locals(2);
        frame.insert_local(0, Value::Int(9));
        frame.set_optional(0, 0, Value::Int(1));
        frame.set_optional(0, 1, Value::Int(2));
        assert_eq!(frame.get_local(0, 0).as_int(), Some(9));
        assert_eq!(frame.get_local(0, 1).as_int(), Some(2));
    }

    #[test]
    fn removing_a_block_frame_removes_its_template() {
        let template = frame();
        let running = CallFrame::new(template.set.clone(), Value::Nil)
            .with_block(Some(template.clone()))
            .as_block();
        running.mark_removed();
        assert!(template.is_removed());
    }
}
