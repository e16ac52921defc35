use std::collections::BTreeMap;
use std::sync::Arc;

use super::class::ClassId;
use super::error::{ErrorKind, VmError, VmResult};
use super::frame::{BlockObject, CallFrame};
use super::method::{Callable, MethodObject};
use super::thread::{SlotFlags, Thread};
use super::value::{RangeValue, Value};
use crate::bytecode::{
    ArgSet, ArgType, Constant, Instruction, InstructionSet, NO_SUPER_CLASS, OpCode,
};

fn missing_operand(set: &InstructionSet, ins: &Instruction<'_>) -> VmError {
    VmError::Internal(format!(
        "malformed operand for {} at {}:{} in {}",
        ins.op, set.filename, ins.pc, set.name
    ))
}

impl Thread {
    /// Runs `frame`'s instructions until `leave`, `break` or the end of the set.
    pub(super) fn exec(
        &mut self,
        frame: &Arc<CallFrame>,
        defers: &mut Vec<Arc<CallFrame>>,
    ) -> VmResult<()> {
        let set = frame.set.clone();
        let mut pc = 0;
        while pc < set.len() {
            let Some(ins) = set.decode(pc) else {
                return Err(VmError::Internal(format!(
                    "invalid instruction at {}:{pc} in {}",
                    set.filename, set.name
                )));
            };
            pc += ins.op.width();
            frame.set_pc(pc);
            self.line = ins.line;
            if let Some(trace) = &self.vm.config.trace {
                trace.record(self.id, &set.name, ins.pc, ins.op.mnemonic(), ins.line);
            }

            let string = |index: usize| {
                set.string(ins.operand(index))
                    .ok_or_else(|| missing_operand(&set, &ins))
            };

            match ins.op {
                OpCode::NoOp => {}
                OpCode::Leave => return Ok(()),
                OpCode::Break => {
                    if frame.is_block {
                        frame.mark_removed();
                        return Ok(());
                    }
                }
                OpCode::Pop => {
                    self.stack.pop()?;
                }
                OpCode::Dup => {
                    let top = self.stack.top().cloned().unwrap_or_default();
                    self.stack.push(top);
                }
                OpCode::PutTrue => self.stack.push(Value::Bool(true)),
                OpCode::PutFalse => self.stack.push(Value::Bool(false)),
                OpCode::PutNil => self.stack.push(Value::Nil),
                OpCode::PutSelf => self.stack.push(frame.self_value.clone()),
                OpCode::PutSuper => self
                    .stack
                    .push_flagged(frame.self_value.clone(), SlotFlags::SUPER),
                OpCode::PutInt => self.stack.push(Value::Int(i64::from(ins.operand(0)))),
                OpCode::PutString => {
                    let text = string(0)?;
                    self.stack.push(Value::from(text));
                }
                OpCode::PutFloat | OpCode::PutObject => {
                    let value = match set.constant(ins.operand(0)) {
                        Some(Constant::Int(number)) => Value::Int(*number),
                        Some(Constant::Float(number)) => Value::Float(*number),
                        Some(Constant::String(text)) => Value::from(text.as_str()),
                        _ => return Err(missing_operand(&set, &ins)),
                    };
                    self.stack.push(value);
                }
                OpCode::GetLocal => {
                    let value =
                        frame.get_local(ins.operand(0) as usize, ins.operand(1) as usize);
                    self.stack.push(value);
                }
                OpCode::SetLocal => {
                    let value = self.stack.top().cloned().unwrap_or_default();
                    frame.set_local(ins.operand(0) as usize, ins.operand(1) as usize, value);
                }
                OpCode::SetOptional => {
                    let value = self.stack.pop()?;
                    frame.set_optional(ins.operand(0) as usize, ins.operand(1) as usize, value);
                }
                OpCode::GetInstanceVariable => {
                    let value = self.ivar(&frame.self_value, string(0)?);
                    self.stack.push(value);
                }
                OpCode::SetInstanceVariable => {
                    let value = self.stack.top().cloned().unwrap_or_default();
                    self.set_ivar(&frame.self_value, string(0)?, value);
                }
                OpCode::GetConstant | OpCode::GetConstantNamespace => {
                    let name = string(0)?;
                    self.get_constant(frame, name, ins.op == OpCode::GetConstantNamespace)?;
                }
                OpCode::SetConstant => {
                    let name = string(0)?;
                    let value = self.stack.top().cloned().unwrap_or_default();
                    self.set_constant(frame, name, value)?;
                }
                OpCode::NewArray => {
                    let count = ins.operand(0) as usize;
                    let start = self.stack.base_index(count)?;
                    let elements = self.stack.values(start);
                    self.stack.truncate(start);
                    self.stack.push(Value::array(elements));
                }
                OpCode::ExpandArray => {
                    let count = ins.operand(0) as usize;
                    let Value::Array(array) = self.stack.pop()? else {
                        return Err(self.error(
                            ErrorKind::TypeError,
                            "Expect stack top's value to be an Array when executing 'expandarray' instruction.",
                        ));
                    };
                    let elements = array.snapshot();
                    for index in (0..count).rev() {
                        self.stack.push(elements.get(index).cloned().unwrap_or_default());
                    }
                }
                OpCode::SplatArray => {
                    if matches!(self.stack.top(), Some(Value::Array(_))) {
                        self.stack.flag_top(SlotFlags::SPLAT);
                    }
                }
                OpCode::SplatBlock => {
                    if matches!(self.stack.top(), Some(Value::Block(_))) {
                        self.stack.flag_top(SlotFlags::SPLAT);
                    }
                }
                OpCode::NewHash => {
                    let words = ins.operand(0) as usize;
                    let mut pairs = BTreeMap::new();
                    for _ in 0..words / 2 {
                        let value = self.stack.pop()?;
                        let key = self.stack.pop()?;
                        let key = match key {
                            Value::Str(text) => text.to_string(),
                            other => self.to_s(&other)?,
                        };
                        pairs.entry(key).or_insert(value);
                    }
                    self.stack.push(Value::hash(pairs));
                }
                OpCode::NewRange | OpCode::NewRangeExcl => {
                    let end = self.stack.pop()?;
                    let start = self.stack.pop()?;
                    let range = match (&start, &end) {
                        (Value::Int(start), Value::Int(end)) => RangeValue {
                            start: *start,
                            end: *end,
                            exclusive: ins.op == OpCode::NewRangeExcl,
                        },
                        _ => {
                            let bad = if start.as_int().is_none() { &start } else { &end };
                            let got = self.vm.class_name_of(bad);
                            return Err(self.error(
                                ErrorKind::ArgumentError,
                                super::error::wrong_argument_type("Integer", &got),
                            ));
                        }
                    };
                    self.stack.push(Value::Range(range));
                }
                OpCode::BranchUnless => {
                    if !self.stack.pop()?.is_truthy() {
                        pc = ins.operand(0) as usize;
                    }
                }
                OpCode::BranchIf => {
                    if self.stack.pop()?.is_truthy() {
                        pc = ins.operand(0) as usize;
                    }
                }
                OpCode::Jump => pc = ins.operand(0) as usize,
                OpCode::DefMethod | OpCode::DefMetaMethod => {
                    let name = string(1)?;
                    let body = set
                        .child(ins.operand(2))
                        .ok_or_else(|| missing_operand(&set, &ins))?;
                    let target = self.stack.pop()?;
                    let method = Callable::Lito(Arc::new(MethodObject {
                        name: name.to_string(),
                        set: body.clone(),
                        argc: ins.operand(0) as usize,
                    }));
                    self.define_method(&target, name, method, ins.op == OpCode::DefMetaMethod);
                }
                OpCode::DefClass => {
                    let is_module = string(0)? == "module";
                    let name = string(1)?;
                    let body = set
                        .child(ins.operand(2))
                        .ok_or_else(|| missing_operand(&set, &ins))?
                        .clone();
                    let super_name = string(3)?;
                    self.define_class(frame, is_module, name, body, super_name)?;
                }
                OpCode::Add
                | OpCode::Subtract
                | OpCode::Greater
                | OpCode::Less
                | OpCode::GreaterEqual
                | OpCode::LessEqual => {
                    if let Some(result) = self.fast_int_op(ins.op) {
                        self.stack.truncate(self.stack.len() - 2);
                        self.stack.push(result);
                    } else {
                        self.binary_send(string(0)?)?;
                    }
                }
                OpCode::BinOp => self.binary_send(string(0)?)?,
                OpCode::Send => {
                    let name = string(0)?;
                    let argc = ins.operand(1) as usize;
                    let literal_block = set.child(ins.operand(2)).cloned();
                    let call_site = set.arg_set(ins.operand(3)).cloned();
                    self.send_instruction(frame, name, argc, literal_block, call_site)?;
                }
                OpCode::InvokeBlock => {
                    let argc = ins.operand(0) as usize;
                    let receiver_slot = self.stack.receiver_index(argc)?;
                    let Some(template) = self.resolve_block(frame) else {
                        return Err(self.error(
                            ErrorKind::InternalError,
                            super::error::CANT_YIELD_WITHOUT_BLOCK,
                        ));
                    };
                    let receiver = self.stack.get(receiver_slot);
                    let args = self.stack.values(receiver_slot + 1);
                    let block_frame =
                        self.block_frame(&template, receiver, template.ep.clone(), &args);
                    let result = self.run_frame(block_frame)?;
                    self.stack.truncate(receiver_slot);
                    self.stack.push(result);
                }
                OpCode::GetBlock => {
                    let Some(template) = self.resolve_block(frame) else {
                        return Err(self.error(
                            ErrorKind::InternalError,
                            "Can't get block without a block argument",
                        ));
                    };
                    let block = BlockObject::from_template(&template, template.self_value.clone());
                    self.stack.push(Value::Block(Arc::new(block)));
                }
                OpCode::HasBlock => self.stack.push(Value::Bool(frame.block.is_some())),
                OpCode::Defer => {
                    let argc = ins.operand(0) as usize;
                    let literal_block = set.child(ins.operand(1)).cloned();
                    if let Some(deferred) = self.defer_instruction(frame, argc, literal_block)? {
                        defers.push(deferred);
                    }
                }
            }
        }
        Ok(())
    }

    fn fast_int_op(&self, op: OpCode) -> Option<Value> {
        let len = self.stack.len();
        if len < 2 {
            return None;
        }
        let (Value::Int(left), Value::Int(right)) = (self.stack.get(len - 2), self.stack.get(len - 1))
        else {
            return None;
        };
        Some(match op {
            OpCode::Add => Value::Int(left.wrapping_add(right)),
            OpCode::Subtract => Value::Int(left.wrapping_sub(right)),
            OpCode::Greater => Value::Bool(left > right),
            OpCode::Less => Value::Bool(left < right),
            OpCode::GreaterEqual => Value::Bool(left >= right),
            OpCode::LessEqual => Value::Bool(left <= right),
            _ => return None,
        })
    }

    /// `left op right` as a one-argument call on `left`.
    fn binary_send(&mut self, name: &str) -> VmResult<()> {
        let receiver_slot = self.stack.receiver_index(1)?;
        let is_super = self.stack.flags_at(receiver_slot).contains(SlotFlags::SUPER);
        self.dispatch(name, receiver_slot, 1, is_super, None, None)
    }

    fn send_instruction(
        &mut self,
        frame: &Arc<CallFrame>,
        name: &str,
        argc: usize,
        literal_block: Option<Arc<InstructionSet>>,
        call_site: Option<ArgSet>,
    ) -> VmResult<()> {
        let (mut argc, splat_block) = self.unsplat_block(argc)?;
        let block = splat_block.or_else(|| {
            literal_block.map(|set| {
                Arc::new(
                    CallFrame::new(set, frame.self_value.clone())
                        .with_ep(Some(frame.clone()))
                        .as_block()
                        .at_line(self.line),
                )
            })
        });
        let mut call_site = call_site;
        if let Some(expanded) = self.unsplat_array(argc)? {
            call_site = call_site.map(|site| expand_splat(&site, expanded));
            argc += expanded;
            argc -= 1;
        }
        let receiver_slot = self.stack.receiver_index(argc)?;
        let is_super = self.stack.flags_at(receiver_slot).contains(SlotFlags::SUPER);
        self.dispatch(name, receiver_slot, argc, is_super, call_site.as_ref(), block)
    }

    /// Pops a trailing `&block` argument.
    fn unsplat_block(&mut self, argc: usize) -> VmResult<(usize, Option<Arc<CallFrame>>)> {
        if argc > 0
            && self.stack.top_flags().contains(SlotFlags::SPLAT)
            && let Some(Value::Block(block)) = self.stack.top().cloned()
        {
            self.stack.pop()?;
            return Ok((argc - 1, Some(block.to_frame())));
        }
        Ok((argc, None))
    }

    /// Replaces a trailing `*array` argument with its elements; returns how many.
    fn unsplat_array(&mut self, argc: usize) -> VmResult<Option<usize>> {
        if argc == 0 || !self.stack.top_flags().contains(SlotFlags::SPLAT) {
            return Ok(None);
        }
        let Some(Value::Array(array)) = self.stack.top().cloned() else {
            return Ok(None);
        };
        self.stack.pop()?;
        let elements = array.snapshot();
        let count = elements.len();
        for element in elements {
            self.stack.push(element);
        }
        Ok(Some(count))
    }

    fn defer_instruction(
        &mut self,
        frame: &Arc<CallFrame>,
        argc: usize,
        literal_block: Option<Arc<InstructionSet>>,
    ) -> VmResult<Option<Arc<CallFrame>>> {
        let (mut argc, splat_block) = self.unsplat_block(argc)?;
        if let Some(expanded) = self.unsplat_array(argc)? {
            argc = argc + expanded - 1;
        }
        let receiver_slot = self.stack.receiver_index(argc)?;
        let receiver = self.stack.get(receiver_slot);
        let args = self.stack.values(receiver_slot + 1);
        self.stack.truncate(receiver_slot);
        self.stack.push(Value::Nil);

        let deferred = match (splat_block, literal_block) {
            (Some(template), _) => {
                Some(self.block_frame(&template, receiver, template.ep.clone(), &args))
            }
            (None, Some(set)) => {
                let template = Arc::new(
                    CallFrame::new(set, frame.self_value.clone())
                        .with_ep(Some(frame.clone()))
                        .as_block()
                        .at_line(self.line),
                );
                Some(self.block_frame(&template, receiver, Some(frame.clone()), &args))
            }
            (None, None) => None,
        };
        Ok(deferred)
    }

    /// Block visible to `yield`/`get_block` in `frame`. Inside a block that
    /// shares its environment with the template, the enclosing method's block.
    fn resolve_block(&self, frame: &Arc<CallFrame>) -> Option<Arc<CallFrame>> {
        let block = frame.block.clone()?;
        if let (Some(block_ep), Some(frame_ep)) = (&block.ep, &frame.ep)
            && Arc::ptr_eq(block_ep, frame_ep)
        {
            return frame_ep.block.clone();
        }
        Some(block)
    }

    fn define_method(&self, target: &Value, name: &str, method: Callable, meta: bool) {
        let classes = &self.vm.classes;
        let class = match (target, meta) {
            (Value::Class(id), true) => match classes.meta_of(*id) {
                Some(meta) => meta,
                None => return,
            },
            (_, true) => return,
            (Value::Class(id), false) => *id,
            (other, false) => self.vm.class_of(other),
        };
        classes.define(class, name, method);
    }

    /// Class whose constants `frame` reads and writes.
    fn constant_scope(&self, frame: &CallFrame) -> ClassId {
        match &frame.self_value {
            Value::Class(id) => *id,
            other => self.vm.class_of(other),
        }
    }

    fn lookup_constant(&self, frame: &CallFrame, name: &str) -> Option<Arc<super::value::Pointer>> {
        let classes = &self.vm.classes;
        if self.stack.top_flags().contains(SlotFlags::NAMESPACE)
            && let Some(Value::Class(namespace)) = self.stack.top()
            && let Some(pointer) = classes.constant_under_all_scope(*namespace, name)
        {
            return Some(pointer);
        }
        classes
            .constant_under_all_scope(self.constant_scope(frame), name)
            .or_else(|| classes.get(super::OBJECT).constant(name))
    }

    fn get_constant(&mut self, frame: &CallFrame, name: &str, is_namespace: bool) -> VmResult<()> {
        let Some(pointer) = self.lookup_constant(frame, name) else {
            return Err(self.error(
                ErrorKind::NameError,
                format!("uninitialized constant {name}"),
            ));
        };
        if self.stack.top_flags().contains(SlotFlags::NAMESPACE) {
            self.stack.pop()?;
        }
        let flags = if is_namespace {
            SlotFlags::NAMESPACE
        } else {
            SlotFlags::NONE
        };
        self.stack.push_flagged(pointer.get(), flags);
        Ok(())
    }

    fn set_constant(&mut self, frame: &CallFrame, name: &str, value: Value) -> VmResult<()> {
        let scope = self.constant_scope(frame);
        let classes = &self.vm.classes;
        if classes.constant_in_current_scope(scope, name).is_some() {
            return Err(self.error(
                ErrorKind::ConstantAlreadyInitialisedError,
                format!("Constant {name} already initialized. Can't assign value to a constant twice."),
            ));
        }
        self.store_constant(scope, name, value);
        Ok(())
    }

    fn store_constant(&self, scope: ClassId, name: &str, value: Value) {
        let classes = &self.vm.classes;
        if let Value::Class(class) = &value
            && *class != scope
        {
            classes.update(*class, |links| {
                if links.scope.is_none() {
                    links.scope = Some(scope);
                }
            });
        }
        classes.get(scope).set_constant(name, value);
    }

    fn define_class(
        &mut self,
        frame: &Arc<CallFrame>,
        is_module: bool,
        name: &str,
        body: Arc<InstructionSet>,
        super_name: &str,
    ) -> VmResult<()> {
        let parent = if super_name == NO_SUPER_CLASS {
            None
        } else {
            Some(self.stack.pop()?)
        };
        self.stack.pop()?;

        let scope = self.constant_scope(frame);
        let classes = &self.vm.classes;
        let class = match classes.constant_under_all_scope(scope, name).map(|p| p.get()) {
            Some(Value::Class(id)) => id,
            Some(other) => {
                let got = self.vm.class_name_of(&other);
                return Err(self.error(
                    ErrorKind::TypeError,
                    format!("Constant {name} is not a class. got: {got}"),
                ));
            }
            None => {
                let id = if is_module {
                    classes.init_module(name)
                } else {
                    classes.init_class(name)
                };
                self.store_constant(scope, name, Value::Class(id));
                if let Some(parent) = parent {
                    let Value::Class(parent_id) = parent else {
                        let got = self.vm.class_name_of(&parent);
                        return Err(self.error(
                            ErrorKind::InternalError,
                            format!("Constant {super_name} is not a class. got: {got}"),
                        ));
                    };
                    if classes.get(parent_id).is_module {
                        return Err(self.error(
                            ErrorKind::InternalError,
                            format!("Module inheritance is not supported: {super_name}"),
                        ));
                    }
                    classes.inherit(id, parent_id);
                }
                tracing::debug!(name, module = is_module, "defined class");
                id
            }
        };

        let body_frame = CallFrame::new(body, Value::Class(class)).at_line(self.line);
        self.run_frame(Arc::new(body_frame))?;
        self.stack.push(Value::Class(class));
        Ok(())
    }
}

/// Call-site description after a trailing splat expanded into `count` values.
fn expand_splat(site: &ArgSet, count: usize) -> ArgSet {
    let mut expanded = ArgSet::default();
    let keep = site.len().saturating_sub(1);
    for (name, kind) in site.names.iter().zip(&site.types).take(keep) {
        expanded.push(name.as_str(), *kind);
    }
    for _ in 0..count {
        expanded.push("", ArgType::Normal);
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splat_expansion_rewrites_the_call_site() {
        let mut site = ArgSet::default();
        site.push("a", ArgType::Normal);
        site.push("rest", ArgType::Splat);
        let expanded = expand_splat(&site, 3);
        assert_eq!(expanded.len(), 4);
        assert_eq!(expanded.types[0], ArgType::Normal);
        assert!(expanded.types[1..].iter().all(|kind| *kind == ArgType::Normal));
    }
}
