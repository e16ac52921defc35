use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{self, ErrorKind, ErrorObject, VmError, VmResult};
use super::frame::{BuiltinFrame, CallFrame, Frame};
use super::method::{BuiltinBody, BuiltinMethod, Callable, MethodObject, bind_arguments};
use super::value::Value;
use super::wait_group::WaitGroup;
use super::{ClassId, MachineKind, Vm};
use crate::bytecode::ArgSet;
use crate::compiler::{ParserMode, compile_source};

/// Nesting limit for frames on one thread.
pub const MAX_CALL_DEPTH: usize = 2048;

/// Native stack reserved for threads started by `go`.
pub const THREAD_STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotFlags(u8);

impl SlotFlags {
    pub const NONE: SlotFlags = SlotFlags(0);
    /// Receiver pushed by `putsuper`.
    pub const SUPER: SlotFlags = SlotFlags(1);
    /// Class pushed by `getconstantnamespace`.
    pub const NAMESPACE: SlotFlags = SlotFlags(1 << 1);
    /// Array or block marked by `splat_array`/`splat_block`.
    pub const SPLAT: SlotFlags = SlotFlags(1 << 2);

    pub fn contains(self, other: SlotFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: SlotFlags) -> SlotFlags {
        SlotFlags(self.0 | other.0)
    }
}

#[derive(Clone, Debug)]
struct Slot {
    value: Value,
    flags: SlotFlags,
}

/// Operand stack of one thread.
#[derive(Debug, Default)]
pub struct Stack {
    slots: Vec<Slot>,
}

impl Stack {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn push(&mut self, value: Value) {
        self.push_flagged(value, SlotFlags::NONE);
    }

    pub fn push_flagged(&mut self, value: Value, flags: SlotFlags) {
        self.slots.push(Slot { value, flags });
    }

    pub fn pop(&mut self) -> VmResult<Value> {
        self.slots
            .pop()
            .map(|slot| slot.value)
            .ok_or_else(|| VmError::Internal("operand stack underflow".to_string()))
    }

    pub fn top(&self) -> Option<&Value> {
        self.slots.last().map(|slot| &slot.value)
    }

    pub fn top_flags(&self) -> SlotFlags {
        self.slots.last().map_or(SlotFlags::NONE, |slot| slot.flags)
    }

    pub fn flag_top(&mut self, flags: SlotFlags) {
        if let Some(slot) = self.slots.last_mut() {
            slot.flags = slot.flags.with(flags);
        }
    }

    pub fn flags_at(&self, index: usize) -> SlotFlags {
        self.slots.get(index).map_or(SlotFlags::NONE, |slot| slot.flags)
    }

    pub fn get(&self, index: usize) -> Value {
        self.slots
            .get(index)
            .map(|slot| slot.value.clone())
            .unwrap_or_default()
    }

    pub fn values(&self, from: usize) -> Vec<Value> {
        self.slots
            .get(from..)
            .unwrap_or_default()
            .iter()
            .map(|slot| slot.value.clone())
            .collect()
    }

    pub fn insert(&mut self, index: usize, value: Value) {
        let index = index.min(self.slots.len());
        self.slots.insert(
            index,
            Slot {
                value,
                flags: SlotFlags::NONE,
            },
        );
    }

    pub fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }

    /// Index of the first of the top `count` values.
    pub fn base_index(&self, count: usize) -> VmResult<usize> {
        self.slots
            .len()
            .checked_sub(count)
            .ok_or_else(|| VmError::Internal("operand stack underflow".to_string()))
    }

    /// `count` values starting at `from`.
    pub fn window(&self, from: usize, count: usize) -> Vec<Value> {
        self.slots
            .iter()
            .skip(from)
            .take(count)
            .map(|slot| slot.value.clone())
            .collect()
    }

    /// Index of the receiver below `argc` arguments.
    pub fn receiver_index(&self, argc: usize) -> VmResult<usize> {
        self.slots
            .len()
            .checked_sub(argc + 1)
            .ok_or_else(|| VmError::Internal("operand stack underflow".to_string()))
    }
}

/// One interpreter thread: operand stack plus call-frame stack over a shared VM.
pub struct Thread {
    pub vm: Arc<Vm>,
    pub id: u64,
    pub(super) stack: Stack,
    frames: Vec<Frame>,
    pub(super) line: usize,
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("stack", &self.stack.len())
            .field("frames", &self.frames.len())
            .finish()
    }
}

impl Thread {
    pub fn new(vm: Arc<Vm>, id: u64) -> Self {
        Self {
            vm,
            id,
            stack: Stack::default(),
            frames: Vec::new(),
            line: 0,
        }
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Source line of the instruction being executed.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Block passed to the innermost frame; inside a builtin this is the
    /// block given at its call site.
    pub fn block(&self) -> Option<Arc<CallFrame>> {
        self.frames.last().and_then(Frame::block).cloned()
    }

    pub fn current_file(&self) -> String {
        self.frames
            .last()
            .map(|frame| frame.file().to_string())
            .unwrap_or_default()
    }

    /// `from file:line` for every source frame, innermost first.
    pub fn stack_traces(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .filter_map(|frame| match frame {
                Frame::Normal(frame) if !frame.set.is_empty() => {
                    Some(format!("from {}:{}", frame.file, frame.current_line()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn error_object(&self, kind: ErrorKind, message: impl Display) -> Arc<ErrorObject> {
        let class = self.vm.core.error_class(kind);
        self.error_with_class(class, format!("{}: {message}", kind.name()))
    }

    /// Raised error of `class` with traces captured at this point.
    pub fn error_with_class(&self, class: ClassId, message: String) -> Arc<ErrorObject> {
        let err = ErrorObject::new(class, self.vm.classes.name(class), message);
        err.store_traces(self.stack_traces());
        Arc::new(err)
    }

    pub fn error(&self, kind: ErrorKind, message: impl Display) -> VmError {
        VmError::Raised(self.error_object(kind, message))
    }

    /// Executes `frame` to completion, then its deferred blocks in reverse
    /// order. Leaves the operand stack at its height on entry.
    pub fn run_frame(&mut self, frame: Arc<CallFrame>) -> VmResult<Value> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(self.error(
                ErrorKind::InternalError,
                format!("Stack level too deep ({MAX_CALL_DEPTH} frames)"),
            ));
        }
        let base = self.stack.len();
        self.frames.push(Frame::Normal(frame.clone()));

        let mut defers = Vec::new();
        let outcome = self.exec(&frame, &mut defers);
        let outcome = self.run_defers(defers, outcome);

        self.frames.pop();
        let value = if self.stack.len() > base {
            self.stack.top().cloned().unwrap_or_default()
        } else {
            Value::Nil
        };
        self.stack.truncate(base);
        outcome.map(|()| value)
    }

    fn run_defers(
        &mut self,
        defers: Vec<Arc<CallFrame>>,
        mut outcome: VmResult<()>,
    ) -> VmResult<()> {
        for deferred in defers.into_iter().rev() {
            let height = self.stack.len();
            let result = self.run_frame(deferred);
            self.stack.truncate(height);
            if let Err(err) = result
                && outcome.is_ok()
            {
                outcome = Err(err);
            }
        }
        outcome
    }

    /// Frame running `template` with `args` bound to its parameters.
    pub(super) fn block_frame(
        &self,
        template: &Arc<CallFrame>,
        self_value: Value,
        ep: Option<Arc<CallFrame>>,
        args: &[Value],
    ) -> Arc<CallFrame> {
        let params = template.set.arg_types.len();
        Arc::new(
            CallFrame::new(template.set.clone(), self_value)
                .with_ep(ep)
                .with_block(Some(template.clone()))
                .as_block()
                .with_locals(args.iter().take(params).cloned())
                .at_line(self.line),
        )
    }

    /// Runs a block template; nil once the block has been broken out of.
    pub fn yield_block(&mut self, template: &Arc<CallFrame>, args: &[Value]) -> VmResult<Value> {
        if template.is_removed() {
            return Ok(Value::Nil);
        }
        let frame = self.block_frame(
            template,
            template.self_value.clone(),
            template.ep.clone(),
            args,
        );
        let value = self.run_frame(frame)?;
        if template.is_removed() {
            return Ok(Value::Nil);
        }
        Ok(value)
    }

    /// Like `yield_block` but with `receiver` as self.
    pub fn yield_with_self(
        &mut self,
        template: &Arc<CallFrame>,
        receiver: Value,
        args: &[Value],
    ) -> VmResult<Value> {
        if template.is_removed() {
            return Ok(Value::Nil);
        }
        let frame = self.block_frame(template, receiver, template.ep.clone(), args);
        self.run_frame(frame)
    }

    /// Calls `name` on `receiver` from native code.
    pub fn send(
        &mut self,
        receiver: &Value,
        name: &str,
        args: &[Value],
        block: Option<Arc<CallFrame>>,
    ) -> VmResult<Value> {
        let slot = self.stack.len();
        self.stack.push(receiver.clone());
        for arg in args {
            self.stack.push(arg.clone());
        }
        let result = self.dispatch(name, slot, args.len(), false, None, block);
        let value = self.stack.top().cloned().unwrap_or_default();
        self.stack.truncate(slot);
        result.map(|()| value)
    }

    /// Resolves and invokes `name`. The receiver sits at `receiver_slot`
    /// followed by `argc` arguments; on success all of them are replaced by
    /// the result.
    pub(super) fn dispatch(
        &mut self,
        name: &str,
        receiver_slot: usize,
        argc: usize,
        is_super: bool,
        call_site: Option<&ArgSet>,
        block: Option<Arc<CallFrame>>,
    ) -> VmResult<()> {
        let receiver = self.stack.get(receiver_slot);
        let mut argc = argc;
        let mut call_site = call_site;
        let method = match self.vm.find_method(&receiver, name, is_super) {
            Some(method) => method,
            None => match self.vm.find_lookup(&receiver) {
                Some(method) => {
                    self.stack.insert(receiver_slot + 1, Value::from(name));
                    argc += 1;
                    call_site = None;
                    method
                }
                None => {
                    let text = self.to_s(&receiver)?;
                    return Err(self.error(
                        ErrorKind::NoMethodError,
                        error::undefined_method(name, &text),
                    ));
                }
            },
        };

        let args = self.stack.window(receiver_slot + 1, argc);
        let result = match &method {
            Callable::Lito(method) => self.call_lito(&receiver, method, &args, call_site, block)?,
            Callable::Builtin(builtin) => {
                self.call_builtin(&receiver, builtin, &args, call_site, block)?
            }
        };
        self.stack.truncate(receiver_slot);
        self.stack.push(result);
        Ok(())
    }

    pub(super) fn call_lito(
        &mut self,
        receiver: &Value,
        method: &Arc<MethodObject>,
        args: &[Value],
        call_site: Option<&ArgSet>,
        block: Option<Arc<CallFrame>>,
    ) -> VmResult<Value> {
        let slots = bind_arguments(method, args, call_site)
            .map_err(|message| self.error(ErrorKind::ArgumentError, message))?;
        let frame = CallFrame::new(method.set.clone(), receiver.clone())
            .with_block(block)
            .at_line(self.line);
        frame.reserve_locals(slots.len());
        for (index, value) in slots.into_iter().enumerate() {
            if let Some(value) = value {
                frame.insert_local(index, value);
            }
        }
        self.run_frame(Arc::new(frame))
    }

    fn call_builtin(
        &mut self,
        receiver: &Value,
        builtin: &Arc<BuiltinMethod>,
        args: &[Value],
        call_site: Option<&ArgSet>,
        block: Option<Arc<CallFrame>>,
    ) -> VmResult<Value> {
        self.frames.push(Frame::Builtin(BuiltinFrame {
            name: builtin.name.clone(),
            block: block.clone(),
            file: self.current_file(),
            line: self.line,
        }));
        let outcome = match &builtin.body {
            BuiltinBody::Native(func) => func(self, receiver, args),
            BuiltinBody::Getter(name) => Ok(self.ivar(receiver, name)),
            BuiltinBody::Setter(name) => match args.first() {
                Some(value) => {
                    self.set_ivar(receiver, name, value.clone());
                    Ok(value.clone())
                }
                None => Err(self.error(
                    ErrorKind::ArgumentError,
                    error::wrong_number_of_arguments(1, 0),
                )),
            },
        };
        self.frames.pop();
        let value = outcome?;

        if &*builtin.name == "new"
            && matches!(receiver, Value::Class(_))
            && let Value::Object(instance) = &value
            && let Some(Callable::Lito(init)) =
                self.vm.classes.lookup_method(instance.class, "init")
        {
            self.call_lito(&value, &init, args, call_site, block)?;
        }

        if let Value::Error(err) = &value {
            if err.is_ignored() && err.is_raised() {
                err.set_ignore(false);
            } else if err.is_raised() {
                if !err.has_stored_traces() {
                    err.store_traces(self.stack_traces());
                }
                return Err(VmError::Raised(err.clone()));
            }
        }
        Ok(value)
    }

    pub fn ivar(&self, target: &Value, name: &str) -> Value {
        let found = match target {
            Value::Object(instance) => instance.ivars.get(name),
            Value::Class(id) => self.vm.classes.get(*id).ivars.get(name),
            Value::Error(err) => err.ivars.get(name),
            _ => None,
        };
        found.unwrap_or_default()
    }

    pub fn set_ivar(&self, target: &Value, name: &str, value: Value) {
        match target {
            Value::Object(instance) => instance.ivars.set(name, value),
            Value::Class(id) => self.vm.classes.get(*id).ivars.set(name, value),
            Value::Error(err) => err.ivars.set(name, value),
            _ => {}
        }
    }

    /// Starts an OS thread yielding `template`; errors end the thread quietly.
    pub fn spawn(
        &self,
        template: Arc<CallFrame>,
        args: Vec<Value>,
        group: Option<Arc<WaitGroup>>,
    ) -> VmResult<()> {
        let mut thread = self.vm.new_thread();
        let id = thread.id;
        std::thread::Builder::new()
            .name(format!("lito-{id}"))
            .stack_size(THREAD_STACK_SIZE)
            .spawn(move || {
                tracing::debug!(thread = id, "thread started");
                if let Err(err) = thread.yield_block(&template, &args) {
                    tracing::debug!(thread = id, error = %err, "thread stopped by error");
                }
                if let Some(group) = group
                    && group.done().is_err()
                {
                    tracing::debug!(thread = id, "wait group counter went negative");
                }
            })
            .map_err(|err| VmError::Internal(format!("cannot spawn thread: {err}")))?;
        Ok(())
    }

    /// Loads a library class or a source file. Files load at most once.
    pub fn require(&mut self, name: &str) -> VmResult<bool> {
        if self.vm.require_library(name) {
            return Ok(true);
        }
        if self.vm.config.machine == MachineKind::Sandbox {
            return Err(self.error(ErrorKind::IOError, error::cant_load_file(name)));
        }
        let Some(path) = self.resolve_require(name) else {
            return Err(self.error(ErrorKind::IOError, error::cant_load_file(name)));
        };
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if !self.vm.mark_loaded(&canonical) {
            return Ok(false);
        }
        let filename = path.to_string_lossy().to_string();
        let source = std::fs::read_to_string(&path)
            .map_err(|_| self.error(ErrorKind::IOError, error::cant_load_file(name)))?;
        let set = compile_source(&source, &filename, ParserMode::Normal)
            .map_err(|err| self.error(ErrorKind::InternalError, err))?;
        tracing::debug!(file = %filename, "required file");
        let frame = CallFrame::new(set, self.vm.main_object().clone());
        self.run_frame(Arc::new(frame))?;
        Ok(true)
    }

    fn resolve_require(&self, name: &str) -> Option<PathBuf> {
        let file = format!("{name}.{}", crate::FILE_EXT);
        if name.starts_with('.') {
            let current = self.current_file();
            let dir = Path::new(&current)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let candidate = dir.join(&file);
            return candidate.is_file().then_some(candidate);
        }
        self.vm
            .config
            .lib_paths
            .iter()
            .map(|dir| dir.join(&file))
            .chain(std::iter::once(PathBuf::from(&file)))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_flags_combine() {
        let flags = SlotFlags::SUPER.with(SlotFlags::SPLAT);
        assert!(flags.contains(SlotFlags::SUPER));
        assert!(flags.contains(SlotFlags::SPLAT));
        assert!(!flags.contains(SlotFlags::NAMESPACE));
    }

    #[test]
    fn stack_reports_underflow() {
        let mut stack = Stack::default();
        stack.push(Value::Int(1));
        stack.flag_top(SlotFlags::NAMESPACE);
        assert!(stack.top_flags().contains(SlotFlags::NAMESPACE));
        assert_eq!(stack.pop().expect("value").as_int(), Some(1));
        assert!(stack.pop().is_err());
        assert!(stack.receiver_index(0).is_err());
        assert_eq!(stack.base_index(0).ok(), Some(0));
        assert!(stack.base_index(1).is_err());
    }

    #[test]
    fn array_operands_may_start_at_the_bottom() {
        let mut stack = Stack::default();
        stack.push(Value::Int(1));
        stack.push(Value::Int(2));
        assert_eq!(stack.base_index(2).ok(), Some(0));
        assert!(stack.receiver_index(2).is_err());
        let window: Vec<_> = stack.window(0, 2).iter().filter_map(Value::as_int).collect();
        assert_eq!(window, vec![1, 2]);
    }
}
