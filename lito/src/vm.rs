use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::bytecode::InstructionSet;

pub mod channel;
pub mod class;
pub mod diagnostics;
pub mod display;
pub mod error;
pub mod frame;
pub mod host;
mod interpreter;
pub mod method;
#[cfg(feature = "runtime")]
pub mod repl;
pub mod thread;
pub mod value;
pub mod wait_group;

pub use class::{CLASS, ClassId, ClassTable, MODULE, OBJECT};
pub use error::{ErrorKind, ErrorObject, VmError, VmResult};
pub use frame::CallFrame;
pub use method::Callable;
pub use thread::Thread;
pub use value::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MachineKind {
    /// Core library plus host access (files, environment, process).
    #[default]
    Standard,
    /// Core library only.
    Sandbox,
}

impl MachineKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(MachineKind::Standard),
            "sandbox" => Some(MachineKind::Sandbox),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MachineKind::Standard => "standard",
            MachineKind::Sandbox => "sandbox",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Normal,
    Repl,
    CommandLine,
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Destination of `print`/`println`.
#[derive(Clone)]
pub struct OutputSink {
    writer: SharedWriter,
}

impl OutputSink {
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Sink writing into a shared buffer, for embedding and tests.
    pub fn capture() -> (Self, CapturedOutput) {
        let buffer = CapturedOutput::default();
        (Self::from_writer(buffer.clone()), buffer)
    }

    pub fn write_str(&self, text: &str) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(text.as_bytes())?;
        writer.flush()
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OutputSink")
    }
}

#[derive(Clone, Debug, Default)]
pub struct CapturedOutput {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Per-instruction execution log enabled by `-trace`.
#[derive(Clone)]
pub struct TraceSink {
    writer: SharedWriter,
}

impl TraceSink {
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn create(path: &Path) -> io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::from_writer(io::BufWriter::new(file)))
    }

    pub fn record(&self, thread: u64, set: &str, pc: usize, mnemonic: &str, line: usize) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "{thread}\t{set}\t{pc}\t{mnemonic}\t{line}");
    }

    pub fn flush(&self) {
        let _ = self.writer.lock().flush();
    }
}

impl fmt::Debug for TraceSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TraceSink")
    }
}

#[derive(Clone, Debug, Default)]
pub struct VmConfig {
    pub machine: MachineKind,
    pub mode: RunMode,
    /// Script arguments exposed as `Args`.
    pub args: Vec<String>,
    pub output: OutputSink,
    pub trace: Option<TraceSink>,
    /// Directories searched by `require` for non-relative names.
    pub lib_paths: Vec<PathBuf>,
}

impl VmConfig {
    pub fn sandbox() -> Self {
        Self {
            machine: MachineKind::Sandbox,
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: OutputSink) -> Self {
        self.output = output;
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Ids of the classes the runtime creates at startup.
#[derive(Clone, Debug)]
pub struct CoreClasses {
    pub integer: ClassId,
    pub float: ClassId,
    pub string: ClassId,
    pub boolean: ClassId,
    pub null: ClassId,
    pub array: ClassId,
    pub hash: ClassId,
    pub range: ClassId,
    pub block: ClassId,
    pub method: ClassId,
    pub channel: ClassId,
    pub wait_group: ClassId,
    pub regexp: ClassId,
    pub error: ClassId,
    errors: Vec<(ErrorKind, ClassId)>,
    pub file: ClassId,
    pub system: ClassId,
    pub json: ClassId,
    pub lock: ClassId,
}

impl CoreClasses {
    fn bootstrap(classes: &ClassTable, machine: MachineKind) -> Self {
        let object = classes.create("Object");
        let class = classes.create("Class");
        let module = classes.create("Module");
        debug_assert_eq!((object, class, module), (OBJECT, CLASS, MODULE));

        let object_meta = classes.create("#<Class:Object>");
        let class_meta = classes.create("#<Class:Class>");
        let module_meta = classes.create("#<Class:Module>");
        classes.update(object_meta, |links| {
            links.super_class = CLASS;
            links.pseudo_super = CLASS;
        });
        classes.update(OBJECT, |links| {
            links.super_class = OBJECT;
            links.pseudo_super = OBJECT;
            links.meta = Some(object_meta);
        });
        classes.update(CLASS, |links| {
            links.super_class = MODULE;
            links.pseudo_super = MODULE;
            links.meta = Some(class_meta);
        });
        classes.update(MODULE, |links| links.meta = Some(module_meta));

        let root = classes.get(OBJECT);
        for id in [OBJECT, CLASS, MODULE] {
            root.set_constant(classes.name(id), Value::Class(id));
        }

        let define = |name: &str| {
            let id = classes.init_class(name);
            root.set_constant(name, Value::Class(id));
            id
        };
        let integer = define("Integer");
        let float = define("Float");
        let string = define("String");
        let boolean = define("Boolean");
        let null = define("Nil");
        let array = define("Array");
        let hash = define("Hash");
        let range = define("Range");
        let block = define("Block");
        let method = define("Method");
        let channel = define("Channel");
        let wait_group = define("WaitGroup");
        let regexp = define("Regexp");

        let error = define("Error");
        let errors = ErrorKind::ALL
            .iter()
            .map(|&kind| {
                if kind == ErrorKind::Error {
                    return (kind, error);
                }
                let id = define(kind.name());
                classes.inherit(id, error);
                (kind, id)
            })
            .collect();

        // host and library classes exist on every machine; their constants
        // are published by the machine kind or by `require`
        let file = classes.init_class("File");
        let system = classes.init_class("System");
        let json = classes.init_class("JSON");
        let lock = classes.init_class("Lock");
        if machine == MachineKind::Standard {
            root.set_constant("File", Value::Class(file));
            root.set_constant("System", Value::Class(system));
        }

        Self {
            integer,
            float,
            string,
            boolean,
            null,
            array,
            hash,
            range,
            block,
            method,
            channel,
            wait_group,
            regexp,
            error,
            errors,
            file,
            system,
            json,
            lock,
        }
    }

    pub fn error_class(&self, kind: ErrorKind) -> ClassId {
        self.errors
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map_or(self.error, |(_, id)| *id)
    }
}

pub struct Vm {
    pub classes: ClassTable,
    pub core: CoreClasses,
    pub config: VmConfig,
    main_object: Value,
    next_thread: AtomicU64,
    loaded_files: Mutex<HashSet<PathBuf>>,
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("machine", &self.config.machine)
            .field("mode", &self.config.mode)
            .field("classes", &self.classes.len())
            .finish()
    }
}

impl Vm {
    pub fn new(config: VmConfig) -> Arc<Self> {
        let classes = ClassTable::default();
        let core = CoreClasses::bootstrap(&classes, config.machine);
        crate::builtins::install(&classes, &core);
        if config.machine == MachineKind::Standard {
            crate::builtins::install_host_constants(&classes, &config.args);
        }
        let main_object = Value::Object(Arc::new(value::Instance::new(OBJECT)));
        tracing::debug!(
            machine = config.machine.name(),
            classes = classes.len(),
            "vm initialised"
        );
        Arc::new(Self {
            classes,
            core,
            config,
            main_object,
            next_thread: AtomicU64::new(1),
            loaded_files: Mutex::new(HashSet::new()),
        })
    }

    pub fn main_object(&self) -> &Value {
        &self.main_object
    }

    pub fn main_thread(self: &Arc<Self>) -> Thread {
        Thread::new(self.clone(), 0)
    }

    /// Thread with a fresh id, for `go` blocks and library loading.
    pub fn new_thread(self: &Arc<Self>) -> Thread {
        let id = self.next_thread.fetch_add(1, Ordering::Relaxed);
        Thread::new(self.clone(), id)
    }

    /// Runs a program set on the main thread with the main object as self.
    pub fn run(self: &Arc<Self>, set: Arc<InstructionSet>) -> VmResult<Value> {
        let mut thread = self.main_thread();
        let frame = CallFrame::new(set, self.main_object.clone());
        let result = thread.run_frame(Arc::new(frame));
        if let Some(trace) = &self.config.trace {
            trace.flush();
        }
        result
    }

    pub fn write_output(&self, text: &str) -> VmResult<()> {
        self.config
            .output
            .write_str(text)
            .map_err(|err| VmError::Internal(format!("output: {err}")))
    }

    pub fn class_of(&self, value: &Value) -> ClassId {
        let core = &self.core;
        match value {
            Value::Nil => core.null,
            Value::Bool(_) => core.boolean,
            Value::Int(_) => core.integer,
            Value::Float(_) => core.float,
            Value::Str(_) => core.string,
            Value::Array(_) => core.array,
            Value::Hash(_) => core.hash,
            Value::Range(_) => core.range,
            Value::Block(_) => core.block,
            Value::Channel(_) => core.channel,
            Value::WaitGroup(_) => core.wait_group,
            Value::Regexp(_) => core.regexp,
            Value::Class(id) => self.classes.class_of(*id),
            Value::Object(instance) => instance.class,
            Value::Error(err) => err.class,
            Value::File(_) => core.file,
            Value::Lock(_) => core.lock,
        }
    }

    pub fn class_name_of(&self, value: &Value) -> String {
        self.classes.name(self.class_of(value))
    }

    pub fn is_a(&self, value: &Value, class: ClassId) -> bool {
        self.classes.is_a(self.class_of(value), class)
    }

    pub fn find_method(&self, receiver: &Value, name: &str, is_super: bool) -> Option<Callable> {
        match receiver {
            Value::Class(id) => self.classes.find_class_method(*id, name, is_super),
            other => {
                let mut class = self.class_of(other);
                if is_super {
                    class = self.classes.super_of(class);
                }
                self.classes.lookup_method(class, name)
            }
        }
    }

    /// `lookup!` handler for a missing method, honouring `inherits_lookup!`.
    pub fn find_lookup(&self, receiver: &Value) -> Option<Callable> {
        const LOOKUP: &str = "lookup!";
        let class = self.class_of(receiver);
        let search = self.classes.links(class).inherits_lookup;
        match receiver {
            Value::Class(id) => {
                let own = self
                    .classes
                    .meta_of(*id)
                    .and_then(|meta| self.classes.get(meta).method(LOOKUP));
                own.or_else(|| self.classes.get(class).method(LOOKUP))
                    .or_else(|| {
                        search
                            .then(|| self.classes.find_class_method(*id, LOOKUP, false))
                            .flatten()
                    })
            }
            _ => self.classes.get(class).method(LOOKUP).or_else(|| {
                search
                    .then(|| self.classes.lookup_method(class, LOOKUP))
                    .flatten()
            }),
        }
    }

    /// Publishes a library class; false for unknown names.
    pub fn require_library(&self, name: &str) -> bool {
        let (constant, id) = match name {
            "json" => ("JSON", self.core.json),
            "lock" => ("Lock", self.core.lock),
            _ => return false,
        };
        self.classes
            .get(OBJECT)
            .set_constant(constant, Value::Class(id));
        tracing::debug!(library = name, "library enabled");
        true
    }

    /// Records `path` as loaded; false when it already was.
    pub fn mark_loaded(&self, path: &Path) -> bool {
        self.loaded_files.lock().insert(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_wires_the_root_classes() {
        let vm = Vm::new(VmConfig::sandbox());
        let classes = &vm.classes;
        assert_eq!(classes.super_of(OBJECT), OBJECT);
        assert_eq!(classes.super_of(CLASS), MODULE);
        assert_eq!(classes.super_of(MODULE), OBJECT);
        assert_eq!(vm.class_of(&Value::Class(vm.core.integer)), CLASS);
        assert_eq!(vm.class_name_of(&Value::Int(1)), "Integer");
        assert!(classes.is_a(vm.core.error_class(ErrorKind::TypeError), vm.core.error));
    }

    #[test]
    fn sandbox_hides_host_classes_until_required() {
        let vm = Vm::new(VmConfig::sandbox());
        let root = vm.classes.get(OBJECT);
        assert!(root.constant("File").is_none());
        assert!(root.constant("Lock").is_none());
        assert!(vm.require_library("lock"));
        assert!(root.constant("Lock").is_some());
        assert!(!vm.require_library("yaml"));
    }
}
