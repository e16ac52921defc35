use super::{Methods, check_max_args, define_meta, int_arg, no_new};
use crate::vm::{ClassId, ClassTable, Thread, Value, VmError, VmResult};

const CLASS_METHODS: Methods = &[("exit", exit), ("new", no_new)];

pub(super) fn install(classes: &ClassTable, class: ClassId) {
    define_meta(classes, class, CLASS_METHODS);
}

/// Unwinds every frame; the embedder turns it into the process status.
fn exit(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_max_args(t, args, 1)?;
    let code = if args.is_empty() { 0 } else { int_arg(t, args, 0)? };
    tracing::debug!(thread = t.id, code, "exit requested");
    Err(VmError::Exit(code as i32))
}
