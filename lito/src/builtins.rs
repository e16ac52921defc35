//! Native methods of the core classes.
//!
//! Every builtin has the signature [`NativeFn`]: it receives the running
//! thread, the receiver and the already evaluated arguments. A block given at
//! the call site is reachable through [`Thread::block`]. Errors are returned
//! as raised error objects so Lito code can `try`/`catch` them.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::vm::error::{self, CANT_YIELD_WITHOUT_BLOCK};
use crate::vm::host::FileObject;
use crate::vm::method::NativeFn;
use crate::vm::{CallFrame, Callable, ClassId, ClassTable, ErrorKind, OBJECT, Thread, Value};
use crate::vm::{CoreClasses, VmError, VmResult};

mod array;
mod class;
mod concurrency;
mod errors;
mod file;
mod float;
mod hash;
mod integer;
mod json;
mod misc;
mod object;
mod range;
mod regexp;
mod string;
mod system;

pub(crate) type Methods = &'static [(&'static str, NativeFn)];

pub fn install(classes: &ClassTable, core: &CoreClasses) {
    object::install(classes);
    class::install(classes);
    integer::install(classes, core.integer);
    float::install(classes, core.float);
    string::install(classes, core.string);
    array::install(classes, core.array);
    hash::install(classes, core.hash);
    range::install(classes, core.range);
    misc::install(classes, core);
    regexp::install(classes, core.regexp);
    concurrency::install(classes, core);
    errors::install(classes, core.error);
    file::install(classes, core.file);
    system::install(classes, core.system);
    json::install(classes, core.json);
    tracing::trace!(classes = classes.len(), "builtins installed");
}

/// `Env`, `Args` and the standard streams.
pub fn install_host_constants(classes: &ClassTable, args: &[String]) {
    let root = classes.get(OBJECT);
    let env: BTreeMap<String, Value> = std::env::vars()
        .map(|(key, value)| (key, Value::from(value)))
        .collect();
    root.set_constant("Env", Value::hash(env));
    root.set_constant(
        "Args",
        Value::array(args.iter().map(|arg| Value::from(arg.as_str())).collect()),
    );
    root.set_constant("Stdin", Value::File(Arc::new(FileObject::stdin())));
    root.set_constant("Stdout", Value::File(Arc::new(FileObject::stdout())));
    root.set_constant("Stderr", Value::File(Arc::new(FileObject::stderr())));
}

/// Instance methods of `class`.
pub(crate) fn define(classes: &ClassTable, class: ClassId, methods: Methods) {
    let record = classes.get(class);
    for (name, func) in methods {
        record.define(*name, Callable::builtin(name, *func));
    }
}

/// Class methods of `class`, stored on its metaclass.
pub(crate) fn define_meta(classes: &ClassTable, class: ClassId, methods: Methods) {
    if let Some(meta) = classes.meta_of(class) {
        define(classes, meta, methods);
    }
}

pub(crate) fn check_argc(t: &Thread, args: &[Value], expected: usize) -> VmResult<()> {
    if args.len() != expected {
        return Err(t.error(
            ErrorKind::ArgumentError,
            error::wrong_number_of_arguments(expected, args.len()),
        ));
    }
    Ok(())
}

pub(crate) fn check_max_args(t: &Thread, args: &[Value], max: usize) -> VmResult<()> {
    if args.len() > max {
        return Err(t.error(
            ErrorKind::ArgumentError,
            error::wrong_number_of_arguments_less(max, args.len()),
        ));
    }
    Ok(())
}

pub(crate) fn check_arg_range(t: &Thread, args: &[Value], min: usize, max: usize) -> VmResult<()> {
    if args.len() < min || args.len() > max {
        return Err(t.error(
            ErrorKind::ArgumentError,
            error::wrong_number_of_arguments_range(min, max, args.len()),
        ));
    }
    Ok(())
}

pub(crate) fn type_error(t: &Thread, expected: &str, got: &Value) -> VmError {
    let got = t.vm.class_name_of(got);
    t.error(
        ErrorKind::TypeError,
        error::wrong_argument_type(expected, &got),
    )
}

fn arg<'a>(t: &Thread, args: &'a [Value], index: usize) -> VmResult<&'a Value> {
    args.get(index).ok_or_else(|| {
        t.error(
            ErrorKind::ArgumentError,
            error::wrong_number_of_arguments(index + 1, args.len()),
        )
    })
}

pub(crate) fn str_arg<'a>(t: &Thread, args: &'a [Value], index: usize) -> VmResult<&'a str> {
    let value = arg(t, args, index)?;
    value.as_str().ok_or_else(|| type_error(t, "String", value))
}

pub(crate) fn int_arg(t: &Thread, args: &[Value], index: usize) -> VmResult<i64> {
    let value = arg(t, args, index)?;
    value.as_int().ok_or_else(|| type_error(t, "Integer", value))
}

pub(crate) fn class_arg(t: &Thread, args: &[Value], index: usize) -> VmResult<ClassId> {
    let value = arg(t, args, index)?;
    value.as_class().ok_or_else(|| type_error(t, "Class", value))
}

/// Block given to the running builtin.
pub(crate) fn block_arg(t: &Thread) -> VmResult<Arc<CallFrame>> {
    t.block()
        .ok_or_else(|| t.error(ErrorKind::InternalError, CANT_YIELD_WITHOUT_BLOCK))
}

/// Class method `new` for classes whose instances only come from literals.
pub(crate) fn no_new(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let name = t.inspect(receiver)?;
    Err(t.error(
        ErrorKind::NoMethodError,
        error::undefined_method("new", &name),
    ))
}

/// Resolves a possibly negative index against `len`.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indices_count_from_the_end() {
        assert_eq!(normalize_index(0, 3), Some(0));
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(-4, 3), None);
        assert_eq!(normalize_index(3, 3), None);
    }
}
