use std::sync::Arc;

use super::{Methods, check_max_args, define, define_meta, str_arg};
use crate::vm::{ClassId, ClassTable, ErrorObject, Thread, Value, VmResult};

const CLASS_METHODS: Methods = &[("new", new)];

const METHODS: Methods = &[
    ("cancel", cancel),
    ("ignore", ignore),
    ("message", message),
    ("raise", raise),
    ("stack", stack),
    ("type", kind),
];

pub(super) fn install(classes: &ClassTable, class: ClassId) {
    define_meta(classes, class, CLASS_METHODS);
    define(classes, class, METHODS);
}

/// Creates an error without raising it; `raise err` or returning it from a
/// builtin unwinds later.
fn new(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_max_args(t, args, 1)?;
    let Value::Class(class) = receiver else {
        return Ok(Value::Nil);
    };
    let name = t.vm.classes.name(*class);
    let message = if args.is_empty() {
        format!("{name}: ")
    } else {
        format!("{name}: '{}'", str_arg(t, args, 0)?)
    };
    let err = ErrorObject::new(*class, name, message);
    err.set_raised(false);
    err.set_ignore(true);
    Ok(Value::Error(Arc::new(err)))
}

fn error(receiver: &Value) -> Option<&Arc<ErrorObject>> {
    match receiver {
        Value::Error(err) => Some(err),
        _ => None,
    }
}

fn message(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(error(receiver).map_or("", |err| err.message.as_str())))
}

/// One `from file:line` per frame, innermost first.
fn stack(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let traces = error(receiver).map(|err| err.traces()).unwrap_or_default();
    Ok(Value::from(traces.join("\n")))
}

fn kind(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(error(receiver).map_or("", |err| err.kind.as_str())))
}

fn raise(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    if let Some(err) = error(receiver) {
        err.set_raised(true);
    }
    Ok(receiver.clone())
}

fn ignore(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    if let Some(err) = error(receiver) {
        err.set_ignore(true);
    }
    Ok(receiver.clone())
}

/// Stops the error from propagating any further.
fn cancel(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    if let Some(err) = error(receiver) {
        err.set_raised(false);
        err.set_ignore(false);
    }
    Ok(receiver.clone())
}
