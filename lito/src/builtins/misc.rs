//! `Boolean`, `Nil` and `Block`.

use std::sync::Arc;

use super::{Methods, block_arg, check_argc, define, define_meta, no_new};
use crate::vm::frame::BlockObject;
use crate::vm::{ClassTable, CoreClasses, ErrorKind, Thread, Value, VmResult};

const LITERAL_ONLY: Methods = &[("new", no_new)];

const BOOLEAN_METHODS: Methods = &[("ifFalse", if_false), ("ifTrue", if_true), ("int", bool_int)];

const NIL_METHODS: Methods = &[
    ("!", nil_not),
    ("!=", nil_not_equal),
    ("inspect", nil_inspect),
    ("int", nil_int),
    ("nil?", nil_is_nil),
    ("string", nil_string),
];

const BLOCK_CLASS_METHODS: Methods = &[("new", block_new)];

const BLOCK_METHODS: Methods = &[("call", block_call)];

pub(super) fn install(classes: &ClassTable, core: &CoreClasses) {
    define_meta(classes, core.boolean, LITERAL_ONLY);
    define(classes, core.boolean, BOOLEAN_METHODS);
    define_meta(classes, core.null, LITERAL_ONLY);
    define(classes, core.null, NIL_METHODS);
    define_meta(classes, core.block, BLOCK_CLASS_METHODS);
    define(classes, core.block, BLOCK_METHODS);
}

fn bool_int(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Int(i64::from(receiver.is_truthy())))
}

/// Runs the block when the receiver's truthiness is `expected`.
fn yield_if(t: &mut Thread, receiver: &Value, expected: bool) -> VmResult<Value> {
    let block = block_arg(t)?;
    if receiver.is_truthy() != expected || block.is_empty() {
        return Ok(Value::Nil);
    }
    t.yield_block(&block, &[])
}

fn if_true(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    yield_if(t, receiver, true)
}

fn if_false(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    yield_if(t, receiver, false)
}

fn nil_not(_t: &mut Thread, _receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Bool(true))
}

fn nil_not_equal(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    Ok(Value::Bool(!args[0].is_nil()))
}

fn nil_inspect(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::from("nil"))
}

fn nil_int(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::Int(0))
}

fn nil_is_nil(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::Bool(true))
}

fn nil_string(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::from(""))
}

/// Captures the given block as a value.
fn block_new(t: &mut Thread, _receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let Some(template) = t.block() else {
        return Err(t.error(
            ErrorKind::ArgumentError,
            "Can't create block object without block argument",
        ));
    };
    let block = BlockObject::from_template(&template, template.self_value.clone());
    Ok(Value::Block(Arc::new(block)))
}

fn block_call(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let Value::Block(block) = receiver else {
        return Ok(Value::Nil);
    };
    let template = block.to_frame();
    t.yield_block(&template, args)
}
