use std::cmp::Ordering;

use super::integer::{Arith, arithmetic, comparison};
use super::{Methods, check_argc, define, define_meta, no_new};
use crate::vm::display::format_float;
use crate::vm::{ClassId, ClassTable, Thread, Value, VmResult};

const CLASS_METHODS: Methods = &[("new", no_new)];

const METHODS: Methods = &[
    ("+", add),
    ("-", subtract),
    ("*", multiply),
    ("/", divide),
    ("%", modulo),
    ("**", power),
    (">", greater),
    (">=", greater_equal),
    ("<", less),
    ("<=", less_equal),
    ("inf?", is_infinite),
    ("int", to_int),
    ("json", json),
    ("nan?", is_nan),
    ("string", string),
];

pub(super) fn install(classes: &ClassTable, class: ClassId) {
    define_meta(classes, class, CLASS_METHODS);
    define(classes, class, METHODS);
}

fn value(receiver: &Value) -> f64 {
    receiver.as_number().unwrap_or_default()
}

fn binary(t: &Thread, op: Arith, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    // the receiver is always a float, so the result is too
    arithmetic(t, op, &Value::Float(value(receiver)), &args[0])
}

fn add(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    binary(t, Arith::Add, receiver, args)
}

fn subtract(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    binary(t, Arith::Subtract, receiver, args)
}

fn multiply(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    binary(t, Arith::Multiply, receiver, args)
}

fn divide(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    binary(t, Arith::Divide, receiver, args)
}

fn modulo(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    binary(t, Arith::Modulo, receiver, args)
}

fn power(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    binary(t, Arith::Power, receiver, args)
}

fn greater(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    comparison(t, receiver, args, Ordering::is_gt)
}

fn greater_equal(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    comparison(t, receiver, args, Ordering::is_ge)
}

fn less(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    comparison(t, receiver, args, Ordering::is_lt)
}

fn less_equal(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    comparison(t, receiver, args, Ordering::is_le)
}

fn is_infinite(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::Bool(value(receiver).is_infinite()))
}

fn is_nan(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::Bool(value(receiver).is_nan()))
}

/// Truncates toward zero.
fn to_int(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Int(value(receiver) as i64))
}

fn json(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::from(t.to_json(receiver)?))
}

fn string(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(format_float(value(receiver))))
}
