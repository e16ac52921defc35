use super::{Methods, block_arg, check_argc, define, define_meta, int_arg, no_new};
use crate::vm::error;
use crate::vm::value::RangeValue;
use crate::vm::{ClassId, ClassTable, ErrorKind, Thread, Value, VmResult};

const CLASS_METHODS: Methods = &[("new", no_new)];

const METHODS: Methods = &[
    ("array", to_array),
    ("each", each),
    ("exclusive?", is_exclusive),
    ("first", first),
    ("last", last),
    ("map", map),
    ("size", size),
    ("step", step),
    ("string", string),
];

pub(super) fn install(classes: &ClassTable, class: ClassId) {
    define_meta(classes, class, CLASS_METHODS);
    define(classes, class, METHODS);
}

fn range(receiver: &Value) -> RangeValue {
    match receiver {
        Value::Range(range) => *range,
        _ => RangeValue {
            start: 0,
            end: 0,
            exclusive: true,
        },
    }
}

fn to_array(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let values = range(receiver).values();
    Ok(Value::array(values.into_iter().map(Value::Int).collect()))
}

fn each(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let block = block_arg(t)?;
    for value in range(receiver).values() {
        t.yield_block(&block, &[Value::Int(value)])?;
        if block.is_removed() {
            break;
        }
    }
    Ok(receiver.clone())
}

fn is_exclusive(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Bool(range(receiver).exclusive))
}

fn first(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Int(range(receiver).start))
}

fn last(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Int(range(receiver).end))
}

fn map(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    let values = range(receiver).values();
    if block.is_empty() {
        return Ok(Value::array(vec![Value::Nil; values.len()]));
    }
    let mut mapped = Vec::with_capacity(values.len());
    for value in values {
        mapped.push(t.yield_block(&block, &[Value::Int(value)])?);
    }
    Ok(Value::array(mapped))
}

fn size(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Int(range(receiver).len() as i64))
}

/// Yields every `n`th value counted from the start.
fn step(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let block = block_arg(t)?;
    let step = int_arg(t, args, 0)?;
    if step <= 0 {
        return Err(t.error(ErrorKind::ArgumentError, error::negative_value(step)));
    }
    let range = range(receiver);
    for value in range.values() {
        if (value - range.start) % step != 0 {
            continue;
        }
        t.yield_block(&block, &[Value::Int(value)])?;
        if block.is_removed() {
            break;
        }
    }
    Ok(receiver.clone())
}

fn string(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(t.inspect(receiver)?))
}
