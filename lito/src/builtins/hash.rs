use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Methods, block_arg, check_argc, define, define_meta, str_arg, type_error};
use crate::vm::error;
use crate::vm::value::HashObject;
use crate::vm::{ClassId, ClassTable, ErrorKind, Thread, Value, VmResult};

const CLASS_METHODS: Methods = &[("new", new)];

const METHODS: Methods = &[
    ("[]", get),
    ("[]=", set),
    ("any?", any),
    ("array", to_array),
    ("clear", clear),
    ("delete", delete),
    ("dup", dup),
    ("each", each),
    ("each_key", each_key),
    ("each_value", each_value),
    ("empty?", is_empty),
    ("filter", filter),
    ("json", json),
    ("key?", has_key),
    ("keys", keys),
    ("length", length),
    ("map_values", map_values),
    ("merge", merge),
    ("string", string),
    ("value?", has_value),
    ("values", values),
];

pub(super) fn install(classes: &ClassTable, class: ClassId) {
    define_meta(classes, class, CLASS_METHODS);
    define(classes, class, METHODS);
}

fn hash_of(t: &Thread, value: &Value) -> VmResult<Arc<HashObject>> {
    match value {
        Value::Hash(hash) => Ok(hash.clone()),
        other => Err(type_error(t, "Hash", other)),
    }
}

fn pairs(t: &Thread, receiver: &Value) -> VmResult<BTreeMap<String, Value>> {
    Ok(hash_of(t, receiver)?.snapshot())
}

fn new(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::hash(BTreeMap::new()))
}

fn get(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let key = str_arg(t, args, 0)?;
    Ok(hash_of(t, receiver)?.get(key).unwrap_or_default())
}

fn set(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 2)?;
    let key = str_arg(t, args, 0)?;
    hash_of(t, receiver)?.insert(key, args[1].clone());
    Ok(args[1].clone())
}

fn any(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    if block.is_empty() {
        return Ok(Value::Bool(false));
    }
    for (key, value) in pairs(t, receiver)? {
        let result = t.yield_block(&block, &[Value::from(key), value])?;
        if block.is_removed() {
            return Ok(Value::Nil);
        }
        if result.is_truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

/// `[[key, value], ...]` in key order.
fn to_array(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let entries = pairs(t, receiver)?
        .into_iter()
        .map(|(key, value)| Value::array(vec![Value::from(key), value]))
        .collect();
    Ok(Value::array(entries))
}

fn clear(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    hash_of(t, receiver)?.clear();
    Ok(receiver.clone())
}

/// Removes the named keys, then every pair for which the block is truthy.
fn delete(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let hash = hash_of(t, receiver)?;
    for index in 0..args.len() {
        hash.remove(str_arg(t, args, index)?);
    }
    let Some(block) = t.block() else {
        return Ok(receiver.clone());
    };
    if block.is_empty() {
        return Ok(receiver.clone());
    }
    for (key, value) in hash.snapshot() {
        let verdict = t.yield_block(&block, &[Value::from(key.as_str()), value])?;
        if verdict.is_truthy() {
            hash.remove(&key);
        }
    }
    Ok(receiver.clone())
}

fn dup(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::hash(pairs(t, receiver)?))
}

fn each(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    for (key, value) in pairs(t, receiver)? {
        t.yield_block(&block, &[Value::from(key), value])?;
        if block.is_removed() {
            break;
        }
    }
    Ok(receiver.clone())
}

/// Yields each key and returns them.
fn each_key(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    let mut keys = Vec::new();
    for key in hash_of(t, receiver)?.keys() {
        let key = Value::from(key);
        keys.push(key.clone());
        t.yield_block(&block, &[key])?;
    }
    Ok(Value::array(keys))
}

fn each_value(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    let mut values = Vec::new();
    for value in pairs(t, receiver)?.into_values() {
        values.push(value.clone());
        t.yield_block(&block, &[value])?;
    }
    Ok(Value::array(values))
}

fn is_empty(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::Bool(hash_of(t, receiver)?.is_empty()))
}

fn filter(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    let mut kept = BTreeMap::new();
    if block.is_empty() {
        return Ok(Value::hash(kept));
    }
    for (key, value) in pairs(t, receiver)? {
        let verdict = t.yield_block(&block, &[Value::from(key.as_str()), value.clone()])?;
        if verdict.is_truthy() {
            kept.insert(key, value);
        }
    }
    Ok(Value::hash(kept))
}

fn json(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::from(t.to_json(receiver)?))
}

fn has_key(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let key = str_arg(t, args, 0)?;
    Ok(Value::Bool(hash_of(t, receiver)?.get(key).is_some()))
}

fn keys(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let keys = hash_of(t, receiver)?.keys();
    Ok(Value::array(keys.into_iter().map(Value::from).collect()))
}

fn length(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::Int(hash_of(t, receiver)?.len() as i64))
}

fn map_values(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    if block.is_empty() {
        return Ok(receiver.clone());
    }
    let mut mapped = BTreeMap::new();
    for (key, value) in pairs(t, receiver)? {
        mapped.insert(key, t.yield_block(&block, &[value])?);
    }
    Ok(Value::hash(mapped))
}

/// New hash; later arguments win on duplicate keys.
fn merge(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    if args.is_empty() {
        return Err(t.error(
            ErrorKind::ArgumentError,
            error::wrong_number_of_arguments_more(1, 0),
        ));
    }
    let mut merged = pairs(t, receiver)?;
    for other in args {
        merged.extend(hash_of(t, other)?.snapshot());
    }
    Ok(Value::hash(merged))
}

fn string(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::from(t.inspect(receiver)?))
}

fn has_value(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let found = pairs(t, receiver)?
        .values()
        .any(|value| value.equal_to(&args[0]));
    Ok(Value::Bool(found))
}

/// All values in key order, or the values of the named keys.
fn values(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let hash = hash_of(t, receiver)?;
    if args.is_empty() {
        return Ok(Value::array(hash.snapshot().into_values().collect()));
    }
    let mut picked = Vec::with_capacity(args.len());
    for index in 0..args.len() {
        picked.push(hash.get(str_arg(t, args, index)?).unwrap_or_default());
    }
    Ok(Value::array(picked))
}
