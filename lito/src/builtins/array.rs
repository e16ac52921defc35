use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{
    Methods, block_arg, check_arg_range, check_argc, check_max_args, define, define_meta, int_arg,
    normalize_index, str_arg, type_error,
};
use crate::vm::error;
use crate::vm::value::ArrayObject;
use crate::vm::{ClassId, ClassTable, ErrorKind, Thread, Value, VmResult};

const CLASS_METHODS: Methods = &[("new", new)];

const METHODS: Methods = &[
    ("[]", index),
    ("[]=", assign),
    ("*", repeat),
    ("+", concat_new),
    ("any?", any),
    ("clear", clear),
    ("concat", concat),
    ("count", count),
    ("delete_at", delete_at),
    ("dup", dup),
    ("each", each),
    ("each_index", each_index),
    ("empty?", is_empty),
    ("filter", filter),
    ("first", first),
    ("flatten", flatten),
    ("hash", to_hash),
    ("include?", include),
    ("index_with", index_with),
    ("join", join),
    ("json", json),
    ("last", last),
    ("length", length),
    ("map", map),
    ("pop", pop),
    ("push", push),
    ("reduce", reduce),
    ("reverse", reverse),
    ("reverse_each", reverse_each),
    ("shift", shift),
    ("sort", sort),
    ("unshift", unshift),
    ("values", values),
];

pub(super) fn install(classes: &ClassTable, class: ClassId) {
    define_meta(classes, class, CLASS_METHODS);
    define(classes, class, METHODS);
}

fn array_of(t: &Thread, receiver: &Value) -> VmResult<Arc<ArrayObject>> {
    match receiver {
        Value::Array(array) => Ok(array.clone()),
        other => Err(type_error(t, "Array", other)),
    }
}

fn new(_t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::array(args.to_vec()))
}

/// `a[i]`, `a[i, count]` or `a[range]`.
fn index(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let array = array_of(t, receiver)?;
    let elements = array.snapshot();
    if let [Value::Range(range)] = args {
        let len = elements.len() as i64;
        let mut start = range.start;
        let mut end = if range.exclusive { range.end - 1 } else { range.end };
        if end < 0 {
            end += len;
        }
        if start < 0 {
            start += len;
        }
        let count = end - start + 1;
        if start < 0 || start > len {
            return Ok(Value::Nil);
        }
        if count < 0 {
            return Ok(Value::Nil);
        }
        return Ok(window(&elements, start as usize, count as usize));
    }

    check_arg_range(t, args, 1, 2)?;
    let position = int_arg(t, args, 0)?;
    let len = elements.len();
    if position < -(len as i64) {
        return Err(t.error(
            ErrorKind::ArgumentError,
            error::index_too_small(position, -(len as i64)),
        ));
    }
    if args.len() == 2 {
        let count = int_arg(t, args, 1)?;
        if count < 0 {
            return Err(t.error(
                ErrorKind::ArgumentError,
                error::negative_second_value(count),
            ));
        }
        if position > 0 && position as usize == len {
            return Ok(Value::array(Vec::new()));
        }
        return Ok(match normalize_index(position, len) {
            Some(start) => window(&elements, start, count as usize),
            None => Value::Nil,
        });
    }
    Ok(normalize_index(position, len)
        .and_then(|at| elements.get(at).cloned())
        .unwrap_or_default())
}

fn window(elements: &[Value], start: usize, count: usize) -> Value {
    let start = start.min(elements.len());
    let end = start.saturating_add(count).min(elements.len());
    Value::array(elements[start..end].to_vec())
}

/// `a[i] = v` pads with nil; `a[i, count] = v` replaces `count` elements.
fn assign(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_arg_range(t, args, 2, 3)?;
    let array = array_of(t, receiver)?;
    let position = int_arg(t, args, 0)?;
    let len = array.len();
    let too_small = || {
        t.error(
            ErrorKind::ArgumentError,
            error::index_too_small(position, -(len as i64)),
        )
    };

    if args.len() == 3 {
        let start = if position < 0 {
            normalize_index(position, len).ok_or_else(too_small)?
        } else {
            position as usize
        };
        let count = int_arg(t, args, 1)?;
        if count < 0 {
            return Err(t.error(
                ErrorKind::ArgumentError,
                error::negative_second_value(count),
            ));
        }
        let value = args[2].clone();
        let inserted = match &value {
            Value::Array(items) => items.snapshot(),
            other => vec![other.clone()],
        };
        array.with_mut(|elements| {
            if start >= elements.len() {
                elements.resize(start, Value::Nil);
                elements.extend(inserted);
            } else {
                let end = start.saturating_add(count as usize).min(elements.len());
                elements.splice(start..end, inserted);
            }
        });
        return Ok(value);
    }

    let value = args[1].clone();
    let slot = if position < 0 {
        normalize_index(position, len).ok_or_else(too_small)?
    } else {
        position as usize
    };
    array.with_mut(|elements| {
        if elements.len() <= slot {
            elements.resize(slot + 1, Value::Nil);
        }
        elements[slot] = value.clone();
    });
    Ok(value)
}

fn repeat(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let times = int_arg(t, args, 0)?;
    if times < 0 {
        return Err(t.error(ErrorKind::ArgumentError, error::negative_value(times)));
    }
    let elements = array_of(t, receiver)?.snapshot();
    let mut out = Vec::with_capacity(elements.len().saturating_mul(times as usize));
    for _ in 0..times {
        out.extend(elements.iter().cloned());
    }
    Ok(Value::array(out))
}

fn concat_new(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let mut elements = array_of(t, receiver)?.snapshot();
    elements.extend(array_of(t, &args[0])?.snapshot());
    Ok(Value::array(elements))
}

fn any(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let block = block_arg(t)?;
    if block.is_empty() {
        return Ok(Value::Bool(false));
    }
    for element in array_of(t, receiver)?.snapshot() {
        if t.yield_block(&block, &[element])?.is_truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn clear(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    array_of(t, receiver)?.replace(Vec::new());
    Ok(receiver.clone())
}

/// Appends every array argument in place.
fn concat(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let array = array_of(t, receiver)?;
    for arg in args {
        let extra = array_of(t, arg)?.snapshot();
        array.with_mut(|elements| elements.extend(extra));
    }
    Ok(receiver.clone())
}

/// Length, occurrences of a scalar, or elements the block accepts.
fn count(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_max_args(t, args, 1)?;
    let elements = array_of(t, receiver)?.snapshot();
    let Some(block) = t.block() else {
        let Some(target) = args.first() else {
            return Ok(Value::Int(elements.len() as i64));
        };
        let hits = elements
            .iter()
            .filter(|element| match (element, target) {
                (Value::Int(_), Value::Int(_))
                | (Value::Str(_), Value::Str(_))
                | (Value::Bool(_), Value::Bool(_)) => element.equal_to(target),
                _ => false,
            })
            .count();
        return Ok(Value::Int(hits as i64));
    };
    if block.is_empty() {
        return Ok(Value::Int(0));
    }
    let mut hits = 0;
    for element in elements {
        if t.yield_block(&block, &[element])?.is_truthy() {
            hits += 1;
        }
    }
    Ok(Value::Int(hits))
}

fn delete_at(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let position = int_arg(t, args, 0)?;
    let array = array_of(t, receiver)?;
    Ok(array.with_mut(|elements| {
        normalize_index(position, elements.len())
            .map(|at| elements.remove(at))
            .unwrap_or_default()
    }))
}

fn dup(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::array(array_of(t, receiver)?.snapshot()))
}

fn each(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    if block.is_empty() {
        return Ok(receiver.clone());
    }
    for element in array_of(t, receiver)?.snapshot() {
        t.yield_block(&block, &[element])?;
        if block.is_removed() {
            break;
        }
    }
    Ok(receiver.clone())
}

fn each_index(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    if block.is_empty() {
        return Ok(receiver.clone());
    }
    let len = array_of(t, receiver)?.len();
    for position in 0..len {
        t.yield_block(&block, &[Value::Int(position as i64)])?;
        if block.is_removed() {
            break;
        }
    }
    Ok(receiver.clone())
}

fn is_empty(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::Bool(array_of(t, receiver)?.is_empty()))
}

fn filter(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    let mut kept = Vec::new();
    if block.is_empty() {
        return Ok(Value::array(kept));
    }
    for element in array_of(t, receiver)?.snapshot() {
        if t.yield_block(&block, std::slice::from_ref(&element))?.is_truthy() {
            kept.push(element);
        }
    }
    Ok(Value::array(kept))
}

fn take_count(t: &Thread, args: &[Value]) -> VmResult<Option<usize>> {
    check_max_args(t, args, 1)?;
    if args.is_empty() {
        return Ok(None);
    }
    let count = int_arg(t, args, 0)?;
    if count < 1 {
        return Err(t.error(ErrorKind::ArgumentError, error::negative_value(count)));
    }
    Ok(Some(count as usize))
}

/// First element, or the first `n` as an array.
fn first(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let count = take_count(t, args)?;
    let elements = array_of(t, receiver)?.snapshot();
    if elements.is_empty() {
        return Ok(Value::Nil);
    }
    Ok(match count {
        None => elements[0].clone(),
        Some(count) if count < elements.len() => Value::array(elements[..count].to_vec()),
        Some(_) => receiver.clone(),
    })
}

fn last(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let count = take_count(t, args)?;
    let elements = array_of(t, receiver)?.snapshot();
    if elements.is_empty() {
        return Ok(Value::Nil);
    }
    let len = elements.len();
    Ok(match count {
        None => elements[len - 1].clone(),
        Some(count) if count < len => Value::array(elements[len - count..].to_vec()),
        Some(_) => receiver.clone(),
    })
}

fn flattened(elements: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::with_capacity(elements.len());
    for element in elements {
        match element {
            Value::Array(nested) => out.extend(flattened(nested.snapshot())),
            other => out.push(other),
        }
    }
    out
}

fn flatten(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::array(flattened(array_of(t, receiver)?.snapshot())))
}

/// Builds a hash from `[key, value]` pairs with string keys.
fn to_hash(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let mut pairs = BTreeMap::new();
    for (position, element) in array_of(t, receiver)?.snapshot().into_iter().enumerate() {
        let Value::Array(pair) = &element else {
            let got = t.vm.class_name_of(&element);
            return Err(t.error(
                ErrorKind::TypeError,
                format!("Expect the Array's element #{position} to be Array. got: {got}"),
            ));
        };
        let pair = pair.snapshot();
        let [key, value] = pair.as_slice() else {
            let text = t.to_s(&element)?;
            return Err(t.error(
                ErrorKind::ArgumentError,
                format!(
                    "Expect element #{position} to have 2 elements as a key-value pair. got: {text}"
                ),
            ));
        };
        let Value::Str(key) = key else {
            let got = t.vm.class_name_of(key);
            return Err(t.error(
                ErrorKind::TypeError,
                format!(
                    "Expect the key in the Array's element #{position} to be String. got: {got}"
                ),
            ));
        };
        pairs.insert(key.to_string(), value.clone());
    }
    Ok(Value::hash(pairs))
}

fn include(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let found = array_of(t, receiver)?
        .snapshot()
        .iter()
        .any(|element| element.equal_to(&args[0]));
    Ok(Value::Bool(found))
}

/// Hash keyed by each element's text, valued by the block; nil results fall
/// back to the optional default.
fn index_with(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let block = block_arg(t)?;
    check_max_args(t, args, 1)?;
    let mut pairs = BTreeMap::new();
    for element in array_of(t, receiver)?.snapshot() {
        let key = t.to_s(&element)?;
        let mut value = t.yield_block(&block, &[element])?;
        if value.is_nil()
            && let Some(default) = args.first()
        {
            value = default.clone();
        }
        pairs.insert(key, value);
    }
    Ok(Value::hash(pairs))
}

fn join(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_arg_range(t, args, 0, 1)?;
    let separator = if args.is_empty() {
        ""
    } else {
        str_arg(t, args, 0)?
    };
    let mut parts = Vec::new();
    for element in flattened(array_of(t, receiver)?.snapshot()) {
        parts.push(t.to_s(&element)?);
    }
    Ok(Value::from(parts.join(separator)))
}

fn json(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::from(t.to_json(receiver)?))
}

fn length(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::Int(array_of(t, receiver)?.len() as i64))
}

fn map(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let block = block_arg(t)?;
    let elements = array_of(t, receiver)?.snapshot();
    if block.is_empty() {
        return Ok(Value::array(vec![Value::Nil; elements.len()]));
    }
    let mut mapped = Vec::with_capacity(elements.len());
    for element in elements {
        mapped.push(t.yield_block(&block, &[element])?);
    }
    Ok(Value::array(mapped))
}

fn pop(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let array = array_of(t, receiver)?;
    Ok(array.with_mut(Vec::pop).unwrap_or_default())
}

fn push(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let array = array_of(t, receiver)?;
    array.with_mut(|elements| elements.extend_from_slice(args));
    Ok(receiver.clone())
}

/// Folds with the block; the first element seeds the fold when no initial
/// value is given.
fn reduce(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_max_args(t, args, 1)?;
    let block = block_arg(t)?;
    if block.is_empty() {
        return Ok(Value::Nil);
    }
    let elements = array_of(t, receiver)?.snapshot();
    let mut rest = elements.into_iter();
    let mut acc = match args.first() {
        Some(initial) => initial.clone(),
        None => match rest.next() {
            Some(first) => first,
            None => return Ok(Value::Nil),
        },
    };
    for element in rest {
        acc = t.yield_block(&block, &[acc, element])?;
    }
    Ok(acc)
}

fn reverse(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let mut elements = array_of(t, receiver)?.snapshot();
    elements.reverse();
    Ok(Value::array(elements))
}

/// Iterates in reverse and returns the reversed copy.
fn reverse_each(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    let mut elements = array_of(t, receiver)?.snapshot();
    elements.reverse();
    if !block.is_empty() {
        for element in &elements {
            t.yield_block(&block, std::slice::from_ref(element))?;
            if block.is_removed() {
                break;
            }
        }
    }
    Ok(Value::array(elements))
}

fn shift(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let array = array_of(t, receiver)?;
    Ok(array.with_mut(|elements| {
        if elements.is_empty() {
            Value::Nil
        } else {
            elements.remove(0)
        }
    }))
}

/// Numbers order numerically and strings lexically; anything else keeps
/// its position.
fn sort_order(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Str(left), Value::Str(right)) => left.cmp(right),
        _ => match (left.as_number(), right.as_number()) {
            (Some(left), Some(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

fn sort(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let mut elements = array_of(t, receiver)?.snapshot();
    elements.sort_by(sort_order);
    Ok(Value::array(elements))
}

fn unshift(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let array = array_of(t, receiver)?;
    array.with_mut(|elements| {
        elements.splice(0..0, args.iter().cloned());
    });
    Ok(receiver.clone())
}

/// Elements at each given index; out of range positions give nil.
fn values(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let elements = array_of(t, receiver)?.snapshot();
    let mut picked = Vec::with_capacity(args.len());
    for position in 0..args.len() {
        let at = int_arg(t, args, position)?;
        picked.push(
            normalize_index(at, elements.len())
                .map(|at| elements[at].clone())
                .unwrap_or_default(),
        );
    }
    Ok(Value::array(picked))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_reaches_every_level() {
        let nested = Value::array(vec![
            Value::Int(1),
            Value::array(vec![Value::Int(2), Value::array(vec![Value::Int(3)])]),
        ]);
        let Value::Array(array) = nested else {
            panic!("expected an array");
        };
        let flat = flattened(array.snapshot());
        let ints: Vec<_> = flat.iter().filter_map(Value::as_int).collect();
        assert_eq!(ints, vec![1, 2, 3]);
    }

    #[test]
    fn sort_orders_mixed_numbers() {
        let mut values = vec![Value::Float(2.5), Value::Int(1), Value::Int(3)];
        values.sort_by(sort_order);
        let numbers: Vec<_> = values.iter().filter_map(Value::as_number).collect();
        assert_eq!(numbers, vec![1.0, 2.5, 3.0]);
    }

    #[test]
    fn windows_clamp_to_the_end() {
        let elements = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
        let Value::Array(window) = window(&elements, 1, 10) else {
            panic!("expected an array");
        };
        assert_eq!(window.len(), 2);
    }
}
