use std::cmp::Ordering;

use super::{Methods, check_argc, define, define_meta, no_new, type_error};
use crate::vm::error::DIVIDED_BY_ZERO;
use crate::vm::value::RangeValue;
use crate::vm::{ClassId, ClassTable, ErrorKind, Thread, Value, VmResult};

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
    ("float", to_float),
    ("int", to_int),
    ("json", string),
    ("string", string),
    ("times", times),
    ("to_f", to_float),
];

pub(super) fn install(classes: &ClassTable, class: ClassId) {
    define_meta(classes, class, CLASS_METHODS);
    define(classes, class, METHODS);
    let record = classes.get(class);
    record.set_constant("MAX_INT", Value::Int(i64::MAX));
    record.set_constant("MIN_INT", Value::Int(i64::MIN));
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Arith {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

impl Arith {
    /// Callers reject zero divisors first.
    fn ints(self, left: i64, right: i64) -> i64 {
        match self {
            Arith::Add => left.wrapping_add(right),
            Arith::Subtract => left.wrapping_sub(right),
            Arith::Multiply => left.wrapping_mul(right),
            Arith::Divide => left.wrapping_div(right),
            Arith::Modulo => left.wrapping_rem(right),
            Arith::Power => match u32::try_from(right) {
                Ok(exponent) => left.wrapping_pow(exponent),
                Err(_) => (left as f64).powf(right as f64) as i64,
            },
        }
    }

    fn floats(self, left: f64, right: f64) -> f64 {
        match self {
            Arith::Add => left + right,
            Arith::Subtract => left - right,
            Arith::Multiply => left * right,
            Arith::Divide => left / right,
            Arith::Modulo => left % right,
            Arith::Power => left.powf(right),
        }
    }

    fn checks_zero(self) -> bool {
        matches!(self, Arith::Divide | Arith::Modulo)
    }
}

/// Integer arithmetic stays integral; any float operand widens the result.
pub(super) fn arithmetic(t: &Thread, op: Arith, left: &Value, right: &Value) -> VmResult<Value> {
    let Some(divisor) = right.as_number() else {
        return Err(type_error(t, "Numeric", right));
    };
    if op.checks_zero() && divisor == 0.0 {
        return Err(t.error(ErrorKind::ZeroDivisionError, DIVIDED_BY_ZERO));
    }
    if let (Value::Int(left), Value::Int(right)) = (left, right) {
        return Ok(Value::Int(op.ints(*left, *right)));
    }
    let left = left.as_number().unwrap_or_default();
    Ok(Value::Float(op.floats(left, divisor)))
}

/// `<`-style comparison against any numeric argument.
pub(super) fn comparison(
    t: &Thread,
    left: &Value,
    args: &[Value],
    test: fn(Ordering) -> bool,
) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let right = &args[0];
    let ordering = match (left, right) {
        (Value::Int(left), Value::Int(right)) => Some(left.cmp(right)),
        _ => {
            let Some(right) = right.as_number() else {
                return Err(type_error(t, "Numeric", right));
            };
            left.as_number().unwrap_or_default().partial_cmp(&right)
        }
    };
    Ok(Value::Bool(ordering.is_some_and(test)))
}

fn binary(t: &Thread, op: Arith, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    arithmetic(t, op, receiver, &args[0])
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

fn to_float(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Float(receiver.as_number().unwrap_or_default()))
}

fn to_int(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(receiver.clone())
}

fn string(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(receiver.as_int().unwrap_or_default().to_string()))
}

/// Yields `0..n`; without a block returns the range `0...n`.
fn times(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let count = receiver.as_int().unwrap_or_default();
    let Some(block) = t.block() else {
        return Ok(Value::Range(RangeValue {
            start: 0,
            end: count,
            exclusive: true,
        }));
    };
    for index in 0..count {
        t.yield_block(&block, &[Value::Int(index)])?;
        if block.is_removed() {
            break;
        }
    }
    Ok(receiver.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_ops_wrap_instead_of_panicking() {
        assert_eq!(Arith::Add.ints(i64::MAX, 1), i64::MIN);
        assert_eq!(Arith::Divide.ints(7, 2), 3);
        assert_eq!(Arith::Modulo.ints(-7, 2), -1);
        assert_eq!(Arith::Power.ints(2, 10), 1024);
        assert_eq!(Arith::Divide.ints(i64::MIN, -1), i64::MIN);
    }
}
