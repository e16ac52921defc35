use std::sync::Arc;
use std::time::Duration;

use super::{
    Methods, block_arg, check_argc, check_max_args, class_arg, define, str_arg, type_error,
};
use crate::vm::error::{self, CANT_YIELD_WITHOUT_BLOCK};
use crate::vm::value::Instance;
use crate::vm::{ClassTable, ErrorKind, OBJECT, Thread, Value, VmError, VmResult};

const METHODS: Methods = &[
    ("==", equal),
    ("!=", not_equal),
    ("===", strict_equal),
    ("!==", strict_not_equal),
    ("!", not),
    ("<-", receive),
    ("class", class),
    ("catch", catch),
    ("current_file", current_file),
    ("dup", dup),
    ("finally", finally),
    ("go", go),
    ("inherits_lookup?", inherits_lookup),
    ("inspect", inspect),
    ("instance_eval", instance_eval),
    ("instance_of?", instance_of),
    ("is_a?", is_a),
    ("metaclass", metaclass),
    ("methods", methods),
    ("nil?", is_nil),
    ("own_methods", own_methods),
    ("print", print),
    ("println", println),
    ("raise", raise),
    ("require", require),
    ("respond_to?", respond_to),
    ("send", send),
    ("sleep", sleep),
    ("string", string),
    ("tap", tap),
    ("try", try_block),
    ("vget", vget),
    ("vset", vset),
];

pub(super) fn install(classes: &ClassTable) {
    define(classes, OBJECT, METHODS);
}

fn equal(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    Ok(Value::Bool(receiver.equal_to(&args[0])))
}

fn not_equal(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    Ok(Value::Bool(!receiver.equal_to(&args[0])))
}

/// Identity, except that numbers and strings compare by value.
fn strictly_equal(receiver: &Value, other: &Value) -> bool {
    match (receiver, other) {
        (Value::Int(_) | Value::Float(_) | Value::Str(_), _) => receiver.equal_to(other),
        _ => receiver.same(other),
    }
}

fn strict_equal(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    Ok(Value::Bool(strictly_equal(receiver, &args[0])))
}

fn strict_not_equal(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    Ok(Value::Bool(!strictly_equal(receiver, &args[0])))
}

fn not(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Bool(matches!(receiver, Value::Bool(false))))
}

/// Prefix `<- source`: receives from a channel or calls `source.receive`.
fn receive(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    match &args[0] {
        Value::Channel(channel) => channel
            .receive()
            .map_err(|_| t.error(ErrorKind::ChannelCloseError, error::CHANNEL_IS_CLOSED)),
        source if t.vm.find_method(source, "receive", false).is_some() => {
            t.send(source, "receive", &[], None)
        }
        other => {
            let got = t.vm.class_name_of(other);
            Err(t.error(
                ErrorKind::ArgumentError,
                error::wrong_argument_type("Channel", &got),
            ))
        }
    }
}

fn class(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Class(t.vm.class_of(receiver)))
}

/// `err.catch(Kinds...) { |e| }` yields when the receiver is one of `Kinds`.
fn catch(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let block = block_arg(t)?;
    if args.is_empty() {
        return t.yield_block(&block, std::slice::from_ref(receiver));
    }
    for kind in args {
        if let Value::Class(class) = kind
            && t.vm.is_a(receiver, *class)
        {
            if let Value::Error(err) = receiver {
                err.set_raised(false);
                err.set_ignore(false);
            }
            return t.yield_block(&block, std::slice::from_ref(receiver));
        }
    }
    Ok(receiver.clone())
}

fn current_file(t: &mut Thread, _receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(t.current_file()))
}

fn dup(_t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(match receiver {
        Value::Object(instance) => {
            let copy = Instance::new(instance.class);
            for (name, value) in instance.ivars.snapshot() {
                copy.ivars.set(name, value);
            }
            Value::Object(Arc::new(copy))
        }
        other => other.clone(),
    })
}

fn finally(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let block = block_arg(t)?;
    t.yield_block(&block, std::slice::from_ref(receiver))?;
    Ok(receiver.clone())
}

fn go(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let block = block_arg(t)?;
    t.spawn(block, args.to_vec(), None)?;
    Ok(Value::Nil)
}

fn inherits_lookup(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let class = match receiver {
        Value::Class(id) => *id,
        other => t.vm.class_of(other),
    };
    Ok(Value::Bool(t.vm.classes.links(class).inherits_lookup))
}

fn inspect(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(t.inspect(receiver)?))
}

/// Runs the block (or a `Block` argument) with the receiver as self.
fn instance_eval(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_max_args(t, args, 1)?;
    let block = match args.first() {
        Some(Value::Block(block)) => Some(block.to_frame()),
        Some(other) => return Err(type_error(t, "Block", other)),
        None => t.block(),
    };
    match block {
        Some(block) if !block.set.is_empty() => t.yield_with_self(&block, receiver.clone(), &[]),
        _ => Ok(receiver.clone()),
    }
}

fn instance_of(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let class = class_arg(t, args, 0)?;
    let own = t.vm.class_of(receiver);
    Ok(Value::Bool(t.vm.classes.name(own) == t.vm.classes.name(class)))
}

fn is_a(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let class = class_arg(t, args, 0)?;
    Ok(Value::Bool(t.vm.is_a(receiver, class)))
}

fn metaclass(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(match receiver {
        Value::Class(id) => t.vm.classes.meta_of(*id).map_or(Value::Nil, Value::Class),
        _ => Value::Nil,
    })
}

fn method_names(t: &Thread, classes: &[crate::vm::ClassId]) -> Value {
    let mut seen = std::collections::BTreeSet::new();
    let mut names = Vec::new();
    for class in classes {
        let mut own = t.vm.classes.get(*class).method_names();
        own.sort();
        for name in own {
            if seen.insert(name.clone()) {
                names.push(Value::from(name));
            }
        }
    }
    Value::array(names)
}

fn methods(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let mut classes = Vec::new();
    if let Value::Class(id) = receiver
        && let Some(meta) = t.vm.classes.meta_of(*id)
    {
        classes.push(meta);
    }
    classes.extend(t.vm.classes.ancestors(t.vm.class_of(receiver)));
    Ok(method_names(t, &classes))
}

fn own_methods(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let mut classes = Vec::new();
    if let Value::Class(id) = receiver
        && let Some(meta) = t.vm.classes.meta_of(*id)
    {
        classes.push(meta);
    }
    classes.push(t.vm.class_of(receiver));
    Ok(method_names(t, &classes))
}

fn is_nil(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::Bool(false))
}

fn print(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let mut out = String::new();
    for arg in args {
        out.push_str(&t.to_s(arg)?);
    }
    t.vm.write_output(&out)?;
    Ok(Value::Nil)
}

fn println(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let mut out = String::new();
    for arg in args {
        out.push_str(&t.to_s(arg)?);
    }
    out.push('\n');
    t.vm.write_output(&out)?;
    Ok(Value::Nil)
}

fn raise(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    match args {
        [] => Err(t.error(ErrorKind::Error, "")),
        [Value::Error(err)] => {
            err.set_ignore(false);
            err.set_raised(true);
            if !err.has_stored_traces() {
                err.store_traces(t.stack_traces());
            }
            Err(VmError::Raised(err.clone()))
        }
        [other] => {
            let text = t.to_s(other)?;
            Err(t.error(ErrorKind::Error, format!("'{text}'")))
        }
        [kind, message] => {
            let Value::Class(class) = kind else {
                let got = t.vm.class_name_of(kind);
                return Err(t.error(
                    ErrorKind::ArgumentError,
                    error::wrong_argument_type_at(1, "a class", &got),
                ));
            };
            let text = t.to_s(message)?;
            let name = t.vm.classes.name(*class);
            Err(VmError::Raised(
                t.error_with_class(*class, format!("{name}: '{text}'")),
            ))
        }
        _ => Err(t.error(
            ErrorKind::ArgumentError,
            error::wrong_number_of_arguments_less(2, args.len()),
        )),
    }
}

fn require(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let name = str_arg(t, args, 0)?.to_string();
    Ok(Value::Bool(t.require(&name)?))
}

fn respond_to(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let name = str_arg(t, args, 0)?;
    Ok(Value::Bool(t.vm.find_method(receiver, name, false).is_some()))
}

/// `send(name, args...)` forwards the call-site block.
fn send(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let Some((name, rest)) = args.split_first() else {
        return Err(t.error(
            ErrorKind::ArgumentError,
            error::wrong_number_of_arguments_more(1, 0),
        ));
    };
    let Some(name) = name.as_str() else {
        return Err(type_error(t, "String", name));
    };
    let block = t.block();
    t.send(receiver, name, rest, block)
}

fn sleep(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let duration = match &args[0] {
        Value::Int(seconds) => Duration::from_secs((*seconds).max(0) as u64),
        Value::Float(seconds) => Duration::from_secs_f64(seconds.max(0.0)),
        other => return Err(type_error(t, "Numeric", other)),
    };
    std::thread::sleep(duration);
    Ok(args[0].clone())
}

fn string(t: &mut Thread, receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::from(t.to_s(receiver)?))
}

fn tap(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    t.yield_block(&block, std::slice::from_ref(receiver))?;
    Ok(receiver.clone())
}

/// Turns an error raised inside the block into the return value.
fn try_block(t: &mut Thread, _receiver: &Value, _args: &[Value]) -> VmResult<Value> {
    let Some(block) = t.block() else {
        return Err(t.error(ErrorKind::InternalError, CANT_YIELD_WITHOUT_BLOCK));
    };
    match t.yield_block(&block, &[]) {
        Err(VmError::Raised(err)) => {
            tracing::trace!(error = %err.message, "error caught by try");
            err.set_ignore(true);
            Ok(Value::Error(err))
        }
        other => other,
    }
}

fn vget(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let name = str_arg(t, args, 0)?;
    Ok(t.ivar(receiver, name))
}

fn vset(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 2)?;
    let name = str_arg(t, args, 0)?;
    t.set_ivar(receiver, name, args[1].clone());
    Ok(args[1].clone())
}
