//! `Channel`, `WaitGroup` and the `Lock` library class.

use std::sync::Arc;

use super::{Methods, block_arg, check_argc, check_max_args, define, define_meta, int_arg};
use crate::vm::channel::Channel;
use crate::vm::error::{self, CHANNEL_IS_CLOSED};
use crate::vm::host::LockObject;
use crate::vm::wait_group::WaitGroup;
use crate::vm::{ClassTable, CoreClasses, ErrorKind, Thread, Value, VmError, VmResult};

const CHANNEL_CLASS_METHODS: Methods = &[("new", channel_new)];

const CHANNEL_METHODS: Methods = &[
    ("<-", channel_send),
    ("cap", channel_cap),
    ("close", channel_close),
    ("each", channel_each),
    ("receive", channel_receive),
];

const WAIT_GROUP_CLASS_METHODS: Methods = &[("new", wait_group_new)];

const WAIT_GROUP_METHODS: Methods = &[
    ("add", wait_group_add),
    ("done", wait_group_done),
    ("go", wait_group_go),
    ("wait", wait_group_wait),
];

const LOCK_CLASS_METHODS: Methods = &[("new", lock_new)];

const LOCK_METHODS: Methods = &[("lock", lock), ("unlock", unlock)];

pub(super) fn install(classes: &ClassTable, core: &CoreClasses) {
    define_meta(classes, core.channel, CHANNEL_CLASS_METHODS);
    define(classes, core.channel, CHANNEL_METHODS);
    define_meta(classes, core.wait_group, WAIT_GROUP_CLASS_METHODS);
    define(classes, core.wait_group, WAIT_GROUP_METHODS);
    define_meta(classes, core.lock, LOCK_CLASS_METHODS);
    define(classes, core.lock, LOCK_METHODS);
}

fn closed(t: &Thread) -> VmError {
    t.error(ErrorKind::ChannelCloseError, CHANNEL_IS_CLOSED)
}

fn channel(receiver: &Value) -> Option<&Arc<Channel>> {
    match receiver {
        Value::Channel(channel) => Some(channel),
        _ => None,
    }
}

/// `Channel.new(capacity = 0)`; zero makes a rendezvous channel.
fn channel_new(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_max_args(t, args, 1)?;
    let capacity = if args.is_empty() { 0 } else { int_arg(t, args, 0)? };
    if capacity < 0 {
        return Err(t.error(ErrorKind::ArgumentError, error::negative_value(capacity)));
    }
    Ok(Value::Channel(Arc::new(Channel::new(capacity as usize))))
}

/// Sends each argument in order; blocks while the channel is full.
fn channel_send(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    if args.is_empty() {
        return Err(t.error(
            ErrorKind::ArgumentError,
            error::wrong_number_of_arguments_more(1, 0),
        ));
    }
    let Some(channel) = channel(receiver) else {
        return Ok(Value::Nil);
    };
    for value in args {
        channel.send(value.clone()).map_err(|_| closed(t))?;
    }
    Ok(receiver.clone())
}

fn channel_cap(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::Int(channel(receiver).map_or(0, |c| c.capacity()) as i64))
}

fn channel_close(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    if let Some(channel) = channel(receiver) {
        channel.close().map_err(|_| closed(t))?;
        tracing::trace!(thread = t.id, "channel closed");
    }
    Ok(Value::Nil)
}

/// Yields received values until the channel is closed and drained.
fn channel_each(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let block = block_arg(t)?;
    let Some(channel) = channel(receiver) else {
        return Ok(receiver.clone());
    };
    if channel.is_closed() && channel.is_empty() {
        return Err(closed(t));
    }
    while let Ok(value) = channel.receive() {
        t.yield_block(&block, &[value])?;
        if block.is_removed() {
            break;
        }
    }
    Ok(receiver.clone())
}

fn channel_receive(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let Some(channel) = channel(receiver) else {
        return Ok(Value::Nil);
    };
    channel.receive().map_err(|_| closed(t))
}

fn wait_group(receiver: &Value) -> Option<&Arc<WaitGroup>> {
    match receiver {
        Value::WaitGroup(group) => Some(group),
        _ => None,
    }
}

fn wait_group_new(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::WaitGroup(Arc::new(WaitGroup::new())))
}

fn adjust(t: &Thread, receiver: &Value, delta: i64) -> VmResult<Value> {
    if let Some(group) = wait_group(receiver) {
        group.add(delta).map_err(|counter| {
            t.error(
                ErrorKind::ArgumentError,
                format!("WaitGroup counter would become negative: {counter}"),
            )
        })?;
    }
    Ok(receiver.clone())
}

fn wait_group_add(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 1)?;
    let delta = int_arg(t, args, 0)?;
    adjust(t, receiver, delta)
}

fn wait_group_done(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    adjust(t, receiver, -1)
}

/// Counts a new thread running the block and marks it done when it ends.
fn wait_group_go(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    let block = block_arg(t)?;
    let Some(group) = wait_group(receiver) else {
        return Ok(Value::Nil);
    };
    adjust(t, receiver, 1)?;
    t.spawn(block, args.to_vec(), Some(group.clone()))?;
    Ok(receiver.clone())
}

fn wait_group_wait(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    if let Some(group) = wait_group(receiver) {
        group.wait();
    }
    Ok(receiver.clone())
}

fn lock_new(t: &mut Thread, _receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    Ok(Value::Lock(Arc::new(LockObject::new())))
}

/// With a block, holds the lock only while the block runs.
fn lock(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    let Value::Lock(lock) = receiver else {
        return Ok(Value::Nil);
    };
    lock.lock();
    let Some(block) = t.block() else {
        return Ok(receiver.clone());
    };
    let result = t.yield_block(&block, &[]);
    lock.unlock();
    result
}

fn unlock(t: &mut Thread, receiver: &Value, args: &[Value]) -> VmResult<Value> {
    check_argc(t, args, 0)?;
    if let Value::Lock(lock) = receiver
        && !lock.unlock()
    {
        return Err(t.error(
            ErrorKind::InternalError,
            "Trying to unlock already unlocked lock",
        ));
    }
    Ok(receiver.clone())
}
