use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::value::Value;

/// Raised by every operation on a channel that has been closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelClosed;

#[derive(Debug, Default)]
struct ChannelState {
    queue: VecDeque<Value>,
    closed: bool,
    sent: u64,
    taken: u64,
}

/// FIFO shared between threads. A capacity of zero makes every send wait
/// until a receiver has taken the value.
#[derive(Debug)]
pub struct Channel {
    capacity: usize,
    state: Mutex<ChannelState>,
    readable: Condvar,
    writable: Condvar,
}

impl Channel {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(ChannelState::default()),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn send(&self, value: Value) -> Result<(), ChannelClosed> {
        let mut state = self.state.lock();
        let limit = self.capacity.max(1);
        while state.queue.len() >= limit && !state.closed {
            self.writable.wait(&mut state);
        }
        if state.closed {
            return Err(ChannelClosed);
        }
        state.queue.push_back(value);
        state.sent += 1;
        let ticket = state.sent;
        self.readable.notify_all();

        if self.capacity == 0 {
            while state.taken < ticket && !state.closed {
                self.writable.wait(&mut state);
            }
        }
        Ok(())
    }

    /// Blocks until a value arrives; fails once the channel is closed and drained.
    pub fn receive(&self) -> Result<Value, ChannelClosed> {
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                state.taken += 1;
                self.writable.notify_all();
                return Ok(value);
            }
            if state.closed {
                return Err(ChannelClosed);
            }
            self.readable.wait(&mut state);
        }
    }

    pub fn close(&self) -> Result<(), ChannelClosed> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ChannelClosed);
        }
        state.closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn buffered_channel_keeps_fifo_order() {
        let channel = Channel::new(2);
        channel.send(Value::Int(1)).expect("send 1");
        channel.send(Value::Int(2)).expect("send 2");
        assert_eq!(channel.receive().expect("recv").as_int(), Some(1));
        assert_eq!(channel.receive().expect("recv").as_int(), Some(2));
    }

    #[test]
    fn rendezvous_send_waits_for_receiver() {
        let channel = Arc::new(Channel::new(0));
        let sender = {
            let channel = channel.clone();
            std::thread::spawn(move || channel.send(Value::Int(42)))
        };
        assert_eq!(channel.receive().expect("recv").as_int(), Some(42));
        sender
            .join()
            .expect("sender thread")
            .expect("send should succeed");
    }

    #[test]
    fn closing_twice_fails_and_drained_receive_fails() {
        let channel = Channel::new(1);
        channel.send(Value::Int(7)).expect("send");
        channel.close().expect("first close");
        assert_eq!(channel.close(), Err(ChannelClosed));
        assert_eq!(channel.receive().expect("buffered value").as_int(), Some(7));
        assert!(channel.receive().is_err());
        assert_eq!(channel.send(Value::Nil), Err(ChannelClosed));
    }
}
