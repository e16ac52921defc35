use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct WaitGroup {
    counter: Mutex<i64>,
    idle: Condvar,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adjusts the counter; returns the offending value if it would go negative.
    pub fn add(&self, delta: i64) -> Result<i64, i64> {
        let mut counter = self.counter.lock();
        let next = *counter + delta;
        if next < 0 {
            return Err(next);
        }
        *counter = next;
        if next == 0 {
            self.idle.notify_all();
        }
        Ok(next)
    }

    pub fn done(&self) -> Result<i64, i64> {
        self.add(-1)
    }

    pub fn wait(&self) {
        let mut counter = self.counter.lock();
        while *counter > 0 {
            self.idle.wait(&mut counter);
        }
    }

    pub fn count(&self) -> i64 {
        *self.counter.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn wait_returns_once_every_worker_is_done() {
        let group = Arc::new(WaitGroup::new());
        group.add(3).expect("add");
        let workers: Vec<_> = (0..3)
            .map(|_| {
                let group = group.clone();
                std::thread::spawn(move || group.done())
            })
            .collect();
        group.wait();
        assert_eq!(group.count(), 0);
        for worker in workers {
            worker.join().expect("worker").expect("done");
        }
    }

    #[test]
    fn negative_counter_is_rejected() {
        let group = WaitGroup::new();
        assert_eq!(group.done(), Err(-1));
        assert_eq!(group.count(), 0);
    }
}
