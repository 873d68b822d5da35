//! Reader-preferring gate in front of an index's document store.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct GateState {
    readers: usize,
    writer: bool,
    /// Writers that waited longer than the priority window.
    urgent_writers: usize,
}

/// Many readers or one writer.
///
/// Readers go ahead of writers that are merely waiting. A writer that has
/// waited longer than `priority_wait` becomes urgent and from then on blocks
/// new readers until it got its turn.
#[derive(Debug)]
pub struct PriorityGate {
    state: Mutex<GateState>,
    changed: Condvar,
    priority_wait: Duration,
}

impl PriorityGate {
    pub fn new(priority_wait: Duration) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
            priority_wait,
        }
    }

    pub fn read(&self) -> ReadGuard<'_> {
        let mut state = self.state.lock();
        while state.writer || state.urgent_writers > 0 {
            self.changed.wait(&mut state);
        }
        state.readers += 1;
        ReadGuard { gate: self }
    }

    pub fn write(&self) -> WriteGuard<'_> {
        let deadline = Instant::now() + self.priority_wait;
        let mut urgent = false;
        let mut state = self.state.lock();
        while state.writer || state.readers > 0 {
            if urgent {
                self.changed.wait(&mut state);
            } else if self.changed.wait_until(&mut state, deadline).timed_out() {
                urgent = true;
                state.urgent_writers += 1;
            }
        }
        if urgent {
            state.urgent_writers -= 1;
        }
        state.writer = true;
        WriteGuard { gate: self }
    }

    pub fn readers(&self) -> usize {
        self.state.lock().readers
    }
}

pub struct ReadGuard<'a> {
    gate: &'a PriorityGate,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.readers -= 1;
        if state.readers == 0 {
            self.gate.changed.notify_all();
        }
    }
}

pub struct WriteGuard<'a> {
    gate: &'a PriorityGate,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.gate.state.lock().writer = false;
        self.gate.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn readers_share_the_gate() {
        let gate = PriorityGate::new(Duration::from_millis(10));
        let a = gate.read();
        let b = gate.read();
        assert_eq!(gate.readers(), 2);
        drop(a);
        drop(b);
        assert_eq!(gate.readers(), 0);
        drop(gate.write());
    }

    #[test]
    fn writer_waits_for_readers_and_then_blocks_new_ones() {
        let gate = Arc::new(PriorityGate::new(Duration::from_millis(5)));
        let written = Arc::new(AtomicBool::new(false));

        let reader = gate.read();
        let writer = {
            let gate = Arc::clone(&gate);
            let written = Arc::clone(&written);
            std::thread::spawn(move || {
                let _guard = gate.write();
                written.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!written.load(Ordering::SeqCst));
        drop(reader);
        writer.join().unwrap();
        assert!(written.load(Ordering::SeqCst));

        // Gate is free again.
        drop(gate.read());
    }
}
