//! Bounded pool of pre-warmed interpreter instances.

use std::sync::{Mutex, PoisonError};

use gobox_interp::Interpreter;
use tracing::debug;

/// Fixed-capacity stack of idle interpreters. [`acquire`](Self::acquire)
/// never blocks: an empty pool hands out a fresh ephemeral instance.
#[derive(Debug)]
pub struct InterpreterPool {
    slots: Mutex<Vec<Interpreter>>,
    capacity: usize,
}

impl Default for InterpreterPool {
    fn default() -> Self {
        Self::new(5)
    }
}

impl InterpreterPool {
    /// Pool pre-filled with `capacity` instances.
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| Interpreter::new()).collect();
        Self {
            slots: Mutex::new(slots),
            capacity,
        }
    }

    pub fn acquire(&self) -> Interpreter {
        let pooled = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        pooled.unwrap_or_else(|| {
            debug!("interpreter pool empty, creating ephemeral instance");
            Interpreter::new()
        })
    }

    /// Return an instance. Dropped when the pool is already full.
    pub fn release(&self, interp: Interpreter) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.len() < self.capacity {
            slots.push(interp);
        }
    }

    /// Idle instances ready to hand out.
    pub fn available(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_full() {
        let pool = InterpreterPool::new(3);
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.capacity(), 3);
    }

    #[test]
    fn acquire_beyond_capacity_does_not_block() {
        let pool = InterpreterPool::new(1);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.available(), 0);
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn zero_capacity_never_retains() {
        let pool = InterpreterPool::new(0);
        let i = pool.acquire();
        pool.release(i);
        assert_eq!(pool.available(), 0);
    }
}
