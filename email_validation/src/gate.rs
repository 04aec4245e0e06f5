//! Bounds the number of validations running at once.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("concurrency gate capacity must be at least 1")]
    ZeroCapacity,
    #[error("concurrency gate closed")]
    Closed,
}

/// Counting gate over a FIFO semaphore.
///
/// Cloning shares the same slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A slot held in a [`ConcurrencyGate`]. Dropping it frees the slot.
#[derive(Debug)]
pub struct Permit {
    _inner: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Result<Self, GateError> {
        if capacity == 0 {
            return Err(GateError::ZeroCapacity);
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Waits until a slot is free and takes it.
    pub async fn admit(&self) -> Result<Permit, GateError> {
        let inner = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateError::Closed)?;
        Ok(Permit { _inner: inner })
    }

    pub fn release(&self, permit: Permit) {
        drop(permit);
    }

    /// Number of permits currently held.
    pub fn occupancy(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() >= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rejects_zero_capacity() {
        assert!(matches!(
            ConcurrencyGate::new(0),
            Err(GateError::ZeroCapacity)
        ));
    }

    #[tokio::test]
    async fn tracks_occupancy() {
        let gate = ConcurrencyGate::new(2).unwrap();
        assert_eq!(gate.occupancy(), 0);

        let a = gate.admit().await.unwrap();
        let b = gate.admit().await.unwrap();
        assert_eq!(gate.occupancy(), 2);
        assert!(gate.is_full());

        gate.release(a);
        assert_eq!(gate.occupancy(), 1);
        drop(b);
        assert_eq!(gate.occupancy(), 0);
    }

    #[tokio::test]
    async fn admit_waits_for_release() {
        let gate = ConcurrencyGate::new(1).unwrap();
        let held = gate.admit().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.admit().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.release(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be admitted")
            .unwrap()
            .unwrap();
    }
}
