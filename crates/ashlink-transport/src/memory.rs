use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, TransportError};
use crate::traits::SerialPort;

/// One direction of a [`MemoryPort`] pair.
#[derive(Debug)]
struct Lane {
    bytes: VecDeque<u8>,
    capacity: usize,
}

type SharedLane = Arc<Mutex<Lane>>;

fn lock(lane: &SharedLane) -> MutexGuard<'_, Lane> {
    // A poisoned lane only means another test thread panicked mid-push.
    lane.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An in-memory serial link.
///
/// [`MemoryPort::pair`] returns two connected ends: bytes written on one end
/// become readable on the other. Each direction holds at most `capacity`
/// bytes, which makes output back-pressure observable in tests.
#[derive(Debug, Clone)]
pub struct MemoryPort {
    rx: SharedLane,
    tx: SharedLane,
}

impl MemoryPort {
    /// Create two connected ports with `capacity` bytes of buffering per direction.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let a_to_b = Arc::new(Mutex::new(Lane {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }));
        let b_to_a = Arc::new(Mutex::new(Lane {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }));
        (
            Self {
                rx: Arc::clone(&b_to_a),
                tx: Arc::clone(&a_to_b),
            },
            Self {
                rx: a_to_b,
                tx: b_to_a,
            },
        )
    }

    /// Number of bytes waiting to be read on this end.
    pub fn pending_input(&self) -> usize {
        lock(&self.rx).bytes.len()
    }

    /// Number of bytes written by this end that the peer has not read yet.
    pub fn pending_output(&self) -> usize {
        lock(&self.tx).bytes.len()
    }

    /// Take everything currently readable on this end.
    pub fn read_all(&mut self) -> Vec<u8> {
        lock(&self.rx).bytes.drain(..).collect()
    }

    /// Write a run of bytes, ignoring the capacity limit.
    pub fn inject(&mut self, bytes: &[u8]) {
        lock(&self.tx).bytes.extend(bytes);
    }
}

impl SerialPort for MemoryPort {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        Ok(lock(&self.rx).bytes.pop_front())
    }

    fn write_available(&mut self) -> bool {
        let lane = lock(&self.tx);
        lane.bytes.len() < lane.capacity
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        let mut lane = lock(&self.tx);
        if lane.bytes.len() >= lane.capacity {
            return Err(TransportError::OutputFull);
        }
        lane.bytes.push_back(byte);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn discard_input(&mut self) -> Result<()> {
        lock(&self.rx).bytes.clear();
        Ok(())
    }
}
