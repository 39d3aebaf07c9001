//! Fixed-size payload buffers and the queues that own them.

use std::collections::VecDeque;

use ashlink_frame::MAX_DATA_FIELD_LEN;

/// Which free list a buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

/// Handle to a pool buffer.
///
/// Not `Copy` or `Clone`: whoever holds the handle owns the buffer, and
/// giving it back to [`BufferPool::free`] consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct BufferId(usize);

#[derive(Debug)]
struct Slot {
    data: Vec<u8>,
    direction: Direction,
}

/// Arena of payload buffers with one free list per direction.
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<Slot>,
    tx_free: Vec<usize>,
    rx_free: Vec<usize>,
}

impl BufferPool {
    pub fn new(tx_buffers: usize, rx_buffers: usize) -> Self {
        let slots: Vec<Slot> = (0..tx_buffers)
            .map(|_| Direction::Tx)
            .chain((0..rx_buffers).map(|_| Direction::Rx))
            .map(|direction| Slot {
                data: Vec::with_capacity(MAX_DATA_FIELD_LEN),
                direction,
            })
            .collect();
        // Reversed so allocation hands out low indices first.
        let tx_free = (0..tx_buffers).rev().collect();
        let rx_free = (tx_buffers..tx_buffers + rx_buffers).rev().collect();
        Self {
            slots,
            tx_free,
            rx_free,
        }
    }

    /// Take an empty buffer, or `None` when the direction is exhausted.
    pub fn alloc(&mut self, direction: Direction) -> Option<BufferId> {
        let index = self.free_list(direction).pop()?;
        self.slots[index].data.clear();
        Some(BufferId(index))
    }

    /// Return a buffer to its free list.
    pub fn free(&mut self, id: BufferId) {
        let direction = self.slots[id.0].direction;
        self.free_list(direction).push(id.0);
    }

    /// Number of buffers available for allocation.
    pub fn free_count(&self, direction: Direction) -> usize {
        match direction {
            Direction::Tx => self.tx_free.len(),
            Direction::Rx => self.rx_free.len(),
        }
    }

    pub fn get(&self, id: &BufferId) -> &[u8] {
        &self.slots[id.0].data
    }

    pub fn get_mut(&mut self, id: &BufferId) -> &mut Vec<u8> {
        &mut self.slots[id.0].data
    }

    fn free_list(&mut self, direction: Direction) -> &mut Vec<usize> {
        match direction {
            Direction::Tx => &mut self.tx_free,
            Direction::Rx => &mut self.rx_free,
        }
    }
}

/// FIFO of owned buffers.
#[derive(Debug, Default)]
pub struct FrameQueue {
    entries: VecDeque<BufferId>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, id: BufferId) {
        self.entries.push_back(id);
    }

    pub fn pop_front(&mut self) -> Option<BufferId> {
        self.entries.pop_front()
    }

    pub fn front(&self) -> Option<&BufferId> {
        self.entries.front()
    }

    /// Entry `index` counting from the oldest.
    pub fn get(&self, index: usize) -> Option<&BufferId> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return every queued buffer to `pool`.
    pub fn release_all(&mut self, pool: &mut BufferPool) {
        while let Some(id) = self.entries.pop_front() {
            pool.free(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_are_accounted_separately() {
        let mut pool = BufferPool::new(1, 2);
        let tx = pool.alloc(Direction::Tx).unwrap();
        assert!(pool.alloc(Direction::Tx).is_none());
        assert_eq!(pool.free_count(Direction::Rx), 2);

        pool.free(tx);
        assert_eq!(pool.free_count(Direction::Tx), 1);
    }

    #[test]
    fn freed_rx_buffer_returns_to_rx_list() {
        let mut pool = BufferPool::new(1, 1);
        let rx = pool.alloc(Direction::Rx).unwrap();
        assert_eq!(pool.free_count(Direction::Rx), 0);
        pool.free(rx);
        assert_eq!(pool.free_count(Direction::Rx), 1);
        assert_eq!(pool.free_count(Direction::Tx), 1);
    }

    #[test]
    fn alloc_hands_out_empty_buffers() {
        let mut pool = BufferPool::new(1, 0);
        let id = pool.alloc(Direction::Tx).unwrap();
        pool.get_mut(&id).extend_from_slice(&[1, 2, 3]);
        assert_eq!(pool.get(&id), &[1, 2, 3]);
        pool.free(id);

        let id = pool.alloc(Direction::Tx).unwrap();
        assert!(pool.get(&id).is_empty());
    }

    #[test]
    fn queue_is_fifo_and_releases_to_pool() {
        let mut pool = BufferPool::new(3, 0);
        let mut queue = FrameQueue::new();
        for byte in 0..3u8 {
            let id = pool.alloc(Direction::Tx).unwrap();
            pool.get_mut(&id).push(byte);
            queue.push_back(id);
        }
        assert_eq!(pool.get(queue.front().unwrap()), &[0]);
        assert_eq!(pool.get(queue.get(2).unwrap()), &[2]);

        let first = queue.pop_front().unwrap();
        assert_eq!(pool.get(&first), &[0]);
        pool.free(first);

        queue.release_all(&mut pool);
        assert!(queue.is_empty());
        assert_eq!(pool.free_count(Direction::Tx), 3);
    }
}
