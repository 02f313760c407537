//! Reusable serialization buffers.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// Buffers with more capacity than this are not kept for reuse.
const MAX_RETAINED_CAPACITY: usize = 4 * 1024 * 1024;

/// A free list of byte buffers shared by concurrent copies.
///
/// A buffer goes back to the pool only when its [`PooledBuffer`] is dropped,
/// so two calls never write into the same buffer.
#[derive(Debug)]
pub struct BufferPool {
    idle: Mutex<Vec<Vec<u8>>>,
    capacity: usize,
}

impl BufferPool {
    /// Creates a pool keeping at most `capacity` idle buffers.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Takes an empty buffer, reusing an idle one when available.
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let buffer = self.idle.lock().pop().unwrap_or_default();
        PooledBuffer { buffer, pool: self }
    }

    /// Number of idle buffers.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, mut buffer: Vec<u8>) {
        if buffer.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buffer.clear();
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(buffer);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(16)
    }
}

/// A buffer on loan from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer<'p> {
    buffer: Vec<u8>,
    pool: &'p BufferPool,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_return_cleared() {
        let pool = BufferPool::new(2);
        {
            let mut buffer = pool.acquire();
            buffer.extend_from_slice(b"abc");
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);
        let buffer = pool.acquire();
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= 3);
    }

    #[test]
    fn concurrent_loans_are_distinct() {
        let pool = BufferPool::new(1);
        let mut a = pool.acquire();
        let mut b = pool.acquire();
        a.push(1);
        b.push(2);
        assert_eq!(a.as_slice(), &[1]);
        assert_eq!(b.as_slice(), &[2]);
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }
}
