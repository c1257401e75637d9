//! Scratch buffer freelist for token encoding
//!
//! Buffers are checked out for a single encode call and returned on drop.
//! Oversized buffers and buffers beyond the pool limit are discarded.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

const DEFAULT_BUFFER_CAPACITY: usize = 256;
const DEFAULT_MAX_POOLED: usize = 32;

pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    max_pooled: usize,
    buffer_capacity: usize,
}

impl BufferPool {
    pub fn new(max_pooled: usize, buffer_capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(max_pooled)),
            max_pooled,
            buffer_capacity,
        }
    }

    /// Check out an empty buffer
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let buf = self
            .buffers
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_capacity));

        PooledBuffer { buf, pool: self }
    }

    fn release(&self, mut buf: Vec<u8>) {
        // Scratch space may have held token plaintext.
        buf.fill(0);
        buf.clear();

        if buf.capacity() > self.buffer_capacity * 4 {
            return;
        }

        let mut buffers = self.buffers.lock();
        if buffers.len() < self.max_pooled {
            buffers.push(buf);
        }
    }

    /// Number of idle buffers
    pub fn idle(&self) -> usize {
        self.buffers.lock().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOLED, DEFAULT_BUFFER_CAPACITY)
    }
}

/// A checked-out buffer, returned to its pool when dropped
pub struct PooledBuffer<'a> {
    buf: Vec<u8>,
    pool: &'a BufferPool,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
