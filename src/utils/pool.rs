//! A pool of reusable string buffers.

use std::ops;
use crossbeam_queue::ArrayQueue;


//------------ BufferPool ----------------------------------------------------

/// A pool of string buffers for rendering response bodies.
///
/// Buffers are checked out via [`get`][Self::get] and returned to the pool
/// when the returned guard is dropped. At most `max` buffers are retained,
/// surplus buffers are simply dropped.
#[derive(Debug)]
pub struct BufferPool {
    buffers: ArrayQueue<String>,
}

impl BufferPool {
    /// The number of buffers retained by a default pool.
    pub const DEFAULT_SIZE: usize = 200;

    /// The initial capacity of a freshly allocated buffer.
    const INITIAL_CAPACITY: usize = 4096;

    /// Creates a new, empty pool that retains up to `max` buffers.
    ///
    /// A pool always retains at least one buffer.
    pub fn new(max: usize) -> Self {
        BufferPool {
            buffers: ArrayQueue::new(max.max(1)),
        }
    }

    /// Checks out an empty buffer.
    pub fn get(&self) -> PooledBuffer {
        PooledBuffer {
            buf: self.buffers.pop().unwrap_or_else(|| {
                String::with_capacity(Self::INITIAL_CAPACITY)
            }),
            pool: self,
        }
    }

    /// Returns the number of buffers currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.buffers.len()
    }

    fn put(&self, mut buf: String) {
        buf.clear();
        // A full queue hands the buffer back and we let it go.
        let _ = self.buffers.push(buf);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE)
    }
}


//------------ PooledBuffer --------------------------------------------------

/// A buffer checked out from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer<'a> {
    buf: String,
    pool: &'a BufferPool,
}

impl ops::Deref for PooledBuffer<'_> {
    type Target = String;

    fn deref(&self) -> &String {
        &self.buf
    }
}

impl ops::DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut String {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buf))
    }
}


//============ Tests =========================================================
