//! Reusable payload buffers.
//!
//! The sender reads every chunk into a scratch buffer before framing it.
//! Chunks at or below the configured threshold borrow a pooled buffer
//! instead of allocating; larger chunks get a one-off allocation. The pool
//! is an optimization only and never affects what goes on the wire.

use std::sync::Mutex;

/// A pool of fixed-size byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    /// Create a pool handing out buffers of `buffer_size` bytes.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            free: Mutex::new(Vec::new()),
        }
    }

    /// The size of every buffer this pool hands out.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Take a buffer from the pool, allocating if none are free.
    ///
    /// The returned buffer always has length `buffer_size`.
    #[must_use]
    pub fn get(&self) -> Vec<u8> {
        let reused = self.free.lock().expect("buffer pool lock").pop();
        match reused {
            Some(mut buf) => {
                // Entries must come back at full length before reuse.
                buf.resize(self.buffer_size, 0);
                buf
            }
            None => vec![0u8; self.buffer_size],
        }
    }

    /// Return a buffer for reuse.
    ///
    /// Buffers whose capacity no longer matches the pool are dropped.
    pub fn put(&self, buf: Vec<u8>) {
        if buf.capacity() >= self.buffer_size {
            self.free.lock().expect("buffer pool lock").push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_full_length() {
        let pool = BufferPool::new(1024);
        let buf = pool.get();
        assert_eq!(buf.len(), 1024);
    }

    #[test]
    fn test_reuse_restores_length() {
        let pool = BufferPool::new(1024);

        let mut buf = pool.get();
        buf.truncate(10);
        pool.put(buf);

        let reused = pool.get();
        assert_eq!(reused.len(), 1024);
    }

    #[test]
    fn test_undersized_buffer_not_pooled() {
        let pool = BufferPool::new(1024);
        pool.put(Vec::with_capacity(16));

        // The pool refused the tiny buffer, so this is a fresh allocation.
        let buf = pool.get();
        assert_eq!(buf.len(), 1024);
    }
}
