//! Bounded output buffer.

/// Default buffer capacity in bytes.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Accumulates unconsumed output, discarding the oldest bytes past its capacity.
#[derive(Debug, Clone)]
pub struct ExpectBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl Default for ExpectBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ExpectBuffer {
    /// Creates a buffer with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer holding at most `capacity` bytes (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends output. Returns how many old bytes were discarded.
    pub fn push(&mut self, chunk: &[u8]) -> usize {
        self.data.extend_from_slice(chunk);
        let overflow = self.data.len().saturating_sub(self.capacity);
        if overflow > 0 {
            self.data.drain(..overflow);
        }
        overflow
    }

    /// Removes and returns the first `end` bytes.
    pub fn consume(&mut self, end: usize) -> Vec<u8> {
        let end = end.min(self.data.len());
        self.data.drain(..end).collect()
    }

    /// Removes and returns everything.
    pub fn take_all(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    /// Unconsumed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
