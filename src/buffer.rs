//! Capacity-bounded run buffer.

use crate::radix::radix_sort;
use crate::record::Record;

/// Default number of records per run.
pub const DEFAULT_RUN_CAPACITY: usize = 10_000;

/// Run buffer builder.
#[derive(Debug, Clone, Copy)]
pub struct RunBufferBuilder {
    capacity: usize,
    preallocate: bool,
}

impl RunBufferBuilder {
    pub fn new(capacity: usize, preallocate: bool) -> Self {
        RunBufferBuilder { capacity, preallocate }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new empty buffer.
    pub fn build(&self) -> RunBuffer {
        if self.preallocate {
            RunBuffer::with_capacity(self.capacity)
        } else {
            RunBuffer::new(self.capacity)
        }
    }
}

impl Default for RunBufferBuilder {
    fn default() -> Self {
        RunBufferBuilder {
            capacity: DEFAULT_RUN_CAPACITY,
            preallocate: false,
        }
    }
}

/// In-memory run: at most `limit` records, sorted before it is persisted.
pub struct RunBuffer {
    limit: usize,
    inner: Vec<Record>,
}

impl RunBuffer {
    pub fn new(limit: usize) -> Self {
        RunBuffer {
            limit,
            inner: Vec::new(),
        }
    }

    pub fn with_capacity(limit: usize) -> Self {
        RunBuffer {
            limit,
            inner: Vec::with_capacity(limit),
        }
    }

    /// Adds a new record to the buffer.
    pub fn push(&mut self, record: Record) {
        self.inner.push(record);
    }

    /// Returns the number of records held.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached its capacity.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }

    /// Sorts the records by key, keeping the arrival order of equal keys.
    pub fn sort(&mut self) {
        radix_sort(&mut self.inner);
    }
}

impl IntoIterator for RunBuffer {
    type Item = Record;
    type IntoIter = <Vec<Record> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}
