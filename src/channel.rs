//! Bounded rendezvous channel.
//!
//! A fixed-capacity byte ring buffer shared between producer and consumer threads. Every thread announces
//! its role before touching the channel and registration blocks until at least one producer and one consumer
//! are present, so a consumer is never told the channel is closed just because the producer has not started yet.
//! Once the last producer leaves, readers drain what is left and then get [`ChannelClosed`]. Once the last
//! consumer leaves, a writer facing a full buffer gets [`ChannelClosed`].

use std::error::Error;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Default channel capacity (1 MiB).
pub const DEFAULT_CHANNEL_SIZE: usize = 1024 * 1024;

/// Role a thread plays on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
    /// Both producer and consumer at once.
    Duplex,
}

impl Role {
    fn is_producer(self) -> bool {
        matches!(self, Role::Producer | Role::Duplex)
    }

    fn is_consumer(self) -> bool {
        matches!(self, Role::Consumer | Role::Duplex)
    }
}

/// Returned when the opposite side of the channel is gone and the operation can never make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClosed;

impl fmt::Display for ChannelClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel closed")
    }
}

impl Error for ChannelClosed {}

struct RingBuffer {
    data: Box<[u8]>,
    /// Position of the next byte to read.
    head: usize,
    /// Position of the next byte to write.
    tail: usize,
    size: usize,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        RingBuffer {
            data: vec![0; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            size: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Copies as many bytes as fit and returns their number.
    fn push(&mut self, bytes: &[u8]) -> usize {
        let count = bytes.len().min(self.capacity() - self.size);
        let first = count.min(self.capacity() - self.tail);

        self.data[self.tail..self.tail + first].copy_from_slice(&bytes[..first]);
        self.data[..count - first].copy_from_slice(&bytes[first..count]);

        self.tail = (self.tail + count) % self.capacity();
        self.size += count;
        return count;
    }

    /// Moves up to `count` bytes to the end of `out` and returns their number.
    fn pop(&mut self, out: &mut Vec<u8>, count: usize) -> usize {
        let count = count.min(self.size);
        let first = count.min(self.capacity() - self.head);

        out.extend_from_slice(&self.data[self.head..self.head + first]);
        out.extend_from_slice(&self.data[..count - first]);

        self.head = (self.head + count) % self.capacity();
        self.size -= count;
        return count;
    }

    /// Returns the offset of the first `byte` among the first `limit` buffered bytes.
    fn find(&self, byte: u8, limit: usize) -> Option<usize> {
        let limit = limit.min(self.size);
        (0..limit).find(|offset| self.data[(self.head + offset) % self.capacity()] == byte)
    }
}

struct State {
    buffer: RingBuffer,
    producers: usize,
    consumers: usize,
    /// Set once a producer and a consumer were registered at the same time. Never reset.
    met: bool,
    /// A consumer took a partial line out of a full buffer and owns the rest of that line.
    line_pending: bool,
}

/// Bounded rendezvous channel.
pub struct Channel {
    state: Mutex<State>,
    cond: Condvar,
}

impl Channel {
    /// Creates a channel holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Channel {
            state: Mutex::new(State {
                buffer: RingBuffer::new(capacity.max(1)),
                producers: 0,
                consumers: 0,
                met: false,
                line_pending: false,
            }),
            cond: Condvar::new(),
        }
    }

    // no update panics halfway through, so a poisoned state is still consistent
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        self.cond.wait(guard).unwrap_or_else(|err| err.into_inner())
    }

    /// Registers the calling thread in the given role.
    /// Blocks until at least one producer and one consumer have been registered at the same time.
    /// The other side may already be gone by the time the call returns.
    pub fn register(&self, role: Role) {
        let mut state = self.lock();
        if role.is_producer() {
            state.producers += 1;
        }
        if role.is_consumer() {
            state.consumers += 1;
        }
        if state.producers > 0 && state.consumers > 0 {
            state.met = true;
        }
        self.cond.notify_all();

        while !state.met {
            state = self.wait(state);
        }
    }

    /// Withdraws a registration made with [`Channel::register`] and wakes every waiter.
    pub fn unregister(&self, role: Role) {
        let mut state = self.lock();
        if role.is_producer() {
            state.producers = state.producers.saturating_sub(1);
        }
        if role.is_consumer() {
            state.consumers = state.consumers.saturating_sub(1);
        }
        self.cond.notify_all();
    }

    /// Registers in the given role and returns a guard that unregisters on drop.
    pub fn registration(&self, role: Role) -> Registration<'_> {
        self.register(role);
        Registration { channel: self, role }
    }

    /// Appends as many bytes as fit into the free space.
    /// Blocks while the buffer is full and a consumer is registered.
    ///
    /// Returns the number of bytes written, which may be less than `bytes.len()`.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, ChannelClosed> {
        if bytes.is_empty() {
            return Ok(0);
        }

        let mut state = self.lock();
        while state.buffer.is_full() && state.consumers > 0 {
            state = self.wait(state);
        }
        if state.buffer.is_full() {
            return Err(ChannelClosed);
        }

        let written = state.buffer.push(bytes);
        self.cond.notify_all();
        return Ok(written);
    }

    /// Writes the whole slice, looping on partial writes.
    pub fn write_all(&self, mut bytes: &[u8]) -> Result<(), ChannelClosed> {
        while !bytes.is_empty() {
            let written = self.write(bytes)?;
            bytes = &bytes[written..];
        }
        return Ok(());
    }

    /// Moves up to `max_len` raw bytes to the end of `buf`.
    /// Blocks while the buffer is empty and a producer is registered.
    pub fn read(&self, buf: &mut Vec<u8>, max_len: usize) -> Result<usize, ChannelClosed> {
        let mut state = self.lock();
        while state.buffer.is_empty() && state.producers > 0 {
            state = self.wait(state);
        }
        if state.buffer.is_empty() {
            return Err(ChannelClosed);
        }

        let read = state.buffer.pop(buf, max_len);
        self.cond.notify_all();
        return Ok(read);
    }

    /// Moves one line to the end of `buf`: bytes up to and including the next `\n`, or `max_len` bytes if no
    /// terminator shows up before that.
    ///
    /// A line is handed out in one piece, so concurrent consumers never split a line between them. A line longer
    /// than the channel is drained in several steps while the other consumers wait. If the last producer leaves
    /// mid-line, the remaining partial line is returned. Fails with [`ChannelClosed`] only when nothing was read,
    /// nothing is buffered and no producer is registered.
    pub fn read_line(&self, buf: &mut Vec<u8>, max_len: usize) -> Result<usize, ChannelClosed> {
        if max_len == 0 {
            return Ok(0);
        }

        let mut state = self.lock();
        while state.line_pending {
            state = self.wait(state);
        }

        let mut read = 0;
        loop {
            let limit = max_len - read;
            if let Some(offset) = state.buffer.find(b'\n', limit) {
                read += state.buffer.pop(buf, offset + 1);
                break;
            }
            if state.buffer.size >= limit {
                read += state.buffer.pop(buf, limit);
                break;
            }
            if state.producers == 0 {
                if read == 0 && state.buffer.is_empty() {
                    return Err(ChannelClosed);
                }
                read += state.buffer.pop(buf, limit);
                break;
            }
            if state.buffer.is_full() {
                // the producer can only finish the line once the buffer is drained
                read += state.buffer.pop(buf, limit);
                state.line_pending = true;
                self.cond.notify_all();
            }
            state = self.wait(state);
        }

        state.line_pending = false;
        self.cond.notify_all();
        return Ok(read);
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel::new(DEFAULT_CHANNEL_SIZE)
    }
}

/// Channel registration guard. Unregisters its role when dropped, including on unwinding.
pub struct Registration<'a> {
    channel: &'a Channel,
    role: Role,
}

impl<'a> Drop for Registration<'a> {
    fn drop(&mut self) {
        self.channel.unregister(self.role);
    }
}
