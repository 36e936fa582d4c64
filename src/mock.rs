//! Virtual clock and scripted channel for driving the dispatcher and sampler
//! without hardware.
//!
//! The clock only advances when something delays on it, and the channel
//! releases scripted bytes once the shared clock reaches their delivery time,
//! so timing behaviour can be asserted exactly.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::serial::{Read, Write};

use crate::clock::Clock;

/// Errors raised by the mock channel
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum MockError {
    WriteFailed,
    ReadFailed,
}

/// Virtual clock, clones share the same time
#[derive(Clone, Debug, Default)]
pub struct MockClock {
    now: Rc<Cell<u64>>,
    interrupt: Rc<Cell<Option<(u64, &'static AtomicBool)>>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds
    pub fn now(&self) -> u64 {
        self.now.get()
    }

    pub fn advance(&self, ms: u64) {
        let now = self.now.get() + ms;
        self.now.set(now);

        if let Some((at, flag)) = self.interrupt.get() {
            if now >= at {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Raise `flag` once the clock reaches `at_ms`
    pub fn interrupt_at(&self, at_ms: u64, flag: &'static AtomicBool) {
        self.interrupt.set(Some((at_ms, flag)));
    }
}

impl DelayMs<u32> for MockClock {
    fn delay_ms(&mut self, ms: u32) {
        self.advance(ms as u64);
    }
}

impl Clock for MockClock {
    fn millis(&mut self) -> u64 {
        self.now()
    }
}

/// Shared view of a `MockChannel` that outlives it
#[derive(Clone, Debug, Default)]
pub struct MockHandle {
    written: Rc<RefCell<Vec<u8>>>,
    flushes: Rc<Cell<usize>>,
    drops: Rc<Cell<usize>>,
}

impl MockHandle {
    /// Bytes written to the channel so far
    pub fn written(&self) -> Vec<u8> {
        self.written.borrow().clone()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.get()
    }

    /// Number of times the channel has been dropped (closed)
    pub fn closes(&self) -> usize {
        self.drops.get()
    }
}

/// Scripted serial channel
#[derive(Debug)]
pub struct MockChannel {
    clock: MockClock,
    handle: MockHandle,

    /// Bytes pending delivery, ordered by delivery time
    rx: VecDeque<(u64, u8)>,
    /// Replies armed by the next flush, as (delay, bytes)
    replies: Vec<(u64, Vec<u8>)>,

    fail_writes: bool,
    fail_reads_at: Option<u64>,
}

impl MockChannel {
    pub fn new(clock: &MockClock) -> Self {
        Self {
            clock: clock.clone(),
            handle: MockHandle::default(),
            rx: VecDeque::new(),
            replies: Vec::new(),
            fail_writes: false,
            fail_reads_at: None,
        }
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }

    /// Deliver `data` once the clock reaches `at_ms`
    pub fn deliver_at(&mut self, at_ms: u64, data: &[u8]) {
        let idx = self.rx.iter().position(|(t, _)| *t > at_ms).unwrap_or(self.rx.len());
        for (i, b) in data.iter().enumerate() {
            self.rx.insert(idx + i, (at_ms, *b));
        }
    }

    /// Deliver `data` `delay_ms` after the next flush
    pub fn reply_after(&mut self, delay_ms: u64, data: &[u8]) {
        self.replies.push((delay_ms, data.to_vec()));
    }

    /// Fail every write
    pub fn fail_writes(&mut self) {
        self.fail_writes = true;
    }

    /// Fail reads once the clock reaches `at_ms`
    pub fn fail_reads_at(&mut self, at_ms: u64) {
        self.fail_reads_at = Some(at_ms);
    }
}

impl Write<u8> for MockChannel {
    type Error = MockError;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        if self.fail_writes {
            return Err(nb::Error::Other(MockError::WriteFailed));
        }
        self.handle.written.borrow_mut().push(word);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        if self.fail_writes {
            return Err(nb::Error::Other(MockError::WriteFailed));
        }
        self.handle.flushes.set(self.handle.flushes.get() + 1);

        let now = self.clock.now();
        for (delay, data) in std::mem::take(&mut self.replies) {
            self.deliver_at(now + delay, &data);
        }

        Ok(())
    }
}

impl Read<u8> for MockChannel {
    type Error = MockError;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        let now = self.clock.now();

        if let Some(at) = self.fail_reads_at {
            if now >= at {
                return Err(nb::Error::Other(MockError::ReadFailed));
            }
        }

        match self.rx.front() {
            Some((t, _)) if *t <= now => Ok(self.rx.pop_front().map(|(_, b)| b).unwrap_or(0)),
            _ => Err(nb::Error::WouldBlock),
        }
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.handle.drops.set(self.handle.drops.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_bytes_on_schedule() {
        let clock = MockClock::new();
        let mut ch = MockChannel::new(&clock);
        ch.deliver_at(100, b"ab");
        ch.deliver_at(50, b"c");

        assert_eq!(ch.read(), Err(nb::Error::WouldBlock));
        clock.advance(60);
        assert_eq!(ch.read(), Ok(b'c'));
        assert_eq!(ch.read(), Err(nb::Error::WouldBlock));
        clock.advance(40);
        assert_eq!(ch.read(), Ok(b'a'));
        assert_eq!(ch.read(), Ok(b'b'));
    }

    #[test]
    fn replies_are_armed_by_flush() {
        let clock = MockClock::new();
        let mut ch = MockChannel::new(&clock);
        ch.reply_after(10, b"x");

        clock.advance(100);
        assert_eq!(ch.read(), Err(nb::Error::WouldBlock));

        ch.write(b'y').unwrap();
        ch.flush().unwrap();
        clock.advance(10);
        assert_eq!(ch.read(), Ok(b'x'));
        assert_eq!(ch.handle().written(), b"y".to_vec());
    }

    #[test]
    fn counts_closes() {
        let clock = MockClock::new();
        let ch = MockChannel::new(&clock);
        let h = ch.handle();
        drop(ch);
        assert_eq!(h.closes(), 1);
    }
}
