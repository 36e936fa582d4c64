//! Time source and bounded polling primitive shared by the dispatcher and
//! sampler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use embedded_hal::blocking::delay::DelayMs;

use crate::Error;

/// Monotonic time source able to block the caller
pub trait Clock: DelayMs<u32> {
    /// Milliseconds elapsed since an arbitrary fixed origin
    fn millis(&mut self) -> u64;
}

/// Wall clock backed by `std::time::Instant`
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayMs<u32> for SystemClock {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

impl Clock for SystemClock {
    fn millis(&mut self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Interrupt flag checked on every poll tick
#[derive(Clone, Copy, Debug, Default)]
pub struct Cancel(Option<&'static AtomicBool>);

impl Cancel {
    /// A flag that is never raised
    pub fn never() -> Self {
        Self(None)
    }

    /// Bind to a (signal handler owned) flag
    pub fn on(flag: &'static AtomicBool) -> Self {
        Self(Some(flag))
    }

    pub fn is_set(&self) -> bool {
        self.0.map(|f| f.load(Ordering::SeqCst)).unwrap_or(false)
    }

    fn check<E: core::fmt::Debug>(&self) -> Result<(), Error<E>> {
        if self.is_set() {
            debug!("Interrupt flag raised");
            return Err(Error::Interrupted);
        }
        Ok(())
    }
}

/// Fixed length interval starting at a clock instant
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Window {
    start_ms: u64,
    length_ms: u64,
}

impl Window {
    /// Open a window of `length` starting now
    pub fn open<C: Clock>(clock: &mut C, length: Duration) -> Self {
        Self {
            start_ms: clock.millis(),
            length_ms: length.as_millis() as u64,
        }
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn length(&self) -> Duration {
        Duration::from_millis(self.length_ms)
    }

    pub fn elapsed<C: Clock>(&self, clock: &mut C) -> Duration {
        Duration::from_millis(clock.millis().saturating_sub(self.start_ms))
    }

    /// Time left before the window closes, zero once expired
    pub fn remaining<C: Clock>(&self, clock: &mut C) -> Duration {
        self.length().checked_sub(self.elapsed(clock)).unwrap_or_default()
    }

    pub fn expired<C: Clock>(&self, clock: &mut C) -> bool {
        self.remaining(clock) == Duration::from_millis(0)
    }
}

/// Outcome of a bounded poll
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Poll {
    /// The check reported completion inside the window
    Ready,
    /// The window closed first
    Expired,
}

/// Sleep for at most `interval_ms`, clipped to the end of the window
fn tick<C: Clock>(clock: &mut C, window: &Window, interval_ms: u32) {
    let remaining = window.remaining(clock).as_millis() as u64;
    let wait = remaining.min(interval_ms.max(1) as u64) as u32;
    if wait > 0 {
        clock.delay_ms(wait);
    }
}

/// Call `check` every `interval_ms` until it returns `true` or the window
/// expires.
///
/// `check` runs at least once, immediately. The final sleep is clipped to
/// the window end so expiry is observed at the window boundary.
pub fn poll_until<C, E, F>(
    clock: &mut C,
    window: &Window,
    interval_ms: u32,
    cancel: &Cancel,
    mut check: F,
) -> Result<Poll, Error<E>>
where
    C: Clock,
    E: core::fmt::Debug,
    F: FnMut(&mut C) -> Result<bool, Error<E>>,
{
    loop {
        cancel.check()?;

        if check(clock)? {
            return Ok(Poll::Ready);
        }

        if window.expired(clock) {
            return Ok(Poll::Expired);
        }

        tick(clock, window, interval_ms);
    }
}

/// Block until the window closes, checking for interrupts every `interval_ms`
pub fn settle<C, E>(
    clock: &mut C,
    window: &Window,
    interval_ms: u32,
    cancel: &Cancel,
) -> Result<(), Error<E>>
where
    C: Clock,
    E: core::fmt::Debug,
{
    while !window.expired(clock) {
        cancel.check()?;
        tick(clock, window, interval_ms);
    }
    Ok(())
}
