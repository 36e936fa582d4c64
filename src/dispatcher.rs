//! Command dispatch with a fixed-latency acknowledgement wait.

use core::marker::PhantomData;
use std::time::Duration;

use crate::clock::{poll_until, settle, Cancel, Clock, Poll, Window};
use crate::protocol::{Code, CommandEntry, Line, LineBuffer};
use crate::{drain, Channel, Error};

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "structopt", derive(structopt::StructOpt))]
pub struct Options {
    /// Time to wait for the command echo, every dispatch blocks this long
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "5000"))]
    pub ack_timeout_ms: u32,

    /// Period to poll for received bytes
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "100"))]
    pub poll_interval_ms: u32,

    /// Idle period after which an unterminated line is treated as complete
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1000"))]
    pub line_idle_ms: u32,

    /// Period to wait for the link to settle after connecting
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "2000"))]
    pub startup_delay_ms: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5000,
            poll_interval_ms: 100,
            line_idle_ms: 1000,
            startup_delay_ms: 2000,
        }
    }
}

/// Outcome of the acknowledgement wait
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum AckResult {
    Acknowledged,
    TimedOut,
}

/// Record of a single dispatched command
#[derive(Clone, PartialEq, Debug)]
pub struct TransmissionAttempt {
    pub code: Code,
    /// Clock time at which transmission started
    pub sent_at_ms: u64,
    pub result: AckResult,
    /// Time from transmission to the end of the wait
    pub elapsed: Duration,
}

impl TransmissionAttempt {
    pub fn acknowledged(&self) -> bool {
        self.result == AckResult::Acknowledged
    }
}

pub struct Dispatcher<P, C, E> {
    options: Options,
    port: Option<P>,
    clock: C,
    cancel: Cancel,
    _err: PhantomData<E>,
}

impl<P, C, E> Dispatcher<P, C, E>
where
    P: Channel<E>,
    C: Clock,
    E: core::fmt::Debug,
{
    /// Create a new dispatcher over an open channel
    pub fn new(port: P, clock: C, options: Options) -> Self {
        Self {
            options,
            port: Some(port),
            clock,
            cancel: Cancel::never(),
            _err: PhantomData,
        }
    }

    /// Abort waits when the provided flag is raised
    pub fn with_cancel(mut self, cancel: Cancel) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Wait for the link to stabilise after opening
    pub fn init(&mut self) -> Result<(), Error<E>> {
        debug!("Waiting {} ms for link to settle", self.options.startup_delay_ms);

        let window = Window::open(&mut self.clock, ms(self.options.startup_delay_ms));
        settle(&mut self.clock, &window, self.options.poll_interval_ms, &self.cancel)
    }

    /// Transmit a command and wait for it to be echoed back.
    ///
    /// Always blocks for the full acknowledgement timeout measured from the
    /// start of transmission, whether or not the echo arrives early.
    pub fn dispatch(&mut self, entry: &CommandEntry) -> Result<TransmissionAttempt, Error<E>> {
        let Self { options, port, clock, cancel, .. } = self;
        let port = port.as_mut().ok_or(Error::Closed)?;

        let window = Window::open(clock, ms(options.ack_timeout_ms));

        debug!("Sending command {} ({})", entry.code, entry.description);

        for b in entry.code.as_bytes().iter() {
            block!(port.write(*b)).map_err(|e| {
                error!("Error writing command {}: {:?}", entry.code, e);
                Error::Transmit(e)
            })?;
        }
        block!(port.flush()).map_err(|e| {
            error!("Error flushing command {}: {:?}", entry.code, e);
            Error::Transmit(e)
        })?;

        debug!("Awaiting acknowledgement");

        let code = entry.code;
        let idle_ms = options.line_idle_ms as u64;
        let mut lines = LineBuffer::new();

        let poll = poll_until(clock, &window, options.poll_interval_ms, cancel, |clock| {
            let now = clock.millis();
            let mut matched = false;

            drain(&mut *port, |b| {
                if let Some(line) = lines.push(b, now) {
                    matched = check_line(&code, &line);
                }
                !matched
            })?;

            if !matched {
                if let Some(line) = lines.flush_idle(now, idle_ms) {
                    matched = check_line(&code, &line);
                }
            }

            Ok(matched)
        })?;

        let result = match poll {
            Poll::Ready => {
                info!("Received acknowledgement for {}", code);
                AckResult::Acknowledged
            }
            Poll::Expired => {
                warn!("No acknowledgement received for {}", code);
                AckResult::TimedOut
            }
        };

        // Hold until the full timeout has passed
        settle(clock, &window, options.poll_interval_ms, cancel)?;

        Ok(TransmissionAttempt {
            code,
            sent_at_ms: window.start_ms(),
            result,
            elapsed: window.elapsed(clock),
        })
    }

    /// Close the channel, returning whether a handle was released
    pub fn close(&mut self) -> bool {
        match self.port.take() {
            Some(p) => {
                drop(p);
                debug!("Serial channel closed");
                true
            }
            None => false,
        }
    }
}

impl<P, C, E> Drop for Dispatcher<P, C, E> {
    fn drop(&mut self) {
        self.port.take();
    }
}

fn ms(v: u32) -> Duration {
    Duration::from_millis(v as u64)
}

/// Compare a received line against the sent code
fn check_line(code: &Code, line: &Line) -> bool {
    match line {
        Line::Text(s) if s.is_empty() => false,
        Line::Text(s) => {
            info!("Received: {}", s);
            code.matches(s)
        }
        Line::Undecodable(raw) => {
            debug!("Ignoring undecodable line: {}", hex::encode(raw));
            false
        }
    }
}
