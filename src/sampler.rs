//! Link throughput measurement over fixed windows.

use core::marker::PhantomData;
use std::time::Duration;

use crate::clock::{poll_until, settle, Cancel, Clock, Window};
use crate::{drain, Channel, Error};

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "structopt", derive(structopt::StructOpt))]
pub struct SampleOptions {
    /// Length of each measurement window
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "10000"))]
    pub window_ms: u32,

    /// Period to poll for received bytes
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1"))]
    pub poll_interval_ms: u32,

    /// Period to wait for the link to settle after connecting
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "2000"))]
    pub startup_delay_ms: u32,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            window_ms: 10_000,
            poll_interval_ms: 1,
            startup_delay_ms: 2000,
        }
    }
}

impl SampleOptions {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms as u64)
    }
}

/// Bytes observed over one measurement window
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct ThroughputSample {
    pub window: Duration,
    pub bytes: u64,
}

impl ThroughputSample {
    pub fn bits(&self) -> u64 {
        self.bytes * 8
    }

    /// Rate over the window in bits per second
    pub fn bit_rate(&self) -> f64 {
        let secs = self.window.as_secs_f64();
        if secs > 0.0 {
            self.bits() as f64 / secs
        } else {
            0.0
        }
    }
}

pub struct Sampler<P, C, E> {
    options: SampleOptions,
    port: Option<P>,
    clock: C,
    cancel: Cancel,
    _err: PhantomData<E>,
}

impl<P, C, E> Sampler<P, C, E>
where
    P: Channel<E>,
    C: Clock,
    E: core::fmt::Debug,
{
    pub fn new(port: P, clock: C, options: SampleOptions) -> Self {
        Self {
            options,
            port: Some(port),
            clock,
            cancel: Cancel::never(),
            _err: PhantomData,
        }
    }

    /// Abort sampling when the provided flag is raised
    pub fn with_cancel(mut self, cancel: Cancel) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &SampleOptions {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Wait for the link to stabilise after opening
    pub fn init(&mut self) -> Result<(), Error<E>> {
        debug!("Waiting {} ms for link to settle", self.options.startup_delay_ms);

        let window = Window::open(
            &mut self.clock,
            Duration::from_millis(self.options.startup_delay_ms as u64),
        );
        settle(&mut self.clock, &window, self.options.poll_interval_ms, &self.cancel)
    }

    /// Count bytes received over `window`
    pub fn sample(&mut self, window: Duration) -> Result<ThroughputSample, Error<E>> {
        self.sample_with(window, |_, _| ())
    }

    /// Count bytes received over `window`, reporting `(elapsed, bytes)` to
    /// `progress` on every poll tick.
    ///
    /// A channel failure closes the channel, later calls return
    /// `Error::Closed`.
    pub fn sample_with<F>(&mut self, window: Duration, mut progress: F) -> Result<ThroughputSample, Error<E>>
    where
        F: FnMut(Duration, u64),
    {
        let Self { options, port, clock, cancel, .. } = self;
        let p = port.as_mut().ok_or(Error::Closed)?;

        let w = Window::open(clock, window);
        let mut bytes = 0u64;

        let r = poll_until(clock, &w, options.poll_interval_ms, cancel, |clock| {
            bytes += drain(&mut *p, |_| true)? as u64;
            progress(w.elapsed(clock), bytes);
            Ok(false)
        });

        match r {
            Ok(_) => (),
            Err(Error::Channel(e)) => {
                error!("Channel lost mid-window: {:?}", e);
                self.close();
                return Err(Error::Channel(e));
            }
            Err(e) => return Err(e),
        }

        let s = ThroughputSample { window, bytes };
        debug!("Sampled {} bytes over {:?} ({:.2} bps)", s.bytes, s.window, s.bit_rate());

        Ok(s)
    }

    /// Lazy, unbounded sequence of samples over `window`.
    ///
    /// Ends after yielding the first error.
    pub fn samples(&mut self, window: Duration) -> Samples<'_, P, C, E> {
        Samples { sampler: self, window, done: false }
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

impl<P, C, E> Drop for Sampler<P, C, E> {
    fn drop(&mut self) {
        self.port.take();
    }
}

pub struct Samples<'a, P, C, E> {
    sampler: &'a mut Sampler<P, C, E>,
    window: Duration,
    done: bool,
}

impl<'a, P, C, E> Iterator for Samples<'a, P, C, E>
where
    P: Channel<E>,
    C: Clock,
    E: core::fmt::Debug,
{
    type Item = Result<ThroughputSample, Error<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let r = self.sampler.sample(self.window);
        if r.is_err() {
            self.done = true;
        }

        Some(r)
    }
}

impl<'a, P, C, E> core::iter::FusedIterator for Samples<'a, P, C, E>
where
    P: Channel<E>,
    C: Clock,
    E: core::fmt::Debug,
{
}
