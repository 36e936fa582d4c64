//! Ground support link utilities.
//!
//! Sends actuation codes to the rig controller over a serial radio link and
//! awaits their echo, and measures the data rate achievable over that link.

#[macro_use]
extern crate log;

#[macro_use(block)]
extern crate nb;

extern crate embedded_hal;
use embedded_hal::serial::{Read, Write};

#[cfg(feature = "linux")]
extern crate linux_embedded_hal;

pub mod clock;
pub use clock::{Cancel, Clock, Poll, SystemClock, Window};

pub mod protocol;
pub use protocol::{Code, CommandEntry, CommandTable, Group, Line, LineBuffer, TableError};

pub mod dispatcher;
pub use dispatcher::{AckResult, Dispatcher, Options, TransmissionAttempt};

pub mod sampler;
pub use sampler::{SampleOptions, Sampler, Samples, ThroughputSample};

pub mod mock;

#[cfg(feature = "linux")]
pub mod linux;

#[cfg(feature = "linux")]
pub mod signal;

#[cfg(feature = "util")]
pub mod menu;

#[cfg(feature = "util")]
pub mod console;

#[cfg(feature = "util")]
pub mod session;

/// Maximum number of bytes drained from the channel per poll tick
pub const MAX_DRAIN: usize = 1024;

/// Serial channel to the rig controller.
///
/// A read returning `WouldBlock` means no bytes are currently available,
/// dropping the channel closes it.
pub trait Channel<E>: Write<u8, Error = E> + Read<u8, Error = E> {}

impl<T, E> Channel<E> for T where T: Write<u8, Error = E> + Read<u8, Error = E> {}

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Error<SerialError: core::fmt::Debug> {
    /// Writing a command to the channel failed
    #[error("transmission failed: {0:?}")]
    Transmit(SerialError),

    /// Reading from the channel failed
    #[error("channel read failed: {0:?}")]
    Channel(SerialError),

    /// The channel has already been closed
    #[error("channel closed")]
    Closed,

    /// Interrupted by the user
    #[error("interrupted")]
    Interrupted,
}

/// Read whatever the channel has pending, up to `MAX_DRAIN` bytes, handing
/// each byte to `f`. Returns the number of bytes read.
pub(crate) fn drain<P, E, F>(port: &mut P, mut f: F) -> Result<usize, Error<E>>
where
    P: Channel<E>,
    E: core::fmt::Debug,
    F: FnMut(u8) -> bool,
{
    let mut n = 0;

    while n < MAX_DRAIN {
        match port.read() {
            Err(nb::Error::WouldBlock) => break,
            Err(nb::Error::Other(e)) => return Err(Error::Channel(e)),
            Ok(v) => {
                n += 1;
                if !f(v) {
                    break;
                }
            }
        }
    }

    Ok(n)
}
