use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::time::Duration;

use linux_embedded_hal::Serial;
use serial_core::{
    BaudRate, CharSize, Error as SerialError, FlowControl, Parity, SerialDevice as _,
    SerialPortSettings as _, StopBits,
};

use crate::{Dispatcher, Options, SampleOptions, Sampler, SystemClock};

/// Read timeout applied to the tty, reads with nothing pending return after this
pub const READ_TIMEOUT_MS: u64 = 1;

/// Open a serial port configured for the rig radio (8N1, no flow control)
pub fn open<P: AsRef<Path>>(port: P, baud: usize) -> Result<Serial, SerialError> {
    debug!("Opening {} at {} baud", port.as_ref().display(), baud);

    let mut port = Serial::open(port.as_ref())?;

    // Apply settings
    let mut settings = port.0.read_settings()?;

    settings.set_char_size(CharSize::Bits8);
    settings.set_stop_bits(StopBits::Stop1);
    settings.set_baud_rate(BaudRate::from_speed(baud))?;
    settings.set_flow_control(FlowControl::FlowNone);
    settings.set_parity(Parity::ParityNone);

    port.0.write_settings(&settings)?;
    port.0.set_timeout(Duration::from_millis(READ_TIMEOUT_MS))?;

    Ok(port)
}

impl Dispatcher<Serial, SystemClock, IoErrorKind> {
    /// Create a new linux serial port dispatcher instance
    pub fn linux<P: AsRef<Path>>(
        port: P,
        baud: usize,
        options: Options,
    ) -> Result<Self, SerialError> {
        let port = open(port, baud)?;
        Ok(Self::new(port, SystemClock::new(), options))
    }
}

impl Sampler<Serial, SystemClock, IoErrorKind> {
    /// Create a new linux serial port sampler instance
    pub fn linux<P: AsRef<Path>>(
        port: P,
        baud: usize,
        options: SampleOptions,
    ) -> Result<Self, SerialError> {
        let port = open(port, baud)?;
        Ok(Self::new(port, SystemClock::new(), options))
    }
}
