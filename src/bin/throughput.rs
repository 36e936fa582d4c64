#[macro_use]
extern crate log;

extern crate structopt;
use structopt::StructOpt;

extern crate simplelog;
use simplelog::{Config, LevelFilter, SimpleLogger};

use std::io::ErrorKind as IoErrorKind;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use gse_link::{signal, Channel, Clock, Error, SampleOptions, Sampler, ThroughputSample};

#[derive(Clone, Debug, StructOpt)]
pub struct Args {
    /// Serial port to connect to
    #[structopt(default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial port baud rate
    #[structopt(long, default_value = "76800")]
    baud: usize,

    #[structopt(flatten)]
    options: SampleOptions,

    /// Log level for console output
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() {
    // Parse out arguments
    let o = Args::from_args();

    // Configure logger
    let _ = SimpleLogger::init(o.log_level, Config::default());

    if let Err(e) = signal::install() {
        warn!("Error installing interrupt handler: {:?}", e);
    }

    let mut s = match Sampler::linux(&o.port, o.baud, o.options.clone()) {
        Ok(s) => s.with_cancel(signal::cancel()),
        Err(e) => {
            println!("Error opening serial port {}: {:?}", o.port, e);
            return;
        }
    };

    println!("Connected to {} at {} baud.", o.port, o.baud);

    let window = s.options().window();
    let r = run(&mut s, window);

    match r {
        Err(Error::Interrupted) => println!("\nExiting."),
        Err(e) => error!("Sampling stopped: {:?}", e),
        Ok(()) => (),
    }

    if s.close() {
        println!("Serial port closed.");
    }
}

/// Sample back to back until interrupted or the channel fails
fn run<P, C>(s: &mut Sampler<P, C, IoErrorKind>, window: Duration) -> Result<(), Error<IoErrorKind>>
where
    P: Channel<IoErrorKind>,
    C: Clock,
{
    s.init()?;

    loop {
        let bar = ProgressBar::new(window.as_millis() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {msg}")
                .progress_chars("=> "),
        );

        let sample = s.sample_with(window, |elapsed, bytes| {
            bar.set_position(elapsed.as_millis() as u64);
            bar.set_message(&bytefmt::format(bytes));
        });
        bar.finish_and_clear();

        report(&sample?);
    }
}

fn report(s: &ThroughputSample) {
    println!("Data received: {} bits ({})", s.bits(), bytefmt::format(s.bytes));
    println!("Data rate: {:.2} bps", s.bit_rate());
}
