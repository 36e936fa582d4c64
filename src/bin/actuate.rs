#[macro_use]
extern crate log;

extern crate structopt;
use structopt::StructOpt;

extern crate simplelog;
use simplelog::{Config, LevelFilter, SimpleLogger};

use std::io::ErrorKind as IoErrorKind;

use gse_link::console::Console;
use gse_link::{session, signal, CommandTable, Dispatcher, Options};

#[derive(Clone, Debug, StructOpt)]
pub struct Args {
    /// Serial port to connect to
    #[structopt(default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial port baud rate
    #[structopt(long, default_value = "9600")]
    baud: usize,

    #[structopt(flatten)]
    options: Options,

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

    let mut d = match Dispatcher::linux(&o.port, o.baud, o.options.clone()) {
        Ok(d) => d.with_cancel(signal::cancel()),
        Err(e) => {
            println!("Error opening serial port {}: {:?}", o.port, e);
            std::process::exit(1);
        }
    };

    println!("Connected to {} at {} baud.", o.port, o.baud);

    let table = CommandTable::standard();
    let mut console = Console::stdin(signal::cancel());

    let r = d
        .init()
        .map_err(anyhow::Error::from)
        .and_then(|_| session::run(&mut d, &table, &mut console));

    let code = session::exit_code::<IoErrorKind>(&r);

    match r {
        Ok(()) => println!("Exiting."),
        Err(e) if session::is_interrupt::<IoErrorKind>(&e) => println!("\nInterrupted by user."),
        Err(e) => error!("{:?}", e),
    }

    if d.close() {
        println!("Serial port closed.");
    }

    std::process::exit(code);
}
