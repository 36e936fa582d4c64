//! Interrupt-aware line input for the interactive utilities.

use std::io::{self, Read, Write};

use crate::clock::Cancel;

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("interrupted")]
    Interrupted,

    #[error("end of input")]
    Eof,

    #[error("console i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Reads operator answers from a byte source, one line at a time
pub struct Console<R> {
    input: R,
    pending: Vec<u8>,
    cancel: Cancel,
}

impl Console<io::Stdin> {
    pub fn stdin(cancel: Cancel) -> Self {
        Self::new(io::stdin(), cancel)
    }
}

impl<R: Read> Console<R> {
    pub fn new(input: R, cancel: Cancel) -> Self {
        Self { input, pending: Vec::new(), cancel }
    }

    /// Print `text` and read the next line, without its terminator
    pub fn prompt(&mut self, text: &str) -> Result<String, ConsoleError> {
        print!("{}", text);
        io::stdout().flush()?;

        self.read_line()
    }

    /// Read the next line.
    ///
    /// Returns `Interrupted` if the cancel flag is raised while waiting, a
    /// signal arriving mid-read surfaces here as `ErrorKind::Interrupted`.
    pub fn read_line(&mut self) -> Result<String, ConsoleError> {
        let mut buf = [0u8; 256];

        loop {
            if self.cancel.is_set() {
                return Err(ConsoleError::Interrupted);
            }

            if let Some(i) = self.pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=i).collect();
                let line = String::from_utf8_lossy(&line[..i]);
                return Ok(line.trim_end_matches('\r').to_string());
            }

            match self.input.read(&mut buf) {
                Ok(0) if self.pending.is_empty() => return Err(ConsoleError::Eof),
                Ok(0) => {
                    let line = std::mem::take(&mut self.pending);
                    return Ok(String::from_utf8_lossy(&line).to_string());
                }
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
