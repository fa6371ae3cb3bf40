//! Diagnostic logging.
//!
//! Log records go to stderr and, inside a run directory, to
//! `separation_log.txt`. Standard output is reserved for progress lines and
//! the final JSON result.

use env_logger::{Builder, Env, Target};
use std::{
    fs::File,
    io::{self, LineWriter, Write},
};

/// Writes every buffer to stderr and an optional log file.
pub struct TeeWriter {
    file: Option<LineWriter<File>>,
}

impl TeeWriter {
    pub fn new(file: Option<File>) -> Self {
        Self {
            file: file.map(LineWriter::new),
        }
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        if let Some(f) = self.file.as_mut() {
            let _ = f.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        if let Some(f) = self.file.as_mut() {
            let _ = f.flush();
        }
        Ok(())
    }
}

/// Install the global logger. `RUST_LOG` overrides the default `info` filter.
///
/// Calling this twice is harmless; the second logger is ignored.
pub fn init_logging(log_file: Option<File>) {
    let result = Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .target(Target::Pipe(Box::new(TeeWriter::new(log_file))))
        .try_init();
    if result.is_err() {
        log::debug!("logger already initialised");
    }
}
