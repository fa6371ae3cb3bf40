//! Line-oriented progress reporting.
//!
//! Every event becomes one `PROGRESS:<percent>:<stage>` line written to the
//! console and, when configured, to a sink file the host polls. Percentages
//! never go backwards within a run: each value is clamped to the last one
//! emitted. Writing is best-effort; a failing sink is ignored.

use parking_lot::Mutex;
use std::{
    fs::File,
    io::{self, LineWriter, Write},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

pub const MAX_PERCENT: u8 = 100;

struct ReporterState {
    floor: Option<u8>,
    console: Box<dyn Write + Send>,
    file: Option<LineWriter<File>>,
}

/// Shared handle to the process's progress sinks.
#[derive(Clone)]
pub struct ProgressReporter {
    state: Arc<Mutex<ReporterState>>,
}

impl ProgressReporter {
    /// Reporter writing to standard output.
    pub fn stdout() -> Self {
        Self::with_console(Box::new(io::stdout()))
    }

    pub fn with_console(console: Box<dyn Write + Send>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ReporterState {
                floor: None,
                console,
                file: None,
            })),
        }
    }

    /// Mirror progress into `sink_path`, truncating it. `None` closes the mirror.
    pub fn configure(&self, sink_path: Option<&Path>) -> io::Result<()> {
        let file = match sink_path {
            Some(p) => Some(LineWriter::new(File::create(p)?)),
            None => None,
        };
        let mut st = self.state.lock();
        if let Some(old) = st.file.as_mut() {
            let _ = old.flush();
        }
        st.file = file;
        Ok(())
    }

    /// Write one progress line to every sink.
    pub fn emit(&self, percent: u8, stage: &str) {
        let mut st = self.state.lock();
        Self::write_locked(&mut st, percent, stage);
    }

    /// Like [`emit`](Self::emit), but only while `gate` is open.
    ///
    /// The gate is checked under the sink lock, so closing it and then calling
    /// [`fence`](Self::fence) guarantees no further line from this caller.
    pub fn emit_gated(&self, gate: &AtomicBool, percent: u8, stage: &str) -> bool {
        let mut st = self.state.lock();
        if !gate.load(Ordering::Acquire) {
            return false;
        }
        Self::write_locked(&mut st, percent, stage);
        true
    }

    /// Wait for any write in progress on another thread to finish.
    pub fn fence(&self) {
        drop(self.state.lock());
    }

    /// Highest percent emitted so far.
    pub fn last_percent(&self) -> Option<u8> {
        self.state.lock().floor
    }

    pub fn flush(&self) {
        let mut st = self.state.lock();
        let _ = st.console.flush();
        if let Some(f) = st.file.as_mut() {
            let _ = f.flush();
        }
    }

    fn write_locked(st: &mut ReporterState, percent: u8, stage: &str) {
        let percent = percent.min(MAX_PERCENT).max(st.floor.unwrap_or(0));
        st.floor = Some(percent);

        let line = format_line(percent, stage);
        if let Some(f) = st.file.as_mut() {
            let _ = f.write_all(line.as_bytes()).and_then(|_| f.flush());
        }
        let _ = st.console.write_all(line.as_bytes());
        let _ = st.console.flush();
    }
}

/// `PROGRESS:<percent>:<stage>\n`, with line breaks in `stage` flattened.
pub fn format_line(percent: u8, stage: &str) -> String {
    let stage: String = stage
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    format!("PROGRESS:{}:{}\n", percent, stage)
}

/// Parse a progress line back into `(percent, stage)`.
pub fn parse_line(line: &str) -> Option<(u8, &str)> {
    let rest = line.trim_end_matches(&['\r', '\n'][..]).strip_prefix("PROGRESS:")?;
    let (pct, stage) = rest.split_once(':')?;
    Some((pct.parse().ok()?, stage))
}
