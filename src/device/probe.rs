//! Backend probing.
//!
//! Every accelerator family is queried through a [`BackendProbe`]. Probes are
//! allowed to fail in any way they like: a missing driver tool, a non-zero
//! exit, an ONNX Runtime error or even a panic. [`run_probe`] is the one place
//! that turns every such failure into "backend absent", so the catalog never
//! has to care why a backend is missing.

use crate::{
    error::{Result, StemError},
    types::{BackendType, Device, SkippedDevice},
};

use std::{
    io::Read,
    panic::{catch_unwind, AssertUnwindSafe},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

/// Devices reported by one probe.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub devices: Vec<Device>,
    pub skipped: Vec<SkippedDevice>,
}

impl ProbeOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices,
            skipped: Vec::new(),
        }
    }
}

pub trait BackendProbe: Send + Sync {
    /// Backend family this probe reports devices for.
    fn backend(&self) -> BackendType;

    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Query the backend. An absent backend returns an empty outcome or an
    /// error; both mean the same thing to the caller.
    fn probe(&self) -> Result<ProbeOutcome>;
}

/// Run a probe with the fail-open policy applied.
pub fn run_probe(probe: &dyn BackendProbe) -> ProbeOutcome {
    match catch_unwind(AssertUnwindSafe(|| probe.probe())) {
        Ok(Ok(outcome)) => {
            log::debug!(
                "probe {}: {} device(s), {} skipped",
                probe.name(),
                outcome.devices.len(),
                outcome.skipped.len()
            );
            outcome
        }
        Ok(Err(e)) => {
            log::debug!("probe {} unavailable: {}", probe.name(), e);
            ProbeOutcome::empty()
        }
        Err(_) => {
            log::debug!("probe {} panicked; treating backend as absent", probe.name());
            ProbeOutcome::empty()
        }
    }
}

/// Run a driver tool and return stdout followed by stderr.
///
/// The child is killed once `timeout` elapses.
pub fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drain both pipes off-thread so a chatty tool cannot block on a full pipe.
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_reader = thread::spawn(move || read_all(stdout));
    let err_reader = thread::spawn(move || read_all(stderr));

    let started = Instant::now();
    loop {
        if child.try_wait()?.is_some() {
            break;
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(StemError::Anyhow(anyhow::anyhow!(
                "{} timed out after {:?}",
                program,
                timeout
            )));
        }
        thread::sleep(Duration::from_millis(20));
    }

    let mut text = out_reader.join().unwrap_or_default();
    text.push('\n');
    text.push_str(&err_reader.join().unwrap_or_default());
    Ok(text)
}

fn read_all<R: Read>(pipe: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut p) = pipe {
        let _ = p.read_to_string(&mut buf);
    }
    buf
}
