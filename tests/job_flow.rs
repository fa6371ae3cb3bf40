use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use stemwerk_worker::{
    io::progress::parse_line, run_job, BackendType, Device, Enumeration, ProgressReporter,
    Result, SeparationEngine, StemError, WorkerOptions,
};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn percents(&self) -> Vec<u8> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .filter_map(parse_line)
            .map(|(p, _)| p)
            .collect()
    }
}

/// Engine that sleeps like a real one and writes separator-style file names.
struct Scripted {
    out: PathBuf,
    delay: Duration,
    fail_separation: bool,
    devices: Vec<String>,
}

impl SeparationEngine for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn load_model(&mut self, _model: &str, device: &str) -> Result<()> {
        self.devices.push(device.to_string());
        thread::sleep(self.delay);
        Ok(())
    }

    fn separate(&mut self, _input: &Path, device: &str) -> Result<Vec<PathBuf>> {
        self.devices.push(device.to_string());
        thread::sleep(self.delay);
        if self.fail_separation {
            return Err(StemError::Engine("out of memory".into()));
        }
        let vocals = self.out.join("song_(Vocals).wav");
        let inst = self.out.join("song_(Instrumental).wav");
        fs::write(&vocals, b"v")?;
        fs::write(&inst, b"i")?;
        Ok(vec![vocals, inst])
    }
}

fn write_input(dir: &Path) -> PathBuf {
    let path = dir.join("song.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut w = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..8000 {
        w.write_sample(0i16).unwrap();
    }
    w.finalize().unwrap();
    path
}

fn setup(fail: bool) -> (tempfile::TempDir, WorkerOptions, Scripted) {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("stems");
    let opts = WorkerOptions {
        input: write_input(dir.path()),
        output_dir: out.clone(),
        device: "auto".into(),
        ..Default::default()
    };
    let engine = Scripted {
        out,
        delay: Duration::from_millis(900),
        fail_separation: fail,
        devices: Vec::new(),
    };
    (dir, opts, engine)
}

fn gpu_machine() -> Enumeration {
    let mut e = Enumeration::baseline();
    e.push_device(Device::new("cuda:0", "NVIDIA RTX 3080", BackendType::Cuda));
    e
}

#[test]
fn successful_job_reports_monotonic_progress_and_canonical_stems() {
    let (_dir, opts, mut engine) = setup(false);
    let console = Captured::default();
    let reporter = ProgressReporter::with_console(Box::new(console.clone()));

    let result = run_job(&opts, &gpu_machine(), &mut engine, &reporter).unwrap();

    assert_eq!(engine.devices, vec!["cuda:0", "cuda:0"]);
    assert_eq!(result.get("vocals"), Some(&opts.output_dir.join("vocals.wav")));
    assert_eq!(result.get("other"), Some(&opts.output_dir.join("other.wav")));

    let pcts = console.percents();
    assert!(pcts.windows(2).all(|w| w[0] <= w[1]), "{:?}", pcts);
    for fixed in [0, 1, 3, 11, 92, 100] {
        assert!(pcts.contains(&fixed), "missing {} in {:?}", fixed, pcts);
    }
    assert_eq!(pcts.first(), Some(&0));
    assert_eq!(pcts.last(), Some(&100));
}

#[test]
fn failed_separation_stops_estimators_and_skips_completion() {
    let (_dir, opts, mut engine) = setup(true);
    let console = Captured::default();
    let reporter = ProgressReporter::with_console(Box::new(console.clone()));

    let err = run_job(&opts, &gpu_machine(), &mut engine, &reporter).unwrap_err();
    assert!(matches!(err, StemError::Engine(_)));
    assert_eq!(err.exit_code(), stemwerk_worker::EXIT_JOB_FAILED);

    let after_return = console.percents();
    thread::sleep(Duration::from_millis(800));
    assert_eq!(console.percents(), after_return, "estimator kept running");
    assert!(!after_return.contains(&92));
    assert!(!after_return.contains(&100));
    assert!(after_return.contains(&11));
}

#[test]
fn unavailable_request_runs_on_cpu() {
    let (_dir, mut opts, mut engine) = setup(false);
    opts.device = "cuda:5".into();
    engine.delay = Duration::from_millis(10);
    let reporter = ProgressReporter::with_console(Box::new(io::sink()));

    run_job(&opts, &Enumeration::baseline(), &mut engine, &reporter).unwrap();
    assert_eq!(engine.devices, vec!["cpu", "cpu"]);
}
