//! The separation engine seam.
//!
//! The worker never separates audio itself. It drives an engine through two
//! blocking calls, `load_model` and `separate`, neither of which reports
//! progress. [`CommandEngine`] runs an external separator program; tests and
//! embedders can plug in their own [`SeparationEngine`].

use crate::error::{Result, StemError};

use std::{
    collections::HashSet,
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
    time::SystemTime,
};

pub const DEFAULT_SEPARATOR: &str = "audio-separator";
pub const SEPARATOR_ENV: &str = "STEMWERK_SEPARATOR";

const AUDIO_EXTENSIONS: [&str; 7] = ["wav", "flac", "mp3", "ogg", "m4a", "aiff", "aif"];

pub trait SeparationEngine {
    /// Human-readable engine name for logs.
    fn name(&self) -> &str;

    /// Prepare `model` on `device`. Blocks until the model is ready.
    fn load_model(&mut self, model: &str, device: &str) -> Result<()>;

    /// Separate `input` on `device` and return the files produced.
    fn separate(&mut self, input: &Path, device: &str) -> Result<Vec<PathBuf>>;
}

/// Model short names understood by the host, mapped to separator model files.
pub fn model_file_name(model: &str) -> String {
    match model {
        "htdemucs" => "htdemucs.yaml".into(),
        "htdemucs_ft" => "htdemucs_ft.yaml".into(),
        "htdemucs_6s" => "htdemucs_6s.yaml".into(),
        "hdemucs_mmi" => "hdemucs_mmi.yaml".into(),
        other => other.into(),
    }
}

/// Models offered to users, with a one-line description.
pub const POPULAR_MODELS: &[(&str, &str)] = &[
    ("htdemucs", "Hybrid Transformer Demucs (default, fast)"),
    ("htdemucs_ft", "Fine-tuned Demucs (better quality)"),
    ("htdemucs_6s", "6-stem model (guitar, piano)"),
    ("UVR-MDX-NET-Voc_FT", "Best vocal isolation"),
    ("Kim_Vocal_2", "Alternative vocal model"),
];

/// Runs an external separator command line tool.
pub struct CommandEngine {
    program: PathBuf,
    output_dir: PathBuf,
    model_file: Option<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            output_dir: output_dir.into(),
            model_file: None,
        }
    }

    /// Program from `STEMWERK_SEPARATOR`, else `audio-separator` on `PATH`.
    pub fn from_env(output_dir: impl Into<PathBuf>) -> Self {
        Self::new(configured_program(), output_dir)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full path of the program, if it can be found.
    pub fn locate(&self) -> Option<PathBuf> {
        locate_program(&self.program)
    }

    fn command(&self, device: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("STEMWERK_DEVICE", device);
        for (key, value) in device_env(device, |k| env::var(k).ok()) {
            cmd.env(key, value);
        }
        cmd
    }

    fn run(&self, mut cmd: Command, what: &str) -> Result<()> {
        log::debug!("running {:?}", cmd);
        let output = cmd.output().map_err(|e| match e.kind() {
            ErrorKind::NotFound => StemError::MissingDependency(format!(
                "separator program '{}' not found (set {} or install audio-separator)",
                self.program.display(),
                SEPARATOR_ENV
            )),
            _ => StemError::Io(e),
        })?;
        relay_output(&output);

        if !output.status.success() {
            let last = String::from_utf8_lossy(&output.stderr)
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("")
                .trim()
                .to_string();
            return Err(StemError::Engine(format!(
                "{} failed ({}){}",
                what,
                output.status,
                if last.is_empty() { String::new() } else { format!(": {}", last) }
            )));
        }
        Ok(())
    }
}

impl SeparationEngine for CommandEngine {
    fn name(&self) -> &str {
        "command"
    }

    fn load_model(&mut self, model: &str, device: &str) -> Result<()> {
        let model_file = model_file_name(model);
        log::info!("Loading model: {} (from {})", model_file, model);
        fs::create_dir_all(&self.output_dir)?;

        let mut cmd = self.command(device);
        cmd.arg("--download_model_only")
            .arg("-m")
            .arg(&model_file)
            .arg("--output_dir")
            .arg(&self.output_dir);
        self.run(cmd, "model load")?;

        self.model_file = Some(model_file);
        Ok(())
    }

    fn separate(&mut self, input: &Path, device: &str) -> Result<Vec<PathBuf>> {
        let model_file = self
            .model_file
            .clone()
            .ok_or_else(|| StemError::Engine("separate called before load_model".into()))?;

        let before = audio_files(&self.output_dir)?;
        let started = SystemTime::now();

        let mut cmd = self.command(device);
        cmd.arg(input)
            .arg("-m")
            .arg(&model_file)
            .arg("--output_dir")
            .arg(&self.output_dir)
            .arg("--output_format")
            .arg("WAV");
        if device.starts_with("privateuseone:") {
            cmd.arg("--use_directml");
        }
        self.run(cmd, "separation")?;

        let mut produced: Vec<PathBuf> = audio_files(&self.output_dir)?
            .into_iter()
            .filter(|p| !before.contains(p) || modified_since(p, started))
            .filter(|p| p.as_path() != input)
            .collect();
        produced.sort();
        log::info!("Raw output files: {:?}", produced);
        Ok(produced)
    }
}

/// Environment that pins the child separator to `device`.
///
/// `cuda:<n>` is an index into the devices this process can see, so the
/// child is narrowed to that one device (by the same token the parent's own
/// visibility list uses for it) and sees it as its default. `cpu` hides every
/// GPU. DirectML adapters are chosen through `ORT_DML_DEFAULT_DEVICE_ID`.
pub fn device_env(device: &str, parent: impl Fn(&str) -> Option<String>) -> Vec<(&'static str, String)> {
    if device == "cpu" {
        return vec![
            ("CUDA_VISIBLE_DEVICES", String::new()),
            ("HIP_VISIBLE_DEVICES", String::new()),
            ("ROCR_VISIBLE_DEVICES", String::new()),
        ];
    }
    if let Some(idx) = device.strip_prefix("privateuseone:").and_then(|i| i.parse::<u32>().ok()) {
        return vec![("ORT_DML_DEFAULT_DEVICE_ID", idx.to_string())];
    }
    let Some(idx) = device.strip_prefix("cuda:").and_then(|i| i.trim().parse::<usize>().ok()) else {
        return Vec::new();
    };

    let cuda = parent("CUDA_VISIBLE_DEVICES");
    // HIP falls back to CUDA_VISIBLE_DEVICES when its own list is unset.
    let hip = parent("HIP_VISIBLE_DEVICES").or_else(|| cuda.clone());
    vec![
        ("CUDA_VISIBLE_DEVICES", nth_visible(cuda.as_deref(), idx)),
        ("HIP_VISIBLE_DEVICES", nth_visible(hip.as_deref(), idx)),
    ]
}

fn nth_visible(list: Option<&str>, idx: usize) -> String {
    list.and_then(|l| l.split(',').map(str::trim).nth(idx))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| idx.to_string())
}

pub fn configured_program() -> PathBuf {
    env::var_os(SEPARATOR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SEPARATOR))
}

/// Resolve a bare program name against `PATH`; paths are checked directly.
pub fn locate_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path = env::var_os("PATH")?;
    env::split_paths(&path).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

fn audio_files(dir: &Path) -> Result<HashSet<PathBuf>> {
    if !dir.is_dir() {
        return Ok(HashSet::new());
    }
    let mut files = HashSet::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_audio = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| AUDIO_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if is_audio && path.is_file() {
            files.insert(path);
        }
    }
    Ok(files)
}

fn modified_since(path: &Path, since: SystemTime) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| t >= since)
        .unwrap_or(false)
}

/// Forward the child's output to the diagnostic log, never to stdout.
fn relay_output(output: &Output) {
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        log::debug!(target: "separator", "{}", line);
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        log::debug!(target: "separator", "{}", line);
    }
}
