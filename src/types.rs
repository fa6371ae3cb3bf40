use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, path::PathBuf};

/// Compute backend family a device belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Auto,
    Cpu,
    Cuda,
    Rocm,
    #[serde(rename = "directml")]
    DirectMl,
    Mps,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Auto => "auto",
            BackendType::Cpu => "cpu",
            BackendType::Cuda => "cuda",
            BackendType::Rocm => "rocm",
            BackendType::DirectMl => "directml",
            BackendType::Mps => "mps",
        }
    }

    /// Accelerated backends, preferred over the CPU by `auto`.
    pub fn is_gpu(&self) -> bool {
        matches!(
            self,
            BackendType::Cuda | BackendType::Rocm | BackendType::DirectMl | BackendType::Mps
        )
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One addressable compute target, e.g. `cuda:1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "type")]
    pub backend_type: BackendType,
}

impl Device {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, backend_type: BackendType) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            backend_type,
        }
    }

    pub fn auto() -> Self {
        Self::new("auto", "Auto", BackendType::Auto)
    }

    pub fn cpu() -> Self {
        Self::new("cpu", "CPU", BackendType::Cpu)
    }

    /// Id prefix before the index, `cuda` for `cuda:1`.
    pub fn family(&self) -> &str {
        device_family(&self.id)
    }
}

/// A device the driver reports but that failed capability validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDevice {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub reason: String,
}

/// The user's device preference as given on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceRequest {
    Auto,
    Cpu,
    Mps,
    Id(String),
}

impl DeviceRequest {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "auto" => DeviceRequest::Auto,
            "cpu" => DeviceRequest::Cpu,
            "mps" => DeviceRequest::Mps,
            _ => DeviceRequest::Id(trimmed.replace(' ', "")),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeviceRequest::Auto => "auto",
            DeviceRequest::Cpu => "cpu",
            DeviceRequest::Mps => "mps",
            DeviceRequest::Id(id) => id,
        }
    }
}

impl From<&str> for DeviceRequest {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device chosen for a job. Always usable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedDevice {
    pub id: String,
    pub display_name: String,
}

impl ResolvedDevice {
    pub fn cpu() -> Self {
        Self::from(&Device::cpu())
    }

    pub fn is_cpu(&self) -> bool {
        self.id == "cpu"
    }
}

impl From<&Device> for ResolvedDevice {
    fn from(d: &Device) -> Self {
        Self {
            id: d.id.clone(),
            display_name: d.display_name.clone(),
        }
    }
}

/// Canonical stem name to output file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobResult {
    pub stems: BTreeMap<String, PathBuf>,
}

impl JobResult {
    pub fn get(&self, stem: &str) -> Option<&PathBuf> {
        self.stems.get(stem)
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    /// Single-line JSON object printed as the worker's final stdout line.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Per-invocation settings of the worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerOptions {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub model_name: String,
    pub device: String,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output_dir: ".".into(),
            model_name: "htdemucs".into(),
            device: "auto".into(),
        }
    }
}

pub(crate) fn device_family(id: &str) -> &str {
    id.split(':').next().unwrap_or(id)
}
