//! One [`BackendProbe`] per accelerator family.

use crate::{
    device::{
        arch::{rocminfo_agents, ArchResolver},
        probe::{run_command, BackendProbe, ProbeOutcome},
        validator::{CapabilityValidator, Verdict},
    },
    error::Result,
    types::{BackendType, Device, SkippedDevice},
};

use std::{env, time::Duration};

// CUDA: Linux and Windows only
#[cfg(all(feature = "cuda", any(target_os = "linux", target_os = "windows")))]
use ort::execution_providers::CUDAExecutionProvider;
// CoreML: macOS only (Apple Silicon)
#[cfg(all(feature = "coreml", target_os = "macos"))]
use ort::execution_providers::CoreMLExecutionProvider;
// DirectML: Windows only
#[cfg(all(feature = "directml", target_os = "windows"))]
use ort::execution_providers::DirectMLExecutionProvider;
#[cfg(any(
    all(feature = "cuda", any(target_os = "linux", target_os = "windows")),
    all(feature = "coreml", target_os = "macos"),
    all(feature = "directml", target_os = "windows")
))]
use ort::execution_providers::ExecutionProvider;

const TOOL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default probe set, in catalog order.
pub fn system_probes(validator: CapabilityValidator) -> Vec<Box<dyn BackendProbe>> {
    vec![
        Box::new(CudaProbe),
        Box::new(RocmProbe::system(validator)),
        Box::new(DirectMlProbe),
        Box::new(MpsProbe),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// CUDA
// ─────────────────────────────────────────────────────────────────────────────

/// NVIDIA GPUs as reported by `nvidia-smi -L`.
pub struct CudaProbe;

impl BackendProbe for CudaProbe {
    fn backend(&self) -> BackendType {
        BackendType::Cuda
    }

    fn name(&self) -> &'static str {
        "cuda"
    }

    fn probe(&self) -> Result<ProbeOutcome> {
        #[cfg(all(feature = "cuda", any(target_os = "linux", target_os = "windows")))]
        {
            if !CUDAExecutionProvider::default().is_available()? {
                log::debug!("CUDA execution provider not available");
                return Ok(ProbeOutcome::empty());
            }
        }

        let text = run_command("nvidia-smi", &["-L"], TOOL_TIMEOUT)?;
        let gpus = apply_cuda_visibility(parse_nvidia_smi(&text), env::var("CUDA_VISIBLE_DEVICES").ok());
        let devices = gpus
            .into_iter()
            .enumerate()
            .map(|(i, name)| Device::new(format!("cuda:{}", i), name, BackendType::Cuda))
            .collect();
        Ok(ProbeOutcome::with_devices(devices))
    }
}

/// `GPU 0: NVIDIA GeForce RTX 3080 (UUID: GPU-…)` -> `(0, "NVIDIA GeForce RTX 3080")`.
pub fn parse_nvidia_smi(text: &str) -> Vec<(u32, String)> {
    text.lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("GPU ")?;
            let (idx, name) = rest.split_once(':')?;
            let idx = idx.trim().parse::<u32>().ok()?;
            let name = name.split(" (UUID").next().unwrap_or(name).trim();
            Some((idx, name.to_string()))
        })
        .collect()
}

/// Keep only the GPUs a numeric `CUDA_VISIBLE_DEVICES` list exposes, in list order.
///
/// Runtimes renumber visible devices from zero, so the caller assigns ids by position.
pub fn apply_cuda_visibility(gpus: Vec<(u32, String)>, visible: Option<String>) -> Vec<String> {
    filter_visible(gpus, visible.as_deref())
}

/// Apply one numeric device-visibility list to `(index, item)` pairs.
///
/// Anything that is not a plain index list (UUIDs, MIG handles) keeps the
/// driver order; an empty list hides everything.
pub fn filter_visible<T: Clone>(items: Vec<(u32, T)>, visible: Option<&str>) -> Vec<T> {
    let Some(visible) = visible.map(str::trim) else {
        return items.into_iter().map(|(_, item)| item).collect();
    };
    if visible.is_empty() {
        return Vec::new();
    }
    let wanted: Option<Vec<u32>> = visible
        .split(',')
        .map(|s| s.trim().parse::<u32>().ok())
        .collect();
    match wanted {
        Some(order) => order
            .iter()
            .filter_map(|w| items.iter().find(|(i, _)| i == w).map(|(_, item)| item.clone()))
            .collect(),
        None => items.into_iter().map(|(_, item)| item).collect(),
    }
}

fn indexed<T>(items: Vec<T>) -> Vec<(u32, T)> {
    (0u32..).zip(items).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// ROCm
// ─────────────────────────────────────────────────────────────────────────────

/// An AMD GPU found by the ROCm probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RocmGpu {
    pub name: String,
    pub arch: Option<String>,
}

enum RocmSource {
    System,
    Fixed(Vec<RocmGpu>),
}

/// AMD GPUs on Linux. HIP exposes them through the CUDA namespace, so ids are
/// `cuda:<n>`; each one is checked against the installed rocBLAS kernels.
pub struct RocmProbe {
    validator: CapabilityValidator,
    source: RocmSource,
}

impl RocmProbe {
    pub fn system(validator: CapabilityValidator) -> Self {
        Self {
            validator,
            source: RocmSource::System,
        }
    }

    pub fn with_gpus(validator: CapabilityValidator, gpus: Vec<RocmGpu>) -> Self {
        Self {
            validator,
            source: RocmSource::Fixed(gpus),
        }
    }

    fn system_gpus() -> Vec<RocmGpu> {
        if !cfg!(target_os = "linux") {
            return Vec::new();
        }
        let resolver = ArchResolver::system();
        let agents = rocminfo_agents();
        let gpus = (0..resolver.gpu_count())
            .map(|i| {
                let arch = resolver.arch_for(i).map(str::to_string);
                let name = agents
                    .get(i)
                    .and_then(|a| a.marketing_name.clone())
                    .unwrap_or_else(|| match &arch {
                        Some(a) => format!("AMD GPU {} ({})", i, a),
                        None => format!("AMD GPU {}", i),
                    });
                RocmGpu { name, arch }
            })
            .collect();
        rocm_visible(
            gpus,
            env::var("ROCR_VISIBLE_DEVICES").ok().as_deref(),
            env::var("HIP_VISIBLE_DEVICES").ok().as_deref(),
            env::var("CUDA_VISIBLE_DEVICES").ok().as_deref(),
        )
    }
}

/// GPUs the HIP runtime will expose, renumbered from zero.
///
/// `ROCR_VISIBLE_DEVICES` selects physical agents first; HIP then applies
/// `HIP_VISIBLE_DEVICES`, or `CUDA_VISIBLE_DEVICES` when that is unset, to
/// the remaining list.
pub fn rocm_visible(
    physical: Vec<RocmGpu>,
    rocr: Option<&str>,
    hip: Option<&str>,
    cuda: Option<&str>,
) -> Vec<RocmGpu> {
    let after_rocr = filter_visible(indexed(physical), rocr);
    filter_visible(indexed(after_rocr), hip.or(cuda))
}

impl BackendProbe for RocmProbe {
    fn backend(&self) -> BackendType {
        BackendType::Rocm
    }

    fn name(&self) -> &'static str {
        "rocm"
    }

    fn probe(&self) -> Result<ProbeOutcome> {
        let gpus = match &self.source {
            RocmSource::System => Self::system_gpus(),
            RocmSource::Fixed(gpus) => gpus.clone(),
        };

        let mut outcome = ProbeOutcome::empty();
        for (i, gpu) in gpus.into_iter().enumerate() {
            let id = format!("cuda:{}", i);
            match self.validator.check(&id, gpu.arch.as_deref()) {
                Verdict::Mismatch(reason) => {
                    log::info!("{} ({}) skipped: {}", id, gpu.name, reason);
                    outcome.skipped.push(SkippedDevice {
                        id,
                        display_name: gpu.name,
                        reason,
                    });
                }
                Verdict::Supported | Verdict::Unknown => {
                    outcome.devices.push(Device::new(id, gpu.name, BackendType::Rocm));
                }
            }
        }
        Ok(outcome)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DirectML
// ─────────────────────────────────────────────────────────────────────────────

/// DirectX 12 adapters on Windows.
pub struct DirectMlProbe;

impl DirectMlProbe {
    #[cfg(target_os = "windows")]
    fn adapters() -> Result<Vec<String>> {
        let text = run_command(
            "powershell",
            &[
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                "(Get-CimInstance Win32_VideoController).Name",
            ],
            TOOL_TIMEOUT,
        )?;
        Ok(parse_video_controllers(&text))
    }

    #[cfg(not(target_os = "windows"))]
    fn adapters() -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

impl BackendProbe for DirectMlProbe {
    fn backend(&self) -> BackendType {
        BackendType::DirectMl
    }

    fn name(&self) -> &'static str {
        "directml"
    }

    fn probe(&self) -> Result<ProbeOutcome> {
        #[cfg(all(feature = "directml", target_os = "windows"))]
        {
            if !DirectMLExecutionProvider::default().is_available()? {
                log::debug!("DirectML execution provider not available");
                return Ok(ProbeOutcome::empty());
            }
        }

        let adapters = Self::adapters()?;
        Ok(ProbeOutcome::with_devices(directml_devices(adapters.len())))
    }
}

/// Adapter names, one per line, minus the software renderer.
pub fn parse_video_controllers(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("Microsoft Basic"))
        .map(str::to_string)
        .collect()
}

/// A single adapter is addressed as plain `directml`.
pub fn directml_devices(count: usize) -> Vec<Device> {
    (0..count)
        .map(|i| {
            let id = if count > 1 {
                format!("directml:{}", i)
            } else {
                "directml".to_string()
            };
            Device::new(id, format!("DirectML GPU {}", i), BackendType::DirectMl)
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Metal (MPS)
// ─────────────────────────────────────────────────────────────────────────────

/// Apple silicon GPU.
pub struct MpsProbe;

impl BackendProbe for MpsProbe {
    fn backend(&self) -> BackendType {
        BackendType::Mps
    }

    fn name(&self) -> &'static str {
        "mps"
    }

    fn probe(&self) -> Result<ProbeOutcome> {
        if !cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            return Ok(ProbeOutcome::empty());
        }

        #[cfg(all(feature = "coreml", target_os = "macos"))]
        {
            if !CoreMLExecutionProvider::default().is_available()? {
                log::debug!("CoreML execution provider not available");
                return Ok(ProbeOutcome::empty());
            }
        }

        Ok(ProbeOutcome::with_devices(vec![Device::new(
            "mps",
            "Apple MPS",
            BackendType::Mps,
        )]))
    }
}
