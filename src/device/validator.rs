//! Kernel-library validation for ROCm devices.
//!
//! rocBLAS ships its Tensile kernels precompiled per chip architecture. A GPU
//! can be visible to the driver while the installed rocBLAS has no kernels
//! for it, which crashes the job halfway through instead of failing cleanly.
//! The check here is a best-effort directory scan and fails open: whenever
//! the answer cannot be established the device is treated as supported.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

const DEFAULT_ROCM_ROOT: &str = "/opt/rocm";
const ROCBLAS_LIBRARY: &str = "lib/rocblas/library";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Supported,
    /// Architecture or kernel directory could not be determined.
    Unknown,
    /// Kernels are definitely missing; carries the reason shown to users.
    Mismatch(String),
}

#[derive(Clone, Debug, Default)]
pub struct CapabilityValidator {
    kernel_dir: Option<PathBuf>,
}

impl CapabilityValidator {
    pub fn new(kernel_dir: impl Into<PathBuf>) -> Self {
        Self {
            kernel_dir: Some(kernel_dir.into()),
        }
    }

    /// A validator with no kernel directory; everything is unknown.
    pub fn unconfigured() -> Self {
        Self { kernel_dir: None }
    }

    /// Kernel directory from `STEMWERK_ROCBLAS_DIR`, `ROCM_PATH` or `/opt/rocm`.
    pub fn system() -> Self {
        if let Some(dir) = env::var_os("STEMWERK_ROCBLAS_DIR").filter(|v| !v.is_empty()) {
            return Self::new(dir);
        }
        let root = env::var_os("ROCM_PATH")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROCM_ROOT));
        Self::new(root.join(ROCBLAS_LIBRARY))
    }

    pub fn kernel_dir(&self) -> Option<&Path> {
        self.kernel_dir.as_deref()
    }

    pub fn check(&self, device_id: &str, chip_arch: Option<&str>) -> Verdict {
        let Some(arch) = chip_arch.and_then(normalize_arch) else {
            log::debug!("{}: architecture unknown, not validating", device_id);
            return Verdict::Unknown;
        };
        let Some(dir) = self.kernel_dir.as_deref().filter(|d| d.is_dir()) else {
            log::debug!("{}: rocBLAS library directory not found, not validating", device_id);
            return Verdict::Unknown;
        };

        match has_kernels_for(dir, arch) {
            Ok(true) => Verdict::Supported,
            Ok(false) => Verdict::Mismatch(format!(
                "ROCm rocBLAS Tensile library missing for arch {} (see {}).",
                arch,
                dir.display()
            )),
            Err(e) => {
                log::debug!("{}: cannot scan {}: {}", device_id, dir.display(), e);
                Verdict::Unknown
            }
        }
    }

    /// `false` only when the kernels are known to be missing.
    pub fn is_supported(&self, device_id: &str, chip_arch: Option<&str>) -> bool {
        !matches!(self.check(device_id, chip_arch), Verdict::Mismatch(_))
    }
}

/// `gfx90a:sramecc+:xnack-` -> `gfx90a`; anything not `gfx…` is unknown.
fn normalize_arch(arch: &str) -> Option<&str> {
    let base = arch.split(':').next()?.trim();
    base.starts_with("gfx").then_some(base)
}

fn has_kernels_for(dir: &Path, arch: &str) -> io::Result<bool> {
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if name.contains(arch) && name.ends_with(".dat") {
            return Ok(true);
        }
    }
    Ok(false)
}
