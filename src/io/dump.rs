//! Device listings for humans and for the host's parser.

use crate::{
    core::engine::{configured_program, locate_program},
    device::{catalog::Enumeration, visibility::gpu_visibility_masked},
    types::BackendType,
};

use serde_json::{json, Value};
use std::{
    env,
    io::{self, Write},
    path::Path,
};

pub const DUMP_BEGIN: &str = "STEMWERK_DEVICES_BEGIN";
pub const DUMP_END: &str = "STEMWERK_DEVICES_END";

fn field(s: &str) -> String {
    s.replace(&['\t', '\r', '\n'][..], " ")
}

/// Environment summary appended to the machine-readable dump.
pub fn environment_report(enumeration: &Enumeration) -> Value {
    let count = |t: BackendType| enumeration.available.iter().filter(|d| d.backend_type == t).count();
    let rocm_root = env::var_os("ROCM_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| "/opt/rocm".into());
    let program = configured_program();
    let separator = locate_program(&program).unwrap_or(program);

    json!({
        "platform": env::consts::OS,
        "arch": env::consts::ARCH,
        "worker_version": env!("CARGO_PKG_VERSION"),
        "ld_library_path_env": env::var("LD_LIBRARY_PATH").ok(),
        "cuda_visible_devices_env": env::var("CUDA_VISIBLE_DEVICES").ok(),
        "gpu_masked": gpu_visibility_masked(),
        "cuda_count": count(BackendType::Cuda),
        "rocm_path_exists": Path::new(&rocm_root).exists(),
        "mps_available": count(BackendType::Mps) > 0,
        "directml_count": count(BackendType::DirectMl),
        "separator_program": separator.display().to_string(),
    })
}

/// Tab-separated dump framed by begin/end markers.
pub fn write_device_dump(out: &mut dyn Write, enumeration: &Enumeration, env_report: &Value) -> io::Result<()> {
    writeln!(out, "{}", DUMP_BEGIN)?;
    for d in &enumeration.available {
        writeln!(
            out,
            "STEMWERK_DEVICE\t{}\t{}\t{}",
            field(&d.id),
            field(&d.display_name),
            d.backend_type
        )?;
    }
    for s in &enumeration.skipped {
        writeln!(
            out,
            "STEMWERK_DEVICE_SKIPPED\t{}\t{}\t{}",
            field(&s.id),
            field(&s.display_name),
            field(&s.reason)
        )?;
    }
    writeln!(out, "STEMWERK_ENV_JSON {}", env_report)?;
    writeln!(out, "{}", DUMP_END)?;
    out.flush()
}

pub fn write_device_list(out: &mut dyn Write, enumeration: &Enumeration) -> io::Result<()> {
    writeln!(out, "Available devices:")?;
    for d in &enumeration.available {
        writeln!(out, "  {}:  {} ({})", d.id, d.display_name, d.backend_type)?;
    }
    for s in &enumeration.skipped {
        writeln!(out, "  {}:  {} (unavailable: {})", s.id, s.display_name, s.reason)?;
    }
    Ok(())
}
