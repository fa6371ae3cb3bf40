//! GPU chip-architecture lookup for ROCm devices.

use crate::device::probe::run_command;

use once_cell::sync::OnceCell;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const KFD_TOPOLOGY_NODES: &str = "/sys/class/kfd/kfd/topology/nodes";

const ROCMINFO_TIMEOUT: Duration = Duration::from_secs(3);

static ROCMINFO_AGENTS: OnceCell<Vec<RocmAgent>> = OnceCell::new();

/// A GPU agent as listed by `rocminfo`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RocmAgent {
    /// `gfx1103` and friends.
    pub arch: String,
    pub marketing_name: Option<String>,
}

/// GPU agents from `rocminfo`, in enumeration order.
///
/// The tool is run at most once per process; failure yields an empty list.
pub fn rocminfo_agents() -> &'static [RocmAgent] {
    ROCMINFO_AGENTS.get_or_init(|| match run_command("rocminfo", &[], ROCMINFO_TIMEOUT) {
        Ok(text) => parse_rocminfo(&text),
        Err(e) => {
            log::debug!("rocminfo unavailable: {}", e);
            Vec::new()
        }
    })
}

pub fn parse_rocminfo(text: &str) -> Vec<RocmAgent> {
    struct Pending {
        is_gpu: bool,
        arch: Option<String>,
        marketing: Option<String>,
    }

    fn flush(p: Option<Pending>, out: &mut Vec<RocmAgent>) {
        if let Some(Pending {
            is_gpu: true,
            arch: Some(arch),
            marketing,
        }) = p
        {
            if arch.starts_with("gfx") {
                out.push(RocmAgent {
                    arch,
                    marketing_name: marketing,
                });
            }
        }
    }

    let mut agents = Vec::new();
    let mut current: Option<Pending> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.starts_with("Agent ") {
            flush(current.take(), &mut agents);
            current = Some(Pending {
                is_gpu: false,
                arch: None,
                marketing: None,
            });
            continue;
        }
        let Some(agent) = current.as_mut() else {
            continue;
        };
        if let Some(v) = line.strip_prefix("Device Type:") {
            agent.is_gpu = v.contains("GPU");
        } else if let Some(v) = line.strip_prefix("Marketing Name:") {
            let v = v.trim();
            if !v.is_empty() {
                agent.marketing = Some(v.to_string());
            }
        } else if let Some(v) = line.strip_prefix("Name:") {
            // First `Name:` of an agent is the ISA name; later ones belong to ISA sections.
            let v = v.trim();
            if agent.arch.is_none() && !v.is_empty() {
                agent.arch = Some(v.to_string());
            }
        }
    }
    flush(current, &mut agents);
    agents
}

/// Decode a KFD `gfx_target_version` such as `110003` into `gfx1103`.
pub fn decode_gfx_target_version(v: u32) -> Option<String> {
    if v == 0 {
        return None;
    }
    let major = v / 10_000;
    let minor = (v / 100) % 100;
    let step = v % 100;
    if minor > 15 || step > 15 {
        return None;
    }
    Some(format!("gfx{}{:x}{:x}", major, minor, step))
}

/// GPU architectures from the KFD topology, ordered by node number.
pub fn kfd_gpu_arches(nodes_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(nodes_dir) else {
        return Vec::new();
    };

    let mut nodes: Vec<(u32, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let idx = e.file_name().to_str()?.parse::<u32>().ok()?;
            Some((idx, e.path()))
        })
        .collect();
    nodes.sort_by_key(|(idx, _)| *idx);

    nodes
        .iter()
        .filter_map(|(_, path)| fs::read_to_string(path.join("properties")).ok())
        .filter_map(|props| {
            props.lines().find_map(|l| {
                let v = l.strip_prefix("gfx_target_version")?.trim().parse::<u32>().ok()?;
                decode_gfx_target_version(v)
            })
        })
        .collect()
}

/// Resolves the chip architecture of a ROCm device by index.
///
/// `rocminfo` order is preferred; KFD node properties are the fallback.
#[derive(Clone, Debug, Default)]
pub struct ArchResolver {
    rocminfo: Vec<String>,
    kfd: Vec<String>,
}

impl ArchResolver {
    pub fn system() -> Self {
        Self {
            rocminfo: rocminfo_agents().iter().map(|a| a.arch.clone()).collect(),
            kfd: kfd_gpu_arches(Path::new(KFD_TOPOLOGY_NODES)),
        }
    }

    pub fn from_sources(rocminfo: Vec<String>, kfd: Vec<String>) -> Self {
        Self { rocminfo, kfd }
    }

    pub fn arch_for(&self, index: usize) -> Option<&str> {
        self.rocminfo
            .get(index)
            .or_else(|| self.kfd.get(index))
            .map(String::as_str)
    }

    /// Number of GPUs either source knows about.
    pub fn gpu_count(&self) -> usize {
        self.rocminfo.len().max(self.kfd.len())
    }
}
