//! Device selection policy.
//!
//! Resolution never fails: an unusable preference degrades to the closest
//! working device and every degradation is reported as a warning.

use crate::{
    device::catalog::Enumeration,
    types::{device_family, BackendType, Device, DeviceRequest, ResolvedDevice},
};

/// Chosen device plus the warnings logged while choosing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub device: ResolvedDevice,
    pub warnings: Vec<String>,
}

impl Resolution {
    fn quiet(device: ResolvedDevice) -> Self {
        Self {
            device,
            warnings: Vec::new(),
        }
    }
}

const GPU_FAMILIES: [&str; 3] = ["cuda", "rocm", "directml"];

pub fn resolve(request: &DeviceRequest, enumeration: &Enumeration) -> Resolution {
    let mut warnings = Vec::new();
    let mut warn = |msg: String| {
        log::warn!("{}", msg);
        warnings.push(msg);
    };

    match request {
        DeviceRequest::Auto => {
            let device = enumeration
                .gpu_devices()
                .next()
                .map(ResolvedDevice::from)
                .unwrap_or_else(ResolvedDevice::cpu);
            return Resolution::quiet(device);
        }
        DeviceRequest::Cpu => return Resolution::quiet(ResolvedDevice::cpu()),
        DeviceRequest::Mps => {
            if let Some(mps) = enumeration
                .available
                .iter()
                .find(|d| d.backend_type == BackendType::Mps)
            {
                return Resolution::quiet(mps.into());
            }
            warn("MPS requested but not available, using CPU".to_string());
        }
        DeviceRequest::Id(id) => {
            if let Some(device) = enumeration.find(id) {
                return Resolution::quiet(device.into());
            }

            let family = device_family(id);
            if id.contains(':') && GPU_FAMILIES.contains(&family) {
                if let Some(skip) = enumeration.find_skipped(id) {
                    warn(format!(
                        "Requested device '{}' is not usable: {}",
                        id, skip.reason
                    ));
                }
                if let Some(dev) = enumeration.gpu_devices().find(|d| in_family(d, family)) {
                    warn(format!(
                        "Requested device '{}' not available; falling back to {}",
                        id, dev.id
                    ));
                    return Resolution {
                        device: dev.into(),
                        warnings,
                    };
                }
            }
        }
    }

    if !matches!(request, DeviceRequest::Mps) {
        warn(format!(
            "Requested device '{}' not available, using CPU",
            request
        ));
    }
    Resolution {
        device: ResolvedDevice::cpu(),
        warnings,
    }
}

/// ROCm GPUs live in the `cuda:*` id space, so a `rocm:N` request maps onto them.
fn in_family(device: &Device, family: &str) -> bool {
    device.family() == family || (family == "rocm" && device.backend_type == BackendType::Rocm)
}

/// Translate a catalog id into the separation engine's device string.
///
/// DirectML devices are addressed through the `privateuseone` namespace;
/// everything else passes through unchanged.
pub fn engine_device(id: &str) -> String {
    match directml_index(id) {
        Some(idx) => format!("privateuseone:{}", idx),
        None => id.to_string(),
    }
}

/// Adapter index of a `directml` or `directml:<n>` id.
pub fn directml_index(id: &str) -> Option<u32> {
    match id.split_once(':') {
        None if id == "directml" => Some(0),
        Some(("directml", idx)) => Some(idx.trim().parse().unwrap_or(0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SkippedDevice;

    fn with(devices: Vec<Device>) -> Enumeration {
        let mut e = Enumeration::baseline();
        for d in devices {
            e.push_device(d);
        }
        e
    }

    fn cuda(i: u32) -> Device {
        Device::new(format!("cuda:{}", i), format!("GPU {}", i), BackendType::Cuda)
    }

    #[test]
    fn auto_prefers_first_gpu() {
        let e = with(vec![cuda(0)]);
        let r = resolve(&DeviceRequest::Auto, &e);
        assert_eq!(r.device.id, "cuda:0");
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn auto_without_gpu_is_cpu() {
        let r = resolve(&DeviceRequest::Auto, &Enumeration::baseline());
        assert!(r.device.is_cpu());
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn cpu_ignores_gpus() {
        let e = with(vec![cuda(0), cuda(1)]);
        let r = resolve(&DeviceRequest::Cpu, &e);
        assert_eq!(r.device, ResolvedDevice::cpu());
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn mps_falls_back_to_cpu_with_one_warning() {
        let r = resolve(&DeviceRequest::Mps, &with(vec![cuda(0)]));
        assert!(r.device.is_cpu());
        assert_eq!(r.warnings.len(), 1);

        let e = with(vec![Device::new("mps", "Apple MPS", BackendType::Mps)]);
        assert_eq!(resolve(&DeviceRequest::Mps, &e).device.id, "mps");
    }

    #[test]
    fn exact_id_is_returned_unchanged() {
        let e = with(vec![cuda(0), cuda(1)]);
        let r = resolve(&DeviceRequest::parse("cuda:1"), &e);
        assert_eq!(r.device.id, "cuda:1");
        assert_eq!(r.device.display_name, "GPU 1");
    }

    #[test]
    fn missing_index_falls_back_within_family() {
        let e = with(vec![cuda(0)]);
        let r = resolve(&DeviceRequest::parse("cuda:3"), &e);
        assert_eq!(r.device.id, "cuda:0");
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn unknown_gpu_without_family_is_cpu_with_exactly_one_warning() {
        let e = with(vec![Device::new("directml", "DirectML GPU 0", BackendType::DirectMl)]);
        let r = resolve(&DeviceRequest::parse("cuda:5"), &e);
        assert!(r.device.is_cpu());
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn skipped_device_reports_reason_before_fallback() {
        let mut e = with(vec![cuda(0)]);
        e.push_skipped(SkippedDevice {
            id: "cuda:1".into(),
            display_name: "780M".into(),
            reason: "rocBLAS missing gfx1103".into(),
        });
        let r = resolve(&DeviceRequest::parse("cuda:1"), &e);
        assert_eq!(r.device.id, "cuda:0");
        assert_eq!(r.warnings.len(), 2);
        assert!(r.warnings[0].contains("gfx1103"));
    }

    #[test]
    fn garbage_request_is_cpu() {
        let r = resolve(&DeviceRequest::parse("tpu"), &with(vec![cuda(0)]));
        assert!(r.device.is_cpu());
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn rocm_request_maps_to_rocm_devices() {
        let e = with(vec![Device::new("cuda:0", "RX 9070", BackendType::Rocm)]);
        let r = resolve(&DeviceRequest::parse("rocm:1"), &e);
        assert_eq!(r.device.id, "cuda:0");
    }

    #[test]
    fn directml_ids_translate_to_privateuseone() {
        assert_eq!(engine_device("directml"), "privateuseone:0");
        assert_eq!(engine_device("directml:1"), "privateuseone:1");
        assert_eq!(engine_device("cuda:1"), "cuda:1");
        assert_eq!(engine_device("cpu"), "cpu");
        assert_eq!(engine_device("mps"), "mps");
        assert_eq!(directml_index("cuda:0"), None);
    }
}
