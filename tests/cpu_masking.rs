use stemwerk_worker::{
    device::{
        probe::{BackendProbe, ProbeOutcome},
        visibility::{gpu_visibility_masked, mask_gpu_visibility, GPU_VISIBILITY_VARS},
    },
    resolve, BackendType, Device, DeviceCatalog, DeviceRequest, Result,
};

/// Reports a GPU unconditionally, the way a driver would without a mask.
struct PretendGpu;

impl BackendProbe for PretendGpu {
    fn backend(&self) -> BackendType {
        BackendType::Cuda
    }
    fn name(&self) -> &'static str {
        "pretend-cuda"
    }
    fn probe(&self) -> Result<ProbeOutcome> {
        Ok(ProbeOutcome::with_devices(vec![Device::new(
            "cuda:0",
            "NVIDIA RTX 3080",
            BackendType::Cuda,
        )]))
    }
}

// Runs in its own test binary because it changes process environment.
#[test]
fn cpu_request_hides_every_gpu() {
    let catalog = DeviceCatalog::new(vec![Box::new(PretendGpu)]);
    let unmasked = if gpu_visibility_masked() { 0 } else { 1 };
    assert_eq!(catalog.enumerate().gpu_devices().count(), unmasked);

    mask_gpu_visibility();
    for var in GPU_VISIBILITY_VARS {
        assert_eq!(std::env::var(var).unwrap(), "");
    }
    assert!(gpu_visibility_masked());

    let enumeration = catalog.enumerate();
    assert_eq!(enumeration.gpu_devices().count(), 0);
    assert!(enumeration
        .available
        .iter()
        .all(|d| matches!(d.backend_type, BackendType::Auto | BackendType::Cpu)));

    let resolution = resolve(&DeviceRequest::Cpu, &enumeration);
    assert!(resolution.device.is_cpu());
    let resolution = resolve(&DeviceRequest::Auto, &enumeration);
    assert!(resolution.device.is_cpu());
}
