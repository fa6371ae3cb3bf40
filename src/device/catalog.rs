use crate::{
    device::{
        backends::system_probes,
        probe::{run_probe, BackendProbe},
        validator::CapabilityValidator,
        visibility::gpu_visibility_masked,
    },
    types::{Device, SkippedDevice},
};

/// Result of one catalog query.
///
/// A device id appears at most once across `available` and `skipped`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Enumeration {
    pub available: Vec<Device>,
    pub skipped: Vec<SkippedDevice>,
}

impl Enumeration {
    /// Only the `auto` and `cpu` entries.
    pub fn baseline() -> Self {
        Self {
            available: vec![Device::auto(), Device::cpu()],
            skipped: Vec::new(),
        }
    }

    pub fn find(&self, id: &str) -> Option<&Device> {
        self.available.iter().find(|d| d.id == id)
    }

    pub fn find_skipped(&self, id: &str) -> Option<&SkippedDevice> {
        self.skipped.iter().find(|s| s.id == id)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.find(id).is_some() || self.find_skipped(id).is_some()
    }

    /// Available accelerator devices in enumeration order.
    pub fn gpu_devices(&self) -> impl Iterator<Item = &Device> {
        self.available.iter().filter(|d| d.backend_type.is_gpu())
    }

    pub fn push_device(&mut self, device: Device) -> bool {
        if self.contains_id(&device.id) {
            log::debug!("duplicate device id {} ignored", device.id);
            return false;
        }
        self.available.push(device);
        true
    }

    pub fn push_skipped(&mut self, skipped: SkippedDevice) -> bool {
        if self.contains_id(&skipped.id) {
            log::debug!("duplicate device id {} ignored", skipped.id);
            return false;
        }
        self.skipped.push(skipped);
        true
    }
}

/// Composes backend probes into one device listing.
pub struct DeviceCatalog {
    probes: Vec<Box<dyn BackendProbe>>,
}

impl DeviceCatalog {
    pub fn new(probes: Vec<Box<dyn BackendProbe>>) -> Self {
        Self { probes }
    }

    /// Every backend this platform knows how to probe.
    pub fn system() -> Self {
        Self::new(system_probes(CapabilityValidator::system()))
    }

    /// Probe all backends. Native probes are re-run on every call.
    pub fn enumerate(&self) -> Enumeration {
        let mut result = Enumeration::baseline();
        let masked = gpu_visibility_masked();

        for probe in &self.probes {
            if masked && probe.backend().is_gpu() {
                log::debug!("GPU visibility masked; skipping {} probe", probe.name());
                continue;
            }
            let outcome = run_probe(probe.as_ref());
            for device in outcome.devices {
                result.push_device(device);
            }
            for skipped in outcome.skipped {
                result.push_skipped(skipped);
            }
        }
        result
    }
}
