mod error;
mod types;

pub mod device {
    pub mod arch;
    pub mod backends;
    pub mod catalog;
    pub mod probe;
    pub mod selector;
    pub mod validator;
    pub mod visibility;
}

pub mod core {
    pub mod audio;
    pub mod engine;
    pub mod estimator;
    pub mod job;
    pub mod normalize;
}

pub mod io {
    pub mod dump;
    pub mod logging;
    pub mod progress;
    pub mod run_dir;
}

// Public API
pub use crate::core::engine::{CommandEngine, SeparationEngine};
pub use crate::core::job::run_job;
pub use crate::device::catalog::{DeviceCatalog, Enumeration};
pub use crate::device::selector::{resolve, Resolution};
pub use crate::device::validator::CapabilityValidator;
pub use crate::error::{
    Result, StemError, EXIT_INPUT_NOT_FOUND, EXIT_JOB_FAILED, EXIT_MISSING_DEPENDENCY, EXIT_OK,
    EXIT_USAGE,
};
pub use crate::io::progress::ProgressReporter;
pub use crate::types::{
    BackendType, Device, DeviceRequest, JobResult, ResolvedDevice, SkippedDevice, WorkerOptions,
};

/// Enumerate devices the way the worker does for `requested`.
///
/// An explicit CPU request masks GPU visibility first, so no accelerator is
/// probed or reported afterwards.
pub fn enumerate_for(requested: &DeviceRequest) -> Enumeration {
    if *requested == DeviceRequest::Cpu {
        crate::device::visibility::mask_gpu_visibility();
    }
    DeviceCatalog::system().enumerate()
}
