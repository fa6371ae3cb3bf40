//! Process-level GPU visibility masking.
//!
//! An explicit CPU request hides every GPU from the driver runtimes so that
//! nothing downstream quietly picks `cuda:0` anyway. The mask must be applied
//! before the catalog (or any native library) first looks at the hardware.

use std::env;

pub const GPU_VISIBILITY_VARS: [&str; 3] = [
    "CUDA_VISIBLE_DEVICES",
    "HIP_VISIBLE_DEVICES",
    "ROCR_VISIBLE_DEVICES",
];

pub fn mask_gpu_visibility() {
    for var in GPU_VISIBILITY_VARS {
        env::set_var(var, "");
    }
    log::info!(
        "CPU mode requested; masked GPU visibility via {}",
        GPU_VISIBILITY_VARS.join("/")
    );
}

/// True when any visibility variable is set but lists no device.
pub fn gpu_visibility_masked() -> bool {
    GPU_VISIBILITY_VARS.iter().any(|var| {
        env::var(var)
            .map(|v| matches!(v.trim(), "" | "-1"))
            .unwrap_or(false)
    })
}
