//! Compute capabilities detected once per process.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use voxfuse_gpu::GpuContext;

/// What compute backends are available. Built once at start-up and passed by
/// reference to whatever needs to pick a backend.
#[derive(Clone, Default)]
pub struct Capabilities {
    gpu: Option<Arc<GpuContext>>,
}

impl Capabilities {
    /// Probe for a GPU when `use_gpu` is set. A failed probe leaves the CPU
    /// path as the only backend.
    pub fn detect(use_gpu: bool) -> Self {
        if !use_gpu {
            return Self::cpu_only();
        }
        match GpuContext::probe() {
            Some(ctx) => {
                info!("GPU integration available on {}", ctx.adapter_name());
                Self {
                    gpu: Some(Arc::new(ctx)),
                }
            }
            None => {
                warn!("GPU requested but no adapter found; using CPU integration");
                Self::cpu_only()
            }
        }
    }

    pub fn cpu_only() -> Self {
        Self { gpu: None }
    }

    pub fn gpu(&self) -> Option<&Arc<GpuContext>> {
        self.gpu.as_ref()
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("gpu", &self.gpu.as_ref().map(|ctx| ctx.adapter_name()))
            .finish()
    }
}
