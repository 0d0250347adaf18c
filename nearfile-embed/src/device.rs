//! Compute device selection.
//!
//! The device is resolved exactly once, when a provider is created, and the
//! model session is built for it. Providers never switch devices afterwards.

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the configuration asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Use an accelerator when one is usable, otherwise the CPU.
    #[default]
    Auto,
    Cpu,
    /// Require an accelerator; fail if none is usable.
    Accelerated,
}

/// The device a provider actually runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Cuda,
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "cpu"),
            ComputeDevice::Cuda => write!(f, "cuda"),
        }
    }
}

impl ComputeDevice {
    /// Pick the device for `preference` given what this build can drive.
    pub fn resolve(preference: DevicePreference) -> Result<Self> {
        Self::resolve_with(preference, accelerator_available())
    }

    fn resolve_with(preference: DevicePreference, accelerator: bool) -> Result<Self> {
        let device = match (preference, accelerator) {
            (DevicePreference::Cpu, _) => ComputeDevice::Cpu,
            (DevicePreference::Auto, true) | (DevicePreference::Accelerated, true) => {
                ComputeDevice::Cuda
            }
            (DevicePreference::Auto, false) => ComputeDevice::Cpu,
            (DevicePreference::Accelerated, false) => {
                return Err(EmbedError::invalid_config(
                    "device = \"accelerated\" but no accelerator is usable in this build",
                ));
            }
        };
        tracing::info!(?preference, %device, "resolved compute device");
        Ok(device)
    }

    #[cfg(feature = "cuda")]
    pub(crate) fn execution_providers(&self) -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
        use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
        match self {
            ComputeDevice::Cpu => Vec::new(),
            ComputeDevice::Cuda => vec![CUDAExecutionProvider::default().build().error_on_failure()],
        }
    }
}

#[cfg(feature = "cuda")]
fn accelerator_available() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
    CUDAExecutionProvider::default().is_available().unwrap_or(false)
}

#[cfg(not(feature = "cuda"))]
fn accelerator_available() -> bool {
    false
}
