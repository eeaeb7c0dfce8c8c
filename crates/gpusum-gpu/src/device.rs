//! Device resolution: enumerate platforms and devices, apply a selection
//! policy, report the chosen device.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use gpusum_types::{DeviceClass, DeviceId, HarnessError, HarnessResult, PlatformId};

use crate::backend::{ComputeBackend, PlatformDescriptor};

/// The device chosen for this run. Immutable once selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeDevice {
    pub platform: PlatformId,
    pub id: DeviceId,
    pub platform_name: String,
    pub vendor: String,
    pub name: String,
    pub version: String,
    pub class: DeviceClass,
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.version)
    }
}

/// Which GPU-class device wins when several are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Scan platform-major, device-minor; every GPU found replaces the
    /// previous pick, so the last one enumerated is used.
    #[default]
    LastGpu,
    /// Keep the first GPU enumerated.
    FirstGpu,
}

/// Everything enumeration found, in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub platforms: Vec<PlatformDescriptor>,
}

impl Inventory {
    pub fn new(platforms: Vec<PlatformDescriptor>) -> Self {
        Self { platforms }
    }

    pub fn platform_count(&self) -> usize {
        self.platforms.len()
    }

    /// Total devices across all platforms.
    pub fn device_count(&self) -> usize {
        self.platforms.iter().map(|p| p.devices.len()).sum()
    }

    /// Human-readable listing, one line per platform and device.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(1 + self.platform_count() + self.device_count());
        lines.push(format!("Found {} platforms:", self.platform_count()));
        for platform in &self.platforms {
            lines.push(format!(
                "    {} - {} - {}",
                platform.vendor, platform.name, platform.version
            ));
            for device in &platform.devices {
                lines.push(format!(
                    "        {} - {} - {} ({})",
                    device.vendor, device.name, device.version, device.class
                ));
            }
        }
        lines
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Applies a [`SelectionPolicy`] to the devices a back-end exposes.
///
/// Only GPU-class devices are eligible. CPU and other accelerators are
/// listed in the inventory but never selected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceResolver {
    policy: SelectionPolicy,
}

impl DeviceResolver {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Enumerate every platform and every device on it.
    pub fn enumerate(&self, backend: &mut dyn ComputeBackend) -> HarnessResult<Inventory> {
        let platforms = backend.platforms()?;
        let inventory = Inventory::new(platforms);
        for line in inventory.lines() {
            info!(backend = backend.name(), "{line}");
        }
        Ok(inventory)
    }

    /// Pick a device from an inventory according to the policy.
    pub fn select(&self, inventory: &Inventory) -> HarnessResult<ComputeDevice> {
        let mut selected: Option<ComputeDevice> = None;

        'scan: for platform in &inventory.platforms {
            for device in &platform.devices {
                if device.class != DeviceClass::Gpu {
                    continue;
                }
                selected = Some(ComputeDevice {
                    platform: platform.id,
                    id: device.id,
                    platform_name: platform.name.clone(),
                    vendor: device.vendor.clone(),
                    name: device.name.clone(),
                    version: device.version.clone(),
                    class: device.class,
                });
                if self.policy == SelectionPolicy::FirstGpu {
                    break 'scan;
                }
            }
        }

        selected.ok_or(HarnessError::DeviceNotFound {
            platforms: inventory.platform_count(),
        })
    }

    /// Enumerate, report the inventory, and select.
    pub fn resolve(&self, backend: &mut dyn ComputeBackend) -> HarnessResult<ComputeDevice> {
        let inventory = self.enumerate(backend)?;
        self.choose(&inventory)
    }

    /// Select from an existing inventory and report the outcome.
    pub fn choose(&self, inventory: &Inventory) -> HarnessResult<ComputeDevice> {
        match self.select(inventory) {
            Ok(device) => {
                info!(device = %device, platform = %device.platform_name, "Using device");
                Ok(device)
            }
            Err(e) => {
                warn!(
                    platforms = inventory.platform_count(),
                    devices = inventory.device_count(),
                    "No appropriate device found"
                );
                Err(e)
            }
        }
    }
}
