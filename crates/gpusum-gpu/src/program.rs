//! Program build results and compiled kernels.

use std::path::Path;

use gpusum_types::{BufferId, HarnessError, HarnessResult, KernelId, ProgramId};

use crate::backend::{BuildReport, KernelArg};
use crate::buffers::DeviceBuffer;

/// Reads kernel source text from disk.
pub fn load_kernel_source(path: impl AsRef<Path>) -> HarnessResult<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| {
        HarnessError::Io(std::io::Error::new(
            e.kind(),
            format!("kernel source {}: {e}", path.display()),
        ))
    })
}

/// A successfully built program. Owned by the context that built it.
#[derive(Debug)]
pub struct Program {
    pub(crate) id: ProgramId,
    report: BuildReport,
    pub(crate) released: bool,
}

impl Program {
    pub(crate) fn new(id: ProgramId, report: BuildReport) -> Self {
        Self {
            id,
            report,
            released: false,
        }
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Compiler output from the successful build (warnings, if any).
    pub fn build_log(&self) -> &str {
        &self.report.log
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

/// A kernel entry point with positional argument slots.
///
/// Slots are recorded here and pushed to the back-end at dispatch time.
/// Dispatch is rejected while any slot is unbound.
#[derive(Debug)]
pub struct CompiledKernel {
    pub(crate) id: KernelId,
    name: String,
    slots: Vec<Option<KernelArg>>,
    pub(crate) released: bool,
}

impl CompiledKernel {
    pub(crate) fn new(id: KernelId, name: &str, arg_count: u32) -> Self {
        Self {
            id,
            name: name.to_string(),
            slots: vec![None; arg_count as usize],
            released: false,
        }
    }

    pub fn id(&self) -> KernelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arg_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Bind a device buffer to slot `index`.
    pub fn bind_buffer(&mut self, index: u32, buffer: &DeviceBuffer) -> HarnessResult<()> {
        if buffer.is_released() {
            return Err(HarnessError::AccessViolation(format!(
                "cannot bind released buffer {} to '{}' slot {index}",
                buffer.id(),
                self.name
            )));
        }
        self.bind(index, KernelArg::Buffer(buffer.id()))
    }

    /// Bind a scalar to slot `index`.
    pub fn bind_scalar(&mut self, index: u32, value: KernelArg) -> HarnessResult<()> {
        if matches!(value, KernelArg::Buffer(_)) {
            return Err(HarnessError::AccessViolation(format!(
                "use bind_buffer for pointer argument '{}' slot {index}",
                self.name
            )));
        }
        self.bind(index, value)
    }

    fn bind(&mut self, index: u32, arg: KernelArg) -> HarnessResult<()> {
        let slot_count = self.slots.len();
        let slot = self.slots.get_mut(index as usize).ok_or_else(|| {
            HarnessError::InvalidConfig(format!(
                "kernel '{}' has {slot_count} argument slots, cannot bind index {index}",
                self.name
            ))
        })?;
        *slot = Some(arg);
        Ok(())
    }

    /// Returns the first slot that has nothing bound.
    pub fn first_unbound(&self) -> Option<u32> {
        self.slots.iter().position(Option::is_none).map(|i| i as u32)
    }

    /// All bindings in slot order, or the first unbound slot.
    pub(crate) fn bindings(&self) -> Result<Vec<(u32, KernelArg)>, u32> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| slot.map(|arg| (i as u32, arg)).ok_or(i as u32))
            .collect()
    }

    /// Buffers bound to this kernel, in slot order.
    pub fn bound_buffers(&self) -> Vec<BufferId> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Some(KernelArg::Buffer(id)) => Some(*id),
                _ => None,
            })
            .collect()
    }
}
