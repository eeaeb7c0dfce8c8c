//! Host and device buffer types.
//!
//! [`HostBuffer`] owns its storage outright. [`DeviceBuffer`] is a handle
//! to memory owned by a [`ComputeContext`](crate::context::ComputeContext);
//! the context frees it on `release_buffer` or at teardown.

use gpusum_types::{AccessMode, BufferId, HarnessError, HarnessResult};

/// An owned, fixed-length host-side sequence.
///
/// Capacity is fixed at construction. `release` frees the storage and
/// leaves the buffer zero-sized; releasing twice is a no-op. Reading or
/// writing a released buffer is a programming error and panics.
#[derive(Debug)]
pub struct HostBuffer<T> {
    data: Vec<T>,
    released: bool,
}

impl<T: Copy + Default> HostBuffer<T> {
    /// Allocates `count` default-initialized elements.
    ///
    /// Fails with `AllocationFailure` instead of aborting when the host
    /// cannot provide the memory.
    pub fn allocate(count: usize) -> HarnessResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(count).map_err(|e| {
            HarnessError::AllocationFailure(format!(
                "host buffer of {count} elements ({} bytes): {e}",
                count.saturating_mul(std::mem::size_of::<T>())
            ))
        })?;
        data.resize(count, T::default());
        Ok(Self {
            data,
            released: false,
        })
    }
}

impl<T: Copy> HostBuffer<T> {
    /// Wraps existing data.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            data,
            released: false,
        }
    }

    /// Returns the number of elements (0 after release).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the contents in bytes.
    pub fn byte_size(&self) -> usize {
        std::mem::size_of_val(self.data.as_slice())
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Returns the contents.
    ///
    /// # Panics
    /// If the buffer has been released.
    pub fn as_slice(&self) -> &[T] {
        self.assert_live();
        &self.data
    }

    /// Returns the contents mutably.
    ///
    /// # Panics
    /// If the buffer has been released.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.assert_live();
        &mut self.data
    }

    /// Overwrites every element with `f(index)`.
    pub fn fill_with(&mut self, mut f: impl FnMut(usize) -> T) {
        for (i, x) in self.as_mut_slice().iter_mut().enumerate() {
            *x = f(i);
        }
    }

    /// Copies `src` into the buffer. Lengths must match exactly.
    pub fn copy_from_slice(&mut self, src: &[T]) -> HarnessResult<()> {
        if src.len() != self.len() {
            return Err(HarnessError::SizeMismatch {
                expected: self.len(),
                actual: src.len(),
            });
        }
        self.as_mut_slice().copy_from_slice(src);
        Ok(())
    }

    /// Frees the storage. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.data = Vec::new();
        self.released = true;
    }

    /// Consumes the buffer, returning its storage.
    pub fn into_vec(mut self) -> Vec<T> {
        self.assert_live();
        std::mem::take(&mut self.data)
    }

    fn assert_live(&self) {
        assert!(!self.released, "host buffer accessed after release");
    }
}

/// Handle to a device-side region of single-precision elements.
///
/// Not `Clone`: exactly one handle exists per allocation, so releasing it
/// through the owning context cannot double-free.
#[derive(Debug)]
pub struct DeviceBuffer {
    pub(crate) id: BufferId,
    access: AccessMode,
    byte_size: usize,
    pub(crate) released: bool,
}

impl DeviceBuffer {
    pub(crate) fn new(id: BufferId, access: AccessMode, byte_size: usize) -> Self {
        Self {
            id,
            access,
            byte_size,
            released: false,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Number of `f32` elements the region holds.
    pub fn len(&self) -> usize {
        self.byte_size / std::mem::size_of::<f32>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}
