//! Strongly-typed handles for compute API objects.
//!
//! Back-ends hand out opaque `u64` identifiers. Newtype wrappers prevent
//! passing a buffer handle where a kernel handle is expected.

use serde::{Deserialize, Serialize};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw back-end identifier.
            #[inline]
            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(val: u64) -> Self {
                Self(val)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

handle!(
    /// Index of a platform in enumeration order.
    PlatformId
);
handle!(
    /// A compute device exposed by a platform.
    DeviceId
);
handle!(
    /// An execution context created against one device.
    ContextId
);
handle!(
    /// An in-order command queue.
    QueueId
);
handle!(
    /// A device-side memory region.
    BufferId
);
handle!(
    /// A program built from kernel source.
    ProgramId
);
handle!(
    /// A kernel created from a built program.
    KernelId
);
