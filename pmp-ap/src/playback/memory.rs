//! Memory headroom sampling
//!
//! Running two engines doubles decode buffers. When headroom is short the
//! controller skips the crossfade and lets the playback layer make a direct
//! transition instead.

use parking_lot::Mutex;
use sysinfo::System;

/// Minimum free memory required to run both engines (30 MB)
pub const MIN_MEMORY_HEADROOM_BYTES: u64 = 30 * 1024 * 1024;

/// Source of the current memory headroom
pub trait MemoryProbe: Send + Sync {
    /// Bytes this process can still allocate
    fn available_bytes(&self) -> u64;

    fn has_headroom(&self, required_bytes: u64) -> bool {
        self.available_bytes() >= required_bytes
    }
}

/// Probe backed by the operating system's memory statistics
///
/// Uses the tighter of system-wide available memory and the cgroup limit
/// when the process runs inside one.
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn available_bytes(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_memory();

        let available = system.available_memory();
        match system.cgroup_limits() {
            Some(limits) => available.min(limits.free_memory),
            None => available,
        }
    }
}
