//! Applying a placement decision at the OS level.
//!
//! The allocator never calls into the OS directly; it always goes through a
//! [`Binder`]. This keeps the placement algorithm testable on any host and
//! keeps the one genuinely platform-specific syscall (`sched_setaffinity`)
//! isolated to a single small module.

use std::sync::Mutex;

use crate::cpumask::{CpuMask, MAX_CPUS};
use crate::error::{Result, WaycaError};

/// Applies a CPU affinity mask to an OS thread.
pub trait Binder: Send + Sync {
    /// Binds OS thread `pid` to `mask`.
    fn set_affinity(&self, pid: i32, mask: &CpuMask) -> Result<()>;
}

/// Binds threads using `sched_setaffinity(2)` on Linux.
#[cfg(target_os = "linux")]
pub struct LinuxBinder;

#[cfg(target_os = "linux")]
impl Binder for LinuxBinder {
    fn set_affinity(&self, pid: i32, mask: &CpuMask) -> Result<()> {
        // SAFETY: `set` is a stack-local, correctly zeroed libc::cpu_set_t;
        // `sched_setaffinity` only reads it for the extent of the call.
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            for cpu in mask.iter() {
                if cpu >= MAX_CPUS.min(8 * std::mem::size_of::<libc::cpu_set_t>()) {
                    break;
                }
                libc::CPU_SET(cpu, &mut set);
            }

            let rc = libc::sched_setaffinity(pid, std::mem::size_of::<libc::cpu_set_t>(), &set);
            if rc != 0 {
                let errno = *libc::__errno_location();
                return Err(WaycaError::Bind {
                    pid,
                    reason: format!("sched_setaffinity failed with errno {errno}"),
                });
            }
        }
        Ok(())
    }
}

/// A [`Binder`] that never touches the OS; it just records the calls it
/// received. Used by tests and by the demo binary's `--dry-run` mode.
#[derive(Default)]
pub struct NullBinder {
    calls: Mutex<Vec<(i32, CpuMask)>>,
}

impl NullBinder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(pid, mask)` pair passed to `set_affinity` so far, in order.
    pub fn calls(&self) -> Vec<(i32, CpuMask)> {
        self.calls.lock().expect("null binder mutex poisoned").clone()
    }
}

impl Binder for NullBinder {
    fn set_affinity(&self, pid: i32, mask: &CpuMask) -> Result<()> {
        self.calls
            .lock()
            .expect("null binder mutex poisoned")
            .push((pid, *mask));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_binder_records_calls() {
        let binder = NullBinder::new();
        let mask = CpuMask::single(3);
        binder.set_affinity(42, &mask).unwrap();

        let calls = binder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 42);
        assert_eq!(calls[0].1, mask);
    }
}
