//! Process-wide per-CPU load accounting.
//!
//! The table is the only piece of shared mutable state in the allocator.
//! Every read or write happens under one [`Mutex`]; no other lock is ever
//! held at the same time, so there is no lock-ordering hazard to reason
//! about between group mutation and load accounting.

use std::sync::Mutex;

use crate::cpumask::CpuMask;

/// A process-wide table of signed "load shares" indexed by CPU id.
pub struct LoadTable {
    loads: Mutex<Vec<i64>>,
}

impl LoadTable {
    /// Creates a table sized for `total_cpus` CPU ids, all starting at zero
    /// load.
    pub fn new(total_cpus: usize) -> Self {
        Self {
            loads: Mutex::new(vec![0; total_cpus]),
        }
    }

    /// Number of CPUs this table accounts for.
    pub fn total_cpus(&self) -> usize {
        self.loads.lock().expect("load table mutex poisoned").len()
    }

    /// Adds (`add = true`) or withdraws (`add = false`) the load share of a
    /// thread bound to `cur_set`.
    ///
    /// The share is `ceil(total_cpus / popcount(cur_set))`, applied to every
    /// CPU bit set in `cur_set`. A thread pinned to a narrow set therefore
    /// weighs more on each of its CPUs than one pinned widely.
    pub fn update(&self, cur_set: &CpuMask, add: bool) {
        let popcount = cur_set.count();
        if popcount == 0 {
            return;
        }
        let mut loads = self.loads.lock().expect("load table mutex poisoned");
        let total = loads.len() as i64;
        let share = div_round_up(total, popcount as i64);
        let delta = if add { share } else { -share };

        for cpu in cur_set.iter() {
            if let Some(slot) = loads.get_mut(cpu) {
                *slot += delta;
            }
        }
    }

    /// Reads the current load of a single CPU. Used by the placement
    /// primitives and by tests asserting on the end-to-end scenarios.
    pub fn load_of(&self, cpu: usize) -> i64 {
        self.loads
            .lock()
            .expect("load table mutex poisoned")
            .get(cpu)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Vec<i64>> {
        self.loads.lock().expect("load table mutex poisoned")
    }
}

fn div_round_up(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}
