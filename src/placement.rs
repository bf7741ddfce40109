//! Load-aware placement primitives.
//!
//! These three functions are the only code in the crate that reads the
//! [`LoadTable`]. Each takes a search mask and the table; none of them
//! mutate group state — callers combine them with the resource-reservation
//! logic in [`crate::group`].

use crate::cpumask::CpuMask;
use crate::load::LoadTable;

/// Returns the CPU id in `mask` with the strictly minimum load, first-wins
/// on ties. `mask` must be non-empty.
pub fn find_idlest_core(loads: &LoadTable, mask: &CpuMask) -> Option<usize> {
    let first = mask.first_set()?;
    let table = loads.lock();
    let mut idlest = first;
    let mut best = table.get(first).copied().unwrap_or(0);

    let mut pos = Some(first);
    while let Some(p) = pos {
        let load = table.get(p).copied().unwrap_or(0);
        if load < best {
            best = load;
            idlest = p;
        }
        pos = mask.next_set(p);
    }
    Some(idlest)
}

/// Partitions the search space into `stride`-aligned windows and rewrites
/// `mask` to the window with the strictly minimum total load, fully set.
///
/// The window is written even for CPU ids outside the original `mask` --
/// resource reservation always rounds up to whole topology units. Returns
/// `None` (and leaves `mask` untouched) if `mask` was empty.
pub fn find_idlest_set(loads: &LoadTable, stride: usize, mask: &mut CpuMask) -> Option<()> {
    debug_assert!(stride > 0);
    let first = mask.first_set()?;
    let last = mask.last_set().unwrap_or(first);

    let start = first - (first % stride);
    let mut idlest_pos = start;
    let mut best = i64::MAX;

    {
        let table = loads.lock();
        let mut pos = start;
        while pos <= last {
            let window_load: i64 = (pos..pos + stride)
                .map(|cpu| table.get(cpu).copied().unwrap_or(0))
                .sum();
            if window_load < best {
                best = window_load;
                idlest_pos = pos;
            }
            pos += stride;
        }
    }

    *mask = CpuMask::zero();
    for cpu in idlest_pos..idlest_pos + stride {
        mask.set(cpu);
    }
    Some(())
}

/// Finds the first `stride`-aligned window within `total` that is neither
/// fully set nor fully clear in `mask`. Windows are walked across `total`,
/// not across `mask`, so a window entirely outside `mask` never matches.
pub fn find_incomplete_set(total: &CpuMask, stride: usize, mask: &CpuMask) -> Option<usize> {
    debug_assert!(stride > 0);
    let first = total.first_set()?;
    let last = total.last_set().unwrap_or(first);

    let mut pos = first - (first % stride);
    while pos <= last {
        let mut in_window = 0usize;
        for cpu in pos..pos + stride {
            if mask.test(cpu) {
                in_window += 1;
            }
        }
        if in_window != 0 && in_window != stride {
            return Some(pos);
        }
        pos += stride;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idlest_core_picks_strict_minimum_first_wins() {
        let loads = LoadTable::new(8);
        let mut set = CpuMask::zero();
        set.set(0);
        loads.update(&set, true); // load up CPU 0 only

        let mask = CpuMask::with_first_n(4);
        assert_eq!(find_idlest_core(&loads, &mask), Some(1));
    }

    #[test]
    fn idlest_set_rounds_up_to_whole_window() {
        let loads = LoadTable::new(16);
        // CPUs 4..7 carry load, window 0..3 is idler.
        let mut busy = CpuMask::zero();
        for cpu in 4..8 {
            busy.set(cpu);
        }
        loads.update(&busy, true);

        let mut search = CpuMask::single(1); // only bit 1 set, stride 4
        find_idlest_set(&loads, 4, &mut search).unwrap();
        for cpu in 0..4 {
            assert!(search.test(cpu));
        }
        assert_eq!(search.count(), 4);
    }

    #[test]
    fn incomplete_set_detects_partial_window() {
        let total = CpuMask::with_first_n(8);
        let mut used = CpuMask::zero();
        used.set(0);
        used.set(1);
        // window [0,4) is partially used (2 of 4 bits), window [4,8) is empty.
        assert_eq!(find_incomplete_set(&total, 4, &used), Some(0));
    }

    #[test]
    fn incomplete_set_none_when_all_windows_whole() {
        let total = CpuMask::with_first_n(8);
        let used = CpuMask::zero();
        assert_eq!(find_incomplete_set(&total, 4, &used), None);
    }
}
