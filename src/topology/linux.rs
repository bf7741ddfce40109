//! Linux topology discovery via `/sys/devices/system/{cpu,node}`.
//!
//! This mirrors, at a much smaller scope, what the C original's `topo.c`
//! does by walking `/sys/devices/system/cpu/cpu%d/topology/` and
//! `/sys/devices/system/node/node%d/cpulist`: the cluster-of-cores (CCL)
//! level isn't a first-class sysfs concept on most kernels, so it is
//! approximated from the last shared cache level below the NUMA node
//! (`cache/index*/shared_cpu_list`). Platforms where no cache index groups
//! fewer CPUs than a full node report CCL as unavailable, matching the
//! oracle's documented "CCL requested on a CCL-less platform" contract.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::cpumask::CpuMask;
use crate::error::{Result, WaycaError};

use super::Topology;

const CPU_ROOT: &str = "/sys/devices/system/cpu";
const NODE_ROOT: &str = "/sys/devices/system/node";

/// Topology discovered from the running Linux machine.
#[derive(Debug, Clone)]
pub struct LinuxTopology {
    total_cpus: usize,
    cores_per_node: usize,
    cores_per_ccl: Option<usize>,
    cores_per_package: usize,
}

impl LinuxTopology {
    /// Discovers the topology of the machine this process is running on.
    pub fn discover() -> Result<Self> {
        let cpu_ids = list_cpu_ids(CPU_ROOT)?;
        let total_cpus = cpu_ids.len();
        if total_cpus == 0 {
            return Err(WaycaError::TopologyUnavailable {
                reason: format!("no CPUs found under {CPU_ROOT}"),
            });
        }

        let cores_per_node = largest_cpulist_group(NODE_ROOT, "node")
            .unwrap_or(total_cpus)
            .max(1);

        let cores_per_ccl = smallest_shared_cache_group(total_cpus).filter(|&n| n < cores_per_node);

        let cores_per_package = largest_physical_package_group(&cpu_ids)
            .unwrap_or(total_cpus)
            .max(1);

        Ok(Self {
            total_cpus,
            cores_per_node,
            cores_per_ccl,
            cores_per_package,
        })
    }
}

impl Topology for LinuxTopology {
    fn cores_in_ccl(&self) -> Option<usize> {
        self.cores_per_ccl
    }

    fn cores_in_node(&self) -> usize {
        self.cores_per_node
    }

    fn cores_in_package(&self) -> usize {
        self.cores_per_package
    }

    fn cores_in_total(&self) -> usize {
        self.total_cpus
    }

    fn total_cpu_set(&self) -> CpuMask {
        CpuMask::with_first_n(self.total_cpus)
    }
}

fn list_cpu_ids(root: &str) -> Result<Vec<usize>> {
    let mut ids = Vec::new();
    let entries = fs::read_dir(root).map_err(|e| WaycaError::TopologyUnavailable {
        reason: format!("reading {root}: {e}"),
    })?;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(rest) = name.strip_prefix("cpu") {
            if let Ok(id) = rest.parse::<usize>() {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Parses a `cpulist` file (`"0-3,8,10-11"`) into a [`CpuMask`].
fn parse_cpulist(contents: &str) -> CpuMask {
    let mut mask = CpuMask::zero();
    for part in contents.trim().split(',') {
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            if let (Ok(lo), Ok(hi)) = (lo.parse::<usize>(), hi.parse::<usize>()) {
                for cpu in lo..=hi {
                    mask.set(cpu);
                }
            }
        } else if let Ok(cpu) = part.parse::<usize>() {
            mask.set(cpu);
        }
    }
    mask
}

/// Finds the largest group size reported by a family of `node%d/cpulist` (or
/// similarly-shaped) files directly under `root`.
fn largest_cpulist_group(root: &str, prefix: &str) -> Option<usize> {
    let mut best = None;
    for entry in fs::read_dir(root).ok()?.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(prefix) {
            continue;
        }
        let cpulist = entry.path().join("cpulist");
        if let Ok(contents) = fs::read_to_string(&cpulist) {
            let count = parse_cpulist(&contents).count();
            if count > 0 {
                best = Some(best.map_or(count, |b: usize| b.max(count)));
            }
        }
    }
    best
}

/// Finds the largest group size among `cpu%d/topology/physical_package_id`
/// values across `cpu_ids`, i.e. how many CPUs share the most populous
/// package id. CPUs whose file is missing or unparsable are skipped; returns
/// `None` if no CPU yielded a usable id.
fn largest_physical_package_group(cpu_ids: &[usize]) -> Option<usize> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &cpu in cpu_ids {
        let path = Path::new(CPU_ROOT).join(format!("cpu{cpu}")).join("topology").join("physical_package_id");
        let Ok(contents) = fs::read_to_string(&path) else { continue };
        let Ok(package_id) = contents.trim().parse::<usize>() else { continue };
        *counts.entry(package_id).or_insert(0) += 1;
    }
    counts.into_values().max()
}

/// Approximates CCL size as the smallest non-trivial `shared_cpu_list`
/// reported by any cache index on CPU 0, on the theory that the
/// finest-grained shared cache below the NUMA node boundary demarcates a
/// cluster of cores.
fn smallest_shared_cache_group(total_cpus: usize) -> Option<usize> {
    let cache_root = Path::new(CPU_ROOT).join("cpu0").join("cache");
    let entries = fs::read_dir(&cache_root).ok()?;

    let mut sizes = BTreeSet::new();
    for entry in entries.flatten() {
        let shared = entry.path().join("shared_cpu_list");
        if let Ok(contents) = fs::read_to_string(&shared) {
            let count = parse_cpulist(&contents).count();
            if count > 0 && count < total_cpus {
                sizes.insert(count);
            }
        }
    }
    sizes.into_iter().next()
}
