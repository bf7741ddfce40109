//! Parsing the `MANAGED_THREADS` static placement map.
//!
//! Applications that don't want to build a [`crate::group::Group`] tree at
//! all can instead describe a fixed task-id -> CPU mapping once, up front,
//! as a single string (typically read from an environment variable) and
//! look affinities up by task id as threads are spawned. The grammar is
//! space-separated entries of the form:
//!
//! ```text
//! <task-ids>@c<cpu-ids>[$util]
//! <task-ids>@n<node-ids>[$util]
//! ```
//!
//! e.g. `"1,3@c1$1 2,4@n0-1$2"` binds tasks 1 and 3 to CPU 1 with a utilization
//! hint of 1, and tasks 2 and 4 to every CPU in NUMA nodes 0-1 with a hint of
//! 2. `c` entries give a literal CPU list; `n` entries give a node list that
//! is expanded to CPUs via the topology oracle.

use crate::cpumask::CpuMask;
use crate::error::{Result, WaycaError};
use crate::topology::Topology;

/// One entry of a parsed managed-thread map: which task ids it covers, the
/// CPUs they're bound to, and an optional scheduler utilization hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedMap {
    tasks: CpuMask,
    cpus: CpuMask,
    cpu_util: Option<u32>,
}

impl ManagedMap {
    /// Task ids this entry covers.
    pub fn tasks(&self) -> &CpuMask {
        &self.tasks
    }

    /// CPUs this entry's tasks are bound to.
    pub fn cpus(&self) -> &CpuMask {
        &self.cpus
    }

    /// The `$util` hint, if the entry carried one.
    pub fn cpu_util(&self) -> Option<u32> {
        self.cpu_util
    }
}

/// Parses a full `MANAGED_THREADS`-style map string into its entries.
///
/// `topo` is needed to expand `n`-prefixed node lists into CPU lists.
/// Returns an empty `Vec` for an empty or all-whitespace input, matching the
/// reference's tolerance for an unset environment variable.
pub fn parse_managed_threads(spec: &str, topo: &dyn Topology) -> Result<Vec<ManagedMap>> {
    spec.split_whitespace().map(|entry| parse_entry(entry, topo)).collect()
}

/// Looks up the CPU mask bound to `task_id`, if any entry covers it.
pub fn cpumask_for_task(maps: &[ManagedMap], task_id: usize) -> Option<&CpuMask> {
    maps.iter().find(|m| m.tasks.test(task_id)).map(|m| &m.cpus)
}

fn parse_entry(entry: &str, topo: &dyn Topology) -> Result<ManagedMap> {
    let (task_part, rest) = entry.split_once('@').ok_or_else(|| WaycaError::Parse {
        reason: format!("entry {entry:?} is missing '@'"),
    })?;
    let tasks = parse_id_list(task_part)?;

    let (selector, util_part) = match rest.split_once('$') {
        Some((selector, util)) => (selector, Some(util)),
        None => (rest, None),
    };
    let cpu_util = util_part
        .map(|u| {
            u.parse::<u32>().map_err(|_| WaycaError::Parse {
                reason: format!("invalid utilization hint {u:?} in entry {entry:?}"),
            })
        })
        .transpose()?;

    let mut chars = selector.chars();
    let kind = chars.next().ok_or_else(|| WaycaError::Parse {
        reason: format!("entry {entry:?} is missing a 'c' or 'n' selector"),
    })?;
    let list = chars.as_str();

    let cpus = match kind {
        'c' => parse_id_list(list)?,
        'n' => node_mask_to_cpu_mask(&parse_id_list(list)?, topo)?,
        other => {
            return Err(WaycaError::Parse {
                reason: format!("entry {entry:?} has unknown selector '{other}', expected 'c' or 'n'"),
            })
        }
    };

    Ok(ManagedMap { tasks, cpus, cpu_util })
}

/// Parses a comma-separated id list with `lo-hi` ranges (`"1,3,5-7"`) into a
/// bitset, reusing [`CpuMask`] as a generic fixed-capacity id set.
fn parse_id_list(list: &str) -> Result<CpuMask> {
    let mut mask = CpuMask::zero();
    for part in list.split(',') {
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: usize = lo.parse().map_err(|_| WaycaError::Parse {
                reason: format!("invalid range start in {part:?}"),
            })?;
            let hi: usize = hi.parse().map_err(|_| WaycaError::Parse {
                reason: format!("invalid range end in {part:?}"),
            })?;
            for id in lo..=hi {
                mask.set(id);
            }
        } else {
            let id: usize = part.parse().map_err(|_| WaycaError::Parse {
                reason: format!("invalid id {part:?}"),
            })?;
            mask.set(id);
        }
    }
    Ok(mask)
}

/// Expands a node-id bitset to the CPUs those nodes contain, assuming every
/// node has `topo.cores_in_node()` CPUs laid out contiguously.
fn node_mask_to_cpu_mask(nodes: &CpuMask, topo: &dyn Topology) -> Result<CpuMask> {
    let cores_per_node = topo.cores_in_node();
    let mut mask = CpuMask::zero();
    for node in nodes.iter() {
        for cpu in node * cores_per_node..(node + 1) * cores_per_node {
            mask.set(cpu);
        }
    }
    Ok(mask)
}
