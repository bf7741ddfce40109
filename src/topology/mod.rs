//! Read-only hardware topology oracle.
//!
//! The allocator never probes hardware itself -- it is handed a `&dyn
//! Topology` at every entry point that needs one. Two implementations ship:
//! [`linux::LinuxTopology`], which discovers the real machine from `/sys`,
//! and [`synthetic::SyntheticTopology`], a builder used by tests and the
//! demo binary to exercise arbitrary hierarchies without touching the OS.

mod linux;
mod synthetic;

pub use linux::LinuxTopology;
pub use synthetic::SyntheticTopology;

use crate::cpumask::CpuMask;
use crate::error::Result;

/// Topology levels a group can be anchored to. Exactly one is carried in a
/// [`crate::group::GroupAttribute`] bit-flag value at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopoLevel {
    /// One hardware thread.
    Cpu,
    /// A cluster of cores (CCL) sharing a last-level intra-node cache.
    Ccl,
    /// A NUMA node.
    Numa,
    /// A physical package (socket).
    Package,
    /// The whole machine.
    All,
}

/// Read-only hardware topology oracle.
///
/// Implementations are immutable after construction: the machine's topology
/// does not change for the lifetime of the process.
pub trait Topology: Send + Sync {
    /// CPUs sharing a CCL, or `None` on platforms without cluster topology.
    fn cores_in_ccl(&self) -> Option<usize>;

    /// CPUs in a NUMA node.
    fn cores_in_node(&self) -> usize;

    /// CPUs in a package (socket).
    fn cores_in_package(&self) -> usize;

    /// Total CPUs in the system.
    fn cores_in_total(&self) -> usize;

    /// The full CPU mask of the machine; becomes a root group's `total`.
    fn total_cpu_set(&self) -> CpuMask;

    /// Resolves a [`TopoLevel`] to a concrete CPU count, or an error if the
    /// level is unavailable on this platform (only possible for `Ccl`).
    fn cpus_per_topo(&self, level: TopoLevel) -> Result<usize> {
        use crate::error::WaycaError;

        Ok(match level {
            TopoLevel::Cpu => 1,
            TopoLevel::Ccl => self.cores_in_ccl().ok_or_else(|| WaycaError::TopologyUnavailable {
                reason: "this platform has no cluster-of-cores (CCL) topology level".into(),
            })?,
            TopoLevel::Numa => self.cores_in_node(),
            TopoLevel::Package => self.cores_in_package(),
            TopoLevel::All => self.cores_in_total(),
        })
    }
}
