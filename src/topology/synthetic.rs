//! A builder for arbitrary, made-up topologies.
//!
//! Used by integration tests and the demo binary so the end-to-end
//! placement scenarios don't depend on the machine actually running them.

use crate::cpumask::CpuMask;
use crate::error::{Result, WaycaError};

use super::Topology;

/// A synthetic, uniform topology: every package has the same number of
/// nodes, every node the same number of CCLs, every CCL the same number of
/// cores.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticTopology {
    cores_per_ccl: usize,
    ccls_per_node: usize,
    nodes_per_package: usize,
    packages: usize,
}

impl SyntheticTopology {
    /// Builds a topology from its per-level multipliers.
    ///
    /// The scenario used throughout this crate's tests -- 64 CPUs, 4 NUMA
    /// nodes of 16 CPUs, 4 CCLs of 4 CPUs each per node, all under one
    /// package -- is `SyntheticTopology::new(4, 4, 4, 1)`.
    pub fn new(
        cores_per_ccl: usize,
        ccls_per_node: usize,
        nodes_per_package: usize,
        packages: usize,
    ) -> Self {
        Self {
            cores_per_ccl,
            ccls_per_node,
            nodes_per_package,
            packages,
        }
    }

    fn cores_in_node(&self) -> usize {
        self.cores_per_ccl * self.ccls_per_node
    }

    fn cores_in_package(&self) -> usize {
        self.cores_in_node() * self.nodes_per_package
    }

    fn cores_in_total(&self) -> usize {
        self.cores_in_package() * self.packages
    }

    /// Parses a descriptor of the form
    /// `"cores_per_ccl,ccls_per_node,nodes_per_package,packages"`, the format
    /// read from a `WAYCA_SYNTHETIC_TOPOLOGY` file by the demo binary and
    /// integration harnesses. Leading/trailing whitespace and blank lines
    /// are ignored so the file can carry a trailing newline.
    pub fn from_descriptor(contents: &str) -> Result<Self> {
        let line = contents
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| WaycaError::Parse {
                reason: "synthetic topology descriptor is empty".into(),
            })?;

        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let [cores_per_ccl, ccls_per_node, nodes_per_package, packages] = parts.as_slice() else {
            return Err(WaycaError::Parse {
                reason: format!(
                    "synthetic topology descriptor {line:?} must have exactly 4 comma-separated fields"
                ),
            });
        };
        let parse = |field: &str| {
            field.parse::<usize>().map_err(|_| WaycaError::Parse {
                reason: format!("invalid field {field:?} in synthetic topology descriptor {line:?}"),
            })
        };

        Ok(Self::new(parse(cores_per_ccl)?, parse(ccls_per_node)?, parse(nodes_per_package)?, parse(packages)?))
    }
}

impl Topology for SyntheticTopology {
    fn cores_in_ccl(&self) -> Option<usize> {
        if self.cores_per_ccl == 0 {
            None
        } else {
            Some(self.cores_per_ccl)
        }
    }

    fn cores_in_node(&self) -> usize {
        self.cores_in_node()
    }

    fn cores_in_package(&self) -> usize {
        self.cores_in_package()
    }

    fn cores_in_total(&self) -> usize {
        self.cores_in_total()
    }

    fn total_cpu_set(&self) -> CpuMask {
        CpuMask::with_first_n(self.cores_in_total())
    }
}

/// A synthetic topology with no cluster-of-cores level, for exercising the
/// "CCL requested on a CCL-less platform" failure path.
impl SyntheticTopology {
    /// Like [`SyntheticTopology::new`] but with CCL reporting disabled.
    pub fn without_ccl(ccls_per_node: usize, nodes_per_package: usize, packages: usize) -> Self {
        Self::new(0, ccls_per_node, nodes_per_package, packages)
    }
}
