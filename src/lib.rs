//! Topology-aware thread placement and CPU affinity allocation.
//!
//! This crate provides a userspace [`Group`](group::Group) resource tree:
//! nested regions of CPUs, carved out topology-unit by topology-unit, that
//! place member threads onto the idlest available CPUs and keep a
//! process-wide [`LoadTable`](load::LoadTable) of who's pinned where. It is
//! the library form of the placement logic a NUMA-aware application would
//! otherwise hand-roll around `sched_setaffinity`.
//!
//! # Layout
//!
//! - [`cpumask`] -- fixed-capacity CPU bitset algebra.
//! - [`topology`] -- read-only hardware topology oracle (Linux sysfs or
//!   synthetic, for tests).
//! - [`load`] -- the process-wide per-CPU load table.
//! - [`placement`] -- the idlest-core / idlest-set / incomplete-set search
//!   primitives built on top of it.
//! - [`group`] -- the resource tree: [`GroupAttribute`](group::GroupAttribute),
//!   [`Group`](group::Group), and the add/delete/rearrange protocol.
//! - [`thread`] -- the managed [`Thread`](thread::Thread) type.
//! - [`binder`] -- the seam between placement decisions and the OS.
//! - [`managed`] -- the static `MANAGED_THREADS` map parser, for
//!   applications that want a fixed task-id to CPU mapping instead of a
//!   group tree.
//! - [`config`] -- process-wide configuration read from the environment.
//! - [`error`] -- the crate's error type.

pub mod binder;
pub mod config;
pub mod cpumask;
pub mod error;
pub mod group;
pub mod load;
pub mod managed;
pub mod placement;
pub mod thread;
pub mod topology;

pub use binder::{Binder, NullBinder};
pub use cpumask::CpuMask;
pub use error::{Result, WaycaError};
pub use group::{Group, GroupAttribute, GroupId};
pub use load::LoadTable;
pub use thread::{Thread, ThreadHandle};
pub use topology::{LinuxTopology, SyntheticTopology, TopoLevel, Topology};

#[cfg(target_os = "linux")]
pub use binder::LinuxBinder;
