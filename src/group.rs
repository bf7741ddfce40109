//! The group resource allocator and placement algorithm.
//!
//! A [`Group`] is one node of the scheduling-group tree: it owns a region of
//! CPUs (`total`), tracks how much of that region is currently reserved
//! (`used`, `roll_over_cnts`), and places member [`Thread`]s inside it
//! according to its [`GroupAttribute`]. Nested groups carve disjoint
//! territory out of their parent via [`Group::add_group`] /
//! [`request_resource_from_parent`].
//!
//! Groups do not hold live references to their parent or children -- the
//! tree shape is tracked only as [`GroupId`] membership lists, and every
//! operation that needs to touch two groups at once (`add_group`,
//! `delete_group`, `rearrange`) takes the relevant groups as explicit
//! `&mut Group` parameters supplied by the caller. This keeps the type
//! entirely safe-Rust and `Send`-able without `Rc<RefCell<_>>` or unsafe
//! back-pointers; see DESIGN.md for why this departs from the reference's
//! intrusive, back-pointer-carrying linked lists.

use core::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use log::{debug, info, warn};

use crate::binder::Binder;
use crate::cpumask::CpuMask;
use crate::error::{Result, WaycaError};
use crate::load::LoadTable;
use crate::placement::{find_idlest_core, find_idlest_set, find_incomplete_set};
use crate::thread::{Thread, ThreadHandle};
use crate::topology::{TopoLevel, Topology};

bitflags! {
    /// Placement policy for a [`Group`]: OR-combine a topology-level flag
    /// with `COMPACT`/`PERCPU` as needed. Exactly one topology-level flag
    /// must be set; [`GroupAttribute::topo_level`] validates this.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GroupAttribute: u32 {
        /// One hardware thread per topology unit.
        const CPU     = 1 << 0;
        /// A cluster of cores (CCL).
        const CCL     = 1 << 1;
        /// A NUMA node.
        const NUMA    = 1 << 2;
        /// A physical package.
        const PACKAGE = 1 << 3;
        /// The whole machine.
        const ALL     = 1 << 4;
        /// Pack threads into the smallest possible region (stride 1).
        /// Absence means SCATTER: spread across distinct topology windows.
        const COMPACT = 1 << 16;
        /// Bind each thread to a single CPU. Absence means PERSET: bind
        /// each thread to a whole topology window.
        const PERCPU  = 1 << 17;
    }
}

impl Default for GroupAttribute {
    /// `CCL | COMPACT | PERCPU`, matching the reference's first-init
    /// defaults.
    fn default() -> Self {
        GroupAttribute::CCL | GroupAttribute::COMPACT | GroupAttribute::PERCPU
    }
}

impl GroupAttribute {
    /// Resolves the single topology-level flag carried in the low bits.
    ///
    /// Errors if zero or more than one of `CPU`/`CCL`/`NUMA`/`PACKAGE`/`ALL`
    /// is set.
    pub fn topo_level(&self) -> Result<TopoLevel> {
        const LEVELS: [(GroupAttribute, TopoLevel); 5] = [
            (GroupAttribute::CPU, TopoLevel::Cpu),
            (GroupAttribute::CCL, TopoLevel::Ccl),
            (GroupAttribute::NUMA, TopoLevel::Numa),
            (GroupAttribute::PACKAGE, TopoLevel::Package),
            (GroupAttribute::ALL, TopoLevel::All),
        ];

        let mut found = None;
        for (flag, level) in LEVELS {
            if self.contains(flag) {
                if found.is_some() {
                    return Err(WaycaError::InvalidArgument {
                        reason: "more than one topology-level flag set".into(),
                    });
                }
                found = Some(level);
            }
        }
        found.ok_or_else(|| WaycaError::InvalidArgument {
            reason: "no topology-level flag set (need one of CPU/CCL/NUMA/PACKAGE/ALL)".into(),
        })
    }
}

/// Opaque identifier for a [`Group`], assigned at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(u64);

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

impl GroupId {
    fn next() -> Self {
        Self(NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One node of the scheduling-group tree.
pub struct Group {
    id: GroupId,
    attribute: GroupAttribute,
    nr_cpus_per_topo: usize,
    /// Distance between consecutive thread placements. Computed for parity
    /// with the reference data model; the placement primitives themselves
    /// use `nr_cpus_per_topo` as their window size (see `assign_thread_resource`).
    stride: usize,
    total: CpuMask,
    used: CpuMask,
    roll_over_cnts: u32,
    nr_groups: usize,
    /// Reserved placement hint, unused by the core algorithm; preserved
    /// verbatim for forward compatibility with the reference design.
    topo_hint: i32,
    threads: Vec<Thread>,
    child_ids: Vec<GroupId>,
    parent_id: Option<GroupId>,
}

impl Group {
    fn bare(attribute: GroupAttribute) -> Self {
        Self {
            id: GroupId::next(),
            attribute,
            nr_cpus_per_topo: 0,
            stride: 0,
            total: CpuMask::zero(),
            used: CpuMask::zero(),
            roll_over_cnts: 0,
            nr_groups: 0,
            topo_hint: -1,
            threads: Vec::new(),
            child_ids: Vec::new(),
            parent_id: None,
        }
    }

    /// Constructs a new root group and immediately requests its resources.
    ///
    /// A freshly constructed group always starts out parentless, exactly
    /// like the reference's `wayca_group_init`: its `total` is the whole
    /// machine until (and unless) it is attached under a parent with
    /// [`Group::add_group`], which re-derives `total` from the parent.
    pub fn new(attribute: GroupAttribute, topo: &dyn Topology) -> Result<Self> {
        let mut group = Self::bare(attribute);
        group.compute_topology_params(topo)?;
        group.total = topo.total_cpu_set();
        debug!(
            "group {:?} constructed: attribute={attribute:?}, {} cpus/window, {} total cpus",
            group.id,
            group.nr_cpus_per_topo,
            group.total.count()
        );
        Ok(group)
    }

    fn compute_topology_params(&mut self, topo: &dyn Topology) -> Result<()> {
        let level = self.attribute.topo_level()?;
        self.nr_cpus_per_topo = topo.cpus_per_topo(level)?;
        self.stride = if self.attribute.contains(GroupAttribute::COMPACT) {
            1
        } else {
            self.nr_cpus_per_topo
        };
        Ok(())
    }

    /// This group's opaque id.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Current placement attribute.
    pub fn attribute(&self) -> GroupAttribute {
        self.attribute
    }

    /// CPUs per topology unit this group is anchored to.
    pub fn nr_cpus_per_topo(&self) -> usize {
        self.nr_cpus_per_topo
    }

    /// Distance between consecutive thread placements (1 if COMPACT).
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The full CPU region owned by this group.
    pub fn total(&self) -> &CpuMask {
        &self.total
    }

    /// The currently-reserved subset of `total`.
    pub fn used(&self) -> &CpuMask {
        &self.used
    }

    /// Number of times `used` has wrapped back to empty.
    pub fn roll_over_cnts(&self) -> u32 {
        self.roll_over_cnts
    }

    /// Number of member threads.
    pub fn nr_threads(&self) -> usize {
        self.threads.len()
    }

    /// Number of attached child groups.
    pub fn nr_groups(&self) -> usize {
        self.nr_groups
    }

    /// Reserved placement hint, preserved verbatim; unused by this crate.
    pub fn topo_hint(&self) -> i32 {
        self.topo_hint
    }

    /// Sets the reserved placement hint.
    pub fn set_topo_hint(&mut self, hint: i32) {
        self.topo_hint = hint;
    }

    /// Member threads, in insertion order (the order rearrangement
    /// re-places them in).
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    /// Changes this group's placement attribute. Does not take effect until
    /// [`Group::rearrange`] is called.
    pub fn set_attribute(&mut self, attribute: GroupAttribute) {
        self.attribute = attribute;
    }

    /// Adds a thread to this group, placing it with
    /// [`assign_thread_resource`](Self::assign_thread_resource), binding it
    /// through `binder`, and recording its load. If the binder rejects the
    /// placement, the thread is not added and the load table is untouched.
    pub fn add_thread(
        &mut self,
        mut thread: Thread,
        loads: &LoadTable,
        binder: &dyn Binder,
    ) -> Result<ThreadHandle> {
        self.assign_thread_resource(&mut thread, loads)?;
        if let Err(err) = binder.set_affinity(thread.pid(), thread.cur_set()) {
            warn!("group {:?}: failed to bind pid {} to {:?}: {err}", self.id, thread.pid(), thread.cur_set());
            return Err(err);
        }
        loads.update(thread.cur_set(), true);

        thread.group = Some(self.id);
        let handle = thread.handle();
        self.threads.push(thread);
        Ok(handle)
    }

    /// Removes a thread from this group, reclaiming its reservation and
    /// withdrawing its load contribution.
    ///
    /// For COMPACT groups this reclaims the thread's whole `allowed_set`
    /// even though only one bit of `used` was ever set on its behalf -- an
    /// asymmetry inherited from the reference design and intentionally
    /// preserved; see `compact_mode_roundtrip_asymmetry` in the test module.
    pub fn delete_thread(&mut self, handle: ThreadHandle, loads: &LoadTable) -> Result<Thread> {
        let idx = self
            .threads
            .iter()
            .position(|t| t.handle() == handle)
            .ok_or_else(|| WaycaError::NotFound {
                reason: "thread is not a member of this group".into(),
            })?;

        if self.used.is_empty() {
            debug_assert!(
                self.roll_over_cnts > 0,
                "roll_over_cnts underflow: used is empty but no roll-over is outstanding"
            );
            self.roll_over_cnts = self.roll_over_cnts.saturating_sub(1);
            self.used = self.total;
        }

        let mut thread = self.threads.remove(idx);
        self.used.xor(thread.allowed_set());
        loads.update(thread.cur_set(), false);
        thread.group = None;
        Ok(thread)
    }

    /// Attaches `child` under `parent`, carving out its `total` from the
    /// parent's available region and placing any existing member threads.
    ///
    /// A no-op returning `Ok(())` if `child` is already a child of
    /// `parent`. Fails if `child`'s topology level is not strictly finer
    /// than `parent`'s. Rolls back the attachment entirely if rearranging
    /// the child fails.
    pub fn add_group(
        child: &mut Group,
        parent: &mut Group,
        topo: &dyn Topology,
        loads: &LoadTable,
        binder: &dyn Binder,
    ) -> Result<()> {
        if parent.child_ids.contains(&child.id) {
            return Ok(());
        }
        if child.nr_cpus_per_topo >= parent.nr_cpus_per_topo {
            return Err(WaycaError::InvalidArgument {
                reason: format!(
                    "child topology unit ({} cpus) is not strictly finer than parent's ({} cpus)",
                    child.nr_cpus_per_topo, parent.nr_cpus_per_topo
                ),
            });
        }

        parent.nr_groups += 1;
        parent.child_ids.push(child.id);
        child.parent_id = Some(parent.id);

        if let Err(err) = child.rearrange(topo, Some(&mut *parent), loads, binder) {
            parent.child_ids.retain(|id| *id != child.id);
            parent.nr_groups -= 1;
            child.parent_id = None;
            return Err(err);
        }

        Ok(())
    }

    /// Detaches `child` from `parent`, reclaiming the CPU region it held.
    pub fn delete_group(child: &mut Group, parent: &mut Group) -> Result<()> {
        if !parent.child_ids.contains(&child.id) {
            return Err(WaycaError::NotFound {
                reason: "group is not a child of this parent".into(),
            });
        }

        if parent.used.is_empty() {
            debug_assert!(
                parent.roll_over_cnts > 0,
                "roll_over_cnts underflow: used is empty but no roll-over is outstanding"
            );
            parent.roll_over_cnts = parent.roll_over_cnts.saturating_sub(1);
            parent.used = parent.total;
        }
        parent.used.xor(&child.total);

        parent.child_ids.retain(|id| *id != child.id);
        parent.nr_groups -= 1;
        child.parent_id = None;
        Ok(())
    }

    /// Rebuilds this group's placement: recomputes `nr_cpus_per_topo` /
    /// `stride` / `total` from the current attribute, clears `used` and
    /// `roll_over_cnts`, then re-places every member thread in list order --
    /// withdrawing its old load, re-running placement, re-binding, and
    /// re-adding its load, one thread at a time.
    ///
    /// `parent` must be `Some` iff this group currently has a parent
    /// (i.e. was attached via [`Group::add_group`]), and must be the same
    /// group it was attached to.
    pub fn rearrange(
        &mut self,
        topo: &dyn Topology,
        parent: Option<&mut Group>,
        loads: &LoadTable,
        binder: &dyn Binder,
    ) -> Result<()> {
        let parent_matches = match (parent.as_ref().map(|p| p.id), self.parent_id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        };
        if !parent_matches {
            return Err(WaycaError::InvalidArgument {
                reason: "parent argument does not match this group's recorded parent".into(),
            });
        }

        self.compute_topology_params(topo)?;
        match parent {
            None => self.total = topo.total_cpu_set(),
            Some(parent) => {
                let required = if self.threads.is_empty() { 4 } else { self.threads.len() };
                self.total = request_resource_from_parent(parent, required, loads)?;
            }
        }

        self.used = CpuMask::zero();
        self.roll_over_cnts = 0;
        info!(
            "group {:?} rearranging: attribute={:?}, {} threads, new region {:?}",
            self.id,
            self.attribute,
            self.threads.len(),
            self.total
        );

        let mut threads = core::mem::take(&mut self.threads);
        for thread in threads.iter_mut() {
            loads.update(thread.cur_set(), false);
            thread.clear_placement();
            self.assign_thread_resource(thread, loads)?;
            if let Err(err) = binder.set_affinity(thread.pid(), thread.cur_set()) {
                warn!(
                    "group {:?}: failed to rebind pid {} to {:?} during rearrange: {err}",
                    self.id,
                    thread.pid(),
                    thread.cur_set()
                );
                self.threads = threads;
                return Err(err);
            }
            loads.update(thread.cur_set(), true);
        }
        self.threads = threads;

        Ok(())
    }

    /// Places a single thread inside this group's available CPUs, updating
    /// `self.used`/`self.roll_over_cnts` but not touching the load table,
    /// the binder, or the member list -- callers (`add_thread`, `rearrange`)
    /// handle those.
    fn assign_thread_resource(&mut self, thread: &mut Thread, loads: &LoadTable) -> Result<()> {
        let mut available = self.used.complement();
        available.and(&self.total);

        let compact = self.attribute.contains(GroupAttribute::COMPACT);
        let percpu = self.attribute.contains(GroupAttribute::PERCPU);

        let target_pos = if compact && available.count() % self.nr_cpus_per_topo != 0 {
            // A partially-filled window exists; keep compact groups packed
            // into it before opening a new one.
            let anchor = find_incomplete_set(&self.total, self.nr_cpus_per_topo, &available)
                .ok_or_else(|| WaycaError::ResourceExhausted {
                    reason: "compact group has no incomplete topology window to fill".into(),
                })?;
            let mut pos = anchor;
            while pos < anchor + self.nr_cpus_per_topo && !available.test(pos) {
                pos += 1;
            }
            pos
        } else {
            let mut window = available;
            find_idlest_set(loads, self.nr_cpus_per_topo, &mut window).ok_or_else(|| {
                WaycaError::ResourceExhausted {
                    reason: "group has no available CPUs left to place a thread".into(),
                }
            })?;
            find_idlest_core(loads, &window).ok_or_else(|| WaycaError::ResourceExhausted {
                reason: "group has no available CPUs left to place a thread".into(),
            })?
        };

        let anchor = target_pos - target_pos % self.nr_cpus_per_topo;

        thread.clear_placement();
        if percpu {
            thread.cur_set.set(target_pos);
            thread.allowed_set.set(target_pos);
        } else {
            for cpu in anchor..anchor + self.nr_cpus_per_topo {
                thread.cur_set.set(cpu);
                thread.allowed_set.set(cpu);
            }
        }

        if compact {
            self.used.set(target_pos);
        } else if percpu {
            for cpu in anchor..anchor + self.nr_cpus_per_topo {
                self.used.set(cpu);
            }
        } else {
            self.used.or(thread.allowed_set());
        }

        if self.used == self.total {
            self.used = CpuMask::zero();
            self.roll_over_cnts += 1;
            info!("group {:?} exhausted its region, rolling over (count={})", self.id, self.roll_over_cnts);
        }

        Ok(())
    }
}

/// Carves a `required`-CPU region out of `parent`'s available window and
/// reserves it, rolling `parent.used` / `parent.roll_over_cnts` over if the
/// reservation exactly exhausts `parent.total`.
///
/// A child can never ask for more CPUs than fit in one parent topology
/// window -- nested groups must always be a strict topology refinement, so
/// `required` is always satisfied by a single window (the
/// `windows_needed = ceil(required / parent.nr_cpus_per_topo)` step from the
/// reference is always `1` given that constraint and is not a separate code
/// path here).
fn request_resource_from_parent(
    parent: &mut Group,
    required: usize,
    loads: &LoadTable,
) -> Result<CpuMask> {
    if required == 0 || required > parent.nr_cpus_per_topo {
        return Err(WaycaError::InvalidArgument {
            reason: format!(
                "child requires {required} cpus but parent's topology unit only holds {}",
                parent.nr_cpus_per_topo
            ),
        });
    }
    if parent.used == parent.total {
        return Err(WaycaError::ResourceExhausted {
            reason: "parent group is fully reserved".into(),
        });
    }

    let mut available = parent.used.complement();
    available.and(&parent.total);
    find_idlest_set(loads, parent.nr_cpus_per_topo, &mut available).ok_or_else(|| {
        WaycaError::ResourceExhausted {
            reason: "parent group has no available window to hand out".into(),
        }
    })?;

    parent.used.or(&available);
    if parent.used == parent.total {
        parent.roll_over_cnts += 1;
        parent.used = CpuMask::zero();
        info!(
            "parent group {:?} exhausted its region handing out a child window, rolling over (count={})",
            parent.id, parent.roll_over_cnts
        );
    }

    Ok(available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::NullBinder;
    use crate::topology::SyntheticTopology;

    fn topo_64() -> SyntheticTopology {
        // 64 CPUs, 4 NUMA nodes of 16, 4 CCLs of 4 per node.
        SyntheticTopology::new(4, 4, 4, 1)
    }

    #[test]
    fn root_group_owns_whole_machine() {
        let topo = topo_64();
        let group = Group::new(GroupAttribute::default(), &topo).unwrap();
        assert_eq!(group.total().count(), 64);
        assert!(group.used().is_empty());
        assert_eq!(group.roll_over_cnts(), 0);
    }

    #[test]
    fn scenario_cpu_compact_percpu_eight_threads() {
        let topo = topo_64();
        let loads = LoadTable::new(topo.cores_in_total());
        let binder = NullBinder::new();
        let mut root =
            Group::new(GroupAttribute::CPU | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo)
                .unwrap();

        let mut handles = Vec::new();
        for pid in 0..8 {
            let handle = root.add_thread(Thread::new(pid), &loads, &binder).unwrap();
            handles.push(handle);
        }

        for (i, thread) in root.threads().iter().enumerate() {
            assert_eq!(thread.cur_set().count(), 1);
            assert!(thread.cur_set().test(i));
        }
        // Each thread is pinned to a single CPU out of 64, so its load
        // share is the full ceil(64 / 1).
        for cpu in 0..8 {
            assert_eq!(loads.load_of(cpu), 64);
        }
        for cpu in 8..64 {
            assert_eq!(loads.load_of(cpu), 0);
        }

        let victim = handles[3];
        root.delete_thread(victim, &loads).unwrap();
        assert_eq!(loads.load_of(3), 0);
    }

    #[test]
    fn nested_group_carves_region_from_parent() {
        let topo = topo_64();
        let loads = LoadTable::new(topo.cores_in_total());
        let binder = NullBinder::new();

        let mut root =
            Group::new(GroupAttribute::CCL | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo)
                .unwrap();
        let mut child =
            Group::new(GroupAttribute::CPU | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo)
                .unwrap();

        Group::add_group(&mut child, &mut root, &topo, &loads, &binder).unwrap();

        assert_eq!(root.nr_groups(), 1);
        assert_eq!(child.total().count(), 4); // one CCL-sized window, the empty-group fallback request
        assert!(child.total().is_subset_of(root.total()));
        assert!(!root.used().is_empty());
    }

    #[test]
    fn scenario_numa_scatter_percpu_strides_by_node() {
        let topo = topo_64();
        let loads = LoadTable::new(topo.cores_in_total());
        let binder = NullBinder::new();
        let mut root = Group::new(
            GroupAttribute::NUMA | GroupAttribute::PERCPU, // SCATTER: no COMPACT
            &topo,
        )
        .unwrap();

        let mut placements = Vec::new();
        for pid in 0..4 {
            root.add_thread(Thread::new(pid), &loads, &binder).unwrap();
            placements.push(root.threads().last().unwrap().cur_set().first_set().unwrap());
        }
        assert_eq!(placements, vec![0, 16, 32, 48]);
    }

    #[test]
    fn scenario_ccl_compact_perset_two_threads() {
        // CCL+COMPACT+PERSET: each thread is bound to a whole 4-cpu window,
        // but the compact branch only ever marks the *target position* in
        // `used`, not the whole window (see `compact_mode_roundtrip_asymmetry`
        // below). The first thread's window [0,4) is therefore never fully
        // marked used, so the second thread re-discovers it as an incomplete
        // window via `find_incomplete_set` and lands on the very same
        // CPUs 0-3, not a fresh window at 4-7 -- this is a direct
        // consequence of `group.c`'s own accounting and is preserved as-is
        // rather than "fixed" to spread threads across distinct windows; see
        // DESIGN.md.
        let topo = topo_64();
        let loads = LoadTable::new(topo.cores_in_total());
        let binder = NullBinder::new();
        let mut root =
            Group::new(GroupAttribute::CCL | GroupAttribute::COMPACT, &topo).unwrap(); // PERSET

        root.add_thread(Thread::new(1), &loads, &binder).unwrap();
        root.add_thread(Thread::new(2), &loads, &binder).unwrap();

        assert_eq!(root.threads().len(), 2);
        for thread in root.threads() {
            let placed = thread.cur_set();
            assert_eq!(placed.count(), 4);
            for cpu in 0..4 {
                assert!(placed.test(cpu));
            }
            for cpu in 4..64 {
                assert!(!placed.test(cpu));
            }
        }
        // Both placements only ever touched target positions 0 and 1 in
        // `used`, not the 8 cpus the two windows would cover if the
        // accounting round-tripped cleanly.
        assert_eq!(root.used().count(), 2);
    }

    #[test]
    fn scenario_roll_over_wraps_and_counts() {
        let topo = topo_64();
        let loads = LoadTable::new(topo.cores_in_total());
        let binder = NullBinder::new();
        let mut root =
            Group::new(GroupAttribute::CCL | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo)
                .unwrap();

        for pid in 0..64 {
            root.add_thread(Thread::new(pid), &loads, &binder).unwrap();
        }
        assert_eq!(root.roll_over_cnts(), 1);
        assert!(root.used().is_empty());

        root.add_thread(Thread::new(64), &loads, &binder).unwrap();
        assert_eq!(root.threads().last().unwrap().cur_set().first_set(), Some(0));
    }

    #[test]
    fn scenario_rearrange_changes_placement_and_conserves_load() {
        let topo = topo_64();
        let loads = LoadTable::new(topo.cores_in_total());
        let binder = NullBinder::new();
        let mut root =
            Group::new(GroupAttribute::CPU | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo)
                .unwrap();

        for pid in 0..4 {
            root.add_thread(Thread::new(pid), &loads, &binder).unwrap();
        }
        for cpu in 0..4 {
            assert_eq!(loads.load_of(cpu), 64);
        }
        let total_load_before: i64 = (0..64).map(|cpu| loads.load_of(cpu)).sum();

        let root_id = root.id();
        root.set_attribute(GroupAttribute::NUMA | GroupAttribute::PERCPU); // now SCATTER
        root.rearrange(&topo, None, &loads, &binder).unwrap();

        // PERCPU is preserved across the attribute change: every thread is
        // still bound to exactly one CPU, just re-placed under the new
        // topology level. Its group membership is untouched by rearranging.
        for thread in root.threads() {
            assert_eq!(thread.cur_set().count(), 1);
            assert_eq!(thread.group(), Some(root_id));
        }
        // Rearranging withdraws every thread's old load before re-adding it
        // at its new placement -- the total never changes.
        let total_load_after: i64 = (0..64).map(|cpu| loads.load_of(cpu)).sum();
        assert_eq!(total_load_before, total_load_after);
    }

    #[test]
    fn add_group_is_idempotent() {
        let topo = topo_64();
        let loads = LoadTable::new(topo.cores_in_total());
        let binder = NullBinder::new();
        let mut root =
            Group::new(GroupAttribute::CCL | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo)
                .unwrap();
        let mut child =
            Group::new(GroupAttribute::CPU | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo)
                .unwrap();

        Group::add_group(&mut child, &mut root, &topo, &loads, &binder).unwrap();
        assert_eq!(root.nr_groups(), 1);

        Group::add_group(&mut child, &mut root, &topo, &loads, &binder).unwrap();
        assert_eq!(root.nr_groups(), 1);
    }

    #[test]
    fn add_group_rejects_non_finer_child() {
        let topo = topo_64();
        let loads = LoadTable::new(topo.cores_in_total());
        let binder = NullBinder::new();
        let mut root =
            Group::new(GroupAttribute::NUMA | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo)
                .unwrap();
        let mut child =
            Group::new(GroupAttribute::PACKAGE | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo)
                .unwrap();

        let result = Group::add_group(&mut child, &mut root, &topo, &loads, &binder);
        assert!(result.is_err());
        assert_eq!(root.nr_groups(), 0);
    }

    #[test]
    fn delete_group_reclaims_parent_region() {
        let topo = topo_64();
        let loads = LoadTable::new(topo.cores_in_total());
        let binder = NullBinder::new();
        let mut root =
            Group::new(GroupAttribute::CCL | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo)
                .unwrap();
        let mut child =
            Group::new(GroupAttribute::CPU | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo)
                .unwrap();

        Group::add_group(&mut child, &mut root, &topo, &loads, &binder).unwrap();
        assert!(!root.used().is_empty());

        Group::delete_group(&mut child, &mut root).unwrap();
        assert!(root.used().is_empty());
        assert_eq!(root.nr_groups(), 0);
    }

    #[test]
    fn thread_group_back_reference_tracks_membership() {
        let topo = topo_64();
        let loads = LoadTable::new(topo.cores_in_total());
        let binder = NullBinder::new();
        let mut root =
            Group::new(GroupAttribute::CPU | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo)
                .unwrap();

        let handle = root.add_thread(Thread::new(1), &loads, &binder).unwrap();
        let thread = root.threads().iter().find(|t| t.handle() == handle).unwrap();
        assert_eq!(thread.group(), Some(root.id()));

        let removed = root.delete_thread(handle, &loads).unwrap();
        assert_eq!(removed.group(), None);
    }

    #[test]
    fn compact_mode_roundtrip_asymmetry() {
        // Documented reference behaviour: assign_thread_resource only sets
        // the single target bit in `used` for a COMPACT PERSET thread, but
        // delete_thread XORs the *whole* allowed_set. When a thread's
        // allowed_set spans more than one bit (PERSET), this produces
        // visible skew rather than a clean round-trip.
        let topo = topo_64();
        let loads = LoadTable::new(topo.cores_in_total());
        let binder = NullBinder::new();
        let mut root = Group::new(GroupAttribute::CCL | GroupAttribute::COMPACT, &topo).unwrap(); // PERSET

        let handle = root.add_thread(Thread::new(1), &loads, &binder).unwrap();
        // assign_thread_resource (COMPACT) set only one bit in `used`...
        assert_eq!(root.used().count(), 1);

        root.delete_thread(handle, &loads).unwrap();
        // ...but delete_thread XORs the thread's whole 4-bit allowed_set
        // against that single-bit `used`, producing 3 *extra* bits rather
        // than an empty mask.
        assert_eq!(root.used().count(), 3);
    }
}
