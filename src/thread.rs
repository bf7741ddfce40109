//! Application threads under management.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::cpumask::CpuMask;
use crate::group::GroupId;

/// Opaque identifier for a [`Thread`], assigned when the thread is created.
///
/// Not the OS `pid` -- `GroupId`/`ThreadHandle` identity is how the
/// allocator tracks membership; [`Thread::pid`] is the OS-level value
/// actually handed to the [`crate::binder::Binder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadHandle(u64);

static NEXT_THREAD_HANDLE: AtomicU64 = AtomicU64::new(1);

impl ThreadHandle {
    fn next() -> Self {
        Self(NEXT_THREAD_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

/// One application thread under management by a [`crate::group::Group`].
#[derive(Debug, Clone)]
pub struct Thread {
    handle: ThreadHandle,
    /// OS-level thread identifier, opaque to the allocator.
    pid: i32,
    /// CPU mask the thread is permitted to run on. Equals `cur_set` in the
    /// current design.
    pub(crate) allowed_set: CpuMask,
    /// CPU mask the thread is currently bound to.
    pub(crate) cur_set: CpuMask,
    /// Non-owning back-reference to the group this thread is a member of.
    /// Set by `Group::add_thread`, cleared by `Group::delete_thread`. Left
    /// untouched across a `rearrange` pass, since group membership doesn't
    /// change even though `cur_set`/`allowed_set` are cleared and re-placed.
    pub(crate) group: Option<GroupId>,
}

impl Thread {
    /// Creates a new, unattached thread for OS thread id `pid`.
    pub fn new(pid: i32) -> Self {
        Self {
            handle: ThreadHandle::next(),
            pid,
            allowed_set: CpuMask::zero(),
            cur_set: CpuMask::zero(),
            group: None,
        }
    }

    /// This thread's opaque handle, stable for its lifetime.
    pub fn handle(&self) -> ThreadHandle {
        self.handle
    }

    /// The OS-level thread id.
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// The CPU mask this thread is currently bound to.
    pub fn cur_set(&self) -> &CpuMask {
        &self.cur_set
    }

    /// The CPU mask this thread is permitted to run on.
    pub fn allowed_set(&self) -> &CpuMask {
        &self.allowed_set
    }

    /// The group this thread is currently a member of, if any.
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub(crate) fn clear_placement(&mut self) {
        self.cur_set = CpuMask::zero();
        self.allowed_set = CpuMask::zero();
    }
}
