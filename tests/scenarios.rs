//! End-to-end placement scenarios against the public API.
//!
//! Each test builds a small group tree on a synthetic 64-CPU machine (4
//! packages... actually 1 package, 4 nodes of 16, 4 CCLs of 4 per node) and
//! drives it the way an application would: construct a group, add threads,
//! inspect where they landed and what the load table says, then tear it
//! down.

use topo_placer::binder::NullBinder;
use topo_placer::group::{Group, GroupAttribute};
use topo_placer::load::LoadTable;
use topo_placer::managed::{cpumask_for_task, parse_managed_threads};
use topo_placer::thread::Thread;
use topo_placer::topology::{SyntheticTopology, Topology};

fn machine() -> SyntheticTopology {
    SyntheticTopology::new(4, 4, 4, 1)
}

#[test]
fn compact_percpu_cpu_level_fills_lowest_cpus_first() {
    let topo = machine();
    let loads = LoadTable::new(topo.cores_in_total());
    let binder = NullBinder::new();
    let mut root =
        Group::new(GroupAttribute::CPU | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo).unwrap();

    for pid in 0..6 {
        root.add_thread(Thread::new(pid), &loads, &binder).unwrap();
    }

    for (i, thread) in root.threads().iter().enumerate() {
        assert_eq!(thread.cur_set().first_set(), Some(i));
    }
    assert_eq!(binder.calls().len(), 6);
}

#[test]
fn nested_group_places_threads_inside_carved_region() {
    let topo = machine();
    let loads = LoadTable::new(topo.cores_in_total());
    let binder = NullBinder::new();

    let mut root =
        Group::new(GroupAttribute::CCL | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo).unwrap();
    let mut child =
        Group::new(GroupAttribute::CPU | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo).unwrap();
    Group::add_group(&mut child, &mut root, &topo, &loads, &binder).unwrap();

    let region = *child.total();
    for pid in 0..4 {
        child.add_thread(Thread::new(pid), &loads, &binder).unwrap();
    }

    for thread in child.threads() {
        let cpu = thread.cur_set().first_set().unwrap();
        assert!(region.test(cpu), "thread placed outside its group's carved region");
    }
}

#[test]
fn exhausting_a_group_rolls_over_and_resumes_from_zero() {
    let topo = machine();
    let loads = LoadTable::new(topo.cores_in_total());
    let binder = NullBinder::new();
    let mut root =
        Group::new(GroupAttribute::CPU | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo).unwrap();

    for pid in 0..64 {
        root.add_thread(Thread::new(pid), &loads, &binder).unwrap();
    }
    assert_eq!(root.roll_over_cnts(), 1);

    let handle = root.add_thread(Thread::new(64), &loads, &binder).unwrap();
    let thread = root.threads().iter().find(|t| t.handle() == handle).unwrap();
    assert_eq!(thread.cur_set().first_set(), Some(0));
}

#[test]
fn deleting_a_thread_withdraws_its_load() {
    let topo = machine();
    let loads = LoadTable::new(topo.cores_in_total());
    let binder = NullBinder::new();
    let mut root =
        Group::new(GroupAttribute::CPU | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|pid| root.add_thread(Thread::new(pid), &loads, &binder).unwrap())
        .collect();
    assert!(loads.load_of(2) > 0);

    root.delete_thread(handles[2], &loads).unwrap();
    assert_eq!(loads.load_of(2), 0);
    assert_eq!(root.threads().len(), 3);
}

#[test]
fn deleting_a_child_group_reclaims_its_parents_region() {
    let topo = machine();
    let loads = LoadTable::new(topo.cores_in_total());
    let binder = NullBinder::new();
    let mut root =
        Group::new(GroupAttribute::CCL | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo).unwrap();
    let mut child =
        Group::new(GroupAttribute::CPU | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo).unwrap();

    Group::add_group(&mut child, &mut root, &topo, &loads, &binder).unwrap();
    assert!(!root.used().is_empty());

    Group::delete_group(&mut child, &mut root).unwrap();
    assert!(root.used().is_empty());
    assert_eq!(root.nr_groups(), 0);
}

#[test]
fn managed_thread_map_and_group_placement_can_coexist() {
    let topo = machine();
    let maps = parse_managed_threads("10,11@c0-1 12@n2", &topo).unwrap();

    // Task 10 is pinned straight to CPU 0/1 via the static map, with no
    // group involved at all.
    let pinned = cpumask_for_task(&maps, 10).unwrap();
    assert!(pinned.test(0) && pinned.test(1));
    assert_eq!(pinned.count(), 2);

    // Task 12 is pinned to every CPU in node 2 (cpus 32..48 on this
    // topology).
    let node_pinned = cpumask_for_task(&maps, 12).unwrap();
    assert_eq!(node_pinned.count(), 16);
    assert!(node_pinned.test(32));
    assert!(!node_pinned.test(31));
    assert!(!node_pinned.test(48));

    // Meanwhile, unrelated application threads still go through the
    // ordinary group-based allocator.
    let loads = LoadTable::new(topo.cores_in_total());
    let binder = NullBinder::new();
    let mut root =
        Group::new(GroupAttribute::CPU | GroupAttribute::COMPACT | GroupAttribute::PERCPU, &topo).unwrap();
    root.add_thread(Thread::new(1), &loads, &binder).unwrap();
    assert_eq!(root.threads().len(), 1);
}
