//! Demo / test-harness binary for the placement engine.
//!
//! Builds a [`Group`] tree for a synthetic or (on Linux) real machine
//! topology, places a configurable number of threads into it, and prints
//! the resulting placement and per-CPU load. Useful for eyeballing how a
//! given [`GroupAttribute`] combination behaves without writing a Rust
//! program against the library.

use clap::{Parser, ValueEnum};
use log::info;

use topo_placer::binder::{Binder, NullBinder};
use topo_placer::config::WaycaConfig;
use topo_placer::group::{Group, GroupAttribute};
use topo_placer::load::LoadTable;
use topo_placer::managed::parse_managed_threads;
use topo_placer::thread::Thread;
use topo_placer::topology::{SyntheticTopology, Topology, TopoLevel};

#[cfg(target_os = "linux")]
use topo_placer::binder::LinuxBinder;
#[cfg(target_os = "linux")]
use topo_placer::topology::LinuxTopology;

#[derive(Parser, Debug)]
#[command(name = "topo-placer")]
#[command(about = "Places threads onto a topology-aware CPU group and prints the result")]
struct Args {
    /// Topology level this group is anchored to.
    #[arg(short = 'l', long, value_enum, default_value_t = Level::Ccl)]
    level: Level,

    /// Pack threads into the smallest region (otherwise spread across windows).
    #[arg(short = 'c', long)]
    compact: bool,

    /// Bind each thread to a single CPU (otherwise to a whole topology window).
    #[arg(short = 'p', long)]
    percpu: bool,

    /// Number of threads to place.
    #[arg(short = 'n', long, default_value_t = 8)]
    threads: usize,

    /// Use the real machine's topology instead of a synthetic one.
    #[cfg(target_os = "linux")]
    #[arg(long)]
    real_topology: bool,

    /// Synthetic topology shape: cores-per-ccl, ccls-per-node, nodes-per-package, packages.
    /// Overridden by `WAYCA_SYNTHETIC_TOPOLOGY` when that variable is set; falls back to
    /// 4,4,4,1 when neither is given.
    #[arg(long, num_args = 4)]
    synthetic_shape: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Level {
    Cpu,
    Ccl,
    Numa,
    Package,
    All,
}

impl From<Level> for TopoLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Cpu => TopoLevel::Cpu,
            Level::Ccl => TopoLevel::Ccl,
            Level::Numa => TopoLevel::Numa,
            Level::Package => TopoLevel::Package,
            Level::All => TopoLevel::All,
        }
    }
}

fn main() {
    let config = WaycaConfig::from_env().unwrap_or_else(|err| {
        eprintln!("failed to read configuration: {err}");
        std::process::exit(1);
    });

    let mut builder = env_logger::Builder::from_default_env();
    if let Some(filter) = &config.log_filter {
        builder.parse_filters(filter);
    }
    builder.init();

    let args = Args::parse();

    if let Err(err) = run(&args, &config) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args, config: &WaycaConfig) -> topo_placer::Result<()> {
    let mut attribute = GroupAttribute::empty();
    attribute |= match args.level {
        Level::Cpu => GroupAttribute::CPU,
        Level::Ccl => GroupAttribute::CCL,
        Level::Numa => GroupAttribute::NUMA,
        Level::Package => GroupAttribute::PACKAGE,
        Level::All => GroupAttribute::ALL,
    };
    if args.compact {
        attribute |= GroupAttribute::COMPACT;
    }
    if args.percpu {
        attribute |= GroupAttribute::PERCPU;
    }

    #[cfg(target_os = "linux")]
    if args.real_topology {
        let topo = LinuxTopology::discover()?;
        return place_and_report(attribute, &topo, args, config);
    }

    let topo = synthetic_topology(args, config)?;
    place_and_report(attribute, &topo, args, config)
}

/// Resolves the synthetic topology to place against: `WAYCA_SYNTHETIC_TOPOLOGY`
/// (via `config`) takes priority over `--synthetic-shape`, which in turn falls
/// back to the crate's usual 64-cpu demo shape.
fn synthetic_topology(args: &Args, config: &WaycaConfig) -> topo_placer::Result<SyntheticTopology> {
    if let Some(path) = &config.synthetic_topology_path {
        let contents = std::fs::read_to_string(path).map_err(|err| topo_placer::error::WaycaError::TopologyUnavailable {
            reason: format!("reading WAYCA_SYNTHETIC_TOPOLOGY file {}: {err}", path.display()),
        })?;
        return SyntheticTopology::from_descriptor(&contents);
    }
    let shape = args.synthetic_shape.clone().unwrap_or_else(|| vec![4, 4, 4, 1]);
    Ok(SyntheticTopology::new(shape[0], shape[1], shape[2], shape[3]))
}

fn place_and_report(
    attribute: GroupAttribute,
    topo: &dyn Topology,
    args: &Args,
    config: &WaycaConfig,
) -> topo_placer::Result<()> {
    let loads = LoadTable::new(topo.cores_in_total());
    let dry_run = config.dry_run;
    let binder: Box<dyn Binder> = select_binder(dry_run);

    if let Some(spec) = &config.managed_threads {
        let maps = parse_managed_threads(spec, topo)?;
        println!("--- {} managed-thread map entries from WAYCA_MANAGED_THREADS ---", maps.len());
        for map in &maps {
            println!("tasks {:?} -> cpus {:?} (util {:?})", map.tasks(), map.cpus(), map.cpu_util());
        }
    }

    let mut group = Group::new(attribute, topo)?;
    info!(
        "group anchored at {:?} ({} cpus/window, {} total cpus)",
        args.level,
        group.nr_cpus_per_topo(),
        topo.cores_in_total()
    );

    for pid in 0..args.threads as i32 {
        let handle = group.add_thread(Thread::new(pid), &loads, binder.as_ref())?;
        let thread = group.threads().iter().find(|t| t.handle() == handle).unwrap();
        println!("thread pid={pid} -> cpus {:?}", thread.cur_set().iter().collect::<Vec<_>>());
    }

    println!("--- per-cpu load ---");
    for cpu in 0..topo.cores_in_total() {
        let load = loads.load_of(cpu);
        if load != 0 {
            println!("cpu {cpu}: {load}");
        }
    }
    println!("group used={} rolled-over {} time(s)", group.used().count(), group.roll_over_cnts());

    Ok(())
}

fn select_binder(dry_run: bool) -> Box<dyn Binder> {
    #[cfg(target_os = "linux")]
    if !dry_run {
        return Box::new(LinuxBinder);
    }
    let _ = dry_run;
    Box::new(NullBinder::new())
}
