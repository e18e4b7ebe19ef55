use std::{io::IsTerminal as _, panic::Location, process};

use ansi_term::Color;
use argh::FromArgs;
use heap::{
    FitPolicy, Heap, HeapConfig, HeapError, HeapPtr, SystemProvider,
    log::{self, LogLevel, Logger},
};
use snafu::ResultExt as _;
use snafu_utils::{GenericError, Report};

/// Run a pseudo-random allocation workload and print heap statistics.
#[derive(Debug, FromArgs)]
struct Args {
    /// free block selection policy: best-fit, first-fit or worst-fit
    #[argh(option, default = "FitPolicy::BestFit")]
    policy: FitPolicy,

    /// alignment of every block, a power of two
    #[argh(option, default = "heap::DEFAULT_ALIGNMENT")]
    alignment: usize,

    /// smallest arena requested from the system, in bytes
    #[argh(option, default = "heap::DEFAULT_MIN_ARENA_SIZE")]
    arena_size: usize,

    /// number of allocate/free rounds
    #[argh(option, short = 'n', default = "10_000")]
    rounds: usize,

    /// largest single allocation, in bytes
    #[argh(option, default = "4096")]
    max_size: usize,

    /// seed of the workload generator
    #[argh(option, default = "0x853c_49e6_748f_ea9b")]
    seed: u64,

    /// allocations deliberately left live to show the leak report
    #[argh(option, default = "3")]
    leak: usize,

    /// disable allocation tracking
    #[argh(switch)]
    no_diagnostics: bool,

    /// log every allocation, split and merge
    #[argh(switch, short = 'v')]
    verbose: bool,
}

struct StderrLogger {
    color: bool,
}

impl Logger for StderrLogger {
    fn log(
        &self,
        level: LogLevel,
        location: &'static Location<'static>,
        message: std::fmt::Arguments<'_>,
    ) {
        let color = match level {
            LogLevel::Trace => Color::DarkGray,
            LogLevel::Debug => Color::Blue,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        };
        let level = color.paint(level).bold().enabled(self.color);
        let location = Color::DarkGray.paint(location).enabled(self.color);
        eprintln!("{level} {message} ({location})");
    }
}

/// PCG-style generator; the workload only has to be reproducible.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, n: usize) -> usize {
        let n = u64::try_from(n).unwrap_or(u64::MAX);
        usize::try_from(self.next() % n).unwrap_or(0)
    }
}

fn main() {
    let args: Args = argh::from_env();
    let color = std::io::stderr().is_terminal();

    let logger = Box::leak(Box::new(StderrLogger { color }));
    if log::set_logger(logger).is_ok() {
        log::set_max_level(if args.verbose {
            LogLevel::Trace
        } else {
            LogLevel::Info
        });
    }

    if let Err(err) = run(&args) {
        let report = Report::new(err).locate::<HeapError>();
        let report = if color { report } else { report.plain() };
        eprintln!("{report}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), GenericError> {
    let config = HeapConfig::new()
        .with_alignment(args.alignment)
        .with_fit_policy(args.policy)
        .with_min_arena_size(args.arena_size)
        .with_diagnostics(!args.no_diagnostics);
    let mut heap =
        Heap::new(SystemProvider::new(), config).whatever_context("failed to create heap")?;

    let mut rng = Rng(args.seed);
    let mut live: Vec<(HeapPtr, usize, u8)> = Vec::new();
    for round in 0..args.rounds {
        if live.is_empty() || rng.below(5) < 3 {
            let size = 1 + rng.below(args.max_size.max(1));
            let ptr = heap.allocate(size).with_whatever_context(|_| {
                format!("allocation failed in round {round}, size={size}")
            })?;
            let fill = u8::try_from(round % 251).unwrap_or(0);
            heap.data_mut(ptr)
                .whatever_context("fresh allocation is not accessible")?[..size]
                .fill(fill);
            live.push((ptr, size, fill));
        } else {
            let (ptr, size, fill) = live.swap_remove(rng.below(live.len()));
            let data = heap
                .data(ptr)
                .whatever_context("live allocation is not accessible")?;
            if data[..size].iter().any(|&b| b != fill) {
                snafu::whatever!("allocation {ptr} was overwritten");
            }
            heap.free(ptr)
                .with_whatever_context(|_| format!("free failed in round {round}"))?;
        }
    }

    let keep = args.leak.min(live.len());
    for (ptr, _, _) in live.drain(keep..) {
        heap.free(ptr).whatever_context("final free failed")?;
    }
    heap.check_integrity()
        .whatever_context("heap is inconsistent after the workload")?;

    let stats = heap.stats();
    println!("policy:            {}", heap.config().fit_policy);
    println!("alignment:         {}", heap.config().alignment);
    println!("header size:       {}", heap.header_size());
    println!("arenas:            {} ({} bytes)", stats.arena_count, stats.arena_bytes);
    println!("allocated bytes:   {}", stats.total_allocated);
    println!("free bytes:        {}", stats.total_free);
    println!("free blocks:       {}", stats.free_block_count);
    println!("largest free:      {}", stats.largest_free_block);
    println!("growths:           {}", stats.growth_count);
    println!("splits / merges:   {} / {}", stats.split_count, stats.merge_count);

    let leaks = heap.report_leaks();
    println!("leaks:             {}", leaks.len());
    for leak in leaks {
        match leak.location {
            Some(location) => println!("  {} size={} at {location}", leak.ptr, leak.size),
            None => println!("  {} size={}", leak.ptr, leak.size),
        }
    }
    Ok(())
}
