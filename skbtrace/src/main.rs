//! # skbtrace - Main Entry Point
//!
//! Startup runs once, in order: filter validation, preflight, function
//! discovery, symbol table, probe object load, filter write, attach. The event
//! pipeline then runs until SIGINT/SIGTERM.

#![allow(clippy::too_many_lines)]

use std::io::{ErrorKind, Write};

use anyhow::{Context, Result};
use aya::maps::perf::AsyncPerfEventArray;
use aya::maps::{Array, HashMap as BpfHashMap};
use clap::Parser;
use log::info;
use skbtrace_common::{
    FilterConfig, CFG_MAP, EVENTS_MAP, OUTPUT_SKB, PRINT_SKB_MAP, PRINT_SKB_STR_SIZE,
};

use skbtrace::catalog::FunctionCatalog;
use skbtrace::cli::Args;
use skbtrace::domain::TracerError;
use skbtrace::filter::{apply_filter, build_filter_config};
use skbtrace::pipeline::{EventPipeline, EventPrinter, PerfEventSource};
use skbtrace::preflight::run_preflight_checks;
use skbtrace::probes::{
    attach_all, init_ebpf_logger, load_probe_object, AttachProgress, KprobeBackend,
    ProbeObjectSource, QuietProgress, StderrProgress,
};
use skbtrace::shutdown::{spawn_signal_observer, Shutdown};
use skbtrace::symbolization::AddressTable;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    // Reject bad filters before touching the kernel
    let filter_config = build_filter_config(&args.filter_options()).context("Invalid filter")?;

    run_preflight_checks(&args.btf)?;

    let shutdown = Shutdown::new();
    let _signals =
        spawn_signal_observer(shutdown.clone()).context("Failed to install signal handlers")?;

    if !quiet {
        println!("skbtrace v{}", env!("CARGO_PKG_VERSION"));
    }

    // ── Phase 1: Discover functions and their addresses ─────────────────
    let catalog = FunctionCatalog::discover(&args.btf)?;
    let addresses = AddressTable::from_kallsyms(&catalog)?;
    if shutdown.is_triggered() {
        return Ok(());
    }

    // ── Phase 2: Load the probe object and write the filter ─────────────
    let object =
        args.bpf_object.clone().map_or(ProbeObjectSource::Embedded, ProbeObjectSource::File);
    let mut bpf = load_probe_object(&object)?;
    init_ebpf_logger(&mut bpf);

    let applied = {
        let mut cfg_map: Array<_, FilterConfig> =
            Array::try_from(bpf.map_mut(CFG_MAP).ok_or(TracerError::MapNotFound(CFG_MAP))?)?;
        apply_filter(&mut cfg_map, filter_config)?
    };

    let events = AsyncPerfEventArray::try_from(
        bpf.take_map(EVENTS_MAP).ok_or(TracerError::MapNotFound(EVENTS_MAP))?,
    )?;
    let raw_packets = if applied.config().has_output(OUTPUT_SKB) {
        let map = bpf.take_map(PRINT_SKB_MAP).ok_or(TracerError::MapNotFound(PRINT_SKB_MAP))?;
        Some(BpfHashMap::<_, u64, [u8; PRINT_SKB_STR_SIZE]>::try_from(map)?)
    } else {
        None
    };

    // ── Phase 3: Attach ─────────────────────────────────────────────────
    let mut progress: Box<dyn AttachProgress> =
        if quiet { Box::new(QuietProgress) } else { Box::new(StderrProgress::new()) };
    let mut backend = KprobeBackend::new(&mut bpf)?;
    let mut report = attach_all(&catalog, &mut backend, &applied, &shutdown, progress.as_mut())?;

    println!("Attached (ignored {})", report.ignored);
    if report.cancelled {
        report.probes.release_all();
        return Ok(());
    }

    // ── Phase 4: Stream events until interrupted ────────────────────────
    let source = PerfEventSource::open(events, &shutdown)?;
    let mut printer = EventPrinter::new(applied.config(), &addresses);
    if let Some(table) = raw_packets {
        printer = printer.with_raw_packets(table);
    }
    let mut pipeline = EventPipeline::new(source);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = pipeline.run(&mut printer, &mut out).await;
    pipeline.source_mut().close();
    let released = report.probes.release_all();

    let stats = match result {
        Ok(stats) => stats,
        // Reader went away (e.g. `| head`), not an error
        Err(e) if e.kind() == ErrorKind::BrokenPipe => pipeline.stats(),
        Err(e) => return Err(e).context("Failed to write events"),
    };
    out.flush().ok();

    info!("Released {released} probes");
    if !quiet {
        eprintln!(
            "\n{} events, {} lost, {} undecodable, {} of {} functions ignored",
            stats.events, stats.lost, stats.decode_errors, report.ignored, report.total
        );
    }

    Ok(())
}
