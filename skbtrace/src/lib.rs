//! # skbtrace - Kernel Packet-Flow Tracer
//!
//! skbtrace attaches a kprobe to every kernel function that takes a
//! `struct sk_buff *` and reports, in call order, which of them a selected
//! packet passed through. It answers "where did my packet go" questions
//! (drops, reordering, latency) at points ordinary capture cannot see.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Linux Kernel                           │
//! │   BTF (vmlinux)     /proc/kallsyms      kprobe_skb_1..5         │
//! └──────┬──────────────────┬─────────────────▲──────┬──────────────┘
//!        │ prototypes       │ addresses       │      │ perf events
//!        ▼                  ▼                 │      ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      skbtrace (This Crate)                      │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Catalog    │──▶│    Probes    │   │   Pipeline   │──▶ stdout
//! │  │    (BTF)     │   │ (attach all) │   │ (perf, loss) │         │
//! │  └──────┬───────┘   └──────▲───────┘   └──────▲───────┘         │
//! │         │                  │ AppliedFilter    │ AddressTable    │
//! │         ▼           ┌──────┴───────┐   ┌──────┴───────┐         │
//! │  ┌──────────────┐   │    Filter    │   │Symbolization │         │
//! │  │   Shutdown   │   │  (CFG_MAP)   │   │  (kallsyms)  │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`catalog`]: functions taking a packet buffer, and the argument
//!   position of that buffer, read from kernel BTF
//! - [`symbolization`]: address → function name table from `/proc/kallsyms`
//! - [`filter`]: user criteria → `FilterConfig`, written once into `CFG_MAP`
//! - [`probes`]: probe object loading, the attach loop, link release
//! - [`pipeline`]: per-CPU perf readers, decoding, loss accounting, output
//! - [`shutdown`]: the run-wide cancellation signal
//! - [`preflight`]: privilege, kernel, BTF and resource-limit checks
//! - [`cli`]: command-line arguments
//! - [`domain`]: core types (`ProbeVariant`, `FunctionEntry`) and errors
//!
//! ## Probe Variants
//!
//! A kprobe program can only read arguments from fixed registers, so the
//! probe object ships five copies of the same logic, `kprobe_skb_1` through
//! `kprobe_skb_5`, each reading the packet pointer from a different argument.
//! Functions whose packet pointer comes later are counted as ignored.
//!
//! ## Typical Usage
//!
//! ```bash
//! # Follow TCP packets to port 443
//! sudo skbtrace --filter-proto tcp --filter-dst-port 443 --output-tuple
//!
//! # Dump marked packets with relative timestamps
//! sudo skbtrace --filter-mark 0x20 --output-relative-timestamp --output-skb
//! ```

pub mod catalog;
pub mod cli;
pub mod domain;
pub mod filter;
pub mod pipeline;
pub mod preflight;
pub mod probes;
pub mod process_lookup;
pub mod shutdown;
pub mod symbolization;
