//! # Event Pipeline
//!
//! ```text
//!  per-CPU perf buffers ──▶ PerfEventSource ──▶ EventPipeline ──▶ EventPrinter ──▶ stdout
//!   (reader task each)      (bounded mpsc)     (decode, loss)    (symbolize,
//!                                                                 PRINT_SKB_MAP)
//! ```
//!
//! - [`source`]: the record stream and its perf-buffer implementation
//! - [`decode`]: sample bytes to [`skbtrace_common::SkbEvent`]
//! - [`processor`]: classification and the consume loop
//! - [`display`]: output formatting

pub mod cpu_utils;
pub mod decode;
pub mod display;
pub mod processor;
pub mod source;

pub use cpu_utils::online_cpus;
pub use decode::decode_event;
pub use display::{EventPrinter, RawPacketTable};
pub use processor::{EventPipeline, PipelineStats, Pulled};
pub use source::{PerfEventSource, RawRecord, RecordSource};
