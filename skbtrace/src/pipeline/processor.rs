//! Event processing loop
//!
//! Pulls raw records, turns them into events, loss notices or decode
//! failures, and hands events to the printer. Loss and decode failures are
//! reported and counted; only a closed stream ends the loop.

use std::io::{self, Write};

use log::{info, warn};
use skbtrace_common::SkbEvent;

use super::decode::decode_event;
use super::display::EventPrinter;
use super::source::{RawRecord, RecordSource};
use crate::domain::DecodeError;

/// One classified record
#[derive(Debug, PartialEq, Eq)]
pub enum Pulled {
    Event(SkbEvent),
    LossNotice(u64),
    DecodeError(DecodeError),
    Closed,
}

/// Counters reported at the end of a run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub events: u64,
    /// Samples the kernel dropped
    pub lost: u64,
    pub decode_errors: u64,
}

pub struct EventPipeline<S> {
    source: S,
    stats: PipelineStats,
}

impl<S: RecordSource> EventPipeline<S> {
    pub fn new(source: S) -> Self {
        Self { source, stats: PipelineStats::default() }
    }

    /// Pull and classify the next record
    pub async fn next(&mut self) -> Pulled {
        match self.source.next_record().await {
            RawRecord::Sample(bytes) => match decode_event(&bytes) {
                Ok(event) => Pulled::Event(event),
                Err(e) => Pulled::DecodeError(e),
            },
            RawRecord::Lost(count) => Pulled::LossNotice(count),
            RawRecord::Closed => Pulled::Closed,
        }
    }

    /// Print the header, then events until the stream closes
    ///
    /// # Errors
    /// Returns the writer's error; stream problems never end the loop.
    pub async fn run<W: Write>(
        &mut self,
        printer: &mut EventPrinter<'_>,
        out: &mut W,
    ) -> io::Result<PipelineStats> {
        printer.print_header(out)?;
        out.flush()?;
        info!("Listening for events..");
        loop {
            match self.next().await {
                Pulled::Event(event) => {
                    printer.print(&event, out)?;
                    self.stats.events += 1;
                }
                Pulled::LossNotice(count) => {
                    warn!("Perf event ring buffer full, dropped {count} samples");
                    self.stats.lost += count;
                }
                Pulled::DecodeError(e) => {
                    warn!("Parsing perf event: {e}");
                    self.stats.decode_errors += 1;
                }
                Pulled::Closed => break,
            }
        }
        out.flush()?;
        Ok(self.stats)
    }

    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}
