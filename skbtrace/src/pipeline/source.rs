//! Kernel-to-user record stream
//!
//! One reader task per online CPU drains its perf buffer into a bounded
//! channel. A full channel makes the readers wait, so loss only ever happens
//! in the kernel, where it is reported as [`RawRecord::Lost`].

use std::future::Future;

use aya::maps::perf::AsyncPerfEventArray;
use aya::maps::MapData;
use bytes::BytesMut;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::cpu_utils::online_cpus;
use crate::domain::TracerError;
use crate::shutdown::Shutdown;

/// Records buffered between the per-CPU readers and the consumer
const CHANNEL_CAPACITY: usize = 4096;

/// Samples drained from a perf buffer per wakeup
const READ_BATCH: usize = 16;

/// Size hint for one sample buffer
const SAMPLE_BUFFER_SIZE: usize = 512;

/// One item of the kernel-to-user stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecord {
    Sample(Vec<u8>),
    /// The kernel dropped this many samples
    Lost(u64),
    Closed,
}

/// Source of raw records
pub trait RecordSource {
    /// Next record; [`RawRecord::Closed`] once the stream is over
    fn next_record(&mut self) -> impl Future<Output = RawRecord> + Send;
}

/// Per-CPU reader tasks, aborted when the set is dropped
#[derive(Debug, Default)]
struct ReaderTasks(Vec<JoinHandle<()>>);

impl ReaderTasks {
    fn push(&mut self, task: JoinHandle<()>) {
        self.0.push(task);
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn abort_all(&mut self) {
        for reader in self.0.drain(..) {
            reader.abort();
        }
    }
}

impl Drop for ReaderTasks {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Perf event array reader
pub struct PerfEventSource {
    rx: mpsc::Receiver<RawRecord>,
    readers: ReaderTasks,
    shutdown: Shutdown,
}

impl PerfEventSource {
    /// Open every online CPU's perf buffer and start its reader task
    ///
    /// # Errors
    /// Returns [`TracerError::ReaderSetup`] if the CPU list cannot be read or
    /// a buffer cannot be opened.
    pub fn open(
        mut events: AsyncPerfEventArray<MapData>,
        shutdown: &Shutdown,
    ) -> Result<Self, TracerError> {
        let cpus = online_cpus()?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        // Dropped on an early return, which stops readers already started.
        let mut readers = ReaderTasks::default();

        for cpu in cpus {
            let mut buf = events
                .open(cpu.0, None)
                .map_err(|e| TracerError::ReaderSetup(format!("{cpu}: {e}")))?;
            let tx = tx.clone();

            readers.push(tokio::spawn(async move {
                let mut buffers: Vec<_> =
                    (0..READ_BATCH).map(|_| BytesMut::with_capacity(SAMPLE_BUFFER_SIZE)).collect();
                loop {
                    let events = match buf.read_events(&mut buffers).await {
                        Ok(events) => events,
                        Err(e) => {
                            warn!("Reading perf buffer on {cpu}: {e}");
                            return;
                        }
                    };
                    if events.lost > 0 {
                        let lost = u64::try_from(events.lost).unwrap_or(u64::MAX);
                        if tx.send(RawRecord::Lost(lost)).await.is_err() {
                            return;
                        }
                    }
                    for sample in buffers.iter().take(events.read) {
                        if tx.send(RawRecord::Sample(sample.to_vec())).await.is_err() {
                            return;
                        }
                    }
                }
            }));
        }
        debug!("Started {} perf buffer readers", readers.len());

        Ok(Self { rx, readers, shutdown: shutdown.clone() })
    }

    /// Stop the reader tasks
    pub fn close(&mut self) {
        self.readers.abort_all();
        self.rx.close();
    }
}

impl RecordSource for PerfEventSource {
    async fn next_record(&mut self) -> RawRecord {
        tokio::select! {
            biased;
            () = self.shutdown.triggered() => RawRecord::Closed,
            record = self.rx.recv() => record.unwrap_or(RawRecord::Closed),
        }
    }
}

impl Drop for PerfEventSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_dropping_reader_tasks_stops_them() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut readers = ReaderTasks::default();
        readers.push(tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        }));
        assert_eq!(readers.len(), 1);

        drop(readers);

        // The aborted task drops its sender without sending.
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_abort_all_empties_the_set() {
        let mut readers = ReaderTasks::default();
        readers.push(tokio::spawn(std::future::pending::<()>()));
        readers.push(tokio::spawn(std::future::pending::<()>()));
        readers.abort_all();
        assert_eq!(readers.len(), 0);
    }
}
