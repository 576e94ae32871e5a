//! The attach loop
//!
//! For each catalog entry: poll the shutdown signal, select the probe variant
//! for its argument position, attach. Missing symbols and unsupported
//! positions are counted as ignored; any other failure aborts the loop, and
//! the links attached so far are released when the partial report is dropped.

use log::{debug, info};

use super::{AttachProgress, AttachedProbes, ProbeBackend, ProbeLink};
use crate::catalog::FunctionCatalog;
use crate::domain::{AttachError, ProbeVariant, TracerError};
use crate::filter::AppliedFilter;
use crate::shutdown::Shutdown;

/// Outcome of a completed or cancelled attach loop
#[derive(Debug)]
pub struct AttachReport<L: ProbeLink> {
    pub total: usize,
    pub attached: usize,
    pub ignored: usize,
    pub cancelled: bool,
    pub probes: AttachedProbes<L>,
}

impl<L: ProbeLink> AttachReport<L> {
    /// Entries the loop never reached, non-zero only when cancelled
    #[must_use]
    pub fn not_attempted(&self) -> usize {
        self.total - self.attached - self.ignored
    }
}

/// Attach a probe to every catalog entry
///
/// The [`AppliedFilter`] token guarantees the filter slot was written before
/// the first attachment.
///
/// # Errors
/// Returns [`TracerError::AttachFailed`] on the first failure that is not a
/// missing symbol. Probes attached before it are released.
pub fn attach_all<B, P>(
    catalog: &FunctionCatalog,
    backend: &mut B,
    filter: &AppliedFilter,
    shutdown: &Shutdown,
    progress: &mut P,
) -> Result<AttachReport<B::Link>, TracerError>
where
    B: ProbeBackend,
    P: AttachProgress + ?Sized,
{
    debug!("Attaching with filter {:?}", filter.config());

    let mut report = AttachReport {
        total: catalog.len(),
        attached: 0,
        ignored: 0,
        cancelled: false,
        probes: AttachedProbes::new(),
    };

    progress.start(catalog.len());
    for entry in catalog {
        if shutdown.is_triggered() {
            report.cancelled = true;
            break;
        }

        let Some(variant) = ProbeVariant::for_position(entry.position) else {
            debug!("Skipping {}: sk_buff at unsupported position {}", entry.name, entry.position);
            report.ignored += 1;
            progress.advance();
            continue;
        };

        match backend.attach(variant, &entry.name) {
            Ok(link) => {
                report.probes.push(entry.name.as_str(), link);
                report.attached += 1;
            }
            Err(AttachError::MissingSymbol { function }) => {
                debug!("Skipping {function}: not available as a kprobe target");
                report.ignored += 1;
            }
            Err(err @ AttachError::Failed { .. }) => {
                progress.finish();
                return Err(err.into());
            }
        }
        progress.advance();
    }
    progress.finish();

    if report.cancelled {
        info!(
            "Attachment interrupted after {} of {} functions",
            report.attached + report.ignored,
            report.total
        );
    }
    Ok(report)
}
