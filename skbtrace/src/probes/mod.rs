//! # Probe Loading and Attachment
//!
//! Multiplexes the function catalog onto the five kernel-resident probe
//! programs and keeps every resulting link in a release list.
//!
//! ## Modules
//!
//! - [`loader`] - read the probe object, check its layout version, load it
//! - [`kprobe`] - aya-backed [`ProbeBackend`] over the five `KProbe` programs
//! - [`attach`] - the interruptible, partial-failure tolerant attach loop
//! - [`release`] - exactly-once release of attached links
//! - [`progress`] - attach progress rendering
//!
//! [`ProbeBackend`] is the seam between the attach loop and the kernel, so the
//! loop runs against synthetic backends in tests.

pub mod attach;
pub mod kprobe;
pub mod loader;
pub mod progress;
pub mod release;

use crate::domain::{AttachError, ProbeVariant};

pub use attach::{attach_all, AttachReport};
pub use kprobe::KprobeBackend;
pub use loader::{init_ebpf_logger, load_probe_object, ProbeObjectSource};
pub use progress::{AttachProgress, QuietProgress, StderrProgress};
pub use release::{AttachedProbe, AttachedProbes};

/// A live attachment that can be undone
pub trait ProbeLink {
    type Error: std::fmt::Display;

    /// Remove the attachment from the kernel
    ///
    /// # Errors
    /// Returns the backend's error if the kernel refuses the detach.
    fn detach(self) -> Result<(), Self::Error>;
}

/// Something that can attach a probe variant to a kernel function
pub trait ProbeBackend {
    type Link: ProbeLink;

    /// Attach `variant` at the entry of `function`
    ///
    /// # Errors
    /// Returns [`AttachError::MissingSymbol`] when the function is not
    /// available as a kprobe target, [`AttachError::Failed`] otherwise.
    fn attach(&mut self, variant: ProbeVariant, function: &str) -> Result<Self::Link, AttachError>;
}
