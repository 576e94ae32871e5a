//! Structured error types for skbtrace
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Fatal errors raised while starting up or attaching
#[derive(Error, Debug)]
pub enum TracerError {
    #[error("Kernel BTF unavailable at {path}: {reason}")]
    BtfUnavailable { path: PathBuf, reason: String },

    #[error("No kernel function taking a struct sk_buff pointer was found in BTF")]
    EmptyCatalog,

    #[error("Failed to read kernel symbols from {path}: {source}")]
    Kallsyms {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),

    #[error("Failed to write filter configuration: {0}")]
    FilterWrite(#[source] BoxError),

    #[error("Failed to attach probe to {function}: {source}")]
    AttachFailed {
        function: String,
        #[source]
        source: BoxError,
    },

    #[error(
        "Probe object layout version mismatch: object has {found}, skbtrace expects {expected}"
    )]
    LayoutMismatch { expected: u32, found: String },

    #[error("Failed to read probe object: {0}")]
    ProbeObject(String),

    #[error("Map {0} not found in probe object")]
    MapNotFound(&'static str),

    #[error("Program {0} not found in probe object")]
    ProgramNotFound(&'static str),

    #[error("Failed to set up event reader: {0}")]
    ReaderSetup(String),

    #[error(transparent)]
    Ebpf(#[from] aya::EbpfError),

    #[error(transparent)]
    Program(#[from] aya::programs::ProgramError),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Rejected user filter criteria
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FilterError {
    #[error("unknown protocol '{0}' (expected tcp, udp or icmp)")]
    InvalidProtocol(String),

    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid {field} port '{value}' (expected 0-65535)")]
    InvalidPort { field: &'static str, value: String },
}

/// Outcome of a single failed attachment
#[derive(Error, Debug)]
pub enum AttachError {
    /// The function exists in BTF but is not available as a kprobe target
    #[error("symbol {function} not found")]
    MissingSymbol { function: String },

    #[error("attaching {function} failed: {source}")]
    Failed {
        function: String,
        #[source]
        source: BoxError,
    },
}

impl AttachError {
    /// Classify a backend error: ENOENT or EINVAL anywhere in the chain is a
    /// missing symbol. Older kernels answer `perf_event_open` with EINVAL for
    /// a kprobe on a function they cannot probe.
    pub fn classify<E>(function: &str, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        if is_not_found(&error) {
            AttachError::MissingSymbol { function: function.to_string() }
        } else {
            AttachError::Failed { function: function.to_string(), source: Box::new(error) }
        }
    }
}

fn is_not_found(error: &(dyn StdError + 'static)) -> bool {
    std::iter::successors(Some(error), |&e| e.source()).any(|e| {
        e.downcast_ref::<io::Error>().is_some_and(|io| {
            io.kind() == io::ErrorKind::NotFound
                || matches!(io.raw_os_error(), Some(libc::ENOENT | libc::EINVAL))
        })
    })
}

impl From<AttachError> for TracerError {
    fn from(err: AttachError) -> Self {
        match err {
            AttachError::MissingSymbol { function } => TracerError::AttachFailed {
                source: format!("symbol {function} not found").into(),
                function,
            },
            AttachError::Failed { function, source } => {
                TracerError::AttachFailed { function, source }
            }
        }
    }
}

/// A perf sample that could not be turned into an event
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record too short: {len} bytes, expected at least {expected}")]
    Truncated { len: usize, expected: usize },
}
