//! # Probe Object Loading
//!
//! The kernel-side programs live in an eBPF object built outside this crate.
//! It is embedded at build time (see `build.rs`) or read from a file given on
//! the command line.
//!
//! Before handing the bytes to aya, the loader reads the object's
//! `SKBTRACE_LAYOUT_VERSION` global and refuses objects built against a
//! different shared layout.

use std::borrow::Cow;
use std::path::PathBuf;

use aya::{include_bytes_aligned, Btf, Ebpf, EbpfLoader};
use aya_log::EbpfLogger;
use log::{debug, info, warn};
use object::{Object, ObjectSection, ObjectSymbol};
use skbtrace_common::{LAYOUT_VERSION, LAYOUT_VERSION_SYMBOL};

use crate::domain::TracerError;

/// Where the probe object comes from
#[derive(Debug, Clone)]
pub enum ProbeObjectSource {
    /// Bytes embedded at build time
    Embedded,
    File(PathBuf),
}

fn embedded_object() -> &'static [u8] {
    include_bytes_aligned!(concat!(env!("OUT_DIR"), "/skbtrace.bpf.o"))
}

/// Load the probe object and verify its layout version
///
/// # Errors
/// - [`TracerError::ProbeObject`] if there is no object or it is not ELF
/// - [`TracerError::LayoutMismatch`] if the object's layout version differs
/// - [`TracerError::Ebpf`] if aya rejects the object
pub fn load_probe_object(source: &ProbeObjectSource) -> Result<Ebpf, TracerError> {
    let data: Cow<'static, [u8]> = match source {
        ProbeObjectSource::Embedded => {
            let data = embedded_object();
            if data.is_empty() {
                return Err(TracerError::ProbeObject(
                    "this build carries no embedded probe object; \
                     pass one with --bpf-object <PATH>"
                        .to_string(),
                ));
            }
            Cow::Borrowed(data)
        }
        ProbeObjectSource::File(path) => Cow::Owned(
            std::fs::read(path)
                .map_err(|e| TracerError::ProbeObject(format!("{}: {e}", path.display())))?,
        ),
    };

    check_layout_version(&data)?;

    let bpf = EbpfLoader::new().btf(Btf::from_sys_fs().ok().as_ref()).load(&data)?;
    info!("✓ Loaded probe object (layout v{LAYOUT_VERSION})");
    Ok(bpf)
}

/// Compare the object's exported layout version with ours
///
/// # Errors
/// Returns [`TracerError::LayoutMismatch`] when the version is absent or
/// different, [`TracerError::ProbeObject`] when the bytes are not an object.
pub fn check_layout_version(data: &[u8]) -> Result<(), TracerError> {
    match read_layout_version(data)? {
        Some(found) if found == LAYOUT_VERSION => {
            debug!("Probe object layout version {found}");
            Ok(())
        }
        Some(found) => {
            Err(TracerError::LayoutMismatch { expected: LAYOUT_VERSION, found: found.to_string() })
        }
        None => Err(TracerError::LayoutMismatch {
            expected: LAYOUT_VERSION,
            found: format!("no {LAYOUT_VERSION_SYMBOL} symbol"),
        }),
    }
}

/// Read the `u32` layout version global, `None` if the object lacks it
///
/// # Errors
/// Returns [`TracerError::ProbeObject`] when the bytes cannot be parsed.
pub fn read_layout_version(data: &[u8]) -> Result<Option<u32>, TracerError> {
    let file = object::File::parse(data).map_err(|e| TracerError::ProbeObject(e.to_string()))?;

    let Some(symbol) = file.symbol_by_name(LAYOUT_VERSION_SYMBOL) else {
        return Ok(None);
    };
    let Some(index) = symbol.section_index() else {
        return Ok(None);
    };
    let section =
        file.section_by_index(index).map_err(|e| TracerError::ProbeObject(e.to_string()))?;
    let bytes = section.data().map_err(|e| TracerError::ProbeObject(e.to_string()))?;

    // Relocatable objects store the symbol's offset within its section.
    let offset = symbol
        .address()
        .checked_sub(section.address())
        .and_then(|off| usize::try_from(off).ok());
    let value = offset
        .and_then(|off| bytes.get(off..off + 4))
        .and_then(|raw| raw.try_into().ok())
        .map(u32::from_le_bytes);
    Ok(value)
}

/// Initialize eBPF logger
pub fn init_ebpf_logger(bpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("Probe object carries no log records: {e}");
    }
}
