//! # Kernel Address Symbolization
//!
//! Converts the instruction pointer reported by a probe back into the name of
//! the traced kernel function.
//!
//! The table is built once from `/proc/kallsyms`, restricted to functions in
//! the catalog, and is read-only afterwards.
//!
//! ## Lookup
//!
//! A kprobe reports the address of the probed instruction. On x86 with
//! `int3`-based probes that address can be one byte past the symbol, so a
//! miss on `addr` retries `addr - 1`. Anything still unknown renders as hex.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;

use aya::util::kernel_symbols;
use log::{debug, warn};

use crate::catalog::FunctionCatalog;
use crate::domain::TracerError;

pub const KALLSYMS_PATH: &str = "/proc/kallsyms";

/// Reverse map from function entry address to name
#[derive(Debug, Default)]
pub struct AddressTable {
    names: HashMap<u64, String>,
}

impl AddressTable {
    /// Build the table from the running kernel's symbols
    ///
    /// # Errors
    /// Returns [`TracerError::Kallsyms`] if `/proc/kallsyms` cannot be read.
    pub fn from_kallsyms(catalog: &FunctionCatalog) -> Result<Self, TracerError> {
        let symbols = kernel_symbols().map_err(|source| TracerError::Kallsyms {
            path: PathBuf::from(KALLSYMS_PATH),
            source,
        })?;
        Ok(Self::from_symbols(symbols, catalog))
    }

    /// Build the table from `(address, name)` pairs, keeping catalog functions
    ///
    /// Names may carry a trailing `\t[module]` as kallsyms reports them.
    pub fn from_symbols<I>(symbols: I, catalog: &FunctionCatalog) -> Self
    where
        I: IntoIterator<Item = (u64, String)>,
    {
        let mut names = HashMap::new();
        let mut zero_addresses = false;

        for (address, name) in symbols {
            if address == 0 {
                zero_addresses = true;
                continue;
            }
            let name = name.split('\t').next().unwrap_or_default();
            if catalog.contains(name) {
                names.entry(address).or_insert_with(|| name.to_string());
            }
        }

        if names.is_empty() && zero_addresses {
            warn!(
                "All kernel symbol addresses are zero (kptr_restrict?). \
                 Functions will be shown as raw addresses."
            );
        }
        debug!("Resolved {} kernel function addresses", names.len());

        Self { names }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Exact-address lookup with the one-byte kprobe fallback
    #[must_use]
    pub fn lookup(&self, addr: u64) -> Option<&str> {
        self.names
            .get(&addr)
            .or_else(|| addr.checked_sub(1).and_then(|prev| self.names.get(&prev)))
            .map(String::as_str)
    }

    /// Function name for an address, or the address in hex
    #[must_use]
    pub fn symbolize(&self, addr: u64) -> Cow<'_, str> {
        match self.lookup(addr) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("0x{addr:x}")),
        }
    }
}
