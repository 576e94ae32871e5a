//! # Function Catalog
//!
//! Discovers the kernel functions that receive a `struct sk_buff *` and the
//! argument position of that pointer.
//!
//! ```text
//! /sys/kernel/btf/vmlinux ──▶ btf::read_signatures ──▶ FunctionSignature*
//!                                                          │
//!                                              FunctionCatalog::from_signatures
//!                                                          │
//!                                                          ▼
//!                                         FunctionEntry { name, position }
//! ```
//!
//! The structural scan works on [`FunctionSignature`] values, so it runs
//! without a kernel in tests.

pub mod btf;

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};

use crate::domain::{ArgPosition, FunctionEntry, ProbeVariant, TracerError};

/// Default location of the running kernel's BTF
pub const DEFAULT_BTF_PATH: &str = "/sys/kernel/btf/vmlinux";

const SK_BUFF: &str = "sk_buff";

/// Reduced view of a parameter type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// Pointer to a named struct, qualifiers stripped
    StructPtr(String),
    Other,
}

/// A function prototype as seen by the catalog scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<ParamType>,
}

impl FunctionSignature {
    /// Position of the first `struct sk_buff *` parameter
    #[must_use]
    pub fn skb_position(&self) -> Option<ArgPosition> {
        self.params
            .iter()
            .position(|p| matches!(p, ParamType::StructPtr(name) if name == SK_BUFF))
            .and_then(|idx| u32::try_from(idx + 1).ok())
            .map(ArgPosition)
    }
}

/// Ordered set of traceable functions, at most one entry per name
#[derive(Debug, Clone, Default)]
pub struct FunctionCatalog {
    entries: Vec<FunctionEntry>,
}

impl FunctionCatalog {
    /// Discover candidate functions from a BTF file
    ///
    /// # Errors
    /// Returns [`TracerError::BtfUnavailable`] if the BTF cannot be read and
    /// [`TracerError::EmptyCatalog`] if no function takes a packet buffer.
    pub fn discover(btf_path: &Path) -> Result<Self, TracerError> {
        let signatures = btf::read_signatures(btf_path)?;
        let catalog = Self::from_signatures(signatures);
        if catalog.is_empty() {
            return Err(TracerError::EmptyCatalog);
        }

        let unsupported = catalog.unsupported_count();
        if unsupported > 0 {
            debug!("{unsupported} functions take sk_buff beyond the fifth argument");
        }
        info!("Found {} candidate functions", catalog.len());
        Ok(catalog)
    }

    /// Build a catalog from prototypes, keeping the first entry per name
    pub fn from_signatures(signatures: impl IntoIterator<Item = FunctionSignature>) -> Self {
        let mut by_name = BTreeMap::new();
        for sig in signatures {
            if let Some(position) = sig.skb_position() {
                by_name.entry(sig.name).or_insert(position);
            }
        }
        let entries =
            by_name.into_iter().map(|(name, position)| FunctionEntry { name, position }).collect();
        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FunctionEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.binary_search_by(|e| e.name.as_str().cmp(name)).is_ok()
    }

    /// Entries whose position has no probe variant
    #[must_use]
    pub fn unsupported_count(&self) -> usize {
        self.entries.iter().filter(|e| ProbeVariant::for_position(e.position).is_none()).count()
    }
}

impl FromIterator<FunctionEntry> for FunctionCatalog {
    fn from_iter<I: IntoIterator<Item = FunctionEntry>>(iter: I) -> Self {
        let mut by_name = BTreeMap::new();
        for entry in iter {
            by_name.entry(entry.name).or_insert(entry.position);
        }
        let entries =
            by_name.into_iter().map(|(name, position)| FunctionEntry { name, position }).collect();
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a FunctionCatalog {
    type Item = &'a FunctionEntry;
    type IntoIter = std::slice::Iter<'a, FunctionEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(name: &str, params: &[&str]) -> FunctionSignature {
        FunctionSignature {
            name: name.to_string(),
            params: params
                .iter()
                .map(|p| {
                    if p.is_empty() {
                        ParamType::Other
                    } else {
                        ParamType::StructPtr((*p).to_string())
                    }
                })
                .collect(),
        }
    }

    #[test]
    fn test_first_skb_position_wins() {
        let s = sig("skb_clone_like", &["net_device", "sk_buff", "sk_buff"]);
        assert_eq!(s.skb_position(), Some(ArgPosition(2)));
    }

    #[test]
    fn test_no_skb_param() {
        assert_eq!(sig("schedule", &["", "task_struct"]).skb_position(), None);
        assert_eq!(sig("noargs", &[]).skb_position(), None);
    }

    #[test]
    fn test_catalog_sorted_and_deduplicated() {
        let catalog = FunctionCatalog::from_signatures(vec![
            sig("tcp_v4_rcv", &["sk_buff"]),
            sig("ip_rcv", &["sk_buff", "net_device"]),
            sig("ip_rcv", &["", "sk_buff"]),
            sig("schedule", &[]),
        ]);
        let names: Vec<_> = catalog.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["ip_rcv", "tcp_v4_rcv"]);
        assert_eq!(catalog.iter().next().map(|e| e.position), Some(ArgPosition(1)));
        assert!(catalog.contains("tcp_v4_rcv"));
        assert!(!catalog.contains("schedule"));
    }

    #[test]
    fn test_unsupported_positions_are_kept() {
        let catalog = FunctionCatalog::from_signatures(vec![
            sig("far_away", &["", "", "", "", "", "sk_buff"]),
            sig("near", &["sk_buff"]),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.unsupported_count(), 1);
    }

    #[test]
    fn test_missing_btf_is_fatal() {
        let err = FunctionCatalog::discover(Path::new("/nonexistent/vmlinux")).unwrap_err();
        assert!(matches!(err, TracerError::BtfUnavailable { .. }));
    }
}
