//! CPU utility functions
//!
//! Utilities for querying CPU information from /sys filesystem.

use std::fs;

use crate::domain::{CpuId, TracerError};

const ONLINE_CPUS_PATH: &str = "/sys/devices/system/cpu/online";

/// Get list of online CPU IDs from /sys/devices/system/cpu/online
///
/// # Errors
/// Returns [`TracerError::ReaderSetup`] if the file is unreadable or malformed.
pub fn online_cpus() -> Result<Vec<CpuId>, TracerError> {
    let content = fs::read_to_string(ONLINE_CPUS_PATH)
        .map_err(|e| TracerError::ReaderSetup(format!("{ONLINE_CPUS_PATH}: {e}")))?;
    parse_cpu_list(&content)
        .ok_or_else(|| TracerError::ReaderSetup(format!("malformed {ONLINE_CPUS_PATH}: {content}")))
}

/// Parse a kernel CPU list like "0-3" or "0-3,8-11"
#[must_use]
pub fn parse_cpu_list(list: &str) -> Option<Vec<CpuId>> {
    let mut cpus = Vec::new();

    for range in list.trim().split(',') {
        if let Some((start, end)) = range.split_once('-') {
            let start: u32 = start.parse().ok()?;
            let end: u32 = end.parse().ok()?;
            cpus.extend((start..=end).map(CpuId));
        } else {
            cpus.push(CpuId(range.parse().ok()?));
        }
    }

    Some(cpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3\n"), Some((0..4).map(CpuId).collect()));
        assert_eq!(
            parse_cpu_list("0-1,4,8-9"),
            Some(vec![CpuId(0), CpuId(1), CpuId(4), CpuId(8), CpuId(9)])
        );
        assert_eq!(parse_cpu_list("0-x"), None);
        assert_eq!(parse_cpu_list(""), None);
    }

    #[test]
    fn test_online_cpus() {
        let result = online_cpus();

        #[cfg(target_os = "linux")]
        {
            let cpus = result.expect("Failed to read online CPUs");
            assert!(!cpus.is_empty(), "Should have at least one CPU");
            assert!(cpus.contains(&CpuId(0)));
        }

        #[cfg(not(target_os = "linux"))]
        {
            assert!(result.is_err());
        }
    }
}
