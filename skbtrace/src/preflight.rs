//! Pre-flight checks for skbtrace
//!
//! Validates system requirements before attempting to load eBPF programs.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() and setrlimit() require unsafe

use anyhow::{bail, Context, Result};
use log::debug;
use std::path::Path;

/// Minimum kernel version: BTF-typed kprobe programs and `bpf_snprintf_btf`
const MIN_KERNEL_VERSION: (u32, u32) = (5, 5);

/// Open file limit needed to hold one perf event per attached function
const NOFILE_LIMIT: libc::rlim_t = 4096;

/// Run all pre-flight checks before eBPF loading
///
/// # Errors
/// Returns an actionable error for the first unmet requirement.
pub fn run_preflight_checks(btf_path: &Path) -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    check_btf_available(btf_path)?;
    raise_resource_limits()?;
    Ok(())
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    bail!(
        "Permission denied: skbtrace requires root privileges to load eBPF programs.\n\n\
         Run with: sudo skbtrace ..."
    );
}

/// Check if the kernel version is sufficient for eBPF features
fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    let Some((release, version)) = parse_kernel_version(&version_str) else {
        // Can't parse, assume it's fine
        return Ok(());
    };

    if version < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {}.{} is too old.\n\n\
             skbtrace requires Linux {}.{} or newer for BTF-enabled kprobes.\n\
             Current kernel: {}",
            version.0,
            version.1,
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
            release
        );
    }

    Ok(())
}

/// Parse "Linux version 5.15.0-generic ..." into the release string and (major, minor)
fn parse_kernel_version(version_str: &str) -> Option<(&str, (u32, u32))> {
    let release = version_str.split_whitespace().nth(2)?;
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    Some((release, (major, minor)))
}

/// Check that kernel type information exists
fn check_btf_available(btf_path: &Path) -> Result<()> {
    if !btf_path.is_file() {
        bail!(
            "Kernel BTF not found at {}\n\n\
             skbtrace needs BTF to find functions that take a struct sk_buff.\n\
             Use a kernel built with CONFIG_DEBUG_INFO_BTF=y, or pass --btf <PATH>.",
            btf_path.display()
        );
    }
    Ok(())
}

/// Raise the open file and locked memory limits
fn raise_resource_limits() -> Result<()> {
    set_rlimit(libc::RLIMIT_NOFILE, NOFILE_LIMIT, NOFILE_LIMIT)
        .context("Failed to raise the open file limit (RLIMIT_NOFILE)")?;
    set_rlimit(libc::RLIMIT_MEMLOCK, libc::RLIM_INFINITY, libc::RLIM_INFINITY)
        .context("Failed to remove the locked memory limit (RLIMIT_MEMLOCK)")?;
    debug!("Raised RLIMIT_NOFILE to {NOFILE_LIMIT} and RLIMIT_MEMLOCK to unlimited");
    Ok(())
}

#[cfg(target_env = "gnu")]
type Resource = libc::__rlimit_resource_t;
#[cfg(not(target_env = "gnu"))]
type Resource = libc::c_int;

fn set_rlimit(resource: Resource, soft: libc::rlim_t, hard: libc::rlim_t) -> std::io::Result<()> {
    let limit = libc::rlimit { rlim_cur: soft, rlim_max: hard };
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_version_check() {
        // Don't assert success since test might run on old kernel
        let _ = check_kernel_version();
    }

    #[test]
    fn test_parse_kernel_version() {
        let v = "Linux version 6.1.0-arch1-1 (builder@host) (gcc 12) #1 SMP";
        assert_eq!(parse_kernel_version(v), Some(("6.1.0-arch1-1", (6, 1))));
        let v = "Linux version 5.4.0-150-generic (buildd@lcy02) #167";
        assert_eq!(parse_kernel_version(v).map(|(_, ver)| ver), Some((5, 4)));
        assert!(parse_kernel_version("garbage").is_none());
    }

    #[test]
    fn test_btf_not_found() {
        let err = check_btf_available(Path::new("/nonexistent/vmlinux")).unwrap_err().to_string();
        assert!(err.contains("Kernel BTF not found"));
        assert!(err.contains("--btf"));
    }
}
