//! Release list for attached probes
//!
//! Every link is released exactly once: explicitly through
//! [`AttachedProbes::release_all`], or when the list is dropped on any other
//! exit path.

use log::{debug, warn};

use super::ProbeLink;

/// One attached function and its link
#[derive(Debug)]
pub struct AttachedProbe<L: ProbeLink> {
    function: String,
    link: Option<L>,
}

impl<L: ProbeLink> AttachedProbe<L> {
    pub fn new(function: impl Into<String>, link: L) -> Self {
        Self { function: function.into(), link: Some(link) }
    }

    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.link.is_some()
    }

    /// Detach the link. Returns `true` only on the call that released it.
    pub fn release(&mut self) -> bool {
        let Some(link) = self.link.take() else {
            return false;
        };
        if let Err(e) = link.detach() {
            warn!("Failed to detach probe from {}: {e}", self.function);
        }
        true
    }
}

impl<L: ProbeLink> Drop for AttachedProbe<L> {
    fn drop(&mut self) {
        self.release();
    }
}

/// All probes attached during a run
#[derive(Debug)]
pub struct AttachedProbes<L: ProbeLink> {
    probes: Vec<AttachedProbe<L>>,
}

impl<L: ProbeLink> Default for AttachedProbes<L> {
    fn default() -> Self {
        Self { probes: Vec::new() }
    }
}

impl<L: ProbeLink> AttachedProbes<L> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, function: impl Into<String>, link: L) {
        self.probes.push(AttachedProbe::new(function, link));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttachedProbe<L>> {
        self.probes.iter()
    }

    /// Release every link still attached, returning how many were released now
    pub fn release_all(&mut self) -> usize {
        let released = self.probes.iter_mut().map(AttachedProbe::release).filter(|r| *r).count();
        if released > 0 {
            debug!("Released {released} probes");
        }
        released
    }
}

impl<L: ProbeLink> Drop for AttachedProbes<L> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingLink(Arc<AtomicUsize>);

    impl ProbeLink for CountingLink {
        type Error = Infallible;

        fn detach(self) -> Result<(), Infallible> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingLink;

    impl ProbeLink for FailingLink {
        type Error = &'static str;

        fn detach(self) -> Result<(), &'static str> {
            Err("link already gone")
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut probe = AttachedProbe::new("ip_rcv", CountingLink(count.clone()));
        assert!(probe.is_attached());
        assert!(probe.release());
        assert!(!probe.release());
        assert!(!probe.is_attached());
        drop(probe);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let mut probes = AttachedProbes::new();
            for name in ["ip_rcv", "ip_output", "tcp_v4_rcv"] {
                probes.push(name, CountingLink(count.clone()));
            }
            assert_eq!(probes.len(), 3);
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_release_all_then_drop_is_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut probes = AttachedProbes::new();
        probes.push("ip_rcv", CountingLink(count.clone()));
        probes.push("ip_output", CountingLink(count.clone()));
        assert_eq!(probes.release_all(), 2);
        assert_eq!(probes.release_all(), 0);
        drop(probes);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_detach_failure_still_counts_as_released() {
        let mut probe = AttachedProbe::new("ip_rcv", FailingLink);
        assert!(probe.release());
        assert!(!probe.is_attached());
    }
}
