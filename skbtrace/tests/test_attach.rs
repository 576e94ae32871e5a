use std::collections::HashSet;
use std::convert::Infallible;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use skbtrace::catalog::FunctionCatalog;
use skbtrace::domain::{ArgPosition, AttachError, FunctionEntry, ProbeVariant, TracerError};
use skbtrace::filter::{apply_filter, AppliedFilter, FilterSlot};
use skbtrace::probes::{attach_all, ProbeBackend, ProbeLink, QuietProgress};
use skbtrace::shutdown::Shutdown;
use skbtrace_common::FilterConfig;

#[derive(Debug)]
struct FakeLink {
    released: Arc<AtomicUsize>,
}

impl ProbeLink for FakeLink {
    type Error = Infallible;

    fn detach(self) -> Result<(), Infallible> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeBackend {
    attempts: Vec<(ProbeVariant, String)>,
    missing: HashSet<String>,
    fail_on: Option<String>,
    trigger_at: Option<(usize, Shutdown)>,
    released: Arc<AtomicUsize>,
}

impl ProbeBackend for FakeBackend {
    type Link = FakeLink;

    fn attach(&mut self, variant: ProbeVariant, function: &str) -> Result<FakeLink, AttachError> {
        self.attempts.push((variant, function.to_string()));
        if let Some((at, shutdown)) = &self.trigger_at {
            if self.attempts.len() == *at {
                shutdown.trigger();
            }
        }
        if self.missing.contains(function) {
            return Err(AttachError::classify(function, io::Error::from(io::ErrorKind::NotFound)));
        }
        if self.fail_on.as_deref() == Some(function) {
            return Err(AttachError::classify(
                function,
                io::Error::from(io::ErrorKind::PermissionDenied),
            ));
        }
        Ok(FakeLink { released: self.released.clone() })
    }
}

#[derive(Default)]
struct MemorySlot(Option<FilterConfig>);

impl FilterSlot for MemorySlot {
    type Error = Infallible;

    fn write(&mut self, config: &FilterConfig) -> Result<(), Infallible> {
        self.0 = Some(*config);
        Ok(())
    }
}

fn applied() -> AppliedFilter {
    apply_filter(&mut MemorySlot::default(), FilterConfig::wildcard()).unwrap()
}

fn catalog_of(count: usize, position: u32) -> FunctionCatalog {
    (0..count).map(|i| FunctionEntry::new(format!("fn_{i:05}"), ArgPosition(position))).collect()
}

#[test]
fn test_filter_written_before_token_exists() {
    let mut slot = MemorySlot::default();
    let config = FilterConfig { mark: 7, ..FilterConfig::wildcard() };
    let applied = apply_filter(&mut slot, config).unwrap();
    assert_eq!(slot.0, Some(config));
    assert_eq!(applied.config(), &config);
}

#[test]
fn test_variant_selected_by_position() {
    let catalog: FunctionCatalog =
        (1..=7).map(|p| FunctionEntry::new(format!("fn_arg{p}"), ArgPosition(p))).collect();
    let mut backend = FakeBackend::default();

    let report =
        attach_all(&catalog, &mut backend, &applied(), &Shutdown::new(), &mut QuietProgress)
            .unwrap();

    let expected: Vec<_> = ProbeVariant::ALL
        .iter()
        .enumerate()
        .map(|(i, v)| (*v, format!("fn_arg{}", i + 1)))
        .collect();
    assert_eq!(backend.attempts, expected);
    assert_eq!(report.attached, 5);
    assert_eq!(report.ignored, 2);
    assert_eq!(report.attached + report.ignored, catalog.len());
    assert!(!report.cancelled);
}

#[test]
fn test_out_of_range_never_attempted() {
    let catalog: FunctionCatalog = [0, 6, 12]
        .into_iter()
        .map(|p| FunctionEntry::new(format!("fn_{p}"), ArgPosition(p)))
        .collect();
    let mut backend = FakeBackend::default();

    let report =
        attach_all(&catalog, &mut backend, &applied(), &Shutdown::new(), &mut QuietProgress)
            .unwrap();

    assert!(backend.attempts.is_empty());
    assert_eq!(report.ignored, 3);
    assert!(report.probes.is_empty());
}

#[test]
fn test_missing_symbols_are_ignored() {
    let catalog = catalog_of(10, 1);
    let mut backend = FakeBackend {
        missing: ["fn_00002", "fn_00007"].into_iter().map(String::from).collect(),
        ..FakeBackend::default()
    };

    let report =
        attach_all(&catalog, &mut backend, &applied(), &Shutdown::new(), &mut QuietProgress)
            .unwrap();

    assert_eq!(backend.attempts.len(), 10);
    assert_eq!(report.attached, 8);
    assert_eq!(report.ignored, 2);
    assert_eq!(report.attached + report.ignored, catalog.len());
    assert_eq!(report.probes.len(), 8);
}

#[test]
fn test_fatal_failure_releases_attached_probes() {
    let catalog = catalog_of(10, 2);
    let released = Arc::new(AtomicUsize::new(0));
    let mut backend = FakeBackend {
        fail_on: Some("fn_00004".to_string()),
        released: released.clone(),
        ..FakeBackend::default()
    };

    let err = attach_all(&catalog, &mut backend, &applied(), &Shutdown::new(), &mut QuietProgress)
        .unwrap_err();

    match err {
        TracerError::AttachFailed { function, .. } => assert_eq!(function, "fn_00004"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.attempts.len(), 5);
    assert_eq!(released.load(Ordering::SeqCst), 4);
}

#[test]
fn test_cancellation_stops_within_one_attempt() {
    const TOTAL: usize = 10_000;
    const TRIGGER_AT: usize = 1_234;

    let catalog = catalog_of(TOTAL, 1);
    let shutdown = Shutdown::new();
    let released = Arc::new(AtomicUsize::new(0));
    let mut backend = FakeBackend {
        trigger_at: Some((TRIGGER_AT, shutdown.clone())),
        released: released.clone(),
        ..FakeBackend::default()
    };

    let mut report =
        attach_all(&catalog, &mut backend, &applied(), &shutdown, &mut QuietProgress).unwrap();

    assert!(report.cancelled);
    assert_eq!(backend.attempts.len(), TRIGGER_AT);
    assert_eq!(report.attached, TRIGGER_AT);
    assert_eq!(report.attached + report.ignored + report.not_attempted(), TOTAL);

    assert_eq!(report.probes.release_all(), TRIGGER_AT);
    drop(report);
    assert_eq!(released.load(Ordering::SeqCst), TRIGGER_AT);
}

#[test]
fn test_cancelled_before_start() {
    let catalog = catalog_of(100, 1);
    let shutdown = Shutdown::new();
    shutdown.trigger();
    let mut backend = FakeBackend::default();

    let report =
        attach_all(&catalog, &mut backend, &applied(), &shutdown, &mut QuietProgress).unwrap();

    assert!(report.cancelled);
    assert!(backend.attempts.is_empty());
    assert_eq!(report.not_attempted(), 100);
}

#[test]
fn test_dropping_report_releases_every_probe_once() {
    let catalog = catalog_of(50, 3);
    let released = Arc::new(AtomicUsize::new(0));
    let mut backend = FakeBackend { released: released.clone(), ..FakeBackend::default() };

    let report =
        attach_all(&catalog, &mut backend, &applied(), &Shutdown::new(), &mut QuietProgress)
            .unwrap();
    assert_eq!(report.attached, 50);
    drop(report);

    assert_eq!(released.load(Ordering::SeqCst), 50);
}
