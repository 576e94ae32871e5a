//! Attach progress rendering

use std::io::Write;

/// Observer of the attach loop
pub trait AttachProgress {
    fn start(&mut self, total: usize);

    /// One catalog entry processed (attached or ignored)
    fn advance(&mut self);

    fn finish(&mut self);
}

/// Single-line counter on stderr
#[derive(Debug, Default)]
pub struct StderrProgress {
    done: usize,
    total: usize,
}

impl StderrProgress {
    /// Redraw at most once per this many entries
    const REDRAW_EVERY: usize = 64;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn draw(&self) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r   Attaching probes: {} / {}   ", self.done, self.total);
        stderr.flush().ok();
    }
}

impl AttachProgress for StderrProgress {
    fn start(&mut self, total: usize) {
        self.done = 0;
        self.total = total;
        self.draw();
    }

    fn advance(&mut self) {
        self.done += 1;
        if self.done % Self::REDRAW_EVERY == 0 || self.done == self.total {
            self.draw();
        }
    }

    fn finish(&mut self) {
        self.draw();
        eprintln!();
    }
}

/// Progress sink for `--quiet`
#[derive(Debug, Default, Clone, Copy)]
pub struct QuietProgress;

impl AttachProgress for QuietProgress {
    fn start(&mut self, _total: usize) {}

    fn advance(&mut self) {}

    fn finish(&mut self) {}
}
