//! Process name lookup for the PROCESS column

use std::collections::HashMap;
use std::fs;

use crate::domain::Pid;

/// Command name of a process, from `/proc/<pid>/comm` or `/proc/<pid>/stat`
#[must_use]
pub fn process_name(pid: Pid) -> Option<String> {
    let Pid(pid) = pid;
    if let Ok(comm) = fs::read_to_string(format!("/proc/{pid}/comm")) {
        let comm = comm.trim_end_matches('\n');
        if !comm.is_empty() {
            return Some(comm.to_string());
        }
    }
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    extract_comm(&stat)
}

/// Extract command name from `/proc/<pid>/stat`.
/// Format: "pid (comm) state ..."
fn extract_comm(stat_line: &str) -> Option<String> {
    let open = stat_line.find('(')?;
    let close = stat_line.rfind(')')?;
    if open >= close {
        return None;
    }
    Some(stat_line[open + 1..close].to_string())
}

/// Cached `pid → "[comm:(pid)]"` labels
pub struct ProcessNames {
    resolve: fn(Pid) -> Option<String>,
    labels: HashMap<Pid, String>,
}

impl Default for ProcessNames {
    fn default() -> Self {
        Self::with_resolver(process_name)
    }
}

impl ProcessNames {
    /// PIDs get reused; drop the cache once it grows this large
    const MAX_CACHED: usize = 4096;

    #[must_use]
    pub fn with_resolver(resolve: fn(Pid) -> Option<String>) -> Self {
        Self { resolve, labels: HashMap::new() }
    }

    pub fn label(&mut self, pid: Pid) -> &str {
        if self.labels.len() >= Self::MAX_CACHED && !self.labels.contains_key(&pid) {
            self.labels.clear();
        }
        let resolve = self.resolve;
        self.labels.entry(pid).or_insert_with(|| match resolve(pid) {
            Some(name) => format!("[{name}:({})]", pid.0),
            None => format!("[<unknown>:({})]", pid.0),
        })
    }
}
