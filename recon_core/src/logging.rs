//! Append-only JSON-lines journal for reconstruction runs and grid searches.
//!
//! Every call appends exactly one line, creating parent directories on demand.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::admm::{AdmmOutput, AdmmStatus, IterateRecord, XUpdate};
use crate::grid::GridSearchRecord;

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

fn append_record<P: AsRef<Path>, T: Serialize>(journal: P, record: &T) -> io::Result<()> {
    let journal = journal.as_ref();
    if let Some(dir) = journal.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    // one write per record keeps concurrent appends line-aligned
    let mut line = serde_json::to_vec(record).map_err(io::Error::from)?;
    line.push(b'\n');
    OpenOptions::new().create(true).append(true).open(journal)?.write_all(&line)
}

/// One ADMM reconstruction as stored in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmmRunRecord {
    pub run: String,
    pub logged_at_ms: u64,
    pub lam: f64,
    pub rho: f64,
    pub status: AdmmStatus,
    pub iterations: usize,
    pub x_update: XUpdate,
    /// Residuals and Lagrangian of the final iterate, if history was kept
    pub final_iterate: Option<IterateRecord>,
    pub history: Vec<IterateRecord>,
}

/// Appends a summary of one ADMM run under the name `run`.
pub fn log_admm_run<P: AsRef<Path>>(journal: P, run: &str, lam: f64, rho: f64, output: &AdmmOutput) -> io::Result<()> {
    let record = AdmmRunRecord {
        run: run.to_string(),
        logged_at_ms: unix_millis(),
        lam,
        rho,
        status: output.status,
        iterations: output.iterations,
        x_update: output.x_update,
        final_iterate: output.history.last().cloned(),
        history: output.history.clone(),
    };
    append_record(journal, &record)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridJournalEntry {
    pub logged_at_ms: u64,
    pub search: GridSearchRecord,
}

/// Appends the grid-search result of one noise level.
pub fn log_grid_record<P: AsRef<Path>>(journal: P, search: &GridSearchRecord) -> io::Result<()> {
    let entry = GridJournalEntry {
        logged_at_ms: unix_millis(),
        search: search.clone(),
    };
    append_record(journal, &entry)
}

/// Reads every grid entry back from a journal, skipping blank lines.
pub fn read_grid_records<P: AsRef<Path>>(journal: P) -> io::Result<Vec<GridJournalEntry>> {
    fs::read_to_string(journal)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err)))
        .collect()
}
