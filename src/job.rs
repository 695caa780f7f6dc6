//! Sort job context.
//!
//! Everything one sort job shares between its tasks: the channel, the run ledger (run index counter and
//! per-run record counts), the round counter, the job's temporary directory and the first failure reported
//! by any task. A fresh context is created for every job.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::channel::Channel;
use crate::sort::SortError;

/// Returns the run file name for a run of the given round.
pub fn run_file_name(round: usize, index: usize) -> String {
    format!("tmp_r{}_{}.dat", round, index)
}

/// Persisted sorted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFile {
    pub index: usize,
    pub path: PathBuf,
    pub records: u64,
}

#[derive(Default)]
struct RunLedger {
    next_index: usize,
    /// Record count per run index, `None` for indices that got no records.
    counts: Vec<Option<u64>>,
}

pub struct JobContext {
    dir: tempfile::TempDir,
    channel: Channel,
    ledger: Mutex<RunLedger>,
    round: usize,
    failed: AtomicBool,
    failure: Mutex<Option<SortError>>,
}

impl JobContext {
    /// Creates a job context with its own temporary directory inside `parent`.
    ///
    /// # Arguments
    /// * `parent` - Directory the job directory is created in
    /// * `channel_size` - Channel capacity in bytes
    /// * `runs_hint` - Expected number of runs, used to pre-size the run ledger
    pub fn new(parent: &Path, channel_size: usize, runs_hint: usize) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("job-").tempdir_in(parent)?;
        log::debug!("job directory: {}", dir.path().display());

        return Ok(JobContext {
            dir,
            channel: Channel::new(channel_size),
            ledger: Mutex::new(RunLedger {
                next_index: 0,
                counts: Vec::with_capacity(runs_hint),
            }),
            round: 1,
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
        });
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Round the outstanding runs belong to.
    pub fn round(&self) -> usize {
        self.round
    }

    pub fn next_round(&mut self) -> usize {
        self.round += 1;
        self.round
    }

    pub fn run_path(&self, round: usize, index: usize) -> PathBuf {
        self.dir.path().join(run_file_name(round, index))
    }

    fn ledger(&self) -> MutexGuard<'_, RunLedger> {
        self.ledger.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Claims the next run index. Every index is handed out exactly once.
    pub fn claim_index(&self) -> usize {
        let mut ledger = self.ledger();
        let index = ledger.next_index;
        ledger.next_index += 1;
        return index;
    }

    /// Records the number of records persisted under a claimed run index.
    pub fn record_run(&self, index: usize, records: u64) {
        let mut ledger = self.ledger();
        if ledger.counts.len() <= index {
            ledger.counts.resize(index + 1, None);
        }
        ledger.counts[index] = Some(records);
    }

    /// Takes the runs recorded so far in ascending index order and resets the ledger.
    pub fn take_runs(&mut self) -> Vec<RunFile> {
        let ledger = std::mem::take(&mut *self.ledger());

        return Vec::from_iter(ledger.counts.into_iter().enumerate().filter_map(|(index, records)| {
            records.map(|records| RunFile {
                index,
                path: self.run_path(self.round, index),
                records,
            })
        }));
    }

    /// Reports a task failure. The first reported failure is kept.
    pub fn fail(&self, err: SortError) {
        log::error!("sort job failed: {}", err);
        self.failed.store(true, Ordering::SeqCst);

        let mut failure = self.failure.lock().unwrap_or_else(|err| err.into_inner());
        if failure.is_none() {
            *failure = Some(err);
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn take_failure(&mut self) -> Option<SortError> {
        self.failure.get_mut().unwrap_or_else(|err| err.into_inner()).take()
    }

    /// Consumes the context keeping only its temporary directory.
    pub fn into_dir(self) -> tempfile::TempDir {
        self.dir
    }
}
