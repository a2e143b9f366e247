//! Threaded interface for running and controlling analyses.
//!
//! This module provides a minimal, thread-per-run runner that accepts raw
//! transactions, performs the full analysis on a background thread and hands
//! the result back through a handle. It uses cooperative cancellation via an
//! `Arc<AtomicBool>` that the miner checks between levels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::analysis::Analysis;
use crate::config::Settings;
use crate::error::{CartwiseError, Result};

/// Cancellation token shared with the worker thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);
impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Opaque run identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(u64);

/// Handle to a running or completed analysis.
pub struct AnalysisHandle {
    pub id: RunId,
    cancel: CancelToken,
    started: Instant,
    join: JoinHandle<Result<Analysis>>,
}
impl AnalysisHandle {
    /// Request cancellation (cooperative). The worker observes it at the next mining level.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
    /// Wait for the analysis to finish.
    pub fn join(self) -> Result<Analysis> {
        let id = self.id;
        self.join
            .join()
            .map_err(|_| CartwiseError::Worker(format!("analysis {id:?} panicked")))?
    }
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
    /// Elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

type ActiveRuns = Arc<Mutex<HashMap<RunId, CancelToken>>>;

// Deregisters a run when its worker finishes, panics included.
struct Registered {
    active: ActiveRuns,
    id: RunId,
}
impl Drop for Registered {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.remove(&self.id);
    }
}

/// Registry managing analysis lifecycles.
pub struct AnalysisRunner {
    settings: Arc<Settings>,
    next_id: Mutex<u64>,
    active: ActiveRuns, // for external cancellation
}

impl AnalysisRunner {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            next_id: Mutex::new(0),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn allocate_id(&self) -> Result<RunId> {
        let mut next_id = self.next_id.lock().map_err(|e| CartwiseError::Worker(e.to_string()))?;
        *next_id += 1;
        Ok(RunId(*next_id))
    }

    /// Submit raw transactions for analysis on a background thread.
    pub fn start(&self, raw_transactions: Vec<Vec<String>>) -> Result<AnalysisHandle> {
        let id = self.allocate_id()?;
        let cancel = CancelToken::new();
        self.active
            .lock()
            .map_err(|e| CartwiseError::Worker(e.to_string()))?
            .insert(id, cancel.clone());

        let settings = Arc::clone(&self.settings);
        let active = Arc::clone(&self.active);
        let cancel_for_thread = cancel.clone();
        let join = std::thread::spawn(move || {
            let _registered = Registered { active, id };
            debug!(?id, transactions = raw_transactions.len(), "analysis started");
            let result = Analysis::run_cancellable(raw_transactions, &settings, &cancel_for_thread);
            if let Err(e) = &result {
                warn!(?id, error = %e, "analysis failed");
            }
            result
        });

        Ok(AnalysisHandle {
            id,
            cancel,
            started: Instant::now(),
            join,
        })
    }

    /// Run an analysis synchronously on the current thread.
    pub fn run_sync<R, T, S>(&self, raw_transactions: R) -> Result<Analysis>
    where
        R: IntoIterator<Item = T>,
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Analysis::run(raw_transactions, &self.settings)
    }

    /// Cancel a run by id. Returns false when the run is unknown or already finished.
    pub fn cancel(&self, id: RunId) -> Result<bool> {
        let active = self.active.lock().map_err(|e| CartwiseError::Worker(e.to_string()))?;
        Ok(match active.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        })
    }

    /// Number of runs that have not finished yet.
    pub fn active(&self) -> Result<usize> {
        Ok(self
            .active
            .lock()
            .map_err(|e| CartwiseError::Worker(e.to_string()))?
            .len())
    }
}
