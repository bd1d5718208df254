//! Bounded concurrent analysis of many files.
//!
//! Each file is analyzed on tokio's blocking pool. A semaphore caps how many
//! run at once and every job gets a wall-clock deadline. A job that misses
//! its deadline is reported as timed out; the blocking work itself runs to
//! completion in the background, since analysis has no cancellation points.

use crate::core::config::ScanConfig;
use crate::core::error::{Error, Result};
use crate::core::types::AnalysisOutcome;
use crate::scanner::analyzer::FileAnalyzer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Final state of one batch job.
#[derive(Debug)]
pub enum BatchStatus {
    /// The analysis finished, successfully or with a read error
    Done(Result<AnalysisOutcome>),
    /// The analysis missed its deadline
    TimedOut,
}

/// One analyzed path and its status.
#[derive(Debug)]
pub struct BatchItem {
    pub path: PathBuf,
    pub status: BatchStatus,
}

impl BatchItem {
    /// The outcome, if the job finished without error.
    pub fn outcome(&self) -> Option<&AnalysisOutcome> {
        match &self.status {
            BatchStatus::Done(Ok(outcome)) => Some(outcome),
            _ => None,
        }
    }
}

/// Runs analyses with bounded concurrency and per-job deadlines.
pub struct BatchScanner {
    analyzer: FileAnalyzer,
    workers: usize,
    job_timeout: Duration,
}

impl BatchScanner {
    /// Create a batch scanner. `workers` is clamped to at least one.
    pub fn new(analyzer: FileAnalyzer, workers: usize, job_timeout: Duration) -> Self {
        Self {
            analyzer,
            workers: workers.max(1),
            job_timeout,
        }
    }

    /// Create a batch scanner from scan settings.
    pub fn from_config(analyzer: FileAnalyzer, config: &ScanConfig) -> Self {
        Self::new(
            analyzer,
            config.workers,
            Duration::from_secs(config.job_timeout_secs),
        )
    }

    /// Analyze every path. Items come back in input order.
    pub async fn scan_all(&self, paths: Vec<PathBuf>) -> Vec<BatchItem> {
        log::info!(
            "Scanning {} file(s) with {} worker(s)",
            paths.len(),
            self.workers
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(paths.len());

        for path in paths {
            let semaphore = Arc::clone(&semaphore);
            let analyzer = self.analyzer.clone();
            let job_timeout = self.job_timeout;

            handles.push(tokio::spawn(async move {
                let status = match semaphore.acquire_owned().await {
                    Ok(permit) => {
                        let job_path = path.clone();
                        let job = tokio::task::spawn_blocking(move || {
                            let _permit = permit;
                            analyzer.analyze(&job_path)
                        });

                        match tokio::time::timeout(job_timeout, job).await {
                            Ok(Ok(result)) => BatchStatus::Done(result),
                            Ok(Err(e)) => BatchStatus::Done(Err(Error::Internal(format!(
                                "analysis task failed: {}",
                                e
                            )))),
                            Err(_) => {
                                log::warn!(
                                    "Analysis of {} exceeded {:?}",
                                    path.display(),
                                    job_timeout
                                );
                                BatchStatus::TimedOut
                            }
                        }
                    }
                    Err(_) => BatchStatus::Done(Err(Error::Internal(
                        "worker pool closed".to_string(),
                    ))),
                };
                BatchItem { path, status }
            }));
        }

        let mut items = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(item) => items.push(item),
                Err(e) => log::error!("Batch worker failed: {}", e),
            }
        }

        let timed_out = items
            .iter()
            .filter(|item| matches!(item.status, BatchStatus::TimedOut))
            .count();
        log::info!(
            "Batch finished: {} item(s), {} timed out",
            items.len(),
            timed_out
        );
        items
    }
}
