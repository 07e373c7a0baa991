//! Bounded job executor.
//!
//! A fixed number of permits, handed out in FIFO order by a fair
//! semaphore. Each leaf operation (one HTTP fetch, one process run, one
//! upload) holds a single permit for its duration. Callers never hold a
//! permit while requesting another one.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("Job executor is shut down")]
    Closed,

    #[error("Job was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct JobExecutor {
    permits: Arc<Semaphore>,
    size: usize,
}

impl JobExecutor {
    /// A pool of `size` permits. A size of zero is raised to one.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Units currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.size.saturating_sub(self.permits.available_permits())
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Wait for a permit, then drive `job` to completion while holding it.
    pub async fn run<F, T>(&self, label: &'static str, job: F) -> Result<T, ExecutorError>
    where
        F: Future<Output = T>,
    {
        let queued = Instant::now();
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ExecutorError::Closed)?;

        let waited_ms = queued.elapsed().as_millis() as u64;
        tracing::debug!(job = label, waited_ms, "Job started");
        let started = Instant::now();
        let output = job.await;
        tracing::debug!(
            job = label,
            duration_ms = started.elapsed().as_millis() as u64,
            "Job finished"
        );
        Ok(output)
    }

    /// Like [`run`](Self::run), but abandons the unit as soon as `cancel`
    /// fires, whether it is still queued or already running. Dropping the
    /// unit kills any child process it spawned.
    pub async fn run_cancellable<F, T>(
        &self,
        label: &'static str,
        cancel: &CancellationToken,
        job: F,
    ) -> Result<T, ExecutorError>
    where
        F: Future<Output = T>,
    {
        if cancel.is_cancelled() {
            return Err(ExecutorError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(job = label, "Job cancelled");
                Err(ExecutorError::Cancelled)
            }
            result = self.run(label, job) => result,
        }
    }

    /// Refuse new work. Units already holding a permit run to completion.
    pub fn close(&self) {
        self.permits.close();
    }
}
