//! Fan-out of blocking engine calls with a short-circuiting, cancellable join.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::EngineError;

/// Why a stage stopped before producing every output
#[derive(Debug, Clone, PartialEq)]
pub enum StageError {
    /// The run's token fired while jobs were still pending
    Cancelled,
    /// The first job failure (or panic) observed
    Engine(EngineError),
}

/// Run each job on the blocking pool and collect their outputs.
///
/// Outputs are returned in job order regardless of completion order. The
/// first failure aborts the remaining jobs and is returned as is. When
/// `token` fires, the join stops waiting immediately; jobs already running
/// keep going in the background and their output is dropped.
pub async fn fan_out<T, F>(stage: &str, jobs: Vec<F>, token: &CancellationToken) -> Result<Vec<T>, StageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
{
    let total = jobs.len();
    let mut set = JoinSet::new();
    for (index, job) in jobs.into_iter().enumerate() {
        set.spawn_blocking(move || (index, job()));
    }

    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
    loop {
        let joined = tokio::select! {
            biased;
            _ = token.cancelled() => {
                set.abort_all();
                debug!(stage, pending = set.len(), "stage cancelled");
                return Err(StageError::Cancelled);
            }
            joined = set.join_next() => joined,
        };

        match joined {
            None => break,
            Some(Ok((index, Ok(output)))) => slots[index] = Some(output),
            Some(Ok((index, Err(e)))) => {
                set.abort_all();
                debug!(stage, index, error = %e, "job failed, aborting stage");
                return Err(StageError::Engine(e));
            }
            Some(Err(join_error)) => {
                set.abort_all();
                return Err(StageError::Engine(EngineError::failed(stage, join_error)));
            }
        }
    }

    debug!(stage, jobs = total, "stage complete");
    Ok(slots.into_iter().flatten().collect())
}
