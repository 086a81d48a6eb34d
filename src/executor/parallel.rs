//! Bounded parallel dispatch
//!
//! At most `P` workers run at once; a new job starts as soon as a slot
//! frees up. Parallel runs never fail fast.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::debug;

use super::worker::Worker;
use super::EngineError;
use crate::config::ConcurrencyLevel;
use crate::models::{ExecutionResult, TestJob};

pub(crate) async fn run_parallel(
    worker: Worker,
    jobs: &[TestJob],
    concurrency: ConcurrencyLevel,
) -> Result<(), EngineError> {
    let slots = Arc::new(Semaphore::new(concurrency.get()));
    let mut tasks = JoinSet::new();

    for job in jobs {
        let permit = Arc::clone(&slots)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::PoolClosed)?;

        // Surface finished failures before starting more work
        while let Some(joined) = tasks.try_join_next() {
            settle(joined)?;
        }

        let worker = worker.clone();
        let job = job.clone();
        debug!(job = %job.id, "Dispatching");
        tasks.spawn(async move {
            let _permit = permit;
            worker.run(&job).await
        });
    }

    drop(worker);

    while let Some(joined) = tasks.join_next().await {
        settle(joined)?;
    }
    Ok(())
}

fn settle(
    joined: Result<Result<ExecutionResult, EngineError>, JoinError>,
) -> Result<(), EngineError> {
    match joined {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) => Err(err),
        Err(err) => Err(EngineError::Worker(err.to_string())),
    }
}
