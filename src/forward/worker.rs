//! Worker loop: take a task, attempt it, finalize or requeue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use tokio::time::Instant;

use crate::forward::client::ForwardError;
use crate::forward::engine::{EngineState, Shared};
use crate::forward::events::TaskEvent;
use crate::observability::metrics;
use crate::task::TaskRecord;

/// Deadline for each requeue attempt into a full queue.
const REQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause after an empty poll while the engine is still running.
const IDLE_PAUSE: Duration = Duration::from_millis(1);

pub(crate) async fn run(worker_id: usize, shared: Arc<Shared>) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        let deadline = Instant::now() + shared.settings.poll_interval;
        let Some(mut task) = shared.queue.get(deadline).await else {
            if shared.state() == EngineState::Stopping {
                break;
            }
            tokio::time::sleep(IDLE_PAUSE).await;
            continue;
        };

        attempt(&shared, &mut task).await;

        if task.is_finished(shared.settings.retry_limit) {
            metrics::record_done(task.succeeded);
            shared.events.emit(TaskEvent::Done, &task.report());
            shared.pool.release(task);
        } else {
            requeue(&shared, task).await;
        }
    }

    tracing::debug!(worker_id, "Worker exited");
}

/// One outbound call, recorded on the task.
async fn attempt(shared: &Shared, task: &mut TaskRecord) {
    task.last_attempt_at = Some(Utc::now());
    let started = Instant::now();

    let outcome = match task.request.as_ref() {
        Some(request) => shared.transport.send(request).await,
        None => Err(ForwardError::MissingRequest),
    };

    task.last_attempt_duration = started.elapsed();
    let succeeded = matches!(outcome, Ok(status) if status == StatusCode::OK);
    metrics::record_attempt(succeeded, task.last_attempt_duration);

    match outcome {
        Ok(_) if succeeded => task.record_success(),
        Ok(status) => task.record_failure(status.to_string()),
        Err(e) => task.record_failure(e.to_string()),
    }

    tracing::trace!(
        id = %task.id,
        attempts = task.attempt_count,
        succeeded = task.succeeded,
        "Forward attempt finished"
    );
}

/// Put an unfinished task back, retrying until the queue takes it.
///
/// A retried task is never dropped, even when new submissions keep the queue
/// full.
async fn requeue(shared: &Shared, mut task: Box<TaskRecord>) {
    loop {
        let deadline = Instant::now() + REQUEUE_TIMEOUT;
        match shared.queue.put(task, deadline).await {
            Ok(()) => return,
            Err(back) => {
                tracing::debug!(id = %back.id, "Queue full, retrying requeue");
                task = back;
                tokio::time::sleep(shared.settings.requeue_pause).await;
            }
        }
    }
}
