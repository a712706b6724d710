//! The forwarding engine: queue, worker pool and lifecycle state machine.
//!
//! # State Transitions
//! ```text
//! Ready ──start──▶ Running ──stop──▶ Stopping ──(all workers exited)──▶ Ready
//! ```
//! `start` outside `Ready` fails without spawning anything; `stop` outside
//! `Running` is a no-op.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::AgentConfig;
use crate::forward::client::Transport;
use crate::forward::events::{EventSink, TaskEvent};
use crate::forward::worker;
use crate::http::OutboundRequest;
use crate::observability::metrics;
use crate::queue::BoundedQueue;
use crate::task::{generate_id, TaskPool, TaskRecord};

/// Lifecycle state of the engine.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Ready = 0,
    Running = 1,
    Stopping = 2,
}

impl From<u8> for EngineState {
    fn from(val: u8) -> Self {
        match val {
            1 => EngineState::Running,
            2 => EngineState::Stopping,
            _ => EngineState::Ready,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Ready => "ready",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("forward engine is running or stopping (state: {0})")]
    AlreadyActive(EngineState),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("request put into buffer timeout")]
    QueueFull,
}

/// Sizing and timing of the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Failed attempts allowed before a task is finalized as failed.
    pub retry_limit: u32,
    pub worker_count: usize,
    /// Ring capacity (usable slots are one fewer).
    pub queue_capacity: usize,
    /// How long a worker waits on an empty queue before checking for shutdown.
    pub poll_interval: Duration,
    /// Deadline for admitting a new request.
    pub submit_timeout: Duration,
    /// Pause between attempts to requeue into a full queue.
    pub requeue_pause: Duration,
}

impl EngineSettings {
    pub fn new(retry_limit: u32, worker_count: usize, queue_capacity: usize) -> Self {
        Self {
            retry_limit,
            worker_count,
            queue_capacity,
            poll_interval: Duration::from_secs(1),
            submit_timeout: Duration::from_secs(1),
            requeue_pause: Duration::from_millis(1),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            retry_limit: config.retry_times,
            worker_count: config.out_parallel,
            queue_capacity: config.buffer_length,
            poll_interval: Duration::from_millis(config.forward.poll_interval_ms),
            submit_timeout: Duration::from_millis(config.forward.submit_timeout_ms),
            requeue_pause: Duration::from_millis(config.forward.requeue_pause_ms),
        }
    }
}

/// State shared between the engine handle and its workers.
pub(crate) struct Shared {
    pub(crate) settings: EngineSettings,
    pub(crate) queue: BoundedQueue<Box<TaskRecord>>,
    pub(crate) pool: TaskPool,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) events: Arc<dyn EventSink>,
    state: AtomicU8,
}

impl Shared {
    pub(crate) fn state(&self) -> EngineState {
        EngineState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Owns the request queue and the worker pool that drains it.
pub struct ForwardEngine {
    shared: Arc<Shared>,
    /// Lifecycle lock; holds the running workers.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ForwardEngine {
    /// # Panics
    ///
    /// Panics if `settings.queue_capacity` is less than 2.
    pub fn new(
        settings: EngineSettings,
        transport: Arc<dyn Transport>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let shared = Shared {
            queue: BoundedQueue::new(settings.queue_capacity),
            pool: TaskPool::new(settings.queue_capacity),
            settings,
            transport,
            events,
            state: AtomicU8::new(EngineState::Ready as u8),
        };
        Self {
            shared: Arc::new(shared),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker pool.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut workers = self.workers.lock().await;
        let state = self.shared.state();
        if state != EngineState::Ready {
            return Err(EngineError::AlreadyActive(state));
        }

        self.shared.set_state(EngineState::Running);
        for worker_id in 0..self.shared.settings.worker_count {
            let shared = Arc::clone(&self.shared);
            workers.push(tokio::spawn(worker::run(worker_id, shared)));
        }

        tracing::info!(
            workers = self.shared.settings.worker_count,
            retry_limit = self.shared.settings.retry_limit,
            queue_capacity = self.shared.settings.queue_capacity,
            "Forward engine started"
        );
        Ok(())
    }

    /// Drain the queue and wait for every worker to exit.
    ///
    /// In-flight outbound calls are never aborted: workers finish (or requeue)
    /// what they hold and only exit once the queue is empty.
    pub async fn stop(&self) {
        let mut workers = self.workers.lock().await;
        if self.shared.state() != EngineState::Running {
            return;
        }

        self.shared.set_state(EngineState::Stopping);
        tracing::info!(queued = self.shared.queue.len(), "Forward engine draining");

        for (worker_id, handle) in workers.drain(..).enumerate() {
            if let Err(e) = handle.await {
                tracing::error!(worker_id, error = %e, "Worker terminated abnormally");
            }
        }

        self.shared.set_state(EngineState::Ready);
        tracing::info!("Forward engine stopped");
    }

    /// Queue `request` for forwarding and return its tracking id.
    ///
    /// Waits at most `submit_timeout` for queue space; the caller is never
    /// blocked longer than that.
    pub async fn submit(&self, request: OutboundRequest) -> Result<String, SubmitError> {
        let mut task = self.shared.pool.acquire();
        task.prepare(generate_id(), request, Utc::now());

        let id = task.id.clone();
        // The task may be picked up the moment it is queued.
        let report = task.report();

        let deadline = Instant::now() + self.shared.settings.submit_timeout;
        match self.shared.queue.put(task, deadline).await {
            Ok(()) => {
                metrics::record_submission(true);
                metrics::record_queue_depth(self.shared.queue.len());
                self.shared.events.emit(TaskEvent::Put, &report);
                Ok(id)
            }
            Err(task) => {
                metrics::record_submission(false);
                tracing::warn!(id = %id, "Queue full, request rejected");
                self.shared.pool.release(task);
                Err(SubmitError::QueueFull)
            }
        }
    }

    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    /// Number of tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Number of recycled task records ready for reuse.
    pub fn idle_records(&self) -> usize {
        self.shared.pool.idle()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.shared.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::client::ForwardError;
    use crate::task::TaskReport;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Replays a script of statuses, then answers 200.
    struct ScriptedTransport {
        script: StdMutex<VecDeque<u16>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedTransport {
        fn new(script: &[u16]) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.iter().copied().collect()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &OutboundRequest) -> Result<StatusCode, ForwardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().unwrap().pop_front().unwrap_or(200);
            Ok(StatusCode::from_u16(next).unwrap())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: StdMutex<Vec<(TaskEvent, TaskReport)>>,
    }

    impl RecordingSink {
        fn done(&self) -> Vec<TaskReport> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(e, _)| *e == TaskEvent::Done)
                .map(|(_, r)| r.clone())
                .collect()
        }

        fn puts(&self) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(e, _)| *e == TaskEvent::Put)
                .count()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: TaskEvent, report: &TaskReport) {
            self.events.lock().unwrap().push((event, report.clone()));
        }
    }

    fn settings(retry_limit: u32, workers: usize, capacity: usize) -> EngineSettings {
        let mut settings = EngineSettings::new(retry_limit, workers, capacity);
        settings.poll_interval = Duration::from_millis(20);
        settings
    }

    fn request() -> OutboundRequest {
        OutboundRequest::get("http://example.test/a?b=1".parse().unwrap())
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let engine = ForwardEngine::new(
            settings(3, 2, 4),
            ScriptedTransport::new(&[]),
            Arc::new(RecordingSink::default()),
        );
        engine.start().await.unwrap();
        assert_eq!(engine.state(), EngineState::Running);

        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyActive(EngineState::Running)));

        engine.stop().await;
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn stop_on_ready_is_noop() {
        let engine = ForwardEngine::new(
            settings(3, 2, 4),
            ScriptedTransport::new(&[]),
            Arc::new(RecordingSink::default()),
        );
        engine.stop().await;
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn successful_forward_is_done_once() {
        let transport = ScriptedTransport::new(&[]);
        let sink = Arc::new(RecordingSink::default());
        let engine = ForwardEngine::new(settings(3, 2, 8), transport.clone(), sink.clone());
        engine.start().await.unwrap();

        let id = engine.submit(request()).await.unwrap();
        engine.stop().await;

        let done = sink.done();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, id);
        assert!(done[0].success);
        assert_eq!(done[0].try_count, 0);
        assert!(done[0].last_try_time.is_some());
        assert_eq!(sink.puts(), 1);
        assert_eq!(transport.calls(), 1);
        assert_eq!(engine.idle_records(), 1);
    }

    #[tokio::test]
    async fn failures_before_success_are_counted() {
        let transport = ScriptedTransport::new(&[503, 503, 503]);
        let sink = Arc::new(RecordingSink::default());
        let engine = ForwardEngine::new(settings(4, 1, 8), transport.clone(), sink.clone());
        engine.start().await.unwrap();

        engine.submit(request()).await.unwrap();
        engine.stop().await;

        let done = sink.done();
        assert_eq!(done.len(), 1);
        assert!(done[0].success);
        assert_eq!(done[0].try_count, 3);
        assert_eq!(done[0].last_error, "");
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn retry_budget_is_never_exceeded() {
        let transport = ScriptedTransport::new(&[503, 503, 503, 503, 503]);
        let sink = Arc::new(RecordingSink::default());
        let engine = ForwardEngine::new(settings(3, 2, 8), transport.clone(), sink.clone());
        engine.start().await.unwrap();

        engine.submit(request()).await.unwrap();
        engine.stop().await;

        let done = sink.done();
        assert_eq!(done.len(), 1);
        assert!(!done[0].success);
        assert_eq!(done[0].try_count, 3);
        assert_eq!(done[0].last_error, "503 Service Unavailable");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn submit_fails_fast_when_full() {
        let mut settings = settings(3, 1, 2);
        settings.submit_timeout = Duration::from_millis(100);
        let sink = Arc::new(RecordingSink::default());
        let engine = ForwardEngine::new(settings, ScriptedTransport::new(&[]), sink.clone());

        engine.submit(request()).await.unwrap();

        let started = std::time::Instant::now();
        let err = engine.submit(request()).await.unwrap_err();
        assert!(matches!(err, SubmitError::QueueFull));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(engine.queued(), 1);
        assert_eq!(sink.puts(), 1);
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_calls() {
        let transport = ScriptedTransport::slow(Duration::from_millis(150));
        let sink = Arc::new(RecordingSink::default());
        let engine = ForwardEngine::new(settings(3, 2, 8), transport.clone(), sink.clone());
        engine.start().await.unwrap();

        for _ in 0..4 {
            engine.submit(request()).await.unwrap();
        }
        engine.stop().await;

        assert_eq!(sink.done().len(), 4);
        assert_eq!(transport.calls(), 4);
        assert_eq!(engine.queued(), 0);

        engine.start().await.unwrap();
        engine.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_are_each_forwarded_once() {
        let transport = ScriptedTransport::new(&[]);
        let sink = Arc::new(RecordingSink::default());
        let engine = Arc::new(ForwardEngine::new(
            settings(3, 4, 16),
            transport.clone(),
            sink.clone(),
        ));
        engine.start().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                loop {
                    if let Ok(id) = engine.submit(request()).await {
                        return id;
                    }
                }
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        engine.stop().await;

        let mut done: Vec<String> = sink.done().into_iter().map(|r| r.id).collect();
        done.sort();
        ids.sort();
        assert_eq!(done, ids);
        assert_eq!(transport.calls(), 50);
    }
}
