//! Streaming client that owns connections for the status stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::controller::{CONNECTION_FAILED, FinishOnce, StreamEnd, TaskId, drive};
use crate::error::ClientError;
use crate::event::StatusEvent;
use crate::notify::{LogNotifier, Notifier};

/// Connection settings for [`StreamClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Resolve a relative path against the base URL. Absolute URLs pass through.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Stops a task: no further deliveries, then abort at its next await.
#[derive(Clone)]
struct Cancellation {
    abort: AbortHandle,
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.abort.abort();
    }
}

type ActiveTasks = Arc<Mutex<HashMap<TaskId, Cancellation>>>;

fn lock(active: &ActiveTasks) -> MutexGuard<'_, HashMap<TaskId, Cancellation>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fires the completion callback when the task's future is dropped, whether
/// it ran to the end or was aborted.
struct FinishGuard(Arc<FinishOnce>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.fire();
    }
}

/// Handle for one running stream task.
pub struct TaskHandle {
    id: TaskId,
    cancellation: Cancellation,
    finish: Arc<FinishOnce>,
    active: ActiveTasks,
}

impl TaskHandle {
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Close the connection. The completion callback runs once the task has
    /// stopped, unless it already ran.
    ///
    /// Safe to call any number of times, including from inside the message
    /// callback.
    pub fn cancel(&self) {
        self.cancellation.cancel();
        if lock(&self.active).remove(&self.id).is_some() {
            tracing::debug!("Cancelled stream task {}", self.id);
        }
    }

    /// Whether the completion callback has run.
    pub fn is_finished(&self) -> bool {
        self.finish.is_fired()
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// HTTP client for status streams.
#[derive(Clone)]
pub struct StreamClient {
    http: reqwest::Client,
    config: ClientConfig,
    notifier: Arc<dyn Notifier>,
    active: ActiveTasks,
}

impl StreamClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http,
            config,
            notifier: Arc::new(LogNotifier),
            active: Arc::default(),
        })
    }

    pub fn with_notifier(mut self, notifier: impl Notifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open a stream and feed decoded updates to `on_message`.
    ///
    /// `on_finish` runs exactly once, after the completion marker, a
    /// transport failure, or [`TaskHandle::cancel`], and never before a call
    /// to `on_message` has returned. Must be called from within a tokio
    /// runtime.
    pub fn create_task<M, F>(&self, path: &str, mut on_message: M, on_finish: F) -> TaskHandle
    where
        M: FnMut(StatusEvent) + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let id = TaskId::new();
        let url = self.config.resolve(path);
        let finish = Arc::new(FinishOnce::new(on_finish));
        // Moved into the task so that dropping its future, even unpolled,
        // is the only place the completion callback runs.
        let guard = FinishGuard(finish.clone());
        let cancelled = Arc::new(AtomicBool::new(false));
        let task_cancelled = cancelled.clone();

        let http = self.http.clone();
        let notifier = self.notifier.clone();
        let active = self.active.clone();
        let task_id = id.clone();

        // Held across spawn so the task cannot deregister before it is registered.
        let mut tasks = lock(&self.active);
        let join = tokio::spawn(async move {
            let _guard = guard;
            tracing::debug!("Opening stream task {} to {}", task_id, url);

            let end = match open(&http, &url).await {
                Ok(response) => {
                    let mut deliver = |event: StatusEvent| {
                        if !task_cancelled.load(Ordering::Acquire) {
                            on_message(event);
                        }
                    };
                    drive(response.bytes_stream(), &mut deliver, notifier.as_ref()).await
                }
                Err(e) => StreamEnd::Failed(e),
            };

            match end {
                StreamEnd::Done => tracing::debug!("Stream task {} completed", task_id),
                StreamEnd::Failed(e) => {
                    tracing::error!("EventSource error on {}: {}", task_id, e);
                    notifier.error(CONNECTION_FAILED);
                }
            }

            lock(&active).remove(&task_id);
        });

        let cancellation = Cancellation {
            abort: join.abort_handle(),
            cancelled,
        };
        tasks.insert(id.clone(), cancellation.clone());
        drop(tasks);

        TaskHandle {
            id,
            cancellation,
            finish,
            active: self.active.clone(),
        }
    }

    /// Number of streams that have not finished yet.
    pub fn active_tasks(&self) -> usize {
        lock(&self.active).len()
    }

    /// Cancel every running stream.
    pub fn cancel_all(&self) {
        for (_, cancellation) in lock(&self.active).drain() {
            cancellation.cancel();
        }
    }

    /// Follow a job stream until it finishes and return its result payload.
    ///
    /// Updates with status `result` carry the payload in `data`; the last one
    /// wins. An `error` update fails immediately with its message.
    pub async fn listen_for_result(&self, path: &str) -> Result<Value, ClientError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = self.create_task(
            path,
            move |event| {
                let _ = tx.send(event);
            },
            || {},
        );

        let mut result = None;
        while let Some(event) = rx.recv().await {
            match event.status.as_str() {
                "result" => result = event.data,
                "error" => {
                    handle.cancel();
                    return Err(ClientError::Job(event.message()));
                }
                _ => tracing::info!("Job status: {}", event.message()),
            }
        }

        result.ok_or(ClientError::NoResult)
    }
}

async fn open(http: &reqwest::Client, url: &str) -> Result<reqwest::Response, ClientError> {
    let response = http
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()?;
    Ok(response)
}
