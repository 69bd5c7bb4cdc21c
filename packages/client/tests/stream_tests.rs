#![allow(clippy::disallowed_methods)]

use std::error::Error;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use api::{AppState, JobId, ServerConfig, StatusUpdate, init_status_service, router};
use status_client::{ClientConfig, ClientError, Notifier, StatusEvent, StreamClient};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

#[derive(Clone, Default)]
struct CountingNotifier {
    errors: Arc<AtomicUsize>,
}

impl Notifier for CountingNotifier {
    fn error(&self, _message: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

/// Serve the status routes on an ephemeral port.
async fn serve() -> Result<(AppState, String), Box<dyn Error>> {
    let config = ServerConfig::default()
        .with_greeting(false)
        .with_keep_alive(Duration::from_millis(200));
    let (state, _handle) = init_status_service(config).await?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    let app = router(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok((state, base_url))
}

fn client(base_url: &str, notifier: &CountingNotifier) -> Result<StreamClient, Box<dyn Error>> {
    Ok(StreamClient::new(ClientConfig::new(base_url))?.with_notifier(notifier.clone()))
}

/// Poll until `check` holds or five seconds pass.
async fn wait_for(mut check: impl FnMut() -> bool) -> Result<(), Box<dyn Error>> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;
    Ok(())
}

struct Recorder {
    messages: mpsc::UnboundedReceiver<StatusEvent>,
    finished: oneshot::Receiver<()>,
    finishes: Arc<AtomicUsize>,
}

fn recorder() -> (
    impl FnMut(StatusEvent) + Send + 'static,
    impl FnOnce() + Send + 'static,
    Recorder,
) {
    let (message_tx, messages) = mpsc::unbounded_channel();
    let (finish_tx, finished) = oneshot::channel();
    let finishes = Arc::new(AtomicUsize::new(0));
    let counter = finishes.clone();

    let on_message = move |event| {
        let _ = message_tx.send(event);
    };
    let on_finish = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = finish_tx.send(());
    };

    (
        on_message,
        on_finish,
        Recorder {
            messages,
            finished,
            finishes,
        },
    )
}

#[tokio::test]
async fn updates_reach_only_their_job() -> Result<(), Box<dyn Error>> {
    let (state, base_url) = serve().await?;
    let notifier = CountingNotifier::default();
    let client = client(&base_url, &notifier)?;
    let abc = JobId::parse("abc");
    let xyz = JobId::parse("xyz");

    let (on_message, on_finish, mut a) = recorder();
    let _a = client.create_task("/api/status-stream?job_id=abc", on_message, on_finish);
    let (on_message, on_finish, mut b) = recorder();
    let _b = client.create_task("/api/status-stream?job_id=xyz", on_message, on_finish);

    let registry = state.broadcaster.registry().clone();
    wait_for(|| {
        registry.bucket_len(abc.as_ref()) == 1 && registry.bucket_len(xyz.as_ref()) == 1
    })
    .await?;

    state
        .broadcaster
        .publish(StatusUpdate::new("running").for_job(abc.clone()).with_progress(0.5))?;
    state.broadcaster.complete(abc.clone())?;

    tokio::time::timeout(Duration::from_secs(5), &mut a.finished).await??;
    let first = a.messages.recv().await.ok_or("no message for abc")?;
    assert_eq!(first.status, "running");
    assert_eq!(first.progress, Some(0.5));
    assert_eq!(first.job_id.as_deref(), Some("abc"));
    assert!(a.messages.recv().await.is_none());
    assert_eq!(a.finishes.load(Ordering::SeqCst), 1);

    // xyz saw nothing and is still open.
    assert!(b.messages.try_recv().is_err());
    assert_eq!(b.finishes.load(Ordering::SeqCst), 0);

    state.broadcaster.complete(xyz.clone())?;
    tokio::time::timeout(Duration::from_secs(5), &mut b.finished).await??;
    assert!(b.messages.recv().await.is_none());

    wait_for(|| registry.is_empty()).await?;
    wait_for(|| client.active_tasks() == 0).await?;
    assert_eq!(notifier.errors.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn cancel_before_first_message_finishes_once() -> Result<(), Box<dyn Error>> {
    let (state, base_url) = serve().await?;
    let notifier = CountingNotifier::default();
    let client = client(&base_url, &notifier)?;
    let job = JobId::parse("slow");

    let (on_message, on_finish, mut recorded) = recorder();
    let handle = client.create_task("/api/status-stream?job_id=slow", on_message, on_finish);

    let registry = state.broadcaster.registry().clone();
    wait_for(|| registry.bucket_len(job.as_ref()) == 1).await?;

    handle.cancel();
    handle.cancel();
    assert_eq!(client.active_tasks(), 0);
    tokio::time::timeout(Duration::from_secs(5), &mut recorded.finished).await??;
    handle.cancel();
    assert!(handle.is_finished());
    assert_eq!(recorded.finishes.load(Ordering::SeqCst), 1);

    // The server notices the disconnect on its next keep-alive write.
    wait_for(|| registry.is_empty()).await?;

    state
        .broadcaster
        .publish(StatusUpdate::new("late").for_job(job.clone()))?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(recorded.messages.try_recv().is_err());
    assert_eq!(recorded.finishes.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.errors.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn connection_failure_notifies_and_finishes() -> Result<(), Box<dyn Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    drop(listener);

    let notifier = CountingNotifier::default();
    let client = client(&base_url, &notifier)?;

    let (on_message, on_finish, mut recorded) = recorder();
    let handle = client.create_task("/api/status-stream", on_message, on_finish);

    tokio::time::timeout(Duration::from_secs(5), &mut recorded.finished).await??;
    assert!(handle.is_finished());
    handle.cancel();

    assert_eq!(recorded.finishes.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.errors.load(Ordering::SeqCst), 1);
    assert!(recorded.messages.recv().await.is_none());
    Ok(())
}

#[tokio::test]
async fn listen_for_result_returns_last_result() -> Result<(), Box<dyn Error>> {
    let (state, base_url) = serve().await?;
    let notifier = CountingNotifier::default();
    let client = client(&base_url, &notifier)?;
    let job = JobId::parse("render");

    let listener = client.clone();
    let pending = tokio::spawn(async move {
        listener
            .listen_for_result("/api/status-stream?job_id=render")
            .await
    });

    let registry = state.broadcaster.registry().clone();
    wait_for(|| registry.bucket_len(job.as_ref()) == 1).await?;

    state.broadcaster.publish(
        StatusUpdate::new("status")
            .for_job(job.clone())
            .with_data(&serde_json::json!({ "message": "working" }))?,
    )?;
    state.broadcaster.publish(
        StatusUpdate::new("result")
            .for_job(job.clone())
            .with_data(&serde_json::json!({ "answer": 42 }))?,
    )?;
    state.broadcaster.complete(job.clone())?;

    let result = tokio::time::timeout(Duration::from_secs(5), pending).await???;
    assert_eq!(result["answer"], 42);
    Ok(())
}

#[tokio::test]
async fn listen_for_result_fails_on_error_or_missing_result() -> Result<(), Box<dyn Error>> {
    let (state, base_url) = serve().await?;
    let notifier = CountingNotifier::default();
    let client = client(&base_url, &notifier)?;
    let registry = state.broadcaster.registry().clone();

    let failing = JobId::parse("failing");
    let listener = client.clone();
    let pending = tokio::spawn(async move {
        listener
            .listen_for_result("/api/status-stream?job_id=failing")
            .await
    });
    wait_for(|| registry.bucket_len(failing.as_ref()) == 1).await?;
    state.broadcaster.publish(
        StatusUpdate::new("error")
            .for_job(failing.clone())
            .with_data(&serde_json::json!({ "message": "out of memory" }))?,
    )?;
    let outcome = tokio::time::timeout(Duration::from_secs(5), pending).await??;
    assert!(matches!(outcome, Err(ClientError::Job(message)) if message == "out of memory"));

    let empty = JobId::parse("empty");
    let listener = client.clone();
    let pending = tokio::spawn(async move {
        listener
            .listen_for_result("/api/status-stream?job_id=empty")
            .await
    });
    wait_for(|| registry.bucket_len(empty.as_ref()) == 1).await?;
    state.broadcaster.complete(empty.clone())?;
    let outcome = tokio::time::timeout(Duration::from_secs(5), pending).await??;
    assert!(matches!(outcome, Err(ClientError::NoResult)));
    Ok(())
}

#[tokio::test]
async fn formatted_payloads_decode_to_the_same_value() -> Result<(), Box<dyn Error>> {
    let (state, base_url) = serve().await?;
    let notifier = CountingNotifier::default();
    let client = client(&base_url, &notifier)?;
    let job = JobId::parse("pretty");

    let (on_message, on_finish, mut recorded) = recorder();
    let _handle = client.create_task("/api/status-stream?job_id=pretty", on_message, on_finish);
    let registry = state.broadcaster.registry().clone();
    wait_for(|| registry.bucket_len(job.as_ref()) == 1).await?;

    let http = reqwest::Client::new();
    let body = "{\r\n  \"status\": \"running\",\r\n  \"data\": {\r\n    \"message\": \"line one\\r\\nline two\",\r\n    \"layers\": [1,\n 2]\r\n  }\r\n}";
    let response = http
        .post(format!("{}/api/status-update?job_id=pretty", base_url))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    http.post(format!("{}/api/status-complete?job_id=pretty", base_url))
        .send()
        .await?;

    tokio::time::timeout(Duration::from_secs(5), &mut recorded.finished).await??;
    let event = recorded.messages.recv().await.ok_or("no update")?;
    assert_eq!(
        event.data,
        Some(serde_json::json!({ "message": "line one\r\nline two", "layers": [1, 2] }))
    );
    assert_eq!(event.message(), "line one\r\nline two");
    assert_eq!(notifier.errors.load(Ordering::SeqCst), 0);
    Ok(())
}

#[derive(Debug, PartialEq)]
enum Seen {
    Message(String),
    Finished,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_message_is_delivered_after_finish() -> Result<(), Box<dyn Error>> {
    let (state, base_url) = serve().await?;
    let notifier = CountingNotifier::default();
    let client = client(&base_url, &notifier)?;
    let job = JobId::parse("busy");

    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let handle_slot: Arc<OnceLock<status_client::TaskHandle>> = Arc::new(OnceLock::new());

    let message_tx = seen_tx.clone();
    let slot = handle_slot.clone();
    let handle = client.create_task(
        "/api/status-stream?job_id=busy",
        move |event: StatusEvent| {
            // Cancelling from inside the callback must not block.
            if event.status == "stop"
                && let Some(handle) = slot.get()
            {
                handle.cancel();
            }
            let _ = message_tx.send(Seen::Message(event.status));
        },
        move || {
            let _ = seen_tx.send(Seen::Finished);
        },
    );
    let _ = handle_slot.set(handle);

    let registry = state.broadcaster.registry().clone();
    wait_for(|| registry.bucket_len(job.as_ref()) == 1).await?;

    for step in 0..20 {
        state
            .broadcaster
            .publish(StatusUpdate::new(format!("step-{}", step)).for_job(job.clone()))?;
    }
    state
        .broadcaster
        .publish(StatusUpdate::new("stop").for_job(job.clone()))?;
    for step in 0..20 {
        state
            .broadcaster
            .publish(StatusUpdate::new(format!("late-{}", step)).for_job(job.clone()))?;
    }

    let mut log = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), seen.recv()).await?;
        match next {
            Some(Seen::Finished) => {
                log.push(Seen::Finished);
                break;
            }
            Some(entry) => log.push(entry),
            None => return Err("callbacks dropped without finishing".into()),
        }
    }

    assert_eq!(log.last(), Some(&Seen::Finished));
    assert_eq!(log.iter().filter(|entry| **entry == Seen::Finished).count(), 1);
    assert!(log.contains(&Seen::Message("stop".to_string())));
    let stop = log
        .iter()
        .position(|entry| *entry == Seen::Message("stop".to_string()))
        .ok_or("stop not seen")?;
    assert_eq!(stop, log.len() - 2, "nothing after the cancelling message");

    // Both callbacks are gone once the task has stopped.
    assert!(tokio::time::timeout(Duration::from_secs(5), seen.recv()).await?.is_none());
    assert!(handle_slot.get().is_some_and(|handle| handle.is_finished()));
    Ok(())
}
