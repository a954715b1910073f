//! Sync Client — retrying delivery over a pluggable transport.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mnema_core::config::SyncConfig;

use crate::error::SyncError;
use crate::queue::SyncQueue;
use crate::types::SyncBatch;

/// MIME type of batch bodies.
pub const MSGPACK_CONTENT_TYPE: &str = "application/msgpack";

/// Something that can carry one encoded batch to the remote end.
pub trait Transport: Send + Sync + 'static {
    /// Send one body. A single attempt; retries are the caller's concern.
    fn send(&self, body: Vec<u8>) -> impl Future<Output = Result<(), SyncError>> + Send;
}

/// HTTP POST transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    endpoint: String,
    timeout_ms: u64,
}

impl HttpTransport {
    /// Create a transport posting to `config.endpoint`.
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            http: Client::new(),
            endpoint: config.endpoint.clone(),
            timeout_ms: config.request_timeout_ms,
        }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, body: Vec<u8>) -> Result<(), SyncError> {
        if self.endpoint.is_empty() {
            return Err(SyncError::Unavailable("no sync endpoint configured".into()));
        }
        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, MSGPACK_CONTENT_TYPE)
            .body(body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SyncError::Timeout(self.timeout_ms)
                } else {
                    SyncError::from(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SyncError::RequestFailed(format!("HTTP {status}")))
        }
    }
}

/// Delivers batches with linear back-off.
#[derive(Debug, Clone)]
pub struct SyncClient<T> {
    transport: T,
    max_retries: u32,
    retry_delay: Duration,
}

impl<T: Transport> SyncClient<T> {
    /// Create a client.
    #[must_use]
    pub fn new(transport: T, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            transport,
            max_retries,
            retry_delay,
        }
    }

    /// Create a client with the retry policy from `config`.
    #[must_use]
    pub fn from_config(transport: T, config: &SyncConfig) -> Self {
        Self::new(transport, config.max_retries, Duration::from_millis(config.retry_delay_ms))
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `batch`, retrying up to `max_retries` times. Attempt `n` (1-based
    /// retry count) first waits `n × retry_delay`. Returns the number of
    /// attempts made.
    ///
    /// # Errors
    ///
    /// [`SyncError::Encode`] if the batch cannot be encoded, otherwise
    /// [`SyncError::RetriesExhausted`] once every attempt has failed.
    pub async fn deliver(&self, batch: &SyncBatch) -> Result<u32, SyncError> {
        let body = batch.encode()?;
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay * attempt).await;
                debug!(
                    agent = %batch.agent,
                    attempt = attempt + 1,
                    max = self.max_retries + 1,
                    "Retrying sync batch"
                );
            }
            match self.transport.send(body.clone()).await {
                Ok(()) => {
                    debug!(agent = %batch.agent, tick = batch.tick, bytes = body.len(), "Sync batch delivered");
                    return Ok(attempt + 1);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(agent = %batch.agent, attempt = attempt + 1, error = %last_error, "Sync attempt failed");
                }
            }
        }
        Err(SyncError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Handle to a running sync worker.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Drain what is already queued, then stop.
    pub async fn shutdown(self) {
        // A closed channel means the worker already exited.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sync worker terminated abnormally");
        }
    }
}

/// Spawn a tokio task that drains `queue` through `client`.
///
/// Failed batches are logged, counted and dropped.
pub fn spawn_worker<T: Transport>(client: SyncClient<T>, queue: SyncQueue) -> WorkerHandle {
    let (shutdown, mut stop) = watch::channel(false);
    let client = Arc::new(client);
    let task = tokio::spawn(async move {
        info!("Sync worker started");
        loop {
            while let Some(batch) = queue.pop() {
                match client.deliver(&batch).await {
                    Ok(_) => queue.mark_sent(),
                    Err(e) => {
                        queue.mark_failed();
                        warn!(agent = %batch.agent, tick = batch.tick, error = %e, "Dropping sync batch");
                    }
                }
            }
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                () = queue.ready() => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        let stats = queue.stats();
        info!(sent = stats.total_sent, failed = stats.total_failed, dropped = stats.total_dropped, "Sync worker stopped");
    });
    WorkerHandle { shutdown, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use mnema_core::types::AgentId;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    /// Fails the first `failures` sends, then accepts everything.
    #[derive(Default)]
    struct MockTransport {
        failures: u32,
        calls: AtomicU32,
        received: Mutex<Vec<Vec<u8>>>,
    }

    impl MockTransport {
        fn failing(failures: u32) -> Self {
            Self {
                failures,
                ..Self::default()
            }
        }
    }

    impl Transport for MockTransport {
        async fn send(&self, body: Vec<u8>) -> Result<(), SyncError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(SyncError::Unavailable("mock down".into()));
            }
            self.received.lock().push(body);
            Ok(())
        }
    }

    fn batch(tick: u64) -> SyncBatch {
        SyncBatch::new(AgentId(7), tick)
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_linear_backoff() {
        let client = SyncClient::new(MockTransport::failing(2), 3, Duration::from_millis(500));
        let start = Instant::now();

        let attempts = client.deliver(&batch(1)).await.expect("third attempt succeeds");

        assert_eq!(attempts, 3);
        assert_eq!(start.elapsed(), Duration::from_millis(500 + 1000));
        let received = client.transport().received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(SyncBatch::decode(&received[0]).expect("decode"), batch(1));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let client = SyncClient::new(MockTransport::failing(u32::MAX), 3, Duration::from_millis(500));
        let start = Instant::now();

        let err = client.deliver(&batch(1)).await.expect_err("always failing");

        match err {
            SyncError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 4);
                assert!(last_error.contains("mock down"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(start.elapsed(), Duration::from_millis(500 + 1000 + 1500));
        assert_eq!(client.transport().calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_does_not_sleep() {
        let client = SyncClient::new(MockTransport::default(), 3, Duration::from_millis(500));
        let start = Instant::now();
        assert_eq!(client.deliver(&batch(1)).await.expect("delivered"), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn worker_drains_queue_and_counts_outcomes() {
        let queue = SyncQueue::new(8);
        queue.push(batch(1)).expect("push");
        queue.push(batch(2)).expect("push");

        let worker = spawn_worker(
            SyncClient::new(MockTransport::default(), 0, Duration::from_millis(10)),
            queue.clone(),
        );
        queue.push(batch(3)).expect("push");
        worker.shutdown().await;

        let stats = queue.stats();
        assert_eq!(stats.total_sent, 3);
        assert_eq!(stats.total_failed, 0);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn worker_drops_undeliverable_batches() {
        let queue = SyncQueue::new(8);
        queue.push(batch(1)).expect("push");

        let worker = spawn_worker(
            SyncClient::new(MockTransport::failing(u32::MAX), 1, Duration::from_millis(10)),
            queue.clone(),
        );
        worker.shutdown().await;

        let stats = queue.stats();
        assert_eq!(stats.total_sent, 0);
        assert_eq!(stats.total_failed, 1);
    }

    #[tokio::test]
    async fn http_transport_without_endpoint_is_unavailable() {
        let config = SyncConfig {
            endpoint: String::new(),
            ..SyncConfig::default()
        };
        let err = HttpTransport::new(&config).send(vec![1, 2, 3]).await.expect_err("no endpoint");
        assert!(matches!(err, SyncError::Unavailable(_)));
    }
}
