//! The public logging client.
//!
//! Every log call normalizes its argument once, then tries to deliver it
//! right away on a spawned task, so the caller never waits on the network.
//! A failed attempt never reaches the caller: the entry goes into
//! the bounded [`QueueState`] and a backoff timer is armed. The timer drains
//! one entry at a time until the queue is empty again.
//!
//! ```text
//!   info()/error()/...
//!          │ normalize
//!          v
//!   ┌──────────────┐   ok
//!   │ deliver now  │ ──────► done
//!   └──────┬───────┘
//!          │ err
//!          v
//!   ┌──────────────┐  timer (1s, 2s, 4s ... 30s)  ┌─────────────┐
//!   │    queue     │ ───────────────────────────► │ drain head  │
//!   └──────────────┘ ◄─────────────────────────── └─────────────┘
//!                        rotate on failure
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn, Instrument};

use crate::config::ClientConfig;
use crate::context::SharedContext;
use crate::error::{ClientError, ConfigError, TransportError};
use crate::level::Level;
use crate::normalize::{normalize, LogInput};
use crate::queue::LogEntry;
use crate::scheduler::{QueuePhase, QueueState};
use crate::transport::{
    PayloadIdentity, ReqwestTransport, Transport, TransportAdapter, TransportResponse,
};
use crate::Record;

/// Error-notification channel. Panics inside it are swallowed.
pub type ErrorCallback = Arc<dyn Fn(&ClientError, &ErrorContext) + Send + Sync>;

/// What the notification is about.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorContext {
    /// The queue was full and `dropped` was evicted to make room.
    Dropped { dropped: LogEntry },
    /// A queued delivery attempt failed.
    Delivery {
        level: Level,
        queue_length: usize,
        consecutive_failures: u32,
    },
}

/// Log shipping client. Cheap to clone; clones share context and queue.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    adapter: TransportAdapter,
    context: Mutex<SharedContext>,
    state: Mutex<QueueState>,
    on_error: Option<ErrorCallback>,
}

impl Client {
    /// Builds a client. Falls back to a direct connection when the proxy
    /// cannot be used.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let transport: Arc<dyn Transport> = match &config.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(default_transport(&config)?),
        };

        let context = SharedContext::with_appid(config.appid.as_deref());
        let identity = PayloadIdentity {
            project_id: config.project_id,
            api_key: config.api_key,
            appid: config.appid,
            device: config.device,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                adapter: TransportAdapter::new(config.endpoint, identity, transport, config.signer),
                context: Mutex::new(context),
                state: Mutex::new(QueueState::new(config.max_log_in_queue)),
                on_error: config.on_error,
            }),
        })
    }

    /// Fire-and-forget log calls. They return at once: delivery runs on a
    /// spawned task and a failed attempt lands in the retry queue.
    pub fn info(&self, data: impl Into<LogInput>) {
        self.dispatch(Level::Info, data.into());
    }

    pub fn warning(&self, data: impl Into<LogInput>) {
        self.dispatch(Level::Warning, data.into());
    }

    pub fn error(&self, data: impl Into<LogInput>) {
        self.dispatch(Level::Error, data.into());
    }

    pub fn critical(&self, data: impl Into<LogInput>) {
        self.dispatch(Level::Critical, data.into());
    }

    /// Normalizes `data` and attempts delivery once.
    ///
    /// Returns the collector's response when that attempt succeeds. On
    /// failure the entry is queued for retry and `None` is returned; this
    /// never fails. The attempt runs on its own task, so dropping this future
    /// does not lose the entry.
    pub async fn send(&self, level: Level, data: impl Into<LogInput>) -> Option<TransportResponse> {
        match self.dispatch(level, data.into()) {
            Some(handle) => handle.await.ok().flatten(),
            None => None,
        }
    }

    /// Normalizes now and spawns the immediate attempt. Without a runtime the
    /// entry goes straight to the queue.
    fn dispatch(&self, level: Level, data: LogInput) -> Option<JoinHandle<Option<TransportResponse>>> {
        let entry = LogEntry::new(level, normalize(data));
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime available, queueing {level} log without an attempt");
            self.inner.enqueue(entry);
            return None;
        };
        let inner = Arc::clone(&self.inner);
        Some(runtime.spawn(
            async move { inner.deliver_or_enqueue(entry).await }.in_current_span(),
        ))
    }

    /// Shallow-merges `partial` into the shared context.
    pub fn set_context(&self, partial: Record) -> u64 {
        self.inner.lock_context().set(partial)
    }

    /// Removes `keys` from the shared context, or everything when `None`.
    pub fn clear_context(&self, keys: Option<&[&str]>) -> u64 {
        let mut context = self.inner.lock_context();
        match keys {
            Some(keys) => context.clear(keys),
            None => context.clear_all(),
        }
    }

    #[must_use]
    pub fn context(&self) -> Record {
        self.inner.lock_context().values().clone()
    }

    #[must_use]
    pub fn get_queue_length(&self) -> usize {
        self.inner.lock_state().len()
    }

    #[must_use]
    pub fn queue_phase(&self) -> QueuePhase {
        self.inner.lock_state().phase()
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock_state().consecutive_failures()
    }

    /// Snapshot of the queued entries, oldest first.
    #[must_use]
    pub fn queued_entries(&self) -> Vec<LogEntry> {
        self.inner.lock_state().queue().iter().cloned().collect()
    }

    /// Cancels a pending backoff timer and drains the head entry now.
    ///
    /// Does nothing while another drain is running or the queue is empty.
    pub async fn process_queue(&self) {
        self.inner.process_queue().await;
    }
}

fn default_transport(config: &ClientConfig) -> Result<ReqwestTransport, ConfigError> {
    match ReqwestTransport::new(config.https_proxy.as_deref(), config.request_timeout) {
        Ok(transport) => Ok(transport),
        Err(e) if config.https_proxy.is_some() => {
            error!("Unable to use proxy configuration: {e}, falling back to direct connection");
            ReqwestTransport::new(None, config.request_timeout).map_err(ConfigError::HttpTransport)
        }
        Err(e) => Err(ConfigError::HttpTransport(e)),
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_context(&self) -> MutexGuard<'_, SharedContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One delivery attempt against the context as it is right now.
    async fn attempt(&self, entry: &LogEntry) -> Result<TransportResponse, TransportError> {
        let context = self.lock_context().values().clone();
        self.adapter.deliver(&context, entry).await
    }

    async fn deliver_or_enqueue(self: &Arc<Self>, entry: LogEntry) -> Option<TransportResponse> {
        match self.attempt(&entry).await {
            Ok(resp) => Some(resp),
            Err(e) => {
                debug!("Queueing {} log after failed delivery: {e}", entry.level);
                self.enqueue(entry);
                None
            }
        }
    }

    fn enqueue(self: &Arc<Self>, entry: LogEntry) {
        let dropped = self.lock_state().enqueue(entry);
        if let Some(dropped) = dropped {
            self.notify(&ClientError::QueueFull, &ErrorContext::Dropped { dropped });
        }
        self.schedule_queue_processing();
    }

    fn schedule_queue_processing(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, queued logs wait for an explicit drain");
            return;
        };
        let weak = Arc::downgrade(self);
        self.lock_state().arm(|delay, id| {
            runtime
                .spawn(async move {
                    tokio::time::sleep(delay).await;
                    // A dropped client leaves nothing to drain.
                    if let Some(inner) = weak.upgrade() {
                        inner.on_timer(id).await;
                    }
                })
                .abort_handle()
        });
    }

    async fn on_timer(self: Arc<Self>, id: u64) {
        let current = self.lock_state().fire_timer(id);
        if current {
            self.drain().await;
        }
    }

    async fn process_queue(self: &Arc<Self>) {
        self.lock_state().cancel_timer();
        self.drain().await;
    }

    async fn drain(self: &Arc<Self>) {
        let head = self.lock_state().begin_drain();
        let Some(entry) = head else {
            return;
        };

        let mut guard = DrainGuard {
            inner: self,
            entry,
            outcome: Err(TransportError::Cancelled),
        };
        guard.outcome = self.attempt(&guard.entry).await.map(|_| ());
    }

    fn finish_drain(self: &Arc<Self>, entry: &LogEntry, outcome: Result<(), TransportError>) {
        let report = self.lock_state().complete_drain(entry, outcome.is_ok());

        if let Err(e) = outcome {
            debug!(
                "Retry of {} log failed ({} consecutive failures, {} queued): {e}",
                entry.level, report.consecutive_failures, report.queue_length
            );
            self.notify(
                &ClientError::Transport(e),
                &ErrorContext::Delivery {
                    level: entry.level,
                    queue_length: report.queue_length,
                    consecutive_failures: report.consecutive_failures,
                },
            );
        }

        self.schedule_queue_processing();
    }

    fn notify(&self, error: &ClientError, context: &ErrorContext) {
        let Some(callback) = &self.on_error else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| callback(error, context))).is_err() {
            debug!("Error callback panicked, ignoring");
        }
    }
}

/// Ends a drain when dropped. An attempt whose future is dropped before it
/// completes counts as failed, so the queue leaves `Draining` and is re-armed.
struct DrainGuard<'a> {
    inner: &'a Arc<Inner>,
    entry: LogEntry,
    outcome: Result<(), TransportError>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let outcome = std::mem::replace(&mut self.outcome, Ok(()));
        self.inner.finish_drain(&self.entry, outcome);
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("adapter", &self.inner.adapter)
            .field("queue_length", &self.get_queue_length())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing_test::traced_test;

    use crate::transport::OutgoingRequest;

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyTransport {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyTransport {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(
            &self,
            _endpoint: &str,
            _request: OutgoingRequest,
        ) -> Result<TransportResponse, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(TransportError::Request("connection refused".to_string()))
            } else {
                Ok(TransportResponse {
                    status: 202,
                    body: String::new(),
                })
            }
        }
    }

    fn client_with(transport: Arc<FlakyTransport>, max_log_in_queue: usize) -> Client {
        Client::new(ClientConfig {
            endpoint: "https://collector.example.com/logs".to_string(),
            max_log_in_queue,
            transport: Some(transport),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = Client::new(ClientConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEndpoint));
    }

    #[test]
    fn test_new_seeds_context_with_appid() {
        let client = Client::new(ClientConfig {
            endpoint: "https://collector.example.com".to_string(),
            appid: Some("com.example".to_string()),
            transport: Some(FlakyTransport::new(0)),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.context().get("appid"), Some(&json!("com.example")));
    }

    #[tokio::test]
    async fn test_successful_send_returns_response() {
        let client = client_with(FlakyTransport::new(0), 3);

        let resp = client.send(Level::Info, "hello").await;

        assert_eq!(resp.map(|r| r.status), Some(202));
        assert_eq!(client.get_queue_length(), 0);
        assert_eq!(client.queue_phase(), QueuePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_failed_send_is_queued_and_armed() {
        let client = client_with(FlakyTransport::new(1), 3);

        let resp = client.send(Level::Warning, "hello").await;

        assert!(resp.is_none());
        assert_eq!(client.get_queue_length(), 1);
        assert_eq!(client.queue_phase(), QueuePhase::Armed);
        assert!(logs_contain("Queueing WARNING log"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_drains_queue() {
        let transport = FlakyTransport::new(1);
        let client = client_with(Arc::clone(&transport), 3);
        client.info("hello");

        tokio::time::sleep(Duration::from_millis(1_001)).await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.get_queue_length(), 0);
        assert_eq!(client.queue_phase(), QueuePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_queue_cancels_pending_timer() {
        let transport = FlakyTransport::new(1);
        let client = client_with(Arc::clone(&transport), 3);
        client.send(Level::Info, "hello").await;
        assert_eq!(client.queue_phase(), QueuePhase::Armed);

        client.process_queue().await;
        assert_eq!(client.get_queue_length(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_process_queue_on_empty_queue_is_noop() {
        let transport = FlakyTransport::new(0);
        let client = client_with(Arc::clone(&transport), 3);

        client.process_queue().await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_client_lets_timer_lapse() {
        let transport = FlakyTransport::new(1);
        let client = client_with(Arc::clone(&transport), 3);
        client.send(Level::Info, "hello").await;

        drop(client);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_enqueue_without_runtime_does_not_panic() {
        let client = client_with(FlakyTransport::new(0), 3);
        client
            .inner
            .enqueue(LogEntry::new(Level::Info, Record::new()));
        assert_eq!(client.get_queue_length(), 1);
        assert_eq!(client.queue_phase(), QueuePhase::Idle);
    }

    #[test]
    fn test_log_without_runtime_is_queued() {
        let transport = FlakyTransport::new(0);
        let client = client_with(Arc::clone(&transport), 3);

        client.critical("no runtime here");

        assert_eq!(client.get_queue_length(), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
