//! Payload construction and the HTTP send primitive.
//!
//! [`Transport`] is the injected primitive: it POSTs a string body with a
//! header map and either returns the collector's response or fails.
//! [`TransportAdapter`] turns a queued [`LogEntry`] into the wire payload,
//! signs it when a [`Signer`] is configured and hands it to the transport.
//!
//! # Wire format
//!
//! ```json
//! {"level": "ERROR", "projectId": "...", "appid": "...", "device": {...},
//!  "context": {...}, "data": {...}}
//! ```
//!
//! Empty fields are stripped. `timestamp` and `signature` are headers.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::TransportError;
use crate::queue::LogEntry;
use crate::sanitize::sanitize;
use crate::signature::Signer;
use crate::Record;

/// One request as handed to the send primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub method: Method,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

/// What the collector answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// The send primitive.
///
/// An `Err` marks the attempt as failed. The system adds no timeout of its
/// own; an implementation that needs one enforces it here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        endpoint: &str,
        request: OutgoingRequest,
    ) -> Result<TransportResponse, TransportError>;
}

/// Default transport backed by `reqwest`.
///
/// Like `fetch`, any HTTP response counts as delivered. With
/// [`ReqwestTransport::with_status_check`], 5xx and 429 answers are turned
/// into [`TransportError::Status`] so the entry is retried; other 4xx answers
/// are permanent and still count as delivered.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    status_check: bool,
}

impl ReqwestTransport {
    pub fn new(
        https_proxy: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .pool_idle_timeout(Some(Duration::from_secs(270)))
            .tcp_keepalive(Some(Duration::from_secs(120)));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(proxy) = https_proxy {
            let proxy =
                reqwest::Proxy::https(proxy).map_err(|e| TransportError::Client(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self {
            client,
            status_check: false,
        })
    }

    #[must_use]
    pub fn with_status_check(mut self, enabled: bool) -> Self {
        self.status_check = enabled;
        self
    }

    fn header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => debug!("Skipping invalid header {name}"),
            }
        }
        map
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        endpoint: &str,
        request: OutgoingRequest,
    ) -> Result<TransportResponse, TransportError> {
        let resp = self
            .client
            .request(request.method, endpoint)
            .headers(Self::header_map(&request.headers))
            .body(request.body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = resp.status();
        if self.status_check && (status.is_server_error() || status.as_u16() == 429) {
            return Err(TransportError::Status(status.as_u16()));
        }
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("Failed to read collector response body: {e}");
                String::new()
            }
        };
        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Static identity fields of every payload.
#[derive(Debug, Clone, Default)]
pub struct PayloadIdentity {
    pub project_id: Option<String>,
    pub api_key: Option<String>,
    pub appid: Option<String>,
    pub device: Option<serde_json::Value>,
}

/// Builds payloads and sends them through the configured primitive.
#[derive(Clone)]
pub struct TransportAdapter {
    endpoint: String,
    identity: PayloadIdentity,
    transport: Arc<dyn Transport>,
    signer: Option<Arc<dyn Signer>>,
}

impl TransportAdapter {
    pub fn new(
        endpoint: String,
        identity: PayloadIdentity,
        transport: Arc<dyn Transport>,
        signer: Option<Arc<dyn Signer>>,
    ) -> Self {
        Self {
            endpoint,
            identity,
            transport,
            signer,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The sanitized wire object for `entry` under the given context.
    #[must_use]
    pub fn build_payload(&self, context: &Record, entry: &LogEntry) -> Record {
        let mut payload = Record::new();
        payload.insert("level".to_string(), entry.level.as_str().into());
        if let Some(project_id) = &self.identity.project_id {
            payload.insert("projectId".to_string(), project_id.as_str().into());
        }
        if let Some(appid) = &self.identity.appid {
            payload.insert("appid".to_string(), appid.as_str().into());
        }
        if let Some(device) = &self.identity.device {
            payload.insert("device".to_string(), device.clone());
        }
        payload.insert(
            "context".to_string(),
            serde_json::Value::Object(sanitize(context)),
        );
        payload.insert(
            "data".to_string(),
            serde_json::Value::Object(sanitize(&entry.data)),
        );
        sanitize(&payload)
    }

    /// Builds the full request for `entry`, signing it when configured.
    pub fn build_request(
        &self,
        context: &Record,
        entry: &LogEntry,
    ) -> Result<OutgoingRequest, TransportError> {
        let payload = self.build_payload(context, entry);

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        if let Some(signer) = &self.signer {
            let signature = signer.sign(
                self.identity.project_id.as_deref().unwrap_or_default(),
                self.identity.api_key.as_deref().unwrap_or_default(),
                &payload,
            );
            headers.insert("signature".to_string(), signature.signature);
            headers.insert("timestamp".to_string(), signature.timestamp);
        }

        let body = serde_json::to_string(&payload).map_err(|e| {
            error!("Failed to encode log payload: {e}");
            TransportError::Encode(e.to_string())
        })?;

        Ok(OutgoingRequest {
            method: Method::POST,
            body,
            headers,
        })
    }

    /// One delivery attempt. Failures are returned, never retried here.
    pub async fn deliver(
        &self,
        context: &Record,
        entry: &LogEntry,
    ) -> Result<TransportResponse, TransportError> {
        let request = self.build_request(context, entry)?;
        let resp = self.transport.send(&self.endpoint, request).await;
        match &resp {
            Ok(r) => debug!("Delivered {} log, collector status {}", entry.level, r.status),
            Err(e) => debug!("Failed to deliver {} log: {e}", entry.level),
        }
        resp
    }
}

impl std::fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("endpoint", &self.endpoint)
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::signature::Signature;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<(String, OutgoingRequest)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(
            &self,
            endpoint: &str,
            request: OutgoingRequest,
        ) -> Result<TransportResponse, TransportError> {
            self.requests
                .lock()
                .unwrap()
                .push((endpoint.to_string(), request));
            Ok(TransportResponse {
                status: 200,
                body: String::new(),
            })
        }
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn identity() -> PayloadIdentity {
        PayloadIdentity {
            project_id: Some("proj-1".to_string()),
            api_key: Some("secret".to_string()),
            appid: Some("com.example".to_string()),
            device: Some(json!({"os": "linux"})),
        }
    }

    fn adapter(
        transport: Arc<RecordingTransport>,
        signer: Option<Arc<dyn Signer>>,
    ) -> TransportAdapter {
        TransportAdapter::new(
            "https://collector.example.com/logs".to_string(),
            identity(),
            transport,
            signer,
        )
    }

    #[test]
    fn test_build_payload_strips_empty_fields() {
        let adapter = TransportAdapter::new(
            "https://collector.example.com".to_string(),
            PayloadIdentity {
                project_id: Some("proj-1".to_string()),
                device: Some(json!({})),
                ..Default::default()
            },
            Arc::new(RecordingTransport::default()),
            None,
        );
        let entry = LogEntry::new(Level::Warning, record(json!({"message": "m", "extra": null})));

        let payload = adapter.build_payload(&Record::new(), &entry);

        assert_eq!(
            serde_json::Value::Object(payload),
            json!({"level": "WARNING", "projectId": "proj-1", "data": {"message": "m"}})
        );
    }

    #[test]
    fn test_build_payload_includes_identity_and_context() {
        let adapter = adapter(Arc::new(RecordingTransport::default()), None);
        let entry = LogEntry::new(Level::Info, record(json!({"message": "hi"})));
        let context = record(json!({"user": "ana", "blank": ""}));

        let payload = adapter.build_payload(&context, &entry);

        assert_eq!(
            serde_json::Value::Object(payload),
            json!({
                "level": "INFO",
                "projectId": "proj-1",
                "appid": "com.example",
                "device": {"os": "linux"},
                "context": {"user": "ana"},
                "data": {"message": "hi"},
            })
        );
    }

    #[tokio::test]
    async fn test_deliver_posts_json_without_signature() {
        let transport = Arc::new(RecordingTransport::default());
        let adapter = adapter(Arc::clone(&transport), None);
        let entry = LogEntry::new(Level::Error, record(json!({"message": "x"})));

        let resp = adapter.deliver(&Record::new(), &entry).await.unwrap();
        assert_eq!(resp.status, 200);

        let requests = transport.requests.lock().unwrap();
        let (endpoint, request) = &requests[0];
        assert_eq!(endpoint, "https://collector.example.com/logs");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.headers.get("Content-Type").unwrap(), "application/json");
        assert!(!request.headers.contains_key("signature"));
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["data"]["message"], "x");
        assert!(body.get("timestamp").is_none());
    }

    #[tokio::test]
    async fn test_deliver_signs_payload_into_headers() {
        let transport = Arc::new(RecordingTransport::default());
        let signer: Arc<dyn Signer> = Arc::new(
            |project_id: &str, api_key: &str, payload: &Record| Signature {
                timestamp: "1234".to_string(),
                signature: format!("{project_id}:{api_key}:{}", payload.len()),
            },
        );
        let adapter = adapter(Arc::clone(&transport), Some(signer));
        let entry = LogEntry::new(Level::Info, record(json!({"message": "x"})));

        adapter.deliver(&Record::new(), &entry).await.unwrap();

        let requests = transport.requests.lock().unwrap();
        let request = &requests[0].1;
        // level, projectId, appid, device, data
        assert_eq!(request.headers.get("signature").unwrap(), "proj-1:secret:5");
        assert_eq!(request.headers.get("timestamp").unwrap(), "1234");
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert!(body.get("signature").is_none());
        assert!(body.get("timestamp").is_none());
    }

    #[test]
    fn test_header_map_skips_invalid_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("bad header".to_string(), "x".to_string());

        let map = ReqwestTransport::header_map(&headers);

        assert_eq!(map.len(), 1);
        assert!(map.contains_key("content-type"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_truncated_body_keeps_status_and_logs() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
            // Keep reading so the close is not a reset.
            while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
        });

        let transport = ReqwestTransport::new(None, Some(Duration::from_secs(5))).unwrap();
        let request = OutgoingRequest {
            method: Method::POST,
            body: "{}".to_string(),
            headers: BTreeMap::new(),
        };
        let resp = transport
            .send(&format!("http://{addr}/logs"), request)
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "");
        assert!(logs_contain("Failed to read collector response body"));
    }
}
