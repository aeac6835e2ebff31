//! Mock send primitives

use async_trait::async_trait;
use logstyx::{OutgoingRequest, Transport, TransportError, TransportResponse};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::Semaphore;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Fail,
    /// Waits for [`ScriptedTransport::release`], then succeeds.
    Block,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub at: Instant,
    pub endpoint: String,
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
}

/// Answers each call with the next scripted outcome, then with `fallback`.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    calls: Mutex<Vec<RecordedCall>>,
    gate: Semaphore,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Outcome>, fallback: Outcome) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
        }
    }

    pub fn always(outcome: Outcome) -> Self {
        Self::new([], outcome)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Lets one blocked call through.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        endpoint: &str,
        request: OutgoingRequest,
    ) -> Result<TransportResponse, TransportError> {
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        self.calls.lock().unwrap().push(RecordedCall {
            at: Instant::now(),
            endpoint: endpoint.to_string(),
            headers: request.headers,
            body: serde_json::from_str(&request.body).expect("body is JSON"),
        });

        match outcome {
            Outcome::Ok => {}
            Outcome::Fail => {
                return Err(TransportError::Request("connection refused".to_string()))
            }
            Outcome::Block => {
                self.gate
                    .acquire()
                    .await
                    .expect("gate is never closed")
                    .forget();
            }
        }
        Ok(TransportResponse {
            status: 200,
            body: "{}".to_string(),
        })
    }
}
