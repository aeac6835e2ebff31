//! Shared helpers for integration tests

pub mod mocks;

use logstyx::{Client, ClientConfig, ClientError, ErrorContext};
use std::sync::{Arc, Mutex};

pub const TEST_ENDPOINT: &str = "https://collector.example.com/logs";

/// Collects every notification passed to `on_error`.
#[derive(Clone, Default)]
pub struct ErrorLog(Arc<Mutex<Vec<(String, ErrorContext)>>>);

#[allow(dead_code)]
impl ErrorLog {
    pub fn config(&self) -> ClientConfig {
        let events = Arc::clone(&self.0);
        ClientConfig {
            endpoint: TEST_ENDPOINT.to_string(),
            on_error: Some(Arc::new(move |error: &ClientError, context: &ErrorContext| {
                events
                    .lock()
                    .unwrap()
                    .push((error.to_string(), context.clone()));
            })),
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<(String, ErrorContext)> {
        self.0.lock().unwrap().clone()
    }
}

#[allow(dead_code)]
pub fn client(transport: Arc<mocks::ScriptedTransport>, max_log_in_queue: usize) -> Client {
    Client::new(ClientConfig {
        endpoint: TEST_ENDPOINT.to_string(),
        max_log_in_queue,
        transport: Some(transport),
        ..Default::default()
    })
    .expect("failed to build client")
}
