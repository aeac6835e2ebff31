//! # logstyx
//!
//! Client-side log shipping. Log calls are normalized into JSON records,
//! enriched with a shared context and posted to a collector. Failed
//! deliveries wait in a bounded queue and are retried one at a time with
//! exponential backoff; when the queue is full the oldest entry is dropped.
//!
//! ```rust,ignore
//! use logstyx::{Client, ClientConfig};
//!
//! let client = Client::new(ClientConfig {
//!     endpoint: "https://collector.example.com/logs".to_string(),
//!     project_id: Some("my-project".to_string()),
//!     ..Default::default()
//! })?;
//!
//! client.info("service started");
//! client.error(logstyx::ErrorInput::from_error(&err));
//! ```
//!
//! ## Modules
//!
//! - [`normalize`]: turns arbitrary log arguments into bounded JSON records
//! - [`sanitize`]: strips empty fields from outgoing objects
//! - [`scheduler`]: queue admission, single-flight drain and backoff state
//! - [`transport`]: payload layout and the HTTP send primitive
//! - [`client`]: the public entry point tying them together

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]

/// Client entry point and error notifications
pub mod client;

/// Configuration from code or `LOGSTYX_*` environment variables
pub mod config;

/// Shared context merged into every payload
pub mod context;

pub mod error;

pub mod level;

/// `tracing` formatter for the client's own diagnostics
pub mod logger;

/// Input classification and bounded cloning
pub mod normalize;

/// Bounded drop-oldest delivery queue
pub mod queue;

pub mod sanitize;

/// Retry timing and single-flight drain state
pub mod scheduler;

/// Optional request signing
pub mod signature;

pub mod transport;

/// Dynamic value graph accepted as log input
pub mod value;

/// A JSON object as sent on the wire.
pub type Record = serde_json::Map<String, serde_json::Value>;

pub use client::{Client, ErrorCallback, ErrorContext};
pub use config::ClientConfig;
pub use error::{ClientError, ConfigError, TransportError};
pub use level::Level;
pub use normalize::{ErrorInput, LogInput};
pub use signature::{HmacSigner, Signature, Signer};
pub use transport::{OutgoingRequest, ReqwestTransport, Transport, TransportResponse};
pub use value::Value;
