//! Diagnostic log formatting for the client's own `tracing` output.
//!
//! Lines look like:
//! ```text
//! LOGSTYX | WARN | Delivery queue full (12 entries), dropping oldest INFO log
//! LOGSTYX | DEBUG | Retry of ERROR log failed (2 consecutive failures, 3 queued): Request failed: connection refused
//! ```
//!
//! The client opens no spans of its own. When the host logs from inside one,
//! the span chain is printed between the level and the message:
//! ```text
//! LOGSTYX | DEBUG | checkout{order=42}: Queueing ERROR log after failed delivery: ...
//! ```
//!
//! The client never installs a subscriber itself. Applications that want
//! these lines call [`init`] or plug [`Formatter`] into their own subscriber:
//!
//! ```rust,ignore
//! let subscriber = tracing_subscriber::fmt()
//!     .event_format(logstyx::logger::Formatter)
//!     .with_max_level(tracing::Level::DEBUG)
//!     .finish();
//! tracing::subscriber::set_global_default(subscriber)?;
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

/// Prefixes every event with `LOGSTYX` and its level.
///
/// Layout, left to right:
///
/// 1. the `LOGSTYX` marker, so client diagnostics can be told apart from the
///    host's own logs in a shared stream
/// 2. the event level
/// 3. every span in the event's scope, root first, as `name{fields}: `
/// 4. the message followed by the event's remaining fields
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "LOGSTYX | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                // Rendered by the fmt layer when the span opened. Spans created
                // before the layer was attached have none.
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs a global stderr subscriber using [`Formatter`].
///
/// Returns `false` when a global subscriber was already set.
pub fn init(max_level: tracing::Level) -> bool {
    tracing_subscriber::fmt()
        .event_format(Formatter)
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
