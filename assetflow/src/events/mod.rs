//! Progress events emitted while a pipeline runs.
//!
//! The pipeline reports every stage start, completion, failed attempt,
//! retry exhaustion and missing animation through an [`EventSink`]. The
//! default sink forwards to `tracing`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};
