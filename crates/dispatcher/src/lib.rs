//! # Dispatcher
//!
//! Tracking frame distribution.
//!
//! Responsibilities:
//! - Consume `TrackingFrame`s
//! - Fan-out to multiple sinks
//! - Isolate slow sinks so they never block ingestion

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{DataSink, TrackingFrame};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::{Delivery, SinkHandle};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, LogSink, NetworkFormat, NetworkSink};
