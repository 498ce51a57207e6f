//! # Ingestion
//!
//! Stype HF tracking data ingestion.
//!
//! Responsibilities:
//! - Decode and validate Stype HF datagrams
//! - Run timing estimation per connection and qualify every sample with a scene time
//! - Derive camera pose and lens data
//! - Backpressure management (drop newest) towards the dispatcher via async-channel
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::StypeReceiver;
//!
//! let mut handle = StypeReceiver::new(blueprint.receiver, blueprint.timing)
//!     .spawn()
//!     .await?;
//! let frames = handle.take_frames().unwrap();
//! while let Ok(frame) = frames.recv().await {
//!     // Process tracking frame
//! }
//! ```
//!
//! ## Mock Testing
//!
//! ```ignore
//! use ingestion::MockStypeSource;
//!
//! let source = MockStypeSource::with_rates(25, 50);
//! let task = source.spawn_udp(target, Duration::from_millis(20));
//! ```

mod config;
mod error;
mod fallback;
mod mock;
pub mod packet;
mod receiver;
mod session;

// Re-exports
pub use config::{IngestionMetrics, MetricsSnapshot};
pub use contracts::{StypePacket, TrackingFrame};
pub use error::{IngestionError, Result};
pub use fallback::FallbackRate;
pub use mock::{LossPattern, MockStypeConfig, MockStypeSource};
pub use receiver::{ReceiverHandle, ReceiverStatus, StypeReceiver};
pub use session::{camera_transform, lens_data, SessionOutput, TrackingSession};
