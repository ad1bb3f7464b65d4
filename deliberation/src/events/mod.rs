//! Progress events for live observability.
//!
//! ```text
//! ┌──────────────┐  emit   ┌──────────────┐     ┌──────────────┐
//! │ Orchestrator │────────▶│  EventSink   │────▶│  Subscribers │
//! │  (per call)  │         │ (broadcast)  │     │   (recv)     │
//! └──────────────┘         └──────────────┘     └──────────────┘
//! ```
//!
//! Delivery is best-effort and never blocks the pipeline.

pub mod sink;
pub mod types;

pub use sink::{
    BroadcastSink, EventFilter, EventSink, NullSink, RecordingSink, SharedBroadcastSink,
    TracingSink,
};
pub use types::{DeliberationPhase, EventMetadata, MessageType, ProgressEvent};
