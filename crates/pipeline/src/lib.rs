//! Event recording and fan-out pipeline.
//!
//! Every product surface (link, bio, FM, landing page, cart, VIP gate)
//! records through one entry point, [`EventRecorder::record`]:
//! 1. bot filter
//! 2. dedup/rate gate (one event per key per sliding window)
//! 3. usage quota guard
//! 4. ad-conversion fan-out (caught, never fatal)
//! 5. warehouse ingestion (caught, never fatal)
//! 6. atomic counter increments

pub mod event;
pub mod gate;
pub mod quota;
pub mod recorder;
pub mod sinks;

pub use event::{AnalyticsEvent, AssetKind, AssetRef, EventType, PurchaseData};
pub use gate::{DedupGate, InMemoryDedupGate};
pub use quota::{InMemoryUsageStore, UsageStore};
pub use recorder::{EventRecorder, RecordOutcome, RecordRequest, SkipReason};
pub use sinks::{
    AdConversionSink, AdEvent, AdPlatform, AnalyticsEndpoint, EndpointDirectory, InMemoryAdSink,
    InMemoryEndpointDirectory, InMemoryWarehouseSink, IngestOutcome, ReportOutcome, SinkError,
    WarehouseSink, provider_events_for, visitor_hash,
};
