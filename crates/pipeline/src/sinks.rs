//! Fan-out sinks: ad-conversion reporting and warehouse ingestion.
//!
//! Both sinks are best-effort. A failure in either is caught by the
//! recorder, logged, and never propagated to the caller or to the other
//! sink.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::WorkspaceId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use cart::Money;

use crate::event::{AnalyticsEvent, EventType};

/// A sink call failed; always caught and logged, never surfaced.
#[derive(Debug, Error)]
#[error("sink unavailable: {0}")]
pub struct SinkError(pub String);

/// Supported ad platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdPlatform {
    Meta,
}

/// Per-workspace, per-platform conversion credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsEndpoint {
    pub workspace_id: WorkspaceId,
    pub platform: AdPlatform,
    pub pixel_id: String,
    pub access_token: String,
}

/// Lookup of a workspace's configured conversion endpoint.
#[async_trait]
pub trait EndpointDirectory: Send + Sync {
    async fn lookup(&self, workspace: WorkspaceId) -> Option<AnalyticsEndpoint>;
}

/// In-memory endpoint directory.
#[derive(Clone, Default)]
pub struct InMemoryEndpointDirectory {
    endpoints: Arc<RwLock<HashMap<WorkspaceId, AnalyticsEndpoint>>>,
}

impl InMemoryEndpointDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, endpoint: AnalyticsEndpoint) {
        self.endpoints
            .write()
            .unwrap()
            .insert(endpoint.workspace_id, endpoint);
    }
}

#[async_trait]
impl EndpointDirectory for InMemoryEndpointDirectory {
    async fn lookup(&self, workspace: WorkspaceId) -> Option<AnalyticsEndpoint> {
        self.endpoints.read().unwrap().get(&workspace).cloned()
    }
}

/// A provider-facing conversion event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdEvent {
    pub name: String,
    pub visitor_hash: Option<String>,
    pub click_id: Option<String>,
    pub value: Option<Money>,
    pub currency: &'static str,
}

impl AdEvent {
    fn named(name: impl Into<String>, event: &AnalyticsEvent) -> Self {
        Self {
            name: name.into(),
            visitor_hash: visitor_hash(event),
            click_id: event.click_id.clone(),
            value: event.purchase.map(|p| p.amount),
            currency: "USD",
        }
    }
}

/// SHA-256 of the visitor identity (session id or IP), lowercased, as the
/// provider-side match key.
pub fn visitor_hash(event: &AnalyticsEvent) -> Option<String> {
    let identity = event
        .session_id
        .map(|s| s.to_string())
        .or_else(|| event.ip.clone())?;
    let digest = Sha256::digest(identity.to_lowercase().as_bytes());
    Some(format!("{digest:x}"))
}

/// Maps an internal event to zero, one or two provider events.
///
/// Purchases report twice: a branded custom event for the seller's own
/// audiences plus the standard `Purchase` event the ad platform optimizes
/// on. View-like events map to a single standard event; everything else is
/// not reported.
pub fn provider_events_for(event: &AnalyticsEvent) -> Vec<AdEvent> {
    match event.event_type {
        EventType::CartPurchase | EventType::CartUpsellPurchase => vec![
            AdEvent::named("StorefrontPurchase", event),
            AdEvent::named("Purchase", event),
        ],
        EventType::CartCheckoutStarted => vec![AdEvent::named("InitiateCheckout", event)],
        EventType::PageView | EventType::BioView | EventType::FmView => {
            vec![AdEvent::named("ViewContent", event)]
        }
        EventType::LinkClick | EventType::VipUnlock | EventType::CartUpsellDeclined => vec![],
    }
}

/// Outcome of a conversion report.
#[derive(Debug, Clone, Copy)]
pub struct ReportOutcome {
    pub reported: bool,
}

/// Server-to-server conversion reporting.
#[async_trait]
pub trait AdConversionSink: Send + Sync {
    async fn report_events(
        &self,
        endpoint: &AnalyticsEndpoint,
        source_url: Option<&str>,
        events: &[AdEvent],
    ) -> Result<ReportOutcome, SinkError>;
}

/// Outcome of a warehouse ingest.
#[derive(Debug, Clone, Copy)]
pub struct IngestOutcome {
    pub accepted: u64,
    pub quarantined: u64,
}

/// Append-only analytics store ingestion.
#[async_trait]
pub trait WarehouseSink: Send + Sync {
    async fn ingest(&self, event: &AnalyticsEvent) -> Result<IngestOutcome, SinkError>;
}

#[derive(Default)]
struct InMemoryAdSinkState {
    reported: Vec<AdEvent>,
    fail_on_report: bool,
}

/// In-memory ad sink for testing.
#[derive(Clone, Default)]
pub struct InMemoryAdSink {
    state: Arc<RwLock<InMemoryAdSinkState>>,
}

impl InMemoryAdSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the sink to fail on the next report call.
    pub fn set_fail_on_report(&self, fail: bool) {
        self.state.write().unwrap().fail_on_report = fail;
    }

    pub fn reported_count(&self) -> usize {
        self.state.read().unwrap().reported.len()
    }

    pub fn reported(&self) -> Vec<AdEvent> {
        self.state.read().unwrap().reported.clone()
    }
}

#[async_trait]
impl AdConversionSink for InMemoryAdSink {
    async fn report_events(
        &self,
        _endpoint: &AnalyticsEndpoint,
        _source_url: Option<&str>,
        events: &[AdEvent],
    ) -> Result<ReportOutcome, SinkError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_report {
            return Err(SinkError("conversion API unreachable".to_string()));
        }

        state.reported.extend_from_slice(events);
        Ok(ReportOutcome { reported: true })
    }
}

#[derive(Default)]
struct InMemoryWarehouseState {
    rows: Vec<AnalyticsEvent>,
    fail_on_ingest: bool,
    quarantine_next: bool,
}

/// In-memory warehouse sink for testing.
#[derive(Clone, Default)]
pub struct InMemoryWarehouseSink {
    state: Arc<RwLock<InMemoryWarehouseState>>,
}

impl InMemoryWarehouseSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the sink to fail on the next ingest call.
    pub fn set_fail_on_ingest(&self, fail: bool) {
        self.state.write().unwrap().fail_on_ingest = fail;
    }

    /// Configures the sink to quarantine the next row instead of accepting.
    pub fn set_quarantine_next(&self, quarantine: bool) {
        self.state.write().unwrap().quarantine_next = quarantine;
    }

    pub fn row_count(&self) -> usize {
        self.state.read().unwrap().rows.len()
    }

    pub fn rows(&self) -> Vec<AnalyticsEvent> {
        self.state.read().unwrap().rows.clone()
    }
}

#[async_trait]
impl WarehouseSink for InMemoryWarehouseSink {
    async fn ingest(&self, event: &AnalyticsEvent) -> Result<IngestOutcome, SinkError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_ingest {
            return Err(SinkError("warehouse unreachable".to_string()));
        }

        if state.quarantine_next {
            state.quarantine_next = false;
            return Ok(IngestOutcome {
                accepted: 0,
                quarantined: 1,
            });
        }

        state.rows.push(event.clone());
        Ok(IngestOutcome {
            accepted: 1,
            quarantined: 0,
        })
    }
}
