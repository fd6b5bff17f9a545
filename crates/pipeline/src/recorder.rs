//! The single entry point every product surface records events through.

use std::sync::Arc;

use chrono::Utc;
use common::VisitorContext;

use cart::Workspace;

use crate::event::{AnalyticsEvent, AssetRef, EventType, PurchaseData};
use crate::gate::DedupGate;
use crate::quota::UsageStore;
use crate::sinks::{AdConversionSink, EndpointDirectory, WarehouseSink, provider_events_for};

/// Why an event was skipped. Skips are normal operation, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Automated traffic, dropped before any side effect.
    Bot,
    /// The key already fired within the current rate-limit window.
    Duplicate,
    /// The workspace is over its monthly event quota.
    QuotaExceeded,
}

/// Result of a record attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded {
        /// Whether the ad sink accepted the conversion report.
        reported: bool,
        /// Whether the warehouse accepted the row.
        ingested: bool,
    },
    Skipped(SkipReason),
}

impl RecordOutcome {
    pub fn was_recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded { .. })
    }
}

/// One record request from a product surface.
#[derive(Debug, Clone)]
pub struct RecordRequest {
    pub workspace: Workspace,
    pub asset: AssetRef,
    pub event_type: EventType,
    pub visitor: VisitorContext,
    /// Monetary breakdown for cart purchase events.
    pub purchase: Option<PurchaseData>,
    /// Page URL the event fired on, forwarded to the conversion sink.
    pub source_url: Option<String>,
}

/// Records events: bot filter, dedup gate, quota guard, then fan-out to the
/// ad-conversion sink and the warehouse with isolated failures, then atomic
/// counter increments.
///
/// The two sinks are deliberately independent and both non-fatal: an ad-API
/// outage must never block internal analytics or the buyer-facing flow, and
/// a warehouse outage must never block ad attribution.
#[derive(Clone)]
pub struct EventRecorder {
    gate: Arc<dyn DedupGate>,
    usage: Arc<dyn UsageStore>,
    endpoints: Arc<dyn EndpointDirectory>,
    ads: Arc<dyn AdConversionSink>,
    warehouse: Arc<dyn WarehouseSink>,
}

impl EventRecorder {
    pub fn new(
        gate: Arc<dyn DedupGate>,
        usage: Arc<dyn UsageStore>,
        endpoints: Arc<dyn EndpointDirectory>,
        ads: Arc<dyn AdConversionSink>,
        warehouse: Arc<dyn WarehouseSink>,
    ) -> Self {
        Self {
            gate,
            usage,
            endpoints,
            ads,
            warehouse,
        }
    }

    /// Returns a handle to the usage counters (for quota inspection).
    pub fn usage_store(&self) -> &Arc<dyn UsageStore> {
        &self.usage
    }

    #[tracing::instrument(
        skip(self, req),
        fields(workspace = %req.workspace.id, asset = %req.asset.key(), event_type = %req.event_type)
    )]
    pub async fn record(&self, req: RecordRequest) -> RecordOutcome {
        // 1. Bot filter: no side effects at all.
        if req.visitor.is_bot {
            metrics::counter!("pipeline_events_skipped_total", "reason" => "bot").increment(1);
            return RecordOutcome::Skipped(SkipReason::Bot);
        }

        // 2. Dedup gate: one event per identity/asset/type per window.
        let identity = req
            .visitor
            .identity()
            .unwrap_or_else(|| "anonymous".to_string());
        let dedup_key = format!("{}:{}:{}", identity, req.asset.key(), req.event_type);
        if !self.gate.allow(&dedup_key).await {
            metrics::counter!("pipeline_events_skipped_total", "reason" => "duplicate")
                .increment(1);
            return RecordOutcome::Skipped(SkipReason::Duplicate);
        }

        // 3. Quota guard: over-limit is an operational alert, never an error.
        let usage = self.usage.usage(req.workspace.id).await;
        if usage >= req.workspace.event_limit() {
            tracing::warn!(
                usage,
                limit = req.workspace.event_limit(),
                "workspace over event quota, skipping event"
            );
            metrics::counter!("pipeline_events_skipped_total", "reason" => "quota").increment(1);
            return RecordOutcome::Skipped(SkipReason::QuotaExceeded);
        }

        let event = build_event(&req);

        // 4. Ad-conversion fan-out: awaited, failure caught.
        let reported = match self.endpoints.lookup(req.workspace.id).await {
            Some(endpoint) => {
                let ad_events = provider_events_for(&event);
                if ad_events.is_empty() {
                    false
                } else {
                    match self
                        .ads
                        .report_events(&endpoint, req.source_url.as_deref(), &ad_events)
                        .await
                    {
                        Ok(outcome) => outcome.reported,
                        Err(e) => {
                            tracing::warn!(error = %e, "conversion report failed");
                            metrics::counter!("pipeline_ad_report_failures_total").increment(1);
                            false
                        }
                    }
                }
            }
            None => false,
        };

        // 5. Warehouse ingestion: failure logged, not retried synchronously.
        let ingested = match self.warehouse.ingest(&event).await {
            Ok(outcome) => {
                if outcome.quarantined > 0 {
                    tracing::warn!(
                        quarantined = outcome.quarantined,
                        "warehouse quarantined event rows"
                    );
                }
                outcome.accepted > 0
            }
            Err(e) => {
                tracing::warn!(error = %e, "warehouse ingest failed");
                metrics::counter!("pipeline_warehouse_failures_total").increment(1);
                false
            }
        };

        // 6. Counters: atomic adds, never read-then-write.
        self.usage.increment_usage(req.workspace.id).await;
        self.usage.increment_asset(&event.asset_key).await;

        metrics::counter!("pipeline_events_recorded_total").increment(1);
        RecordOutcome::Recorded { reported, ingested }
    }
}

fn build_event(req: &RecordRequest) -> AnalyticsEvent {
    let visitor = &req.visitor;
    AnalyticsEvent {
        timestamp: Utc::now(),
        workspace_id: req.workspace.id,
        asset_kind: req.asset.kind,
        asset_id: req.asset.id.clone(),
        asset_sub_id: req.asset.sub_id.clone(),
        asset_key: req.asset.key(),
        session_id: visitor.session_id,
        event_type: req.event_type,
        ip: visitor.ip.clone(),
        country: visitor.country.clone(),
        region: visitor.region.clone(),
        city: visitor.city.clone(),
        browser: visitor.browser.clone(),
        os: visitor.os.clone(),
        device: visitor.device.clone(),
        referrer: visitor.referrer.clone(),
        click_id: visitor.attribution.click_id.clone(),
        purchase: req.purchase,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AssetKind;
    use crate::gate::InMemoryDedupGate;
    use crate::quota::InMemoryUsageStore;
    use crate::sinks::{
        AdPlatform, AnalyticsEndpoint, InMemoryAdSink, InMemoryEndpointDirectory,
        InMemoryWarehouseSink,
    };
    use common::WorkspaceId;
    use std::time::Duration;

    struct Harness {
        recorder: EventRecorder,
        usage: InMemoryUsageStore,
        endpoints: InMemoryEndpointDirectory,
        ads: InMemoryAdSink,
        warehouse: InMemoryWarehouseSink,
        workspace: Workspace,
    }

    fn harness() -> Harness {
        let gate = InMemoryDedupGate::new(Duration::from_secs(3600));
        let usage = InMemoryUsageStore::new();
        let endpoints = InMemoryEndpointDirectory::new();
        let ads = InMemoryAdSink::new();
        let warehouse = InMemoryWarehouseSink::new();

        let recorder = EventRecorder::new(
            Arc::new(gate),
            Arc::new(usage.clone()),
            Arc::new(endpoints.clone()),
            Arc::new(ads.clone()),
            Arc::new(warehouse.clone()),
        );

        Harness {
            recorder,
            usage,
            endpoints,
            ads,
            warehouse,
            workspace: Workspace::new(WorkspaceId::new(), "acme"),
        }
    }

    fn click_request(h: &Harness, ip: &str) -> RecordRequest {
        RecordRequest {
            workspace: h.workspace.clone(),
            asset: AssetRef::new(AssetKind::Link, "l-1"),
            event_type: EventType::LinkClick,
            visitor: VisitorContext {
                ip: Some(ip.to_string()),
                ..Default::default()
            },
            purchase: None,
            source_url: None,
        }
    }

    fn endpoint_for(h: &Harness) -> AnalyticsEndpoint {
        AnalyticsEndpoint {
            workspace_id: h.workspace.id,
            platform: AdPlatform::Meta,
            pixel_id: "px-1".to_string(),
            access_token: "tok".to_string(),
        }
    }

    #[tokio::test]
    async fn bot_traffic_is_dropped_without_side_effects() {
        let h = harness();
        let mut req = click_request(&h, "203.0.113.7");
        req.visitor.is_bot = true;

        let outcome = h.recorder.record(req).await;

        assert_eq!(outcome, RecordOutcome::Skipped(SkipReason::Bot));
        assert_eq!(h.warehouse.row_count(), 0);
        assert_eq!(h.usage.usage(h.workspace.id).await, 0);
    }

    #[tokio::test]
    async fn burst_collapses_to_one_event_and_one_increment() {
        let h = harness();

        for _ in 0..20 {
            h.recorder.record(click_request(&h, "203.0.113.7")).await;
        }

        assert_eq!(h.warehouse.row_count(), 1);
        assert_eq!(h.usage.asset_count("link:l-1").await, 1);
        assert_eq!(h.usage.usage(h.workspace.id).await, 1);
    }

    #[tokio::test]
    async fn distinct_identities_record_independently() {
        let h = harness();

        assert!(
            h.recorder
                .record(click_request(&h, "203.0.113.7"))
                .await
                .was_recorded()
        );
        assert!(
            h.recorder
                .record(click_request(&h, "198.51.100.9"))
                .await
                .was_recorded()
        );
        assert_eq!(h.warehouse.row_count(), 2);
    }

    #[tokio::test]
    async fn quota_exceeded_skips_quietly() {
        let h = harness();
        h.usage
            .set_usage(h.workspace.id, h.workspace.event_limit())
            .await;

        let outcome = h.recorder.record(click_request(&h, "203.0.113.7")).await;

        assert_eq!(outcome, RecordOutcome::Skipped(SkipReason::QuotaExceeded));
        assert_eq!(h.warehouse.row_count(), 0);
    }

    #[tokio::test]
    async fn event_limit_override_is_honored() {
        let mut h = harness();
        h.workspace.event_limit_override = Some(2);

        for ip in ["203.0.113.1", "203.0.113.2", "203.0.113.3"] {
            h.recorder.record(click_request(&h, ip)).await;
        }

        assert_eq!(h.warehouse.row_count(), 2);
    }

    #[tokio::test]
    async fn ad_failure_does_not_block_warehouse() {
        let h = harness();
        h.endpoints.upsert(endpoint_for(&h));
        h.ads.set_fail_on_report(true);

        let mut req = click_request(&h, "203.0.113.7");
        req.event_type = EventType::CartCheckoutStarted;
        req.asset = AssetRef::new(AssetKind::CartFunnel, "f-1");

        let outcome = h.recorder.record(req).await;

        assert_eq!(
            outcome,
            RecordOutcome::Recorded {
                reported: false,
                ingested: true
            }
        );
        assert_eq!(h.warehouse.row_count(), 1);
    }

    #[tokio::test]
    async fn warehouse_failure_does_not_block_ads() {
        let h = harness();
        h.endpoints.upsert(endpoint_for(&h));
        h.warehouse.set_fail_on_ingest(true);

        let mut req = click_request(&h, "203.0.113.7");
        req.event_type = EventType::CartCheckoutStarted;
        req.asset = AssetRef::new(AssetKind::CartFunnel, "f-1");

        let outcome = h.recorder.record(req).await;

        assert_eq!(
            outcome,
            RecordOutcome::Recorded {
                reported: true,
                ingested: false
            }
        );
        assert_eq!(h.ads.reported_count(), 1);
    }

    #[tokio::test]
    async fn no_endpoint_means_no_report_but_still_ingests() {
        let h = harness();

        let mut req = click_request(&h, "203.0.113.7");
        req.event_type = EventType::CartCheckoutStarted;

        let outcome = h.recorder.record(req).await;
        assert_eq!(
            outcome,
            RecordOutcome::Recorded {
                reported: false,
                ingested: true
            }
        );
        assert_eq!(h.ads.reported_count(), 0);
    }

    #[tokio::test]
    async fn purchase_reports_two_provider_events() {
        let h = harness();
        h.endpoints.upsert(endpoint_for(&h));

        let mut req = click_request(&h, "203.0.113.7");
        req.event_type = EventType::CartPurchase;
        req.asset = AssetRef::new(AssetKind::CartFunnel, "f-1");

        let outcome = h.recorder.record(req).await;
        assert!(outcome.was_recorded());
        assert_eq!(h.ads.reported_count(), 2);
    }
}
