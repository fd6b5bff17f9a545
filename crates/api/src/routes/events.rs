//! Shared event-recording endpoint for non-cart surfaces.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use common::{VisitorContext, WorkspaceId};
use serde::{Deserialize, Serialize};

use cart::FunnelStore;
use pipeline::{AssetKind, AssetRef, EventType, RecordOutcome, RecordRequest, SkipReason};

use crate::error::ApiError;
use crate::routes::carts::{AppState, visitor_from};

#[derive(Deserialize)]
pub struct RecordEventRequest {
    pub workspace_id: uuid::Uuid,
    pub asset_kind: AssetKind,
    pub asset_id: String,
    pub asset_sub_id: Option<String>,
    pub event_type: EventType,
    #[serde(default)]
    pub visitor: VisitorContext,
    pub source_url: Option<String>,
}

#[derive(Serialize)]
pub struct RecordEventResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// POST /events — record a link/bio/FM/page/VIP event.
///
/// Skips (bots, duplicates, quota) are 200s: from the surface's point of
/// view a skipped event is normal operation, not a failure.
#[tracing::instrument(skip(state, headers, req))]
pub async fn record<S: FunnelStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<RecordEventRequest>,
) -> Result<Json<RecordEventResponse>, ApiError> {
    let workspace_id = WorkspaceId::from(req.workspace_id);
    let workspace = state
        .store
        .get_workspace(workspace_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Workspace {workspace_id} not found")))?;

    let visitor = visitor_from(req.visitor, &headers);
    let asset = AssetRef {
        kind: req.asset_kind,
        id: req.asset_id,
        sub_id: req.asset_sub_id,
    };

    let outcome = state
        .recorder
        .record(RecordRequest {
            workspace,
            asset,
            event_type: req.event_type,
            visitor,
            purchase: None,
            source_url: req.source_url,
        })
        .await;

    let response = match outcome {
        RecordOutcome::Recorded { .. } => RecordEventResponse {
            status: "recorded",
            reason: None,
        },
        RecordOutcome::Skipped(reason) => RecordEventResponse {
            status: "skipped",
            reason: Some(match reason {
                SkipReason::Bot => "bot",
                SkipReason::Duplicate => "duplicate",
                SkipReason::QuotaExceeded => "quotaExceeded",
            }),
        },
    };

    Ok(Json(response))
}
