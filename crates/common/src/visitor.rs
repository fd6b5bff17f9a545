//! Visitor context captured once per request.

use serde::{Deserialize, Serialize};

use crate::types::SessionId;

/// Attribution references carried by a visitor.
///
/// Each field points at the asset that brought the visitor here. All fields
/// are optional; whichever are present at conversion time receive value
/// attribution independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    /// Ad template id (from the ad-network click).
    pub ad_id: Option<String>,
    /// Email broadcast that linked here.
    pub broadcast_id: Option<String>,
    /// Automation (flow) step that linked here.
    pub flow_step_id: Option<String>,
    /// Landing page the visitor came through.
    pub landing_page_id: Option<String>,
    /// Ad-network click id (e.g. `fbclid`), forwarded to the conversion sink.
    pub click_id: Option<String>,
}

impl Attribution {
    /// Returns true when no attribution reference is set.
    pub fn is_empty(&self) -> bool {
        self.ad_id.is_none()
            && self.broadcast_id.is_none()
            && self.flow_step_id.is_none()
            && self.landing_page_id.is_none()
            && self.click_id.is_none()
    }
}

/// Per-request visitor snapshot.
///
/// Constructed once at the transport layer and threaded as a parameter into
/// cart creation and event recording; business logic never reads transport
/// storage directly. A cart keeps the snapshot from its first request;
/// later requests only fill fields that are still absent (first-touch wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorContext {
    pub ip: Option<String>,
    pub session_id: Option<SessionId>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub user_agent: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub referrer: Option<String>,
    #[serde(default)]
    pub attribution: Attribution,
    /// Set by the transport layer for known automated traffic.
    #[serde(default)]
    pub is_bot: bool,
}

impl VisitorContext {
    /// The identity used for dedup keys: session when known, IP otherwise.
    pub fn identity(&self) -> Option<String> {
        self.session_id
            .map(|s| s.to_string())
            .or_else(|| self.ip.clone())
    }

    /// Fills absent fields from `other` without overwriting present ones.
    pub fn fill_missing_from(&mut self, other: &VisitorContext) {
        fn fill(dst: &mut Option<String>, src: &Option<String>) {
            if dst.is_none() {
                *dst = src.clone();
            }
        }

        fill(&mut self.ip, &other.ip);
        if self.session_id.is_none() {
            self.session_id = other.session_id;
        }
        fill(&mut self.country, &other.country);
        fill(&mut self.region, &other.region);
        fill(&mut self.city, &other.city);
        fill(&mut self.user_agent, &other.user_agent);
        fill(&mut self.browser, &other.browser);
        fill(&mut self.os, &other.os);
        fill(&mut self.device, &other.device);
        fill(&mut self.referrer, &other.referrer);
        fill(&mut self.attribution.ad_id, &other.attribution.ad_id);
        fill(
            &mut self.attribution.broadcast_id,
            &other.attribution.broadcast_id,
        );
        fill(
            &mut self.attribution.flow_step_id,
            &other.attribution.flow_step_id,
        );
        fill(
            &mut self.attribution.landing_page_id,
            &other.attribution.landing_page_id,
        );
        fill(&mut self.attribution.click_id, &other.attribution.click_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visitor(ip: &str) -> VisitorContext {
        VisitorContext {
            ip: Some(ip.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn identity_prefers_session() {
        let session = SessionId::new();
        let ctx = VisitorContext {
            ip: Some("203.0.113.7".to_string()),
            session_id: Some(session),
            ..Default::default()
        };
        assert_eq!(ctx.identity(), Some(session.to_string()));
    }

    #[test]
    fn identity_falls_back_to_ip() {
        let ctx = visitor("203.0.113.7");
        assert_eq!(ctx.identity(), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn fill_missing_does_not_overwrite() {
        let mut first = visitor("203.0.113.7");
        first.attribution.ad_id = Some("ad-1".to_string());

        let mut later = visitor("198.51.100.9");
        later.country = Some("DE".to_string());
        later.attribution.ad_id = Some("ad-2".to_string());

        first.fill_missing_from(&later);

        // First-touch fields survive; absent fields are filled.
        assert_eq!(first.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(first.attribution.ad_id.as_deref(), Some("ad-1"));
        assert_eq!(first.country.as_deref(), Some("DE"));
    }

    #[test]
    fn attribution_is_empty() {
        assert!(Attribution::default().is_empty());
        let attr = Attribution {
            broadcast_id: Some("b-1".to_string()),
            ..Default::default()
        };
        assert!(!attr.is_empty());
    }
}
