//! Workspace (tenant) record: plan, payment accounts, fee configuration.

use common::WorkspaceId;
use serde::{Deserialize, Serialize};

/// Subscription plan, which bounds monthly recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Plan {
    #[default]
    Free,
    Standard,
    Pro,
}

impl Plan {
    /// Monthly event quota for the plan.
    pub fn monthly_event_limit(&self) -> u64 {
        match self {
            Plan::Free => 1_000,
            Plan::Standard => 50_000,
            Plan::Pro => 500_000,
        }
    }
}

/// Deployment environment used to route charges.
///
/// Production and sandbox are strictly separated: a sandbox connected
/// account is never charged against in production and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChargeEnvironment {
    Production,
    Sandbox,
}

impl std::fmt::Display for ChargeEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChargeEnvironment::Production => write!(f, "production"),
            ChargeEnvironment::Sandbox => write!(f, "sandbox"),
        }
    }
}

/// Connected payment accounts per environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAccounts {
    pub live: Option<String>,
    pub sandbox: Option<String>,
}

/// A tenant of the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    #[serde(default)]
    pub plan: Plan,
    /// Overrides the plan's monthly event quota when set.
    pub event_limit_override: Option<u64>,
    /// Platform fee fraction applied to product amounts (e.g. `0.05`).
    pub fee_percent: f64,
    #[serde(default)]
    pub payment_accounts: PaymentAccounts,
}

impl Workspace {
    pub fn new(id: WorkspaceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            plan: Plan::default(),
            event_limit_override: None,
            fee_percent: 0.05,
            payment_accounts: PaymentAccounts::default(),
        }
    }

    /// Effective monthly event quota.
    pub fn event_limit(&self) -> u64 {
        self.event_limit_override
            .unwrap_or_else(|| self.plan.monthly_event_limit())
    }

    /// Connected account for the given environment, if configured.
    pub fn connected_account(&self, env: ChargeEnvironment) -> Option<&str> {
        match env {
            ChargeEnvironment::Production => self.payment_accounts.live.as_deref(),
            ChargeEnvironment::Sandbox => self.payment_accounts.sandbox.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_limit_override_wins() {
        let mut ws = Workspace::new(WorkspaceId::new(), "acme");
        assert_eq!(ws.event_limit(), 1_000);
        ws.event_limit_override = Some(42);
        assert_eq!(ws.event_limit(), 42);
    }

    #[test]
    fn environments_are_routed_separately() {
        let mut ws = Workspace::new(WorkspaceId::new(), "acme");
        ws.payment_accounts.live = Some("acct_live".to_string());
        assert_eq!(
            ws.connected_account(ChargeEnvironment::Production),
            Some("acct_live")
        );
        assert_eq!(ws.connected_account(ChargeEnvironment::Sandbox), None);
    }
}
