//! Device push-token consent gate
//!
//! A pure decision over the reported permission state and the previously
//! recorded outcome, plus a per-flow record so an undetermined retry does
//! not re-prompt. The record is explicit service state, not ambient client
//! storage, and can be reset when a failed attempt must start clean.
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Permission state reported by the client platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Undetermined,
}

/// Recorded consent decision for a sign-up flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentOutcome {
    Granted,
    Denied,
    Skipped,
}

/// Pure decision function
///
/// An explicit grant or denial always wins over history; an undetermined
/// state falls back to the prior recorded outcome so the flow is not
/// re-prompted, and to a skip when there is none.
pub fn decide(state: Option<PermissionState>, prior: Option<ConsentOutcome>) -> ConsentOutcome {
    match state {
        Some(PermissionState::Granted) => ConsentOutcome::Granted,
        Some(PermissionState::Denied) => ConsentOutcome::Denied,
        Some(PermissionState::Undetermined) | None => prior.unwrap_or(ConsentOutcome::Skipped),
    }
}

pub struct NotificationConsentGate {
    decisions: DashMap<String, ConsentOutcome>,
    flow_requires_consent: bool,
}

impl NotificationConsentGate {
    pub fn new(flow_requires_consent: bool) -> Self {
        Self {
            decisions: DashMap::new(),
            flow_requires_consent,
        }
    }

    pub fn requires_consent(&self) -> bool {
        self.flow_requires_consent
    }

    /// Resolve and record the consent outcome for a flow
    ///
    /// Asked-once applies to the undetermined case only: a retry that does
    /// not report a fresh state reuses the recorded outcome, while an
    /// explicit grant or denial replaces it.
    pub fn resolve(&self, email: &str, state: Option<PermissionState>) -> ConsentOutcome {
        let key = email.to_lowercase();
        let prior = self.decisions.get(&key).map(|prior| *prior);

        let outcome = decide(state, prior);
        self.decisions.insert(key, outcome);
        outcome
    }

    /// Forget the recorded decision, e.g. after a failed sign-up attempt
    pub fn reset(&self, email: &str) {
        self.decisions.remove(&email.to_lowercase());
    }

    pub fn was_asked(&self, email: &str) -> bool {
        self.decisions.contains_key(&email.to_lowercase())
    }
}
