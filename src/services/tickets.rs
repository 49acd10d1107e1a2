//! Flow tickets for multi-request flows
//!
//! Consuming a verification code does not finish a flow by itself: password
//! reset still needs the new password, and an email change still needs its
//! second phase. A ticket is the short-lived, single-use proof that the code
//! step happened, bound to the email and flow kind it was minted for.
//!
//! Tickets live in memory only. They share a lifetime class with the codes
//! they follow; losing them on restart just means redoing the code step.
use crate::error::{BridgeError, Result};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

const TICKET_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketKind {
    PasswordReset,
    EmailChange,
}

#[derive(Debug, Clone)]
struct TicketState {
    kind: TicketKind,
    email: String,
    expires_at: DateTime<Utc>,
}

/// In-flight two-phase email change, keyed by the new address
#[derive(Debug, Clone)]
pub struct PendingEmailChange {
    pub user_id: Uuid,
    pub current_email: String,
    pub new_email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct FlowTickets {
    tickets: DashMap<Uuid, TicketState>,
    pending_changes: DashMap<String, PendingEmailChange>,
}

impl FlowTickets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a ticket proving the code step of a flow completed
    pub fn issue(&self, kind: TicketKind, email: &str) -> String {
        let id = Uuid::new_v4();
        self.tickets.insert(
            id,
            TicketState {
                kind,
                email: email.to_lowercase(),
                expires_at: Utc::now() + Duration::minutes(TICKET_TTL_MINUTES),
            },
        );
        id.to_string()
    }

    /// Redeem a ticket; single use, bound to kind and email
    ///
    /// The remove happens before any check, so a ticket can never be
    /// redeemed twice even when the first redemption fails validation.
    pub fn consume(&self, ticket: &str, kind: TicketKind, email: &str) -> Result<()> {
        let id = Uuid::parse_str(ticket).map_err(|_| BridgeError::SessionInvalid)?;
        let Some((_, state)) = self.tickets.remove(&id) else {
            return Err(BridgeError::SessionInvalid);
        };
        if state.kind != kind
            || state.email != email.to_lowercase()
            || state.expires_at < Utc::now()
        {
            return Err(BridgeError::SessionInvalid);
        }
        Ok(())
    }

    /// Record a phase-one-complete email change awaiting its second code
    pub fn record_pending_change(&self, user_id: Uuid, current_email: &str, new_email: &str) {
        let new_email = new_email.to_lowercase();
        self.pending_changes.insert(
            new_email.clone(),
            PendingEmailChange {
                user_id,
                current_email: current_email.to_lowercase(),
                new_email,
                expires_at: Utc::now() + Duration::minutes(TICKET_TTL_MINUTES),
            },
        );
    }

    /// Take the pending change for a new address, if one is still live
    pub fn take_pending_change(&self, new_email: &str) -> Option<PendingEmailChange> {
        let (_, pending) = self.pending_changes.remove(&new_email.to_lowercase())?;
        if pending.expires_at < Utc::now() {
            return None;
        }
        Some(pending)
    }

    pub fn has_pending_change(&self, new_email: &str) -> bool {
        self.pending_changes
            .contains_key(&new_email.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_redeems_once() {
        let tickets = FlowTickets::new();
        let ticket = tickets.issue(TicketKind::PasswordReset, "A@X.com");

        tickets
            .consume(&ticket, TicketKind::PasswordReset, "a@x.com")
            .unwrap();
        let again = tickets.consume(&ticket, TicketKind::PasswordReset, "a@x.com");
        assert!(matches!(again, Err(BridgeError::SessionInvalid)));
    }

    #[test]
    fn ticket_is_bound_to_kind_and_email() {
        let tickets = FlowTickets::new();

        let ticket = tickets.issue(TicketKind::PasswordReset, "a@x.com");
        let wrong_kind = tickets.consume(&ticket, TicketKind::EmailChange, "a@x.com");
        assert!(matches!(wrong_kind, Err(BridgeError::SessionInvalid)));

        // The failed redemption above already burned the ticket
        let ticket = tickets.issue(TicketKind::PasswordReset, "a@x.com");
        let wrong_email = tickets.consume(&ticket, TicketKind::PasswordReset, "b@x.com");
        assert!(matches!(wrong_email, Err(BridgeError::SessionInvalid)));
    }

    #[test]
    fn garbage_ticket_is_rejected() {
        let tickets = FlowTickets::new();
        let err = tickets.consume("not-a-uuid", TicketKind::PasswordReset, "a@x.com");
        assert!(matches!(err, Err(BridgeError::SessionInvalid)));
    }

    #[test]
    fn pending_change_is_taken_once() {
        let tickets = FlowTickets::new();
        let user_id = Uuid::new_v4();
        tickets.record_pending_change(user_id, "old@x.com", "New@X.com");

        assert!(tickets.has_pending_change("new@x.com"));
        let pending = tickets.take_pending_change("new@x.com").unwrap();
        assert_eq!(pending.user_id, user_id);
        assert_eq!(pending.current_email, "old@x.com");
        assert!(tickets.take_pending_change("new@x.com").is_none());
    }
}
