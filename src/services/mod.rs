//! Service layer
pub mod bridge;
pub mod code_store;
pub mod consent;
pub mod email;
pub mod reconcile;
pub mod session;
pub mod tickets;

pub use bridge::{
    AuthOutcome, ChangeEmailProgress, IdentityBridge, SignInInput, SignOutOutcome, SignUpInput,
};
pub use code_store::CodeStore;
pub use consent::{ConsentOutcome, NotificationConsentGate, PermissionState};
pub use email::{EmailDispatch, SmtpEmailDispatch};
pub use reconcile::{spawn_reconciliation_worker, ReconcileConfig};
pub use session::SessionTokenManager;
pub use tickets::{FlowTickets, PendingEmailChange, TicketKind};
