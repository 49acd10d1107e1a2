//! Data models for the identity bridge
pub mod code;
pub mod session;
pub mod user;

pub use code::{CodePurpose, VerificationCode};
pub use session::{SessionClaims, SessionToken};
pub use user::{NewUser, Role, User};
