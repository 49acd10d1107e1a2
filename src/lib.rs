//! Identity bridge and session lifecycle service
//!
//! Bridges an external identity provider (the system of record for
//! credentials) with the local user directory (the system of record for
//! users and roles), and owns everything that can leave the two
//! inconsistent: sign-up compensation, one-time-code flows, two-phase email
//! changes, and the reconciliation journal for the failures that slip
//! through.

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod provider;
pub mod services;
pub mod validators;
