//! Sign-in, refresh, sign-out, and the inconsistent-account guard.
mod common;

use common::{harness, signin_input, signup_input};
use identity_bridge::db::UserDirectory;
use identity_bridge::error::BridgeError;
use identity_bridge::models::Role;
use identity_bridge::provider::IdentityProvider;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn sign_in_records_login_and_redirects_by_role() {
    let h = harness();
    h.bridge.sign_up(signup_input("a@x.com")).await.unwrap();

    let outcome = h
        .bridge
        .sign_in(signin_input("a@x.com", "correct-horse-battery"))
        .await
        .unwrap();
    assert_eq!(outcome.redirect, "/account");
    assert!(outcome.user.last_login_at.is_none());

    // last_login_at is written after the lookup; visible on the next read
    let user = h.directory.find_by_email("a@x.com").await.unwrap().unwrap();
    assert!(user.last_login_at.is_some());

    let mut admin = signup_input("root@x.com");
    admin.role = Role::Admin;
    h.bridge.sign_up(admin).await.unwrap();
    let outcome = h
        .bridge
        .sign_in(signin_input("root@x.com", "correct-horse-battery"))
        .await
        .unwrap();
    assert_eq!(outcome.redirect, "/admin");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let h = harness();
    h.bridge.sign_up(signup_input("a@x.com")).await.unwrap();

    let err = h.bridge.sign_in(signin_input("a@x.com", "wrong-password")).await;
    assert!(matches!(err, Err(BridgeError::InvalidCredentials)));
}

#[tokio::test]
async fn provider_credential_without_directory_row_mints_no_session() {
    let h = harness();

    // A credential the directory has never heard of
    h.provider
        .create_credential("ghost@x.com", "correct-horse-battery")
        .await
        .unwrap();

    let err = h
        .bridge
        .sign_in(signin_input("ghost@x.com", "correct-horse-battery"))
        .await;
    assert!(matches!(err, Err(BridgeError::AccountInconsistent)));

    // Same user-facing message as a plain credential rejection
    assert_eq!(
        BridgeError::AccountInconsistent.public_message(),
        BridgeError::InvalidCredentials.public_message()
    );
}

#[tokio::test]
async fn refresh_exchanges_a_live_provider_session() {
    let h = harness();
    let outcome = h.bridge.sign_up(signup_input("a@x.com")).await.unwrap();

    let refreshed = h.bridge.refresh(&outcome.provider_token).await.unwrap();
    assert_eq!(refreshed.user.id, outcome.user.id);
    h.bridge.authorize(&refreshed.session.token).await.unwrap();
}

#[tokio::test]
async fn refresh_after_sign_out_is_invalid() {
    let h = harness();
    let outcome = h.bridge.sign_up(signup_input("a@x.com")).await.unwrap();

    let signed_out = h.bridge.sign_out(&outcome.provider_token).await;
    assert!(signed_out.provider_session_revoked);

    let err = h.bridge.refresh(&outcome.provider_token).await;
    assert!(matches!(err, Err(BridgeError::SessionInvalid)));
}

#[tokio::test]
async fn sign_out_completes_even_when_the_provider_is_down() {
    let h = harness();
    let outcome = h.bridge.sign_up(signup_input("a@x.com")).await.unwrap();

    h.provider.fail_invalidate.store(true, Ordering::SeqCst);
    let signed_out = h.bridge.sign_out(&outcome.provider_token).await;
    assert!(!signed_out.provider_session_revoked);
}

#[tokio::test]
async fn authorize_rejects_garbage_and_tampering() {
    let h = harness();
    let outcome = h.bridge.sign_up(signup_input("a@x.com")).await.unwrap();

    let err = h.bridge.authorize("not-a-jwt").await;
    assert!(matches!(err, Err(BridgeError::TokenInvalid)));

    let mut tampered = outcome.session.token.clone();
    tampered.push('x');
    let err = h.bridge.authorize(&tampered).await;
    assert!(matches!(err, Err(BridgeError::TokenInvalid)));
}
