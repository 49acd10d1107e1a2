//! Email verification and password reset flows end to end, reading the
//! dispatched plaintext the way a real user would.
mod common;

use common::{harness, signup_input};
use identity_bridge::db::UserDirectory;
use identity_bridge::error::BridgeError;
use identity_bridge::models::CodePurpose;

#[tokio::test]
async fn unknown_address_gets_no_code_but_no_error_either() {
    let h = harness();

    h.bridge
        .request_password_reset("nobody@x.com")
        .await
        .unwrap();
    h.bridge
        .request_email_verification("nobody@x.com")
        .await
        .unwrap();

    assert_eq!(h.dispatch.sent_count(), 0);
}

#[tokio::test]
async fn consuming_the_verification_code_flips_the_flag() {
    let h = harness();
    h.bridge.sign_up(signup_input("a@x.com")).await.unwrap();

    let code = h.dispatch.last_code_for("a@x.com").unwrap();
    let redirect = h.bridge.verify_email_code("a@x.com", &code).await.unwrap();

    assert_eq!(redirect, "/account");
    let user = h.directory.find_by_email("a@x.com").await.unwrap().unwrap();
    assert!(user.email_verified);

    // Second consumption of the same code fails
    let err = h.bridge.verify_email_code("a@x.com", &code).await;
    assert!(matches!(err, Err(BridgeError::CodeAlreadyConsumed)));
}

#[tokio::test]
async fn resend_supersedes_the_signup_code() {
    let h = harness();
    h.bridge.sign_up(signup_input("a@x.com")).await.unwrap();
    let first = h.dispatch.last_code_for("a@x.com").unwrap();

    h.bridge
        .request_email_verification("a@x.com")
        .await
        .unwrap();
    let second = h.dispatch.last_code_for("a@x.com").unwrap();

    let err = h.bridge.verify_email_code("a@x.com", &first).await;
    assert!(matches!(err, Err(BridgeError::CodeAlreadyConsumed)));

    h.bridge.verify_email_code("a@x.com", &second).await.unwrap();
}

#[tokio::test]
async fn password_reset_end_to_end() {
    let h = harness();
    h.bridge.sign_up(signup_input("a@x.com")).await.unwrap();

    h.bridge.request_password_reset("a@x.com").await.unwrap();
    let (purpose, _, code) = h.dispatch.sent.lock().unwrap().last().cloned().unwrap();
    assert_eq!(purpose, CodePurpose::PasswordReset);
    let ticket = h
        .bridge
        .verify_password_reset_code("a@x.com", &code)
        .await
        .unwrap();

    h.bridge
        .update_password("a@x.com", &ticket, "new-password-123")
        .await
        .unwrap();
    assert_eq!(
        h.provider.password_for("a@x.com").unwrap(),
        "new-password-123"
    );

    // The new password signs in, the old one does not
    let err = h
        .bridge
        .sign_in(common::signin_input("a@x.com", "correct-horse-battery"))
        .await;
    assert!(matches!(err, Err(BridgeError::InvalidCredentials)));
    h.bridge
        .sign_in(common::signin_input("a@x.com", "new-password-123"))
        .await
        .unwrap();
}

#[tokio::test]
async fn reset_ticket_is_single_use_and_email_bound() {
    let h = harness();
    h.bridge.sign_up(signup_input("a@x.com")).await.unwrap();
    h.bridge.sign_up(signup_input("b@x.com")).await.unwrap();

    h.bridge.request_password_reset("a@x.com").await.unwrap();
    let code = h.dispatch.last_code_for("a@x.com").unwrap();
    let ticket = h
        .bridge
        .verify_password_reset_code("a@x.com", &code)
        .await
        .unwrap();

    // Wrong email with a valid ticket
    let err = h
        .bridge
        .update_password("b@x.com", &ticket, "new-password-123")
        .await;
    assert!(matches!(err, Err(BridgeError::SessionInvalid)));

    // The failed redemption burned the ticket
    let err = h
        .bridge
        .update_password("a@x.com", &ticket, "new-password-123")
        .await;
    assert!(matches!(err, Err(BridgeError::SessionInvalid)));
    assert_eq!(
        h.provider.password_for("a@x.com").unwrap(),
        "correct-horse-battery"
    );
}

#[tokio::test]
async fn wrong_code_spends_attempts_until_lockout() {
    let h = harness();
    h.bridge.sign_up(signup_input("a@x.com")).await.unwrap();
    h.bridge.request_password_reset("a@x.com").await.unwrap();
    let code = h.dispatch.last_code_for("a@x.com").unwrap();
    let wrong = if code == "000000" { "000001" } else { "000000" };

    for _ in 0..5 {
        let err = h.bridge.verify_password_reset_code("a@x.com", wrong).await;
        assert!(matches!(err, Err(BridgeError::CodeMismatch)));
    }

    let err = h.bridge.verify_password_reset_code("a@x.com", &code).await;
    assert!(matches!(err, Err(BridgeError::TooManyAttempts)));
}
