//! Login flow: credential checks, failed-attempt lockout, password rotation.

mod common;

use auth_core::error::AuthError;
use auth_core::store::UserStore;
use auth_core::MEMBER_ROLE;
use common::{expired_lockout, member_user, TestStack, TEST_PASSWORD};

#[tokio::test]
async fn test_unknown_email_reports_invalid_credentials() {
    let fixture = TestStack::spawn().await;

    let outcome = fixture
        .stack
        .auth
        .login("ghost@example.com", TEST_PASSWORD, None)
        .await;
    assert!(matches!(outcome, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn test_login_round_trip() {
    let fixture = TestStack::spawn().await;
    fixture.register_member("ada@example.com").await;

    let (pair, user) = fixture
        .stack
        .auth
        .login("ada@example.com", TEST_PASSWORD, None)
        .await
        .unwrap();

    assert_eq!(pair.token_type, "Bearer");
    assert!(!pair.access_token.is_empty());
    assert!(!pair.refresh_token.is_empty());
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.role, MEMBER_ROLE);
    assert!(!user.mfa_enabled);
}

#[tokio::test]
async fn test_wrong_password_reports_invalid_credentials() {
    let fixture = TestStack::spawn().await;
    fixture.register_member("ada@example.com").await;

    let outcome = fixture
        .stack
        .auth
        .login("ada@example.com", "Wr0ng-Password!", None)
        .await;
    assert!(matches!(outcome, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn test_lockout_after_repeated_failures() {
    let fixture = TestStack::spawn().await;
    fixture.register_member("ada@example.com").await;
    let threshold = fixture.config.lockout.max_failed_attempts;

    for attempt in 1..threshold {
        let outcome = fixture
            .stack
            .auth
            .login("ada@example.com", "Wr0ng-Password!", None)
            .await;
        assert!(
            matches!(outcome, Err(AuthError::InvalidCredentials)),
            "attempt {attempt} should not lock yet"
        );
    }

    // The attempt that reaches the threshold reports the lock.
    let outcome = fixture
        .stack
        .auth
        .login("ada@example.com", "Wr0ng-Password!", None)
        .await;
    assert!(matches!(outcome, Err(AuthError::AccountLocked)));

    // Even the correct password is refused while locked.
    let outcome = fixture
        .stack
        .auth
        .login("ada@example.com", TEST_PASSWORD, None)
        .await;
    assert!(matches!(outcome, Err(AuthError::AccountLocked)));
}

#[tokio::test]
async fn test_successful_login_resets_failure_counter() {
    let fixture = TestStack::spawn().await;
    fixture.register_member("ada@example.com").await;
    let threshold = fixture.config.lockout.max_failed_attempts;

    for _ in 1..threshold {
        let _ = fixture
            .stack
            .auth
            .login("ada@example.com", "Wr0ng-Password!", None)
            .await;
    }
    fixture.login("ada@example.com").await;

    // The counter restarted from zero, so the same number of failures
    // again stays short of the lock.
    for _ in 1..threshold {
        let outcome = fixture
            .stack
            .auth
            .login("ada@example.com", "Wr0ng-Password!", None)
            .await;
        assert!(matches!(outcome, Err(AuthError::InvalidCredentials)));
    }
    fixture.login("ada@example.com").await;
}

#[tokio::test]
async fn test_expired_lockout_admits_and_clears() {
    let fixture = TestStack::spawn().await;

    let mut user = member_user("ada@example.com");
    user.failed_login_attempts = fixture.config.lockout.max_failed_attempts;
    user.lockout_until = expired_lockout(1);
    fixture.insert_user(&user).await;

    fixture.login("ada@example.com").await;

    let stored = fixture
        .users
        .find_by_email("ada@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.failed_login_attempts, 0);
    assert!(stored.lockout_until.is_none());
    assert!(stored.last_login_at.is_some());
}

#[tokio::test]
async fn test_weak_passwords_rejected_at_registration() {
    let fixture = TestStack::spawn().await;

    for weak in [
        "Sh0rt-pw!",        // under the length floor
        "no-upper-case-1!", // missing uppercase
        "NO-LOWER-CASE-1!", // missing lowercase
        "No-Digits-Here!!", // missing digit
        "NoSpecials12345A",  // missing special
    ] {
        let outcome = fixture
            .stack
            .auth
            .register("ada@example.com", weak, MEMBER_ROLE)
            .await;
        assert!(
            matches!(outcome, Err(AuthError::WeakPassword(_))),
            "{weak:?} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_duplicate_email_rejected() {
    let fixture = TestStack::spawn().await;
    fixture.register_member("ada@example.com").await;

    let outcome = fixture
        .stack
        .auth
        .register("ada@example.com", TEST_PASSWORD, MEMBER_ROLE)
        .await;
    assert!(matches!(outcome, Err(AuthError::EmailTaken)));
}

#[tokio::test]
async fn test_change_password_requires_current() {
    let fixture = TestStack::spawn().await;
    let user = fixture.register_member("ada@example.com").await;

    let outcome = fixture
        .stack
        .auth
        .change_password(user.user_id, "Wr0ng-Password!", "Fresh-Passw0rd!!")
        .await;
    assert!(matches!(outcome, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn test_recent_passwords_rejected_then_roll_off() {
    let mut config = common::test_config();
    config.password.history_depth = 2;
    let fixture = TestStack::with_config(config).await;
    let user = fixture.register_member("ada@example.com").await;

    let second = "Secund0-Passw0rd!";
    let third = "Terti0-Passw0rd!!";

    fixture
        .stack
        .auth
        .change_password(user.user_id, TEST_PASSWORD, second)
        .await
        .unwrap();

    // The previous password is inside the history window.
    let outcome = fixture
        .stack
        .auth
        .change_password(user.user_id, second, TEST_PASSWORD)
        .await;
    assert!(matches!(outcome, Err(AuthError::PasswordReused)));

    // So is the current one.
    let outcome = fixture
        .stack
        .auth
        .change_password(user.user_id, second, second)
        .await;
    assert!(matches!(outcome, Err(AuthError::PasswordReused)));

    fixture
        .stack
        .auth
        .change_password(user.user_id, second, third)
        .await
        .unwrap();

    // Two rotations later the original has rolled out of the window.
    fixture
        .stack
        .auth
        .change_password(user.user_id, third, TEST_PASSWORD)
        .await
        .unwrap();

    fixture.login("ada@example.com").await;
}

#[tokio::test]
async fn test_registration_requires_existing_role() {
    let fixture = TestStack::spawn().await;

    let outcome = fixture
        .stack
        .auth
        .register("ada@example.com", TEST_PASSWORD, "ghost-role")
        .await;
    assert!(matches!(outcome, Err(AuthError::RoleNotFound)));
}
