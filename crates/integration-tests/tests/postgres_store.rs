//! Integration tests for the `PostgreSQL` identity store.
//!
//! These tests require a running `PostgreSQL` database reachable through
//! `LIKENESS_TEST_DATABASE_URL`; without it they return immediately.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::print_stderr
)]

use likeness_core::{
    Binding, GoogleProfile, NewUser, OAuthProfile, ProviderEmail, ServiceAgreement, User,
};
use likeness_identity::{IdentityError, IdentityStore};
use likeness_integration_tests::{TestContext, unique};

async fn context() -> Option<TestContext> {
    let ctx = TestContext::connect().await;
    if ctx.is_none() {
        eprintln!("skipping: {} not set", likeness_integration_tests::DATABASE_URL_VAR);
    }
    ctx
}

async fn create_user(ctx: &TestContext) -> User {
    let username = format!("u{}", unique());
    ctx.engine
        .accounts()
        .create_user(
            &NewUser::new("Test", "User", &username).unwrap(),
            ServiceAgreement::accept(true, true).unwrap(),
        )
        .await
        .unwrap()
}

fn google(subject: &str) -> OAuthProfile {
    OAuthProfile::Google(GoogleProfile {
        provider_id: subject.to_owned(),
        given_name: Some("Jane".to_owned()),
        family_name: None,
        locale: None,
    })
}

fn provider_email(email: &str, verified: bool) -> ProviderEmail {
    ProviderEmail {
        email: email.to_owned(),
        verified,
        primary: true,
    }
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_user_and_agreement_round_trip() {
    let Some(ctx) = context().await else { return };
    let user = create_user(&ctx).await;

    let loaded = ctx.engine.accounts().user(user.id).await.unwrap();
    assert_eq!(loaded.username, user.username);

    let agreement = ctx.engine.accounts().service_agreement(user.id).await.unwrap();
    assert!(agreement.agreement.agreed_to_tos());
}

#[tokio::test]
async fn test_duplicate_username_is_conflict() {
    let Some(ctx) = context().await else { return };
    let user = create_user(&ctx).await;

    let err = ctx
        .engine
        .accounts()
        .create_user(
            &NewUser::new("Other", "User", user.username.as_str()).unwrap(),
            ServiceAgreement::accept(true, true).unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Conflict(_)));
}

// ============================================================================
// Credentials
// ============================================================================

#[tokio::test]
async fn test_oauth_profile_survives_storage() {
    let Some(ctx) = context().await else { return };
    let subject = unique();
    let email = format!("j.doe+{}@gmail.com", unique());

    let created = ctx
        .engine
        .credentials()
        .create_from_oauth(google(&subject), &provider_email(&email, true), true, false, None)
        .await
        .unwrap();
    let loaded = ctx.engine.credentials().credential(created.id).await.unwrap();

    assert_eq!(loaded, created);
    assert_eq!(loaded.binding, Binding::Unbound);
    assert_eq!(loaded.profile.provider_id(), Some(subject.as_str()));
}

#[tokio::test]
async fn test_same_provider_account_links_once() {
    let Some(ctx) = context().await else { return };
    let subject = unique();
    let creds = ctx.engine.credentials();

    creds
        .create_from_oauth(google(&subject), &provider_email("a@gmail.com", true), false, false, None)
        .await
        .unwrap();
    let err = creds
        .create_from_oauth(google(&subject), &provider_email("b@gmail.com", true), false, false, None)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Conflict(_)));
}

#[tokio::test]
async fn test_email_credential_unique_per_address() {
    let Some(ctx) = context().await else { return };
    let first = create_user(&ctx).await;
    let second = create_user(&ctx).await;
    let tag = unique();
    let creds = ctx.engine.credentials();

    creds
        .create_from_email_signup(&format!("{tag}@example.com"), first.id, true, false)
        .await
        .unwrap();
    let err = creds
        .create_from_email_signup(&format!("{}@EXAMPLE.com", tag.to_uppercase()), second.id, true, false)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Conflict(_)));
}

#[tokio::test]
async fn test_attach_and_lookup() {
    let Some(ctx) = context().await else { return };
    let creds = ctx.engine.credentials();
    let tag = unique();

    let google_cred = creds
        .create_from_oauth(
            google(&unique()),
            &provider_email(&format!("j.doe.{tag}+work@gmail.com"), false),
            true,
            true,
            None,
        )
        .await
        .unwrap();
    let owner = create_user(&ctx).await;

    let bound = creds
        .attach_user_to_credentials(&[google_cred.id], owner.id)
        .await
        .unwrap();
    assert_eq!(bound[0].user_id(), Some(owner.id));

    // Rebinding to the same owner is a no-op.
    creds
        .attach_user_to_credentials(&[google_cred.id], owner.id)
        .await
        .unwrap();

    let intruder = create_user(&ctx).await;
    let err = creds
        .attach_user_to_credentials(&[google_cred.id], intruder.id)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Conflict(_)));

    assert_eq!(
        creds
            .lookup_user_for_email(&format!("JDoe{tag}@gmail.com"))
            .await
            .unwrap(),
        Some(owner.id)
    );
}

// ============================================================================
// Passwords
// ============================================================================

#[tokio::test]
async fn test_rotation_and_reuse() {
    let Some(ctx) = context().await else { return };
    let user = create_user(&ctx).await;
    let cred = ctx
        .engine
        .credentials()
        .create_from_email_signup(&format!("{}@example.com", unique()), user.id, true, false)
        .await
        .unwrap();
    let vault = ctx.engine.passwords();

    vault.set_password(cred.id, "first-pass").await.unwrap();
    vault.change_password(cred.id, "second-pass").await.unwrap();

    let records = ctx.engine.store().password_records(cred.id).await.unwrap();
    assert_eq!(records.iter().filter(|r| r.is_current).count(), 1);

    assert!(!vault.can_change_password(user.id, "first-pass").await.unwrap());
    assert!(vault.verify_login(cred.id, "second-pass").await.unwrap());
    assert!(!vault.verify_login(cred.id, "first-pass").await.unwrap());
}

#[tokio::test]
async fn test_concurrent_rotations_keep_one_current_record() {
    let Some(ctx) = context().await else { return };
    let user = create_user(&ctx).await;
    let cred = ctx
        .engine
        .credentials()
        .create_from_email_signup(&format!("{}@example.com", unique()), user.id, true, false)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..8 {
        let engine = ctx.engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .passwords()
                .set_password(cred.id, &format!("password-{n}"))
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("task panicked").unwrap();
    }

    let records = ctx.engine.store().password_records(cred.id).await.unwrap();
    assert_eq!(records.len(), 8);
    assert_eq!(records.iter().filter(|r| r.is_current).count(), 1);
}

#[tokio::test]
async fn test_concurrent_changes_to_same_password_rotate_once() {
    let Some(ctx) = context().await else { return };
    let user = create_user(&ctx).await;
    let cred = ctx
        .engine
        .credentials()
        .create_from_email_signup(&format!("{}@example.com", unique()), user.id, true, false)
        .await
        .unwrap();
    ctx.engine.passwords().set_password(cred.id, "first-pass").await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = ctx.engine.clone();
        handles.push(tokio::spawn(async move {
            engine.passwords().change_password(cred.id, "second-pass").await
        }));
    }
    let mut succeeded = 0;
    for handle in handles {
        if handle.await.expect("task panicked").is_ok() {
            succeeded += 1;
        }
    }
    assert_eq!(succeeded, 1);

    let records = ctx.engine.store().password_records(cred.id).await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_schema_rejects_second_current_record() {
    let Some(ctx) = context().await else { return };
    let user = create_user(&ctx).await;
    let cred = ctx
        .engine
        .credentials()
        .create_from_email_signup(&format!("{}@example.com", unique()), user.id, true, false)
        .await
        .unwrap();
    ctx.engine.passwords().set_password(cred.id, "first-pass").await.unwrap();

    let err = sqlx::query(
        "INSERT INTO identity.email_passwords (credential_id, password_hash, is_current) VALUES ($1, 'x', TRUE)",
    )
    .bind(cred.id)
    .execute(&ctx.pool)
    .await
    .unwrap_err();

    let db_err = err.as_database_error().expect("database error");
    assert!(db_err.is_unique_violation());
}
