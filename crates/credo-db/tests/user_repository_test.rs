//! Integration tests for the User repository using in-memory SurrealDB.

use credo_core::context::RequestContext;
use credo_core::error::CredoError;
use credo_core::models::user::NewUser;
use credo_core::repository::UserRepository;
use credo_db::repository::SurrealUserRepository;
use credo_db::{StoreClient, run_migrations};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> StoreClient<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    let store = StoreClient::from_surreal(db);
    run_migrations(&store).await.unwrap();
    store
}

fn new_user(username: &str, email: &str) -> NewUser {
    NewUser {
        id: Uuid::new_v4(),
        username: username.into(),
        email: email.into(),
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
    }
}

#[tokio::test]
async fn save_and_get_user() {
    let store = setup().await;
    let repo = SurrealUserRepository::new(store);
    let ctx = RequestContext::generate();

    let user = new_user("alice", "alice@example.com");
    let id = user.id;
    repo.save_user(&ctx, user).await.unwrap();

    let fetched = repo.get_by_id(&ctx, id).await.unwrap();
    assert_eq!(fetched.id, id);
    assert_eq!(fetched.username, "alice");
    assert_eq!(fetched.email, "alice@example.com");
    assert!(fetched.refresh_token.is_none());

    let by_name = repo.get_by_username(&ctx, "alice").await.unwrap();
    assert_eq!(by_name.id, id);
}

#[tokio::test]
async fn availability_checks() {
    let store = setup().await;
    let repo = SurrealUserRepository::new(store);
    let ctx = RequestContext::unknown();

    repo.check_username_available(&ctx, "alice").await.unwrap();
    repo.check_email_available(&ctx, "alice@example.com")
        .await
        .unwrap();

    repo.save_user(&ctx, new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    let err = repo
        .check_username_available(&ctx, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, CredoError::UsernameExists));

    let err = repo
        .check_email_available(&ctx, "alice@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, CredoError::EmailExists));

    // Other values are still free.
    repo.check_username_available(&ctx, "bob").await.unwrap();
    repo.check_email_available(&ctx, "bob@example.com")
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_username_insert_is_translated() {
    let store = setup().await;
    let repo = SurrealUserRepository::new(store);
    let ctx = RequestContext::generate();

    repo.save_user(&ctx, new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    let err = repo
        .save_user(&ctx, new_user("alice", "other@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, CredoError::UsernameExists), "got {err:?}");

    // The rejected row was not written.
    repo.check_email_available(&ctx, "other@example.com")
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_email_insert_is_translated() {
    let store = setup().await;
    let repo = SurrealUserRepository::new(store);
    let ctx = RequestContext::generate();

    repo.save_user(&ctx, new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    let err = repo
        .save_user(&ctx, new_user("bob", "alice@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, CredoError::EmailExists), "got {err:?}");

    repo.check_username_available(&ctx, "bob").await.unwrap();
}

#[tokio::test]
async fn email_collision_is_attributed_by_index_not_value() {
    let store = setup().await;
    let repo = SurrealUserRepository::new(store);
    let ctx = RequestContext::generate();

    // The conflicting value itself names the other index.
    repo.save_user(&ctx, new_user("alice", "idx_user_username@x.com"))
        .await
        .unwrap();

    let err = repo
        .save_user(&ctx, new_user("bob", "idx_user_username@x.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, CredoError::EmailExists), "got {err:?}");
}

#[tokio::test]
async fn concurrent_inserts_for_same_username_yield_one_row() {
    let store = setup().await;
    let repo = SurrealUserRepository::new(store);
    let ctx = RequestContext::generate();

    let (a, b) = tokio::join!(
        repo.save_user(&ctx, new_user("carol", "carol1@example.com")),
        repo.save_user(&ctx, new_user("carol", "carol2@example.com")),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one insert must win: {a:?} / {b:?}");

    let loser = if a.is_err() { a } else { b };
    assert!(matches!(
        loser.unwrap_err(),
        CredoError::UsernameExists | CredoError::UserNotSaved { .. }
    ));
}

#[tokio::test]
async fn refresh_token_is_overwritten() {
    let store = setup().await;
    let repo = SurrealUserRepository::new(store);
    let ctx = RequestContext::generate();

    let user = new_user("dave", "dave@example.com");
    let id = user.id;
    repo.save_user(&ctx, user).await.unwrap();

    repo.set_refresh_token(&ctx, id, "first").await.unwrap();
    repo.set_refresh_token(&ctx, id, "second").await.unwrap();

    let fetched = repo.get_by_id(&ctx, id).await.unwrap();
    assert_eq!(fetched.refresh_token.as_deref(), Some("second"));
}

#[tokio::test]
async fn refresh_token_for_unknown_user_is_not_found() {
    let store = setup().await;
    let repo = SurrealUserRepository::new(store);
    let ctx = RequestContext::generate();

    let err = repo
        .set_refresh_token(&ctx, Uuid::new_v4(), "token")
        .await
        .unwrap_err();
    assert!(matches!(err, CredoError::NotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn get_nonexistent_user_returns_not_found() {
    let store = setup().await;
    let repo = SurrealUserRepository::new(store);
    let ctx = RequestContext::generate();

    let result = repo.get_by_id(&ctx, Uuid::new_v4()).await;
    assert!(matches!(result, Err(CredoError::NotFound { .. })));
}

#[tokio::test]
async fn repository_calls_fail_after_close() {
    let store = setup().await;
    let repo = SurrealUserRepository::new(store.clone());
    let ctx = RequestContext::generate();

    store.close().await;

    let err = repo
        .check_username_available(&ctx, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, CredoError::StoreClosed));

    let err = repo
        .save_user(&ctx, new_user("alice", "alice@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, CredoError::StoreClosed));
    assert_eq!(store.in_flight(), 0);
}
