//! Integration tests for schema initialization using in-memory SurrealDB.

use credo_db::{StoreClient, run_migrations};
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    let store = StoreClient::from_surreal(db);

    run_migrations(&store).await.unwrap();

    let op = store.begin_operation().unwrap();
    let mut result = op.client().query("INFO FOR TABLE user").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info_str = format!("{:?}", info.expect("INFO FOR TABLE should return a value"));

    assert!(info_str.contains("idx_user_username"), "missing username index");
    assert!(info_str.contains("idx_user_email"), "missing email index");
    assert!(info_str.contains("refresh_token"), "missing refresh_token field");
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    let store = StoreClient::from_surreal(db);

    run_migrations(&store).await.unwrap();
    run_migrations(&store).await.unwrap();
}

#[tokio::test]
async fn migrations_fail_on_closed_store() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    let store = StoreClient::from_surreal(db);
    store.close().await;

    let err = run_migrations(&store).await.unwrap_err();
    assert!(matches!(err, credo_db::DbError::StoreClosed));
}
