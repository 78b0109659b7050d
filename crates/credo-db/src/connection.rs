//! SurrealDB store client with retried startup, per-operation admission
//! control and drain-before-close shutdown.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use surrealdb::{Connection, Surreal};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::error::DbError;

/// Configuration for connecting to SurrealDB.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Endpoint understood by the `any` engine (e.g. `ws://127.0.0.1:8000`
    /// or `mem://`).
    pub endpoint: String,
    /// SurrealDB namespace.
    pub namespace: String,
    /// SurrealDB database name.
    pub database: String,
    /// Root credentials. `None` skips sign-in (embedded engines).
    pub credentials: Option<StoreCredentials>,
    /// Connection attempts before giving up.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles per attempt.
    pub retry_base_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct StoreCredentials {
    pub username: String,
    pub password: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000".into(),
            namespace: "credo".into(),
            database: "main".into(),
            credentials: Some(StoreCredentials {
                username: "root".into(),
                password: "root".into(),
            }),
            max_attempts: 5,
            retry_base_delay: Duration::from_secs(2),
        }
    }
}

/// In-flight counter and closed flag shared by the client and its guards.
#[derive(Debug, Default)]
struct Admission {
    in_flight: AtomicUsize,
    closed: AtomicBool,
    drained: Notify,
}

impl Admission {
    fn enter(&self) -> Result<(), DbError> {
        // Increment before reading the flag: a concurrent close either sees
        // this operation in the counter or this operation sees the flag.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            self.leave();
            return Err(DbError::StoreClosed);
        }
        Ok(())
    }

    fn leave(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    async fn wait_drained(&self) {
        loop {
            let mut notified = pin!(self.drained.notified());
            notified.as_mut().enable();

            let remaining = self.in_flight.load(Ordering::SeqCst);
            if remaining == 0 {
                return;
            }
            debug!(in_flight = remaining, "Waiting for active operations to finish");
            notified.await;
        }
    }
}

struct Inner<C: Connection> {
    db: RwLock<Option<Surreal<C>>>,
    admission: Admission,
}

/// Shared handle to a SurrealDB connection.
///
/// Every query must run inside an [`OperationGuard`] obtained from
/// [`begin_operation`](Self::begin_operation). [`close`](Self::close)
/// stops admitting new operations and waits for admitted ones to finish
/// before releasing the connection.
pub struct StoreClient<C: Connection> {
    inner: Arc<Inner<C>>,
}

impl<C: Connection> Clone for StoreClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl StoreClient<Any> {
    /// Connect to the configured endpoint, retrying with exponential
    /// backoff.
    ///
    /// Each attempt connects, signs in (when credentials are set),
    /// selects the namespace and database, and pings the server. A
    /// failed attempt is discarded entirely before the next one starts.
    pub async fn open(config: &StoreConfig) -> Result<Self, DbError> {
        let max_attempts = config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            match connect_once(config).await {
                Ok(db) => {
                    info!(
                        endpoint = %config.endpoint,
                        attempt = attempt + 1,
                        "Successfully connected to SurrealDB"
                    );
                    return Ok(Self::from_surreal(db));
                }
                Err(e) => {
                    error!(
                        endpoint = %config.endpoint,
                        attempt = attempt + 1,
                        max_attempts,
                        error = %e,
                        "Failed to connect to SurrealDB"
                    );
                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(backoff_delay(config.retry_base_delay, attempt)).await;
                    }
                }
            }
        }

        error!(
            endpoint = %config.endpoint,
            max_attempts,
            "Failed to establish a connection after maximum attempts"
        );
        Err(DbError::ConnectionEstablishmentFailed {
            attempts: max_attempts,
        })
    }
}

async fn connect_once(config: &StoreConfig) -> Result<Surreal<Any>, surrealdb::Error> {
    info!(
        endpoint = %config.endpoint,
        namespace = %config.namespace,
        database = %config.database,
        "Connecting to SurrealDB"
    );

    let db = any::connect(config.endpoint.as_str()).await?;

    if let Some(credentials) = &config.credentials {
        db.signin(Root {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
        .await?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await?;

    let version = db.version().await?;
    debug!(?version, "SurrealDB ping succeeded");

    Ok(db)
}

/// `base * 2^attempt`, saturating.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}

impl<C: Connection> StoreClient<C> {
    /// Wrap an already connected SurrealDB handle.
    pub fn from_surreal(db: Surreal<C>) -> Self {
        Self {
            inner: Arc::new(Inner {
                db: RwLock::new(Some(db)),
                admission: Admission::default(),
            }),
        }
    }

    /// Admit one operation.
    ///
    /// Fails with [`DbError::StoreClosed`] once [`close`](Self::close) has
    /// started. Dropping the returned guard ends the operation.
    pub fn begin_operation(&self) -> Result<OperationGuard<C>, DbError> {
        if let Err(e) = self.inner.admission.enter() {
            warn!("Attempted operation on a closed store");
            return Err(e);
        }

        // The connection is only released after the counter drains, so an
        // admitted operation always finds it in place.
        let db = self
            .inner
            .db
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match db {
            Some(db) => {
                let guard = OperationGuard {
                    db,
                    inner: Arc::clone(&self.inner),
                };
                debug!(active_operations = self.in_flight(), "Operation started");
                Ok(guard)
            }
            None => {
                self.inner.admission.leave();
                Err(DbError::StoreClosed)
            }
        }
    }

    /// Stop admitting operations, wait for in-flight ones, then release
    /// the connection.
    ///
    /// Only the first call does any work; later calls return immediately.
    pub async fn close(&self) {
        let admission = &self.inner.admission;
        if admission
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Attempted to close a store that was already closed");
            return;
        }

        info!(
            active_operations = self.in_flight(),
            "Closing store, draining active operations"
        );
        admission.wait_drained().await;

        let released = self
            .inner
            .db
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(released);

        info!("Store closed");
    }

    /// Number of operations currently admitted.
    pub fn in_flight(&self) -> usize {
        self.inner.admission.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.admission.closed.load(Ordering::SeqCst)
    }
}

/// An admitted store operation.
///
/// Holds its own handle to the connection and decrements the in-flight
/// counter when dropped, on every exit path.
pub struct OperationGuard<C: Connection> {
    db: Surreal<C>,
    inner: Arc<Inner<C>>,
}

impl<C: Connection> OperationGuard<C> {
    /// The SurrealDB client for queries inside this operation.
    pub fn client(&self) -> &Surreal<C> {
        &self.db
    }
}

impl<C: Connection> Drop for OperationGuard<C> {
    fn drop(&mut self) {
        self.inner.admission.leave();
        debug!(
            active_operations = self.inner.admission.in_flight.load(Ordering::SeqCst),
            "Operation ended"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surrealdb::engine::local::{Db, Mem};

    async fn mem_client() -> StoreClient<Db> {
        let db = Surreal::new::<Mem>(()).await.unwrap();
        db.use_ns("test").use_db("test").await.unwrap();
        StoreClient::from_surreal(db)
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
    }

    #[test]
    fn backoff_saturates() {
        let delay = backoff_delay(Duration::from_secs(2), 64);
        assert!(delay >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn guard_tracks_in_flight() {
        let store = mem_client().await;
        assert_eq!(store.in_flight(), 0);

        let a = store.begin_operation().unwrap();
        let b = store.begin_operation().unwrap();
        assert_eq!(store.in_flight(), 2);

        drop(a);
        assert_eq!(store.in_flight(), 1);
        drop(b);
        assert_eq!(store.in_flight(), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let store = mem_client().await;
        store.close().await;
        store.close().await;
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn begin_after_close_is_rejected() {
        let store = mem_client().await;
        store.close().await;

        let err = store.begin_operation().err().unwrap();
        assert!(matches!(err, DbError::StoreClosed));
        assert_eq!(store.in_flight(), 0);
    }

    #[tokio::test]
    async fn close_waits_for_admitted_operations() {
        let store = mem_client().await;
        let guard = store.begin_operation().unwrap();

        let closer = tokio::spawn({
            let store = store.clone();
            async move { store.close().await }
        });

        // Give the closer time to set the flag and start waiting.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_closed());
        assert!(!closer.is_finished());
        assert!(matches!(
            store.begin_operation().err(),
            Some(DbError::StoreClosed)
        ));

        // The admitted operation can still use the connection.
        guard.client().query("RETURN 1").await.unwrap();
        drop(guard);

        tokio::time::timeout(Duration::from_secs(5), closer)
            .await
            .expect("close should finish once drained")
            .unwrap();
        assert_eq!(store.in_flight(), 0);
    }

    #[tokio::test]
    async fn open_embedded_endpoint() {
        let config = StoreConfig {
            endpoint: "mem://".into(),
            credentials: None,
            max_attempts: 1,
            ..Default::default()
        };
        let store = StoreClient::open(&config).await.unwrap();
        let op = store.begin_operation().unwrap();
        op.client().query("RETURN 1").await.unwrap();
    }

    #[tokio::test]
    async fn open_gives_up_after_max_attempts() {
        let config = StoreConfig {
            endpoint: "nonexistent://nowhere".into(),
            credentials: None,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let err = StoreClient::open(&config).await.err().unwrap();
        assert!(matches!(
            err,
            DbError::ConnectionEstablishmentFailed { attempts: 3 }
        ));
    }
}
