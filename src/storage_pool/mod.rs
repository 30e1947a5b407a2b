//! StoragePool - Bounded SQLite Connection Pool
//!
//! ## Responsibilities
//!
//! - Keep a fixed set of reusable SQLite connections warm
//! - Lend each connection to at most one caller at a time
//! - Open temporary overflow connections instead of blocking callers
//!   indefinitely when the pool is exhausted
//! - Return released connections to the pool, closing extras above
//!   capacity
//!
//! sqlx ships its own pool, but it fails acquisition at the timeout;
//! ingestion here must degrade to an extra connection instead, so the
//! pool is managed by hand on top of raw [`SqliteConnection`]s.

use crate::error::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{ConnectOptions, SqliteConnection};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// StoragePool configuration
#[derive(Debug, Clone)]
pub struct StoragePoolConfig {
    /// SQLite database file (created on first open)
    pub database_path: PathBuf,
    /// Number of connections kept warm
    pub capacity: usize,
    /// How long acquire waits for a pooled connection before opening
    /// an overflow connection
    pub acquire_timeout: Duration,
}

impl Default for StoragePoolConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("detections.db"),
            capacity: 4,
            acquire_timeout: Duration::from_millis(500),
        }
    }
}

/// A pooled connection with its lending tag.
struct Handle {
    id: u64,
    conn: SqliteConnection,
}

struct PoolInner {
    idle: Mutex<Vec<Handle>>,
    /// Signalled on every release so a waiting acquire can retry
    released: Notify,
    capacity: usize,
    acquire_timeout: Duration,
    connect_options: SqliteConnectOptions,
    next_handle_id: AtomicU64,
}

impl PoolInner {
    fn lock_idle(&self) -> MutexGuard<'_, Vec<Handle>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pop_idle(&self) -> Option<Handle> {
        self.lock_idle().pop()
    }

    async fn open_handle(&self) -> Result<Handle> {
        let conn = self
            .connect_options
            .connect()
            .await
            .map_err(|e| Error::Pool(e.to_string()))?;
        let id = self.next_handle_id.fetch_add(1, Ordering::Relaxed);
        Ok(Handle { id, conn })
    }
}

/// Shared pool handle. Cloning is cheap and all clones lend from the
/// same set of connections.
#[derive(Clone)]
pub struct StoragePool {
    inner: Arc<PoolInner>,
}

impl StoragePool {
    /// Open the database and fill the pool to capacity.
    ///
    /// Every pooled connection is opened up front so the first requests
    /// never pay connection setup latency.
    pub async fn connect(config: StoragePoolConfig) -> Result<Self> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let inner = Arc::new(PoolInner {
            idle: Mutex::new(Vec::with_capacity(config.capacity)),
            released: Notify::new(),
            capacity: config.capacity,
            acquire_timeout: config.acquire_timeout,
            connect_options,
            next_handle_id: AtomicU64::new(1),
        });

        for _ in 0..config.capacity {
            let handle = inner.open_handle().await?;
            inner.lock_idle().push(handle);
        }

        tracing::info!(
            path = %config.database_path.display(),
            capacity = config.capacity,
            "Storage pool ready"
        );

        Ok(Self { inner })
    }

    /// Acquire a connection, waiting up to the configured timeout for a
    /// pooled one.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.acquire_timeout(self.inner.acquire_timeout).await
    }

    /// Acquire a connection, waiting up to `timeout` for a pooled one.
    ///
    /// When every pooled connection stays busy for the whole wait, a
    /// fresh overflow connection is opened instead of failing the
    /// caller. Only a failed open is an error, and it is fatal to the
    /// calling operation.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(handle) = self.inner.pop_idle() {
                return Ok(PooledConnection::new(handle, Arc::clone(&self.inner)));
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            // Wait for a release, bounded by the remaining budget. A
            // release that raced ahead of this wait left a stored
            // permit, so the wakeup is not lost.
            if tokio::time::timeout(deadline - now, self.inner.released.notified())
                .await
                .is_err()
            {
                break;
            }
        }

        let handle = self.inner.open_handle().await?;
        tracing::debug!(handle_id = handle.id, "Pool exhausted, opened overflow connection");
        Ok(PooledConnection::new(handle, Arc::clone(&self.inner)))
    }

    /// Configured pool capacity
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Connections currently parked in the pool
    pub fn idle_count(&self) -> usize {
        self.inner.lock_idle().len()
    }
}

/// RAII guard for a lent connection.
///
/// Dereferences to [`SqliteConnection`] for query execution. Dropping
/// the guard returns the connection to the pool, or closes it when the
/// pool is already at capacity, so every exit path releases.
pub struct PooledConnection {
    handle: Option<Handle>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    fn new(handle: Handle, pool: Arc<PoolInner>) -> Self {
        Self {
            handle: Some(handle),
            pool,
        }
    }

    /// Stable tag of the underlying connection, for logging and for
    /// verifying lending behavior
    pub fn handle_id(&self) -> u64 {
        match &self.handle {
            Some(handle) => handle.id,
            None => 0,
        }
    }
}

impl Deref for PooledConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        match &self.handle {
            Some(handle) => &handle.conn,
            // The handle is only vacated in drop
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.handle {
            Some(handle) => &mut handle.conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return,
        };

        let mut idle = self.pool.lock_idle();
        if idle.len() < self.pool.capacity {
            idle.push(handle);
            drop(idle);
            self.pool.released.notify_one();
        } else {
            drop(idle);
            // Above capacity: let the connection close. sqlx tears the
            // sqlite handle down on drop.
            tracing::trace!(handle_id = handle.id, "Closed overflow connection");
            drop(handle);
        }
    }
}
