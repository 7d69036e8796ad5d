//! Service layer orchestrating database mutations with audit and outbox.
//!
//! `KpxService` wraps `KpxDb` (raw database access). All repo methods are
//! implemented as `impl KpxService` in [`crate::repos`].

use tokio::sync::{Mutex, MutexGuard};

use crate::KpxDb;
use crate::error::DatabaseError;

/// Orchestrates database mutations with the audit trail and event outbox.
///
/// Every mutation method follows this protocol:
/// 1. Take the write gate
/// 2. Begin transaction
/// 3. Execute SQL (status changes are conditional on the expected old status)
/// 4. Append audit entry and outbox events (inside transaction)
/// 5. Commit, or roll back on any error
///
/// The gate serializes writers on the single shared connection so that one
/// request's transaction never picks up another request's statements.
pub struct KpxService {
    db: KpxDb,
    write_gate: Mutex<()>,
}

impl KpxService {
    /// Create a new service wrapping a local database.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the libSQL database file, or `":memory:"` for tests.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new_local(db_path: &str) -> Result<Self, DatabaseError> {
        let db = KpxDb::open_local(db_path).await?;
        Ok(Self::from_db(db))
    }

    /// Create a service backed by a remote libSQL server.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the connection cannot be established.
    pub async fn new_remote(url: &str, auth_token: &str) -> Result<Self, DatabaseError> {
        let db = KpxDb::open_remote(url, auth_token).await?;
        Ok(Self::from_db(db))
    }

    /// Create from an existing `KpxDb`.
    #[must_use]
    pub fn from_db(db: KpxDb) -> Self {
        Self {
            db,
            write_gate: Mutex::new(()),
        }
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &KpxDb {
        &self.db
    }

    /// Wait for exclusive write access.
    pub(crate) async fn write_gate(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }

    /// Begin a transaction on the shared connection.
    ///
    /// Callers must hold the write gate.
    pub(crate) async fn begin(&self) -> Result<libsql::Transaction, DatabaseError> {
        Ok(self.db.conn().transaction().await?)
    }
}

/// Commit `tx` if `outcome` succeeded, roll it back otherwise.
///
/// # Errors
///
/// Returns the original error, or the commit error.
pub(crate) async fn finish<T>(
    tx: libsql::Transaction,
    outcome: Result<T, DatabaseError>,
) -> Result<T, DatabaseError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::error!("rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}
