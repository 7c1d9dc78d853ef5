// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oc-store: relational persistence for jobs, runs, steps, schedules, and
//! worker heartbeats.
//!
//! Backed by a single SQLite file in WAL mode. The dispatch-queue leasing
//! contract is realized as one atomic claim UPDATE; SQLite's
//! serialized writers give the same at-most-one-lease guarantee that
//! `SELECT … FOR UPDATE SKIP LOCKED` provides on a server database, and
//! the SQL is kept portable for that backend.

mod jobs;
mod rows;
mod runs;
mod schedules;
mod steps;
mod workers;

#[cfg(test)]
pub(crate) mod test_util;

pub use steps::{CancelOutcome, CompletionOutcome, LeasedStep, OrphanAction, OrphanReport};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Bounded pool default; min 2, max 20 is the typical range.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
/// Connection-acquisition timeout.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
/// Transient connect failures retry this many times with doubling delay.
const CONNECT_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("step already terminal")]
    AlreadyTerminal,
    #[error("lease mismatch")]
    LeaseMismatch,
    #[error("run already terminal")]
    RunTerminal,
    #[error("invalid stored data: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Integrity violations surface as validation-class conflicts; other
    /// database errors are operational and retryable.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Health probe result: `SELECT 1` with measured latency plus pool stats.
#[derive(Debug, Clone)]
pub struct StoreHealth {
    pub ok: bool,
    pub latency_ms: u64,
    pub pool_size: u32,
    pub idle_connections: usize,
}

/// Handle to the relational store. Cheap to clone; all clones share the
/// bounded connection pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the store at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(path, DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn open_with(path: &Path, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let mut attempt = 0;
        let pool = loop {
            let result = SqlitePoolOptions::new()
                .min_connections(2)
                .max_connections(max_connections)
                .acquire_timeout(DEFAULT_ACQUIRE_TIMEOUT)
                .connect_with(options.clone())
                .await;
            match result {
                Ok(pool) => break pool,
                Err(e) if attempt + 1 < CONNECT_ATTEMPTS => {
                    attempt += 1;
                    let delay = Duration::from_millis(100 * (1 << attempt));
                    tracing::warn!(error = %e, attempt, "store connect failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(path = %path.display(), max_connections, "store opened");
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// `SELECT 1` probe with latency, plus pool occupancy.
    pub async fn health(&self) -> StoreHealth {
        let start = std::time::Instant::now();
        let ok = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok();
        StoreHealth {
            ok,
            latency_ms: start.elapsed().as_millis() as u64,
            pool_size: self.pool.size(),
            idle_connections: self.pool.num_idle(),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Map a sqlx error, converting unique violations into conflicts.
pub(crate) fn map_insert_err(e: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict(what.to_string());
        }
    }
    StoreError::Db(e)
}
