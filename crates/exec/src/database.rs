// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Database step driver: connects per step with the `Any` driver, runs
//! the rendered query under the step timeout, and reports row counts.

use crate::executor::{ExecFailure, StepContext, StepExecutor};
use async_trait::async_trait;
use oc_core::step::StepPayload;
use oc_core::StepOutcome;
use sqlx::any::AnyPoolOptions;
use std::sync::Once;
use std::time::Duration;

static INSTALL_DRIVERS: Once = Once::new();

pub struct DatabaseExecutor;

impl DatabaseExecutor {
    pub fn new() -> Self {
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
        Self
    }
}

impl Default for DatabaseExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepExecutor for DatabaseExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, ExecFailure> {
        let StepPayload::Database { connection_string, query, fetch_results } = &ctx.step.payload
        else {
            return Err(ExecFailure::validation("database executor got a non-database payload"));
        };
        if query.trim().is_empty() {
            return Err(ExecFailure::validation("database step has an empty query"));
        }

        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(ctx.step.timeout_secs.max(1).min(30)))
            .connect(connection_string)
            .await
            .map_err(|e| ExecFailure::transient(format!("database connect: {}", e)))?;

        let result = if *fetch_results {
            match sqlx::query(query).fetch_all(&pool).await {
                Ok(rows) => Ok(StepOutcome::succeeded(format!("{} rows", rows.len()))
                    .with_metric("rows_returned", rows.len() as u64)),
                Err(e) => Err(classify(e)),
            }
        } else {
            match sqlx::query(query).execute(&pool).await {
                Ok(done) => Ok(StepOutcome::succeeded(format!(
                    "{} rows affected",
                    done.rows_affected()
                ))
                .with_metric("rows_affected", done.rows_affected())),
                Err(e) => Err(classify(e)),
            }
        };
        pool.close().await;
        result
    }
}

/// SQL syntax and constraint errors are protocol failures; transport
/// errors are transient.
fn classify(error: sqlx::Error) -> ExecFailure {
    match &error {
        sqlx::Error::Database(_) => ExecFailure::protocol(format!("database query: {}", error)),
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => {
            ExecFailure::transient(format!("database: {}", error))
        }
        _ => ExecFailure::transient(format!("database: {}", error)),
    }
}
