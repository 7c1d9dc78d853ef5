// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job repository: versioned workflow definitions with soft delete.

use crate::rows::{job_from_row, to_json};
use crate::{map_insert_err, Store, StoreError};
use oc_core::{Job, JobId};

impl Store {
    /// Insert a new job. Fails with a conflict when an active job already
    /// holds the name.
    pub async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let definition = to_json(&job.definition, "job.definition")?;
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO jobs (id, name, version, description, definition, is_active, \
             created_by, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(job.id.as_str())
        .bind(&job.name)
        .bind(job.version as i64)
        .bind(&job.description)
        .bind(&definition)
        .bind(job.is_active)
        .bind(&job.created_by)
        .bind(job.created_at_ms as i64)
        .bind(job.updated_at_ms as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_err(e, &format!("job name {:?} already active", job.name)))?;

        sqlx::query(
            "INSERT INTO job_versions (job_id, version, definition, saved_at_ms) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(job.id.as_str())
        .bind(job.version as i64)
        .bind(&definition)
        .bind(job.created_at_ms as i64)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Update a job's definition (and optionally name/description),
    /// bumping the version and retaining the prior one. Active runs are
    /// unaffected: their steps were snapshotted at materialization.
    pub async fn update_job(
        &self,
        id: &JobId,
        name: Option<&str>,
        description: Option<&str>,
        definition: &serde_json::Value,
        now_ms: u64,
    ) -> Result<Job, StoreError> {
        let mut tx = self.pool().begin().await?;
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("job {}", id)))?;
        let mut job = job_from_row(&row)?;

        job.version += 1;
        if let Some(name) = name {
            job.name = name.to_string();
        }
        if let Some(description) = description {
            job.description = Some(description.to_string());
        }
        job.definition = definition.clone();
        job.updated_at_ms = now_ms;

        let definition_json = to_json(&job.definition, "job.definition")?;
        sqlx::query(
            "UPDATE jobs SET name = ?2, version = ?3, description = ?4, definition = ?5, \
             updated_at_ms = ?6 WHERE id = ?1",
        )
        .bind(id.as_str())
        .bind(&job.name)
        .bind(job.version as i64)
        .bind(&job.description)
        .bind(&definition_json)
        .bind(now_ms as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_err(e, &format!("job name {:?} already active", job.name)))?;

        sqlx::query(
            "INSERT INTO job_versions (job_id, version, definition, saved_at_ms) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(id.as_str())
        .bind(job.version as i64)
        .bind(&definition_json)
        .bind(now_ms as i64)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(job)
    }

    /// Soft delete: clears is_active, freeing the name for reuse.
    pub async fn delete_job(&self, id: &JobId, now_ms: u64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE jobs SET is_active = 0, updated_at_ms = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(now_ms as i64)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("job {}", id)));
        }
        Ok(())
    }

    pub async fn get_job(&self, id: &JobId) -> Result<Job, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("job {}", id)))?;
        job_from_row(&row)
    }

    pub async fn get_active_job_by_name(&self, name: &str) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE name = ?1 AND is_active = 1")
            .bind(name)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// Active jobs, name-ordered (the export set).
    pub async fn list_active_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE is_active = 1 ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Retained definition history for a job, oldest first.
    pub async fn job_versions(&self, id: &JobId) -> Result<Vec<(u32, serde_json::Value)>, StoreError> {
        let rows = sqlx::query(
            "SELECT version, definition FROM job_versions WHERE job_id = ?1 ORDER BY version",
        )
        .bind(id.as_str())
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| {
                use sqlx::Row as _;
                let version = row.try_get::<i64, _>("version")? as u32;
                let raw: String = row.try_get("definition")?;
                let definition = serde_json::from_str(&raw)
                    .map_err(|e| crate::rows::corrupt("job_versions.definition", e))?;
                Ok((version, definition))
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
