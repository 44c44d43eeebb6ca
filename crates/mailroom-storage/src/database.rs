// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes from one process are serialized through tokio-rusqlite's single
//! background thread. Do NOT create additional Connection instances for writes.
//! Other processes (an overlapping `mailroom tick`, the tracking server) open
//! their own handle; WAL plus `busy_timeout` lets them share the file.

use std::path::Path;

use mailroom_config::StorageConfig;
use mailroom_core::{HealthStatus, MailroomError};
use tracing::debug;

/// Handle to the Mailroom SQLite database.
///
/// Cheap to clone: clones share the same background connection thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` with default settings.
    pub async fn open(path: &str) -> Result<Self, MailroomError> {
        Self::open_with_config(&StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        })
        .await
    }

    /// Open the database described by `config`, apply PRAGMAs, and run
    /// pending migrations.
    pub async fn open_with_config(config: &StorageConfig) -> Result<Self, MailroomError> {
        let path = config.database_path.clone();
        if let Some(parent) = Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| MailroomError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(|e| MailroomError::Storage {
                source: Box::new(e),
            })?;

        let wal_mode = config.wal_mode;
        let busy_timeout_ms = config.busy_timeout_ms;
        conn.call(move |conn| {
            conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))?;
            if wal_mode {
                // journal_mode returns the resulting mode as a row.
                conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
            }
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA synchronous = NORMAL;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| crate::migrations::run_migrations(conn))
            .await
            .map_err(|e| MailroomError::Storage {
                source: e.to_string().into(),
            })?;

        debug!(path = %path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Probe the database with a trivial query.
    pub async fn health_check(&self) -> HealthStatus {
        let probe = self
            .conn
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT 1", [], |row| row.get(0))
            })
            .await;
        match probe {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(format!("database probe failed: {e}")),
        }
    }

    /// Run `PRAGMA integrity_check`. An intact database yields `["ok"]`.
    pub async fn integrity_check(&self) -> Result<Vec<String>, MailroomError> {
        self.conn
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare("PRAGMA integrity_check")?;
                stmt.query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), MailroomError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(|e| MailroomError::Storage {
            source: e.to_string().into(),
        })?;
        debug!("database closed");
        Ok(())
    }
}

/// Convert a tokio-rusqlite error into [`MailroomError::Storage`].
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> MailroomError {
    MailroomError::Storage {
        source: Box::new(e),
    }
}
