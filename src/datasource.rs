//! Data sources (§4.7): acquiring and releasing pooled connections across
//! the supported dialects.
//!
//! Grounded on the teacher's per-dialect `dbms/{postgres,mysql,mssql}/inner.rs`
//! connection lifecycle, generalized from "one connection owned by one PHP
//! object" to "a pool handed out to whichever session asks."

use std::sync::Arc;

use sqlx_oldapi::any::{AnyKind, AnyPool, AnyPoolOptions};

use crate::error::{Error, Result};

/// A pool plus the dialect it was built for, so the executor layer can
/// choose placeholder syntax (`$1` vs `?` vs `@p1`) without re-sniffing the
/// connection string on every call.
pub struct DataSource {
    pool: AnyPool,
    kind: AnyKind,
}

impl DataSource {
    /// # Errors
    /// Returns [`Error::Configuration`] if `url` cannot be parsed or the
    /// pool fails to establish its initial connection.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| Error::configuration("database_url", e.to_string()))?;
        let kind = pool.any_kind();
        Ok(Self { pool, kind })
    }

    #[must_use]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    #[must_use]
    pub fn kind(&self) -> AnyKind {
        self.kind
    }

    /// Acquires one connection from the pool, surfacing pool exhaustion as a
    /// retryable [`Error::Executor`] rather than panicking (§4.7).
    ///
    /// # Errors
    /// Returns [`Error::Executor`] if no connection becomes available
    /// before the pool's own acquire timeout elapses.
    pub async fn acquire(&self) -> Result<sqlx_oldapi::pool::PoolConnection<sqlx_oldapi::Any>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| Error::executor(format!("failed to acquire a connection: {e}")))
    }
}

/// Builds transactions against a shared [`DataSource`] (§4.6's executor
/// layering): separated out so `Session`/`Transaction` don't need to know
/// how connections are sourced.
#[derive(Clone)]
pub struct TransactionFactory {
    data_source: Arc<DataSource>,
}

impl TransactionFactory {
    #[must_use]
    pub fn new(data_source: Arc<DataSource>) -> Self {
        Self { data_source }
    }

    #[must_use]
    pub fn data_source(&self) -> &Arc<DataSource> {
        &self.data_source
    }
}
