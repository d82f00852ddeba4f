//! Transactions (§4.7): connection lifecycle and savepoint scoping for one
//! session's unit of work, in the two behaviors §4.7 names: Managed and
//! JDBC-style/PDO-style.
//!
//! Grounded on the teacher's `dbms/*/inner.rs` connection state machines,
//! which already track "open / in a transaction / closed" for a single
//! connection; generalized here into an explicit `TransactionState` enum
//! plus savepoint bookkeeping, which the teacher's PHP-facing API never
//! needed to expose directly.

use std::sync::atomic::{AtomicU64, Ordering};

use sqlx_oldapi::any::{Any, AnyConnection};
use sqlx_oldapi::pool::PoolConnection;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// Maps the integer enumeration a mapper config declares isolation level
    /// with (§4.7) onto a concrete level. Fails loudly on anything outside
    /// the known range rather than silently clamping.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `value` names no known level.
    pub fn from_ordinal(value: i64) -> Result<Self> {
        match value {
            0 => Ok(IsolationLevel::ReadUncommitted),
            1 => Ok(IsolationLevel::ReadCommitted),
            2 => Ok(IsolationLevel::RepeatableRead),
            3 => Ok(IsolationLevel::Serializable),
            other => Err(Error::configuration(
                "isolation_level",
                format!("{other} is not a known isolation level ordinal (0-3)"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Open,
    Closed,
}

/// The two behaviors a [`Transaction`] can be built with (§4.7). Both wrap a
/// single owned connection; they differ in when a database transaction is
/// opened and what `commit`/`rollback` do to it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Begins on construction if none is active; `commit`/`rollback` act on
    /// it and leave the connection outside any transaction afterwards.
    Managed,
    /// Honors an `autoCommit` flag. When `false`, a transaction is open on
    /// construction and re-opened after every `commit`/`rollback`, so the
    /// connection is always inside one between operations. When `true`,
    /// `commit`/`rollback` are no-ops.
    JdbcStyle { auto_commit: bool },
}

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A transaction wrapping one connection, behaving per its [`TransactionMode`]
/// (§4.7), with savepoint bookkeeping.
pub struct Transaction {
    connection: PoolConnection<Any>,
    state: TransactionState,
    mode: TransactionMode,
    /// Whether a `BEGIN` is currently outstanding on `connection`.
    in_transaction: bool,
    savepoints: Vec<String>,
}

impl Transaction {
    /// Acquires `connection` under `mode`, opening a database transaction
    /// immediately when the mode calls for it (§4.7: Managed always does;
    /// JDBC-style does unless `auto_commit` is set).
    ///
    /// # Errors
    /// Returns [`Error::Transaction`] if the initial `BEGIN` fails.
    pub async fn begin(connection: PoolConnection<Any>, mode: TransactionMode) -> Result<Self> {
        Self::begin_with_isolation(connection, mode, None).await
    }

    /// As [`Transaction::begin`], additionally setting `isolation` on the
    /// connection before any transaction is opened (§4.7: isolation level is
    /// set "before the first transaction begins").
    ///
    /// # Errors
    /// Returns [`Error::Transaction`] if setting the isolation level or the
    /// initial `BEGIN` fails.
    pub async fn begin_with_isolation(
        connection: PoolConnection<Any>,
        mode: TransactionMode,
        isolation: Option<IsolationLevel>,
    ) -> Result<Self> {
        let mut tx = Self {
            connection,
            state: TransactionState::Open,
            mode,
            in_transaction: false,
            savepoints: Vec::new(),
        };
        if let Some(level) = isolation {
            sqlx_oldapi::query(&format!(
                "SET TRANSACTION ISOLATION LEVEL {}",
                level.as_sql()
            ))
            .execute(&mut tx.connection)
            .await
            .map_err(|e| Error::transaction(format!("failed to set isolation level: {e}")))?;
        }
        let should_begin = match mode {
            TransactionMode::Managed => true,
            TransactionMode::JdbcStyle { auto_commit } => !auto_commit,
        };
        if should_begin {
            tx.begin_tx().await?;
        }
        Ok(tx)
    }

    async fn begin_tx(&mut self) -> Result<()> {
        sqlx_oldapi::query("BEGIN")
            .execute(&mut self.connection)
            .await
            .map_err(|e| Error::transaction(format!("begin failed: {e}")))?;
        self.in_transaction = true;
        Ok(())
    }

    #[must_use]
    pub fn connection_mut(&mut self) -> &mut AnyConnection {
        &mut *self.connection
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == TransactionState::Closed
    }

    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Commits the open transaction, if any. A no-op on a JDBC-style
    /// transaction with `auto_commit=true` (§4.7). A JDBC-style transaction
    /// with `auto_commit=false` re-begins immediately afterward so the
    /// connection is never outside a transaction between operations.
    ///
    /// # Errors
    /// Returns [`Error::Transaction`] if already closed, or if `COMMIT`/the
    /// subsequent re-`BEGIN` fails.
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if matches!(self.mode, TransactionMode::JdbcStyle { auto_commit: true }) {
            return Ok(());
        }
        if self.in_transaction {
            sqlx_oldapi::query("COMMIT")
                .execute(&mut self.connection)
                .await
                .map_err(|e| Error::transaction(format!("commit failed: {e}")))?;
            self.savepoints.clear();
            self.in_transaction = false;
        }
        if matches!(self.mode, TransactionMode::JdbcStyle { auto_commit: false }) {
            self.begin_tx().await?;
        }
        Ok(())
    }

    /// Rolls back the open transaction, if any. Mirrors [`Transaction::commit`]'s
    /// no-op/re-begin rules for the JDBC-style mode.
    ///
    /// # Errors
    /// Returns [`Error::Transaction`] if already closed, or if `ROLLBACK`/the
    /// subsequent re-`BEGIN` fails.
    pub async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        if matches!(self.mode, TransactionMode::JdbcStyle { auto_commit: true }) {
            return Ok(());
        }
        if self.in_transaction {
            sqlx_oldapi::query("ROLLBACK")
                .execute(&mut self.connection)
                .await
                .map_err(|e| Error::transaction(format!("rollback failed: {e}")))?;
            self.savepoints.clear();
            self.in_transaction = false;
        }
        if matches!(self.mode, TransactionMode::JdbcStyle { auto_commit: false }) {
            self.begin_tx().await?;
        }
        Ok(())
    }

    /// Idempotent close (§4.7): rolls back if a transaction is still active,
    /// then releases. Closing an already-closed transaction is a no-op, not
    /// an error, matching the teacher's connection-lifecycle tolerance for
    /// redundant shutdown calls.
    pub async fn close(&mut self) {
        if self.state == TransactionState::Closed {
            return;
        }
        if self.in_transaction {
            if let Err(e) = sqlx_oldapi::query("ROLLBACK")
                .execute(&mut self.connection)
                .await
            {
                log::warn!("rollback during transaction close failed, swallowing: {e}");
            }
            self.in_transaction = false;
            self.savepoints.clear();
        }
        self.state = TransactionState::Closed;
    }

    /// # Errors
    /// Returns [`Error::Transaction`] if the transaction is closed.
    pub async fn create_savepoint(&mut self) -> Result<String> {
        self.ensure_open()?;
        let id = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!("sp_{id}");
        sqlx_oldapi::query(&format!("SAVEPOINT {name}"))
            .execute(&mut self.connection)
            .await
            .map_err(|e| Error::transaction(format!("failed to create savepoint: {e}")))?;
        self.savepoints.push(name.clone());
        Ok(name)
    }

    /// # Errors
    /// Returns [`Error::Transaction`] with [`Error::unknown_savepoint`] if
    /// `name` was never created or has already been released/rolled back to
    /// and discarded.
    pub async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let pos = self
            .savepoints
            .iter()
            .position(|s| s == name)
            .ok_or_else(|| Error::unknown_savepoint(name))?;
        sqlx_oldapi::query(&format!("ROLLBACK TO SAVEPOINT {name}"))
            .execute(&mut self.connection)
            .await
            .map_err(|e| Error::transaction(format!("failed to roll back to savepoint: {e}")))?;
        // Savepoints created after this one are no longer reachable.
        self.savepoints.truncate(pos + 1);
        Ok(())
    }

    /// # Errors
    /// Returns [`Error::Transaction`] with [`Error::unknown_savepoint`] if
    /// `name` is not a currently-live savepoint.
    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let pos = self
            .savepoints
            .iter()
            .position(|s| s == name)
            .ok_or_else(|| Error::unknown_savepoint(name))?;
        sqlx_oldapi::query(&format!("RELEASE SAVEPOINT {name}"))
            .execute(&mut self.connection)
            .await
            .map_err(|e| Error::transaction(format!("failed to release savepoint: {e}")))?;
        self.savepoints.remove(pos);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == TransactionState::Closed {
            return Err(Error::transaction("transaction is already closed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_level_rejects_unknown_ordinals() {
        assert!(IsolationLevel::from_ordinal(1).is_ok());
        assert!(IsolationLevel::from_ordinal(99).is_err());
    }

    #[test]
    fn isolation_level_sql_text_matches_standard_names() {
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
        assert_eq!(
            IsolationLevel::from_ordinal(2).unwrap().as_sql(),
            "REPEATABLE READ"
        );
    }
}
