//! Query dispatcher
//!
//! Validates a [`QueryRequest`], borrows one connection, runs the
//! statement in the requested mode and gives the connection back before
//! the outcome is returned. There is no retry.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use sqlgate_core::{Method, QueryRequest, ValidationError};

use crate::db::{ConnectionPool, DriverError, NamedRows, PoolError, PositionalRows};

/// Rows produced by a successful query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    /// `all`: positional arrays
    Rows(PositionalRows),
    /// `execute`: column-name keyed objects
    Records(NamedRows),
}

impl QueryOutcome {
    pub fn len(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Records(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Rejected before a connection was acquired
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No connection could be acquired
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The database failed the statement
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Runs query requests against a shared pool.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<dyn ConnectionPool>,
}

impl Dispatcher {
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    #[tracing::instrument(name = "dispatch", skip_all, fields(method = %request.method))]
    pub async fn dispatch(&self, request: &QueryRequest) -> Result<QueryOutcome, DispatchError> {
        // Validate before acquiring so bad requests never hold a connection
        let method = request.method()?;
        let sql = request.sanitized_sql()?;
        debug!(sql = %sql, params = request.params.len(), "dispatching query");

        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!(error = %e, "failed to acquire connection");
            e
        })?;
        trace!("connection acquired");

        let result = match method {
            Method::All => conn
                .fetch_positional(&sql, &request.params)
                .await
                .map(QueryOutcome::Rows),
            Method::Execute => conn
                .fetch_named(&sql, &request.params)
                .await
                .map(QueryOutcome::Records),
        };

        // Released on every path, including a dropped future
        drop(conn);
        trace!("connection released");

        match result {
            Ok(outcome) => {
                debug!(rows = outcome.len(), "query succeeded");
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, code = ?e.code, "query failed");
                Err(e.into())
            }
        }
    }
}
