//! In-memory pool for tests
//!
//! Records every statement it is asked to run and counts leases, so
//! tests can check that each request acquires and releases exactly one
//! connection. Capacity is enforced with a semaphore like a real pool.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use sqlgate_core::{Method, ParamValue};

use super::pool::{
    ConnectionPool, DriverError, NamedRows, PoolError, PoolStats, PooledConnection,
    PositionalRows, DEFAULT_ACQUIRE_TIMEOUT,
};

/// A statement as the mock pool received it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
    pub sql: String,
    pub params: Vec<ParamValue>,
    pub method: Method,
}

/// Scripted result for the next statement.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Error(DriverError),
}

impl MockResponse {
    pub fn rows(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self::Rows {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(DriverError::new(message))
    }
}

#[derive(Default)]
struct MockState {
    acquired: AtomicUsize,
    released: AtomicUsize,
    in_use: AtomicUsize,
    peak_in_use: AtomicUsize,
    executed: Mutex<Vec<ExecutedQuery>>,
    responses: Mutex<VecDeque<MockResponse>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock connection pool for testing
#[derive(Clone)]
pub struct MockPool {
    permits: Arc<Semaphore>,
    max: u32,
    acquire_timeout: Duration,
    latency: Option<Duration>,
    state: Arc<MockState>,
}

impl MockPool {
    pub fn new(max_connections: u32) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_connections as usize)),
            max: max_connections,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            latency: None,
            state: Arc::new(MockState::default()),
        }
    }

    /// Simulated round-trip time for every statement
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Add a response to return for the next statement.
    /// With none queued, statements return no rows.
    pub fn push_response(&self, response: MockResponse) {
        lock(&self.state.responses).push_back(response);
    }

    pub fn executed(&self) -> Vec<ExecutedQuery> {
        lock(&self.state.executed).clone()
    }

    pub fn acquired(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous leases seen so far
    pub fn peak_in_use(&self) -> usize {
        self.state.peak_in_use.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionPool for MockPool {
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>, PoolError> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| PoolError::Timeout)?
            .map_err(|_| PoolError::Closed)?;

        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        let in_use = self.state.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_in_use.fetch_max(in_use, Ordering::SeqCst);

        Ok(Box::new(MockConnection {
            _permit: permit,
            latency: self.latency,
            state: Arc::clone(&self.state),
        }))
    }

    fn stats(&self) -> PoolStats {
        let in_use = self.state.in_use.load(Ordering::SeqCst) as u32;
        PoolStats {
            size: self.max,
            idle: self.max.saturating_sub(in_use),
            max: self.max,
        }
    }

    async fn close(&self) {
        self.permits.close();
    }
}

struct MockConnection {
    _permit: OwnedSemaphorePermit,
    latency: Option<Duration>,
    state: Arc<MockState>,
}

impl MockConnection {
    async fn run(
        &mut self,
        sql: &str,
        params: &[ParamValue],
        method: Method,
    ) -> Result<(Vec<String>, Vec<Vec<Value>>), DriverError> {
        lock(&self.state.executed).push(ExecutedQuery {
            sql: sql.to_string(),
            params: params.to_vec(),
            method,
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let response = lock(&self.state.responses).pop_front();
        match response {
            Some(MockResponse::Rows { columns, rows }) => Ok((columns, rows)),
            Some(MockResponse::Error(e)) => Err(e),
            None => Ok((Vec::new(), Vec::new())),
        }
    }
}

#[async_trait]
impl PooledConnection for MockConnection {
    async fn fetch_positional(
        &mut self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<PositionalRows, DriverError> {
        let (_, rows) = self.run(sql, params, Method::All).await?;
        Ok(rows)
    }

    async fn fetch_named(
        &mut self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<NamedRows, DriverError> {
        let (columns, rows) = self.run(sql, params, Method::Execute).await?;
        Ok(rows
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect::<Map<String, Value>>())
            .collect())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.in_use.fetch_sub(1, Ordering::SeqCst);
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn lease_drop_is_counted() {
        let pool = MockPool::new(2);
        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.acquired(), 1);
        assert_eq!(pool.released(), 0);
        assert_eq!(pool.stats().idle, 1);

        drop(conn);
        assert_eq!(pool.released(), 1);
        assert_eq!(pool.stats().idle, 2);
    }

    #[tokio::test]
    async fn named_rows_follow_column_order() {
        let pool = MockPool::new(1);
        pool.push_response(MockResponse::rows(&["b", "a"], vec![vec![json!(1), json!(2)]]));

        let mut conn = pool.acquire().await.unwrap();
        let rows = conn.fetch_named("SELECT 1 AS b, 2 AS a", &[]).await.unwrap();
        let keys: Vec<_> = rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let pool = MockPool::new(1).with_acquire_timeout(Duration::from_millis(10));
        let _held = pool.acquire().await.unwrap();

        let result = pool.acquire().await;
        assert!(matches!(result, Err(PoolError::Timeout)));
    }

    #[tokio::test]
    async fn closed_pool_refuses_leases() {
        let pool = MockPool::new(1);
        pool.close().await;

        let result = pool.acquire().await;
        assert!(matches!(result, Err(PoolError::Closed)));
    }
}
