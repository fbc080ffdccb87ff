//! Application state shared across handlers

use std::sync::Arc;
use std::time::Instant;

use crate::db::ConnectionPool;
use crate::dispatch::Dispatcher;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    dispatcher: Dispatcher,
    started_at: Instant,
}

impl AppState {
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                dispatcher: Dispatcher::new(pool),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        self.inner.dispatcher.pool()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}
