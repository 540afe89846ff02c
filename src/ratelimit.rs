//! Per-identity rate limiting for run creation.
//!
//! A persisted counter per identity gates how many runs may be created in a
//! rolling window. The increment happens before any graph is invoked; a
//! request over the ceiling is rejected outright and the window rollover
//! resets the count.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

/// Persisted request counter for one identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCounter {
    pub identity: String,
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

/// Errors from the rate-limiting path.
#[derive(Debug, Error, Diagnostic)]
pub enum RateLimitError {
    /// The identity exhausted its request budget for the current window.
    #[error("rate limit exceeded for '{identity}': {count}/{ceiling} requests in window")]
    #[diagnostic(
        code(codeloom::ratelimit::exceeded),
        help("Wait for the window to roll over, or raise the ceiling.")
    )]
    Exceeded {
        identity: String,
        count: u32,
        ceiling: u32,
    },

    /// The backing store failed.
    #[error("rate counter store error: {0}")]
    #[diagnostic(code(codeloom::ratelimit::store))]
    Store(String),
}

/// Storage seam for rate counters.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Load the counter for an identity, if one exists.
    async fn load(&self, identity: &str) -> Result<Option<RateCounter>, RateLimitError>;
    /// Persist (insert or replace) a counter.
    async fn save(&self, counter: &RateCounter) -> Result<(), RateLimitError>;
}

/// Volatile store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryRateStore {
    counters: Mutex<FxHashMap<String, RateCounter>>,
}

impl InMemoryRateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateStore for InMemoryRateStore {
    async fn load(&self, identity: &str) -> Result<Option<RateCounter>, RateLimitError> {
        Ok(self
            .counters
            .lock()
            .map_err(|_| RateLimitError::Store("counter map poisoned".into()))?
            .get(identity)
            .cloned())
    }

    async fn save(&self, counter: &RateCounter) -> Result<(), RateLimitError> {
        self.counters
            .lock()
            .map_err(|_| RateLimitError::Store("counter map poisoned".into()))?
            .insert(counter.identity.clone(), counter.clone());
        Ok(())
    }
}

/// Gate applied at run creation.
pub struct RateLimiter {
    store: Box<dyn RateStore>,
    ceiling: u32,
    window: Duration,
}

impl RateLimiter {
    /// Default request ceiling per window.
    pub const DEFAULT_CEILING: u32 = 15;

    /// Creates a limiter over the given store.
    #[must_use]
    pub fn new(store: Box<dyn RateStore>, ceiling: u32, window: Duration) -> Self {
        Self {
            store,
            ceiling,
            window,
        }
    }

    /// A limiter with the default ceiling and a 24h window over an
    /// in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(InMemoryRateStore::new()),
            Self::DEFAULT_CEILING,
            Duration::hours(24),
        )
    }

    /// Increment the identity's counter, rejecting when the ceiling is
    /// exceeded within the current window. The counter resets when the
    /// window has rolled over.
    pub async fn check_and_increment(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<u32, RateLimitError> {
        let existing = self.store.load(identity).await?;

        let mut counter = match existing {
            Some(counter) if now - counter.window_start < self.window => counter,
            _ => RateCounter {
                identity: identity.to_string(),
                count: 0,
                window_start: now,
            },
        };

        if counter.count >= self.ceiling {
            return Err(RateLimitError::Exceeded {
                identity: identity.to_string(),
                count: counter.count,
                ceiling: self.ceiling,
            });
        }

        counter.count += 1;
        self.store.save(&counter).await?;
        Ok(counter.count)
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteRateStore;

#[cfg(feature = "sqlite")]
mod sqlite_store {
    use super::*;
    use sqlx::Row;
    use std::sync::Arc;

    /// Durable counter store sharing the checkpoint database.
    pub struct SqliteRateStore {
        pool: Arc<sqlx::SqlitePool>,
    }

    impl SqliteRateStore {
        #[must_use]
        pub fn new(pool: Arc<sqlx::SqlitePool>) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl RateStore for SqliteRateStore {
        async fn load(&self, identity: &str) -> Result<Option<RateCounter>, RateLimitError> {
            let row = sqlx::query(
                "SELECT identity, count, window_start FROM rate_counters WHERE identity = ?1",
            )
            .bind(identity)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| RateLimitError::Store(e.to_string()))?;

            Ok(row.map(|row| RateCounter {
                identity: row.get("identity"),
                count: row.get::<i64, _>("count") as u32,
                window_start: row.get("window_start"),
            }))
        }

        async fn save(&self, counter: &RateCounter) -> Result<(), RateLimitError> {
            sqlx::query(
                "INSERT INTO rate_counters (identity, count, window_start) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(identity) DO UPDATE SET count = excluded.count, \
                 window_start = excluded.window_start",
            )
            .bind(&counter.identity)
            .bind(counter.count as i64)
            .bind(counter.window_start)
            .execute(&*self.pool)
            .await
            .map_err(|e| RateLimitError::Store(e.to_string()))?;
            Ok(())
        }
    }
}
