//! Shared service context and transaction retry policy.

use std::future::Future;
use std::sync::Arc;

use volunteerhub_core::error::DatabaseError;
use volunteerhub_core::{AggregateStore, CoreConfig, Error, Result};

/// Everything a service function needs: the store and the configuration.
///
/// Services themselves are stateless free functions; this is the only thing
/// threaded through them.
pub struct ServiceContext<S> {
    store: Arc<S>,
    config: CoreConfig,
}

impl<S: AggregateStore> ServiceContext<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, CoreConfig::default())
    }

    pub fn with_config(store: S, config: CoreConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }
}

impl<S> Clone for ServiceContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

/// Run a transactional operation, retrying on transient store errors up to
/// the configured bound. Anything else surfaces on the first attempt.
pub(crate) async fn with_tx_retry<T, F, Fut>(
    config: &CoreConfig,
    op: &'static str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_transaction_retries => {
                attempt += 1;
                tracing::warn!(op, attempt, error = %err, "retrying transaction after transient store error");
            }
            Err(err) => return Err(err),
        }
    }
}

/// Map a unique-constraint violation to a domain `Conflict`, leaving every
/// other error untouched. Used where a pre-check can race a concurrent
/// insert.
pub(crate) fn constraint_to_conflict(err: Error, message: &str) -> Error {
    match err {
        Error::Database(DatabaseError::Constraint(_)) => Error::conflict(message),
        other => other,
    }
}
