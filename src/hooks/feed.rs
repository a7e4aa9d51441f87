use super::queries::Queries;
use crate::cache::{CacheKey, NotReady, Subscription};
use crate::core::{Page, Result, Transaction, TransactionQuery};
use std::sync::Mutex;
use tracing::{Level, event};

/// The transaction page currently on screen.
///
/// Switching to another query cancels the fetch of the query it replaces, so
/// a slow response for an abandoned page can never land in the cache. The
/// shown page stays subscribed and is refetched after mutations invalidate it.
pub struct TransactionFeed {
    queries: Queries,
    current: Mutex<Option<(TransactionQuery, Subscription)>>,
}

impl TransactionFeed {
    pub fn new(queries: Queries) -> Self {
        Self {
            queries,
            current: Mutex::new(None),
        }
    }

    pub fn query(&self) -> Option<TransactionQuery> {
        self.lock()
            .as_ref()
            .map(|(query, _)| query.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<(TransactionQuery, Subscription)>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `query` the displayed one and load it.
    pub async fn show(&self, query: TransactionQuery) -> Result<Page<Transaction>> {
        let key = CacheKey::transactions(&query);
        let previous = {
            let mut current = self.lock();
            let unchanged = current
                .as_ref()
                .is_some_and(|(_, subscription)| subscription.key() == &key);
            if unchanged {
                None
            } else {
                let subscription = self.queries.subscribe(&key);
                current.replace((query.clone(), subscription))
            }
        };

        if let Some((_, superseded)) = previous {
            if self.queries.cache().cancel(superseded.key()) {
                event!(Level::DEBUG, key = %superseded.key(), "cancelled superseded page");
            }
        }

        self.queries.transactions(&query).await
    }

    pub fn peek(&self) -> std::result::Result<Page<Transaction>, NotReady> {
        match self.query() {
            Some(query) => self.queries.peek_transactions(&query),
            None => Err(NotReady::Idle),
        }
    }
}
