use crate::api::ApiClient;
use crate::cache::{CacheKey, KeyFilter, NotReady, QueryCache, Subscription};
use crate::core::{
    Account, Action, Category, Condition, EntityId, Page, Result, Rule, Statement, Transaction,
    TransactionQuery,
};
use crate::mutation::change::find_in;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;

/// Read access to remote entities through the query cache.
///
/// Async readers return cached values while fresh and otherwise fetch once
/// for all concurrent callers. `peek_*` readers never fetch: they report
/// whether a value is available (`NotReady::Pending` while loading,
/// `NotReady::Failed` after an error). `find_*` helpers are derived from
/// cached data only.
#[derive(Clone)]
pub struct Queries {
    cache: Arc<QueryCache>,
    api: Arc<ApiClient>,
}

impl Queries {
    pub fn new(cache: Arc<QueryCache>, api: Arc<ApiClient>) -> Self {
        Self { cache, api }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    async fn load<T, F, Fut>(&self, key: CacheKey, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(Arc<ApiClient>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let api = self.api.clone();
        self.cache.read(key, move || fetch(api.clone())).await
    }

    // ------------------------------------------------------------------------
    // Accounts and categories
    // ------------------------------------------------------------------------

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.load(CacheKey::accounts(), |api| async move {
            api.list_accounts().await
        })
        .await
    }

    pub async fn account(&self, id: EntityId) -> Result<Account> {
        self.load(CacheKey::account(id), move |api| async move {
            api.get_account(id).await
        })
        .await
    }

    pub fn peek_accounts(&self) -> std::result::Result<Vec<Account>, NotReady> {
        self.cache.peek_as(&CacheKey::accounts())
    }

    pub fn find_account(&self, id: EntityId) -> Option<Account> {
        self.find_cached(&[CacheKey::accounts(), CacheKey::account(id)], id)
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        self.load(CacheKey::categories(), |api| async move {
            api.list_categories().await
        })
        .await
    }

    pub async fn category(&self, id: EntityId) -> Result<Category> {
        self.load(CacheKey::category(id), move |api| async move {
            api.get_category(id).await
        })
        .await
    }

    pub fn peek_categories(&self) -> std::result::Result<Vec<Category>, NotReady> {
        self.cache.peek_as(&CacheKey::categories())
    }

    pub fn find_category(&self, id: EntityId) -> Option<Category> {
        self.find_cached(&[CacheKey::categories(), CacheKey::category(id)], id)
    }

    /// Cached categories of `transaction`, in the transaction's order.
    /// Categories not (yet) cached are skipped.
    pub fn categories_of(&self, transaction: &Transaction) -> Vec<Category> {
        transaction
            .category_ids
            .iter()
            .filter_map(|id| self.find_category(*id))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------------

    /// One page of transactions. Every distinct query is its own cache entry.
    pub async fn transactions(&self, query: &TransactionQuery) -> Result<Page<Transaction>> {
        let owned = query.clone();
        self.load(CacheKey::transactions(query), move |api| {
            let query = owned.clone();
            async move { api.list_transactions(&query).await }
        })
        .await
    }

    pub fn peek_transactions(
        &self,
        query: &TransactionQuery,
    ) -> std::result::Result<Page<Transaction>, NotReady> {
        self.cache.peek_as(&CacheKey::transactions(query))
    }

    /// Search every cached transaction page.
    pub fn find_transaction(&self, id: EntityId) -> Option<Transaction> {
        let pages = self
            .cache
            .keys_matching(&KeyFilter::Prefix(CacheKey::transaction_lists()));
        self.find_cached(&pages, id)
    }

    // ------------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------------

    pub async fn rules(&self) -> Result<Vec<Rule>> {
        self.load(CacheKey::rules(), |api| async move { api.list_rules().await })
            .await
    }

    pub async fn rule(&self, id: EntityId) -> Result<Rule> {
        self.load(CacheKey::rule(id), move |api| async move {
            api.get_rule(id).await
        })
        .await
    }

    pub async fn rule_conditions(&self, id: EntityId) -> Result<Vec<Condition>> {
        self.load(CacheKey::rule_conditions(id), move |api| async move {
            api.get_rule_conditions(id).await
        })
        .await
    }

    pub async fn rule_actions(&self, id: EntityId) -> Result<Vec<Action>> {
        self.load(CacheKey::rule_actions(id), move |api| async move {
            api.get_rule_actions(id).await
        })
        .await
    }

    pub fn peek_rules(&self) -> std::result::Result<Vec<Rule>, NotReady> {
        self.cache.peek_as(&CacheKey::rules())
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    pub async fn statements(&self, page: u32, page_size: u32) -> Result<Page<Statement>> {
        self.load(CacheKey::statements(page, page_size), move |api| async move {
            api.list_statements(page, page_size).await
        })
        .await
    }

    pub async fn statement(&self, id: EntityId) -> Result<Statement> {
        self.load(CacheKey::statement(id), move |api| async move {
            api.get_statement(id).await
        })
        .await
    }

    pub fn peek_statements(
        &self,
        page: u32,
        page_size: u32,
    ) -> std::result::Result<Page<Statement>, NotReady> {
        self.cache.peek_as(&CacheKey::statements(page, page_size))
    }

    /// Keep `key` alive and refreshed after invalidations while the guard
    /// lives.
    pub fn subscribe(&self, key: &CacheKey) -> Subscription {
        self.cache.subscribe(key)
    }

    fn find_cached<T: DeserializeOwned>(&self, keys: &[CacheKey], id: EntityId) -> Option<T> {
        keys.iter()
            .filter_map(|key| self.cache.get_data(key))
            .find_map(|value| {
                find_in(&value, id).and_then(|found| serde_json::from_value(found.clone()).ok())
            })
    }
}
