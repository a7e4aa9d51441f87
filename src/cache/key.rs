use crate::core::{Account, Category, Entity, EntityId, Rule, Statement, Transaction, TransactionQuery};
use std::fmt;

const LIST: &str = "list";
const DETAIL: &str = "detail";

/// Composite identifier of a cache entry: resource scope followed by
/// parameters, e.g. `transaction/list/{query}` or `account/detail/3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Resource the key belongs to (its first segment).
    pub fn scope(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }

    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Every key of one resource.
    pub fn resource(resource: &str) -> Self {
        Self::new([resource])
    }

    pub fn list_of<E: Entity>() -> Self {
        Self::new([E::RESOURCE, LIST])
    }

    pub fn detail_of<E: Entity>(id: EntityId) -> Self {
        Self::new([E::RESOURCE.to_string(), DETAIL.to_string(), id.to_string()])
    }

    pub fn is_list(&self) -> bool {
        self.0.get(1).map(String::as_str) == Some(LIST)
    }

    pub fn accounts() -> Self {
        Self::list_of::<Account>()
    }

    pub fn account(id: EntityId) -> Self {
        Self::detail_of::<Account>(id)
    }

    pub fn categories() -> Self {
        Self::list_of::<Category>()
    }

    pub fn category(id: EntityId) -> Self {
        Self::detail_of::<Category>(id)
    }

    /// Key of one transaction query. The query is embedded as JSON so the
    /// parameters can be recovered with [`CacheKey::transaction_query`].
    pub fn transactions(query: &TransactionQuery) -> Self {
        let encoded = serde_json::to_string(query).unwrap_or_default();
        Self::new([Transaction::RESOURCE.to_string(), LIST.to_string(), encoded])
    }

    /// Prefix matching every cached transaction page.
    pub fn transaction_lists() -> Self {
        Self::list_of::<Transaction>()
    }

    pub fn transaction_query(&self) -> Option<TransactionQuery> {
        if self.scope() != Transaction::RESOURCE || !self.is_list() {
            return None;
        }
        self.0
            .get(2)
            .and_then(|encoded| serde_json::from_str(encoded).ok())
    }

    pub fn rules() -> Self {
        Self::list_of::<Rule>()
    }

    pub fn rule(id: EntityId) -> Self {
        Self::detail_of::<Rule>(id)
    }

    pub fn rule_conditions(id: EntityId) -> Self {
        Self::new([
            Rule::RESOURCE.to_string(),
            DETAIL.to_string(),
            id.to_string(),
            "conditions".to_string(),
        ])
    }

    pub fn rule_actions(id: EntityId) -> Self {
        Self::new([
            Rule::RESOURCE.to_string(),
            DETAIL.to_string(),
            id.to_string(),
            "actions".to_string(),
        ])
    }

    pub fn statements(page: u32, page_size: u32) -> Self {
        Self::new([
            Statement::RESOURCE.to_string(),
            LIST.to_string(),
            format!("page={}&page_size={}", page, page_size),
        ])
    }

    pub fn statement(id: EntityId) -> Self {
        Self::detail_of::<Statement>(id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Selects the entries an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    All,
    Exact(CacheKey),
    Prefix(CacheKey),
}

impl KeyFilter {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyFilter::All => true,
            KeyFilter::Exact(exact) => exact == key,
            KeyFilter::Prefix(prefix) => key.starts_with(prefix),
        }
    }
}

impl From<CacheKey> for KeyFilter {
    fn from(key: CacheKey) -> Self {
        KeyFilter::Exact(key)
    }
}
