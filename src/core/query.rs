use super::entities::NewTransaction;
use super::ids::EntityId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// One page of a server-side paginated collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(alias = "data", alias = "results")]
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Date,
    Amount,
    Name,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Date => "date",
            SortField::Amount => "amount",
            SortField::Name => "name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Filter, sort and pagination parameters of the transaction list.
///
/// Every field takes part in the cache key, so each distinct query shape is
/// cached on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub page: u32,
    pub page_size: u32,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    pub account_id: Option<EntityId>,
    pub category_id: Option<EntityId>,
    pub uncategorized: Option<bool>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: None,
            sort_order: None,
            account_id: None,
            category_id: None,
            uncategorized: None,
            min_amount: None,
            max_amount: None,
            date_from: None,
            date_to: None,
            search: None,
        }
    }
}

impl TransactionQuery {
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn sort(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_by = Some(field);
        self.sort_order = Some(order);
        self
    }

    pub fn account(mut self, account_id: EntityId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn category(mut self, category_id: EntityId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn uncategorized(mut self, only_uncategorized: bool) -> Self {
        self.uncategorized = Some(only_uncategorized);
        self
    }

    pub fn amount_between(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_amount = min;
        self.max_amount = max;
        self
    }

    pub fn dates_between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn search(mut self, text: &str) -> Self {
        let text = text.trim();
        self.search = if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        };
        self
    }

    /// Query-string pairs in a fixed order; unset filters are omitted.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("page_size".to_string(), self.page_size.to_string()),
        ];
        let mut push = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((name.to_string(), value));
            }
        };
        push("sort_by", self.sort_by.map(|s| s.as_str().to_string()));
        push("sort_order", self.sort_order.map(|s| s.as_str().to_string()));
        push("account_id", self.account_id.map(|v| v.to_string()));
        push("category_id", self.category_id.map(|v| v.to_string()));
        push("uncategorized", self.uncategorized.map(|v| v.to_string()));
        push("min_amount", self.min_amount.map(|v| v.to_string()));
        push("max_amount", self.max_amount.map(|v| v.to_string()));
        push("date_from", self.date_from.map(|d| d.format("%Y-%m-%d").to_string()));
        push("date_to", self.date_to.map(|d| d.format("%Y-%m-%d").to_string()));
        push("search", self.search.clone());
        pairs
    }

    /// Whether `transaction` certainly belongs on this query's first page.
    /// Free-text search is matched on the server only, so searched pages
    /// never admit a placeholder.
    pub(crate) fn admits_new(&self, transaction: &NewTransaction) -> bool {
        if self.page != 1 || self.search.is_some() {
            return false;
        }
        let categories = &transaction.category_ids;
        self.account_id.is_none_or(|id| id == transaction.account_id)
            && self.category_id.is_none_or(|id| categories.contains(&id))
            && (self.uncategorized != Some(true) || categories.is_empty())
            && self.min_amount.is_none_or(|min| transaction.amount >= min)
            && self.max_amount.is_none_or(|max| transaction.amount <= max)
            && self.date_from.is_none_or(|from| transaction.date >= from)
            && self.date_to.is_none_or(|to| transaction.date <= to)
    }
}
