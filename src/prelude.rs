//! Common imports for applications built on `finsync`.
//!
//! ```ignore
//! use finsync::prelude::*;
//! ```

pub use crate::FinanceClient;
pub use crate::api::{ImportKind, StatementFile};
pub use crate::cache::{CacheKey, KeyFilter, NotReady};
pub use crate::connection::ClientConfig;
pub use crate::core::{
    Account, AccountChanges, Action, ApiError, Category, CategoryChanges, Condition, EntityId,
    NewAccount, NewCategory, NewRule, NewTransaction, Page, Result, Rule, RuleChanges, SortField,
    SortOrder, Statement, Transaction, TransactionChanges, TransactionQuery,
};
pub use crate::hooks::{Queries, TransactionFeed};
pub use crate::mutation::{BulkDeleteReport, RuleUpdate, UpdatedRule};
pub use crate::notify::{Disposition, ErrorPolicy, Notification, Notifier};
