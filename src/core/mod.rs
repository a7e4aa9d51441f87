pub mod entities;
pub mod error;
pub mod ids;
pub mod query;

pub use entities::{
    Account, AccountChanges, Action, Category, CategoryChanges, Condition, Entity, NewAccount,
    NewCategory, NewRule, NewTransaction, Rule, RuleChanges, Statement, Transaction,
    TransactionChanges,
};
pub use error::{ApiError, Result};
pub use ids::{EntityId, TempIdAllocator, is_temporary};
pub use query::{DEFAULT_PAGE_SIZE, Page, SortField, SortOrder, TransactionQuery};
