use super::error::{ApiError, Result};
use super::ids::EntityId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// A record exchanged with the backend and identified by a numeric id.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Resource name used in paths, cache keys and error reports.
    const RESOURCE: &'static str;

    fn id(&self) -> EntityId;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: EntityId,
    pub name: String,
    pub bank_type: String,
    pub currency: String,
    pub balance: f64,
    #[serde(default)]
    pub created_by: String,
}

impl Entity for Account {
    const RESOURCE: &'static str = "account";

    fn id(&self) -> EntityId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub created_by: String,
}

impl Entity for Category {
    const RESOURCE: &'static str = "category";

    fn id(&self) -> EntityId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: EntityId,
    pub date: NaiveDate,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub category_ids: Vec<EntityId>,
    pub account_id: EntityId,
}

impl Entity for Transaction {
    const RESOURCE: &'static str = "transaction";

    fn id(&self) -> EntityId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub effective_from: NaiveDate,
}

impl Entity for Rule {
    const RESOURCE: &'static str = "rule";

    fn id(&self) -> EntityId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub condition_type: String,
    pub condition_operator: String,
    pub condition_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: String,
    pub action_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub id: EntityId,
    pub account_id: EntityId,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_count: Option<u64>,
}

impl Entity for Statement {
    const RESOURCE: &'static str = "statement";

    fn id(&self) -> EntityId {
        self.id
    }
}

// ============================================================================
// Create payloads
// ============================================================================

fn require_name(resource: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ApiError::invalid_input(resource, "name cannot be empty"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub bank_type: String,
    pub currency: String,
    pub balance: f64,
}

impl NewAccount {
    pub fn validate(&self) -> Result<()> {
        require_name(Account::RESOURCE, &self.name)?;
        if self.currency.trim().is_empty() {
            return Err(ApiError::invalid_input(
                Account::RESOURCE,
                "currency cannot be empty",
            ));
        }
        Ok(())
    }

    pub(crate) fn placeholder(&self, id: EntityId) -> Account {
        Account {
            id,
            name: self.name.clone(),
            bank_type: self.bank_type.clone(),
            currency: self.currency.clone(),
            balance: self.balance,
            created_by: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl NewCategory {
    pub fn validate(&self) -> Result<()> {
        require_name(Category::RESOURCE, &self.name)
    }

    pub(crate) fn placeholder(&self, id: EntityId) -> Category {
        Category {
            id,
            name: self.name.clone(),
            icon: self.icon.clone(),
            created_by: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub category_ids: Vec<EntityId>,
    pub account_id: EntityId,
}

impl NewTransaction {
    pub fn validate(&self) -> Result<()> {
        require_name(Transaction::RESOURCE, &self.name)?;
        if !self.amount.is_finite() {
            return Err(ApiError::invalid_input(
                Transaction::RESOURCE,
                "amount must be a finite number",
            ));
        }
        Ok(())
    }

    pub(crate) fn placeholder(&self, id: EntityId) -> Transaction {
        Transaction {
            id,
            date: self.date,
            name: self.name.clone(),
            description: self.description.clone(),
            amount: self.amount,
            category_ids: self.category_ids.clone(),
            account_id: self.account_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub effective_from: NaiveDate,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl NewRule {
    pub fn validate(&self) -> Result<()> {
        require_name(Rule::RESOURCE, &self.name)?;
        if self.conditions.is_empty() {
            return Err(ApiError::invalid_input(
                Rule::RESOURCE,
                "a rule needs at least one condition",
            ));
        }
        if self.actions.is_empty() {
            return Err(ApiError::invalid_input(
                Rule::RESOURCE,
                "a rule needs at least one action",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Partial updates
// ============================================================================
//
// Each `*Changes` type holds the fields a caller wants to change. `diff`
// drops every field equal to the original so only real changes reach the
// server.
//
// ============================================================================

fn changed<T: PartialEq + Clone>(proposed: &Option<T>, current: &T) -> Option<T> {
    proposed.as_ref().filter(|value| *value != current).cloned()
}

fn changed_opt<T: PartialEq + Clone>(proposed: &Option<T>, current: &Option<T>) -> Option<T> {
    proposed
        .as_ref()
        .filter(|value| current.as_ref() != Some(*value))
        .cloned()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
}

impl AccountChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.bank_type.is_none()
            && self.currency.is_none()
            && self.balance.is_none()
    }

    pub fn diff(&self, original: &Account) -> Self {
        Self {
            name: changed(&self.name, &original.name),
            bank_type: changed(&self.bank_type, &original.bank_type),
            currency: changed(&self.currency, &original.currency),
            balance: changed(&self.balance, &original.balance),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl CategoryChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.icon.is_none()
    }

    pub fn diff(&self, original: &Category) -> Self {
        Self {
            name: changed(&self.name, &original.name),
            icon: changed_opt(&self.icon, &original.icon),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_ids: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<EntityId>,
}

impl TransactionChanges {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.name.is_none()
            && self.description.is_none()
            && self.amount.is_none()
            && self.category_ids.is_none()
            && self.account_id.is_none()
    }

    /// Category ids are compared as sets: `[3, 1, 2]` equals `[1, 2, 3]`.
    pub fn diff(&self, original: &Transaction) -> Self {
        let category_ids = self.category_ids.as_ref().filter(|proposed| {
            let proposed: BTreeSet<_> = proposed.iter().collect();
            let current: BTreeSet<_> = original.category_ids.iter().collect();
            proposed != current
        });

        Self {
            date: changed(&self.date, &original.date),
            name: changed(&self.name, &original.name),
            description: changed_opt(&self.description, &original.description),
            amount: changed(&self.amount, &original.amount),
            category_ids: category_ids.cloned(),
            account_id: changed(&self.account_id, &original.account_id),
        }
    }
}

/// Keeps an explicit `null` apart from an absent field.
fn explicit_null<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial rule metadata. `description: Some(None)` clears the description
/// and is sent as `null`; `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_from: Option<NaiveDate>,
}

impl RuleChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.effective_from.is_none()
    }

    pub fn diff(&self, original: &Rule) -> Self {
        Self {
            name: changed(&self.name, &original.name),
            description: changed(&self.description, &original.description),
            effective_from: changed(&self.effective_from, &original.effective_from),
        }
    }

    /// Changes that put back the fields of `original` touched by `self`.
    pub fn inverse(&self, original: &Rule) -> Self {
        Self {
            name: self.name.as_ref().map(|_| original.name.clone()),
            description: self.description.as_ref().map(|_| original.description.clone()),
            effective_from: self.effective_from.map(|_| original.effective_from),
        }
    }
}
