use super::change::{Edit, Position};
use super::controller::{MutationController, MutationPlan, confirm_as, to_entity_value, to_fields};
use crate::cache::{CacheKey, KeyFilter};
use crate::core::{Account, AccountChanges, ApiError, Entity, EntityId, NewAccount, Result};

impl MutationController {
    /// Append a placeholder to the cached account list, then swap it for the
    /// created account.
    pub async fn create_account(&self, account: NewAccount) -> Result<Account> {
        const OPERATION: &str = "create_account";
        if let Err(err) = account.validate() {
            return self.reject(OPERATION, err);
        }

        let temp_id = self.temp_ids.next();
        let placeholder = to_entity_value(Account::RESOURCE, &account.placeholder(temp_id))?;
        let plan = MutationPlan::new(OPERATION)
            .edit(
                CacheKey::accounts(),
                Edit::Insert {
                    entity: placeholder,
                    at: Position::Back,
                },
            )
            .invalidate(KeyFilter::Prefix(CacheKey::transaction_lists()));

        let api = self.api.clone();
        self.run(
            plan,
            async move { api.create_account(&account).await },
            confirm_as::<Account>(temp_id),
        )
        .await
    }

    /// Send only the fields that differ from the cached account. Nothing is
    /// sent when nothing changed.
    pub async fn update_account(&self, id: EntityId, changes: AccountChanges) -> Result<Account> {
        const OPERATION: &str = "update_account";
        let original = self.cached::<Account>(id);
        let changes = match &original {
            Some(original) => changes.diff(original),
            None => changes,
        };
        if changes.is_empty() {
            return match original {
                Some(original) => Ok(original),
                None => self.reject(
                    OPERATION,
                    ApiError::invalid_input(Account::RESOURCE, "no changes to apply"),
                ),
            };
        }

        let fields = to_fields(Account::RESOURCE, &changes)?;
        let plan = MutationPlan::new(OPERATION)
            .edit_each(
                [CacheKey::accounts(), CacheKey::account(id)],
                Edit::Patch { id, fields },
            )
            .invalidate(KeyFilter::Prefix(CacheKey::transaction_lists()));

        let api = self.api.clone();
        self.run(
            plan,
            async move { api.update_account(id, &changes).await },
            confirm_as::<Account>(id),
        )
        .await
    }

    pub async fn delete_account(&self, id: EntityId) -> Result<()> {
        let plan = MutationPlan::new("delete_account")
            .edit(CacheKey::accounts(), Edit::Remove { id })
            .remove_on_success(KeyFilter::Exact(CacheKey::account(id)))
            .invalidate(KeyFilter::Prefix(CacheKey::transaction_lists()))
            .invalidate(KeyFilter::Prefix(CacheKey::resource("statement")));

        let api = self.api.clone();
        self.run(plan, async move { api.delete_account(id).await }, |_| None)
            .await
    }
}
