use super::change::{Edit, Position};
use super::controller::{MutationController, MutationPlan, confirm_as, to_entity_value, to_fields};
use crate::cache::{CacheKey, KeyFilter};
use crate::core::{
    ApiError, Entity, EntityId, NewTransaction, Result, Transaction, TransactionChanges,
};
use futures::future::join_all;
use std::collections::BTreeSet;
use tracing::{Level, event};

/// Outcome of deleting a selection of transactions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkDeleteReport {
    pub deleted: Vec<EntityId>,
    pub failed: Vec<(EntityId, ApiError)>,
}

impl BulkDeleteReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// e.g. `2 transactions deleted`.
    pub fn summary(&self) -> String {
        let count = self.deleted.len();
        let noun = if count == 1 { "transaction" } else { "transactions" };
        format!("{} {} deleted", count, noun)
    }
}

impl MutationController {
    /// Balances shown with accounts move with every transaction write.
    fn transaction_plan(&self, operation: &'static str) -> MutationPlan {
        MutationPlan::new(operation)
            .invalidate(KeyFilter::Prefix(CacheKey::transaction_lists()))
            .invalidate(KeyFilter::Prefix(CacheKey::resource("account")))
    }

    /// The placeholder goes to the front of every cached first page whose
    /// filters it satisfies. Other pages only see it after their refetch.
    pub async fn create_transaction(&self, transaction: NewTransaction) -> Result<Transaction> {
        const OPERATION: &str = "create_transaction";
        if let Err(err) = transaction.validate() {
            return self.reject(OPERATION, err);
        }

        let temp_id = self.temp_ids.next();
        let placeholder =
            to_entity_value(Transaction::RESOURCE, &transaction.placeholder(temp_id))?;
        let pages = self.list_keys::<Transaction>().into_iter().filter(|key| {
            key.transaction_query()
                .is_some_and(|query| query.admits_new(&transaction))
        });
        let plan = self.transaction_plan(OPERATION).edit_each(
            pages,
            Edit::Insert {
                entity: placeholder,
                at: Position::Front,
            },
        );

        let api = self.api.clone();
        self.run(
            plan,
            async move { api.create_transaction(&transaction).await },
            confirm_as::<Transaction>(temp_id),
        )
        .await
    }

    pub async fn update_transaction(
        &self,
        id: EntityId,
        changes: TransactionChanges,
    ) -> Result<Transaction> {
        const OPERATION: &str = "update_transaction";
        let original = self.cached::<Transaction>(id);
        let changes = match &original {
            Some(original) => changes.diff(original),
            None => changes,
        };
        if changes.is_empty() {
            return match original {
                Some(original) => Ok(original),
                None => self.reject(
                    OPERATION,
                    ApiError::invalid_input(Transaction::RESOURCE, "no changes to apply"),
                ),
            };
        }

        let fields = to_fields(Transaction::RESOURCE, &changes)?;
        let plan = self
            .transaction_plan(OPERATION)
            .edit_each(self.list_keys::<Transaction>(), Edit::Patch { id, fields });

        let api = self.api.clone();
        self.run(
            plan,
            async move { api.update_transaction(id, &changes).await },
            confirm_as::<Transaction>(id),
        )
        .await
    }

    pub async fn delete_transaction(&self, id: EntityId) -> Result<()> {
        let plan = self
            .transaction_plan("delete_transaction")
            .edit_each(self.list_keys::<Transaction>(), Edit::Remove { id });

        let api = self.api.clone();
        self.run(plan, async move { api.delete_transaction(id).await }, |_| None)
            .await
    }

    /// Delete every selected transaction as an independent mutation. Deleted
    /// ids leave `selection`; failed ones stay selected.
    pub async fn delete_transactions(&self, selection: &mut BTreeSet<EntityId>) -> BulkDeleteReport {
        let ids: Vec<EntityId> = selection.iter().copied().collect();
        let results = join_all(ids.iter().map(|id| self.delete_transaction(*id))).await;

        let mut report = BulkDeleteReport::default();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    selection.remove(&id);
                    report.deleted.push(id);
                }
                Err(err) => report.failed.push((id, err)),
            }
        }

        event!(
            Level::INFO,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "bulk delete finished"
        );
        report
    }
}
