use super::{ApiClient, ApiRequest, collection_path};
use crate::core::{
    Entity, EntityId, NewTransaction, Page, Result, Transaction, TransactionChanges,
    TransactionQuery,
};

impl ApiClient {
    /// One page of transactions matching `query`.
    pub async fn list_transactions(&self, query: &TransactionQuery) -> Result<Page<Transaction>> {
        let request = ApiRequest::get(collection_path::<Transaction>()).query(query.to_query_pairs());
        self.fetch(Transaction::RESOURCE, request).await
    }

    pub async fn create_transaction(&self, transaction: &NewTransaction) -> Result<Transaction> {
        transaction.validate()?;
        self.create::<Transaction, _>(transaction).await
    }

    pub async fn update_transaction(
        &self,
        id: EntityId,
        changes: &TransactionChanges,
    ) -> Result<Transaction> {
        self.patch::<Transaction, _>(id, changes).await
    }

    pub async fn delete_transaction(&self, id: EntityId) -> Result<()> {
        self.remove::<Transaction>(id).await
    }
}
