use super::ApiClient;
use crate::core::{Account, AccountChanges, EntityId, NewAccount, Result};

impl ApiClient {
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.list::<Account>().await
    }

    pub async fn get_account(&self, id: EntityId) -> Result<Account> {
        self.get::<Account>(id).await
    }

    pub async fn create_account(&self, account: &NewAccount) -> Result<Account> {
        account.validate()?;
        self.create::<Account, _>(account).await
    }

    pub async fn update_account(&self, id: EntityId, changes: &AccountChanges) -> Result<Account> {
        self.patch::<Account, _>(id, changes).await
    }

    pub async fn delete_account(&self, id: EntityId) -> Result<()> {
        self.remove::<Account>(id).await
    }
}
