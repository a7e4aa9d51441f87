use super::ApiClient;
use crate::core::{Category, CategoryChanges, EntityId, NewCategory, Result};

// The backend exposes no category delete.
impl ApiClient {
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        self.list::<Category>().await
    }

    pub async fn get_category(&self, id: EntityId) -> Result<Category> {
        self.get::<Category>(id).await
    }

    pub async fn create_category(&self, category: &NewCategory) -> Result<Category> {
        category.validate()?;
        self.create::<Category, _>(category).await
    }

    pub async fn update_category(&self, id: EntityId, changes: &CategoryChanges) -> Result<Category> {
        self.patch::<Category, _>(id, changes).await
    }
}
