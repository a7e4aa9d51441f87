use super::change::{Edit, Position};
use super::controller::{MutationController, MutationPlan, confirm_as, to_entity_value, to_fields};
use crate::cache::{CacheKey, KeyFilter};
use crate::core::{ApiError, Category, CategoryChanges, Entity, EntityId, NewCategory, Result};

// Categories cannot be deleted through the API.

impl MutationController {
    pub async fn create_category(&self, category: NewCategory) -> Result<Category> {
        const OPERATION: &str = "create_category";
        if let Err(err) = category.validate() {
            return self.reject(OPERATION, err);
        }

        let temp_id = self.temp_ids.next();
        let placeholder = to_entity_value(Category::RESOURCE, &category.placeholder(temp_id))?;
        let plan = MutationPlan::new(OPERATION).edit(
            CacheKey::categories(),
            Edit::Insert {
                entity: placeholder,
                at: Position::Back,
            },
        );

        let api = self.api.clone();
        self.run(
            plan,
            async move { api.create_category(&category).await },
            confirm_as::<Category>(temp_id),
        )
        .await
    }

    pub async fn update_category(&self, id: EntityId, changes: CategoryChanges) -> Result<Category> {
        const OPERATION: &str = "update_category";
        let original = self.cached::<Category>(id);
        let changes = match &original {
            Some(original) => changes.diff(original),
            None => changes,
        };
        if changes.is_empty() {
            return match original {
                Some(original) => Ok(original),
                None => self.reject(
                    OPERATION,
                    ApiError::invalid_input(Category::RESOURCE, "no changes to apply"),
                ),
            };
        }

        let fields = to_fields(Category::RESOURCE, &changes)?;
        // Transaction rows display category names.
        let plan = MutationPlan::new(OPERATION)
            .edit_each(
                [CacheKey::categories(), CacheKey::category(id)],
                Edit::Patch { id, fields },
            )
            .invalidate(KeyFilter::Prefix(CacheKey::transaction_lists()));

        let api = self.api.clone();
        self.run(
            plan,
            async move { api.update_category(id, &changes).await },
            confirm_as::<Category>(id),
        )
        .await
    }
}
