use super::{ApiClient, ApiRequest, item_path, json_body};
use crate::core::{Action, Condition, Entity, EntityId, NewRule, Result, Rule, RuleChanges};
use serde_json::json;

impl ApiClient {
    pub async fn list_rules(&self) -> Result<Vec<Rule>> {
        self.list::<Rule>().await
    }

    pub async fn get_rule(&self, id: EntityId) -> Result<Rule> {
        self.get::<Rule>(id).await
    }

    /// Create a rule together with its conditions and actions.
    pub async fn create_rule(&self, rule: &NewRule) -> Result<Rule> {
        rule.validate()?;
        self.create::<Rule, _>(rule).await
    }

    pub async fn update_rule(&self, id: EntityId, changes: &RuleChanges) -> Result<Rule> {
        self.patch::<Rule, _>(id, changes).await
    }

    pub async fn delete_rule(&self, id: EntityId) -> Result<()> {
        self.remove::<Rule>(id).await
    }

    pub async fn get_rule_conditions(&self, id: EntityId) -> Result<Vec<Condition>> {
        let path = format!("{}/conditions", item_path::<Rule>(id));
        self.fetch(Rule::RESOURCE, ApiRequest::get(path)).await
    }

    pub async fn get_rule_actions(&self, id: EntityId) -> Result<Vec<Action>> {
        let path = format!("{}/actions", item_path::<Rule>(id));
        self.fetch(Rule::RESOURCE, ApiRequest::get(path)).await
    }

    /// Replace the full condition set of a rule.
    pub async fn replace_rule_conditions(
        &self,
        id: EntityId,
        conditions: &[Condition],
    ) -> Result<Vec<Condition>> {
        let path = format!("{}/conditions", item_path::<Rule>(id));
        let body = json_body(Rule::RESOURCE, &json!({ "conditions": conditions }))?;
        self.fetch(Rule::RESOURCE, ApiRequest::put(path, body)).await
    }

    /// Replace the full action set of a rule.
    pub async fn replace_rule_actions(&self, id: EntityId, actions: &[Action]) -> Result<Vec<Action>> {
        let path = format!("{}/actions", item_path::<Rule>(id));
        let body = json_body(Rule::RESOURCE, &json!({ "actions": actions }))?;
        self.fetch(Rule::RESOURCE, ApiRequest::put(path, body)).await
    }
}
