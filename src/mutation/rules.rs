// ============================================================================
// Rule Mutations
// ============================================================================
//
// A rule update touches up to three resources: metadata (PATCH), conditions
// (PUT) and actions (PUT). They are applied in that order; when a step
// fails, the steps already applied are reverted in reverse order with the
// original values, so the rule is never left half-updated.
//
// ============================================================================

use super::change::Edit;
use super::controller::{MutationController, MutationPlan};
use crate::cache::{CacheKey, KeyFilter};
use crate::core::{Action, ApiError, Condition, EntityId, NewRule, Result, Rule, RuleChanges};
use tracing::{Instrument, Level, event, info_span};

/// Changes to a rule; `None` leaves that part untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleUpdate {
    pub metadata: Option<RuleChanges>,
    pub conditions: Option<Vec<Condition>>,
    pub actions: Option<Vec<Action>>,
}

impl RuleUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(mut self, changes: RuleChanges) -> Self {
        self.metadata = Some(changes);
        self
    }

    pub fn conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = Some(actions);
        self
    }
}

/// Rule state after a successful update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedRule {
    pub rule: Rule,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

/// A step that reached the server, with what is needed to undo it.
enum AppliedStep {
    Metadata(RuleChanges),
    Conditions(Vec<Condition>),
    Actions(Vec<Action>),
}

impl MutationController {
    async fn load_rule(&self, id: EntityId) -> Result<Rule> {
        let api = self.api.clone();
        self.cache
            .read(CacheKey::rule(id), move || {
                let api = api.clone();
                async move { api.get_rule(id).await }
            })
            .await
    }

    async fn load_conditions(&self, id: EntityId) -> Result<Vec<Condition>> {
        let api = self.api.clone();
        self.cache
            .read(CacheKey::rule_conditions(id), move || {
                let api = api.clone();
                async move { api.get_rule_conditions(id).await }
            })
            .await
    }

    async fn load_actions(&self, id: EntityId) -> Result<Vec<Action>> {
        let api = self.api.clone();
        self.cache
            .read(CacheKey::rule_actions(id), move || {
                let api = api.clone();
                async move { api.get_rule_actions(id).await }
            })
            .await
    }

    pub async fn create_rule(&self, rule: NewRule) -> Result<Rule> {
        const OPERATION: &str = "create_rule";
        if let Err(err) = rule.validate() {
            return self.reject(OPERATION, err);
        }
        let plan = MutationPlan::new(OPERATION).invalidate(KeyFilter::Prefix(CacheKey::rules()));
        let api = self.api.clone();
        self.run(plan, async move { api.create_rule(&rule).await }, |_| None)
            .await
    }

    pub async fn delete_rule(&self, id: EntityId) -> Result<()> {
        let plan = MutationPlan::new("delete_rule")
            .edit(CacheKey::rules(), Edit::Remove { id })
            .remove_on_success(KeyFilter::Prefix(CacheKey::rule(id)));
        let api = self.api.clone();
        self.run(plan, async move { api.delete_rule(id).await }, |_| None)
            .await
    }

    /// Apply `update` step by step, compensating already applied steps when
    /// a later one fails. Parts equal to the current state are skipped.
    pub async fn update_rule(&self, id: EntityId, update: RuleUpdate) -> Result<UpdatedRule> {
        const OPERATION: &str = "update_rule";
        let span = info_span!("rule.update", rule_id = id);

        async {
            let loaded = async {
                Ok::<_, ApiError>((
                    self.load_rule(id).await?,
                    self.load_conditions(id).await?,
                    self.load_actions(id).await?,
                ))
            }
            .await;
            let (original, original_conditions, original_actions) = match loaded {
                Ok(loaded) => loaded,
                Err(err) => return self.reject(OPERATION, err),
            };

            let metadata = update
                .metadata
                .map(|changes| changes.diff(&original))
                .filter(|changes| !changes.is_empty());
            let conditions = update
                .conditions
                .filter(|conditions| *conditions != original_conditions);
            let actions = update.actions.filter(|actions| *actions != original_actions);

            let mut applied = Vec::new();
            let mut result = UpdatedRule {
                rule: original.clone(),
                conditions: original_conditions.clone(),
                actions: original_actions.clone(),
            };

            if let Some(changes) = metadata {
                match self.api.update_rule(id, &changes).await {
                    Ok(rule) => {
                        applied.push(AppliedStep::Metadata(changes.inverse(&original)));
                        result.rule = rule;
                    }
                    Err(err) => return self.abort_rule_update(id, applied, err).await,
                }
            }

            if let Some(conditions) = conditions {
                match self.api.replace_rule_conditions(id, &conditions).await {
                    Ok(conditions) => {
                        applied.push(AppliedStep::Conditions(original_conditions));
                        result.conditions = conditions;
                    }
                    Err(err) => return self.abort_rule_update(id, applied, err).await,
                }
            }

            if let Some(actions) = actions {
                match self.api.replace_rule_actions(id, &actions).await {
                    Ok(actions) => {
                        applied.push(AppliedStep::Actions(original_actions));
                        result.actions = actions;
                    }
                    Err(err) => return self.abort_rule_update(id, applied, err).await,
                }
            }

            if applied.is_empty() {
                return Ok(result);
            }

            self.cache.set(&CacheKey::rule(id), &result.rule)?;
            self.cache
                .set(&CacheKey::rule_conditions(id), &result.conditions)?;
            self.cache.set(&CacheKey::rule_actions(id), &result.actions)?;
            self.cache.invalidate(&KeyFilter::Prefix(CacheKey::rules()));
            self.cache
                .refetch_active(&KeyFilter::Prefix(CacheKey::rules()))
                .await;
            event!(Level::INFO, steps = applied.len(), "rule updated");
            Ok(result)
        }
        .instrument(span)
        .await
    }

    async fn abort_rule_update<T>(
        &self,
        id: EntityId,
        applied: Vec<AppliedStep>,
        err: ApiError,
    ) -> Result<T> {
        event!(
            Level::WARN,
            error = %err,
            compensating = applied.len(),
            "rule update failed"
        );
        if !applied.is_empty() {
            self.compensate(id, applied).await;
        }
        self.reject("update_rule", err)
    }

    async fn compensate(&self, id: EntityId, applied: Vec<AppliedStep>) {
        for step in applied.into_iter().rev() {
            let outcome = match &step {
                AppliedStep::Metadata(inverse) => {
                    self.api.update_rule(id, inverse).await.map(|_| "metadata")
                }
                AppliedStep::Conditions(original) => self
                    .api
                    .replace_rule_conditions(id, original)
                    .await
                    .map(|_| "conditions"),
                AppliedStep::Actions(original) => self
                    .api
                    .replace_rule_actions(id, original)
                    .await
                    .map(|_| "actions"),
            };
            match outcome {
                Ok(part) => event!(Level::DEBUG, part, "reverted rule step"),
                Err(err) => event!(Level::ERROR, error = %err, "failed to revert rule step"),
            }
        }

        // Server state is uncertain if any revert failed.
        self.cache.invalidate(&KeyFilter::Prefix(CacheKey::rule(id)));
        self.cache.invalidate(&KeyFilter::Exact(CacheKey::rules()));
    }
}
