// ============================================================================
// Optimistic Mutation Controller
// ============================================================================
//
// Every write goes through the same protocol:
//
//   1. cancel in-flight refetches of affected keys that hold a value; a
//      first load is left running and marked stale on success
//   2. snapshot each affected value and apply the speculative edit
//   3. commit against the backend
//   4a. success: swap speculative entities for confirmed ones, then
//       invalidate and refetch dependent caches
//   4b. failure: restore the snapshot value if nothing else wrote the key
//       since, otherwise revert only this mutation's edit. Staleness is left
//       as it is. Then notify and return the error.
//
// ============================================================================

use super::change::{Edit, Reconcile, Undo, find_in};
use crate::api::ApiClient;
use crate::cache::{CacheKey, KeyFilter, QueryCache};
use crate::core::{ApiError, Entity, EntityId, Result, TempIdAllocator};
use crate::notify::{ErrorPolicy, Notifier, TracingNotifier};
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// What a mutation does to the cache around its commit.
#[derive(Debug, Clone)]
pub struct MutationPlan {
    operation: &'static str,
    edits: Vec<(CacheKey, Edit)>,
    invalidate: Vec<KeyFilter>,
    remove_on_success: Vec<KeyFilter>,
}

impl MutationPlan {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            edits: Vec::new(),
            invalidate: Vec::new(),
            remove_on_success: Vec::new(),
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Speculatively apply `edit` to the value cached under `key`.
    pub fn edit(mut self, key: CacheKey, edit: Edit) -> Self {
        self.edits.push((key, edit));
        self
    }

    pub fn edit_each(mut self, keys: impl IntoIterator<Item = CacheKey>, edit: Edit) -> Self {
        for key in keys {
            self.edits.push((key, edit.clone()));
        }
        self
    }

    /// Mark matching entries stale once the commit succeeded.
    pub fn invalidate(mut self, filter: KeyFilter) -> Self {
        self.invalidate.push(filter);
        self
    }

    /// Drop matching entries once the commit succeeded.
    pub fn remove_on_success(mut self, filter: KeyFilter) -> Self {
        self.remove_on_success.push(filter);
        self
    }
}

struct Speculation {
    key: CacheKey,
    snapshot: Value,
    version: u64,
    undo: Undo,
}

pub struct MutationController {
    pub(crate) cache: Arc<QueryCache>,
    pub(crate) api: Arc<ApiClient>,
    notifier: Arc<dyn Notifier>,
    policy: ErrorPolicy,
    pub(crate) temp_ids: TempIdAllocator,
}

impl MutationController {
    pub fn new(cache: Arc<QueryCache>, api: Arc<ApiClient>) -> Self {
        Self {
            cache,
            api,
            notifier: Arc::new(TracingNotifier),
            policy: ErrorPolicy::new(),
            temp_ids: TempIdAllocator::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Execute `commit` under `plan`. `confirm` maps the committed result to
    /// the swap applied to every speculatively edited key.
    pub async fn run<T, Fut, C>(&self, plan: MutationPlan, commit: Fut, confirm: C) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
        C: FnOnce(&T) -> Option<Reconcile>,
    {
        let span = info_span!("mutation", operation = plan.operation);
        async {
            let (speculations, loading) = self.speculate(&plan);
            event!(
                Level::DEBUG,
                edited = speculations.len(),
                loading = loading.len(),
                "applied optimistic edits"
            );

            match commit.await {
                Ok(result) => {
                    if let Some(reconcile) = confirm(&result) {
                        for speculation in &speculations {
                            self.cache
                                .update_data(&speculation.key, |value| reconcile.apply(value));
                        }
                    }
                    for key in loading {
                        self.cache.invalidate(&KeyFilter::Exact(key));
                    }
                    self.settle(&plan).await;
                    event!(Level::INFO, "mutation committed");
                    Ok(result)
                }
                Err(err) => {
                    self.rollback(speculations);
                    event!(Level::WARN, error = %err, "mutation rolled back");
                    self.report(plan.operation, &err);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Apply the plan's edits. Returns the applied speculations and the keys
    /// skipped because their first load is still running.
    fn speculate(&self, plan: &MutationPlan) -> (Vec<Speculation>, Vec<CacheKey>) {
        let mut speculations = Vec::new();
        let mut loading = Vec::new();
        for (key, edit) in &plan.edits {
            let Some(info) = self.cache.info(key) else {
                continue;
            };
            if !info.has_value {
                if info.is_fetching {
                    loading.push(key.clone());
                }
                continue;
            }
            // A refetch already on its way would overwrite the edit.
            self.cache.cancel(key);

            let mut applied: Option<(Value, Undo)> = None;
            let version = self.cache.update_data(key, |value| {
                let snapshot = value.clone();
                if let Some(undo) = edit.apply(value) {
                    applied = Some((snapshot, undo));
                }
            });

            if let (Some(version), Some((snapshot, undo))) = (version, applied) {
                speculations.push(Speculation {
                    key: key.clone(),
                    snapshot,
                    version,
                    undo,
                });
            }
        }
        (speculations, loading)
    }

    fn rollback(&self, speculations: Vec<Speculation>) {
        for speculation in speculations.into_iter().rev() {
            match self.cache.version(&speculation.key) {
                Some(version) if version == speculation.version => {
                    let snapshot = speculation.snapshot;
                    self.cache
                        .update_data(&speculation.key, move |value| *value = snapshot);
                }
                Some(_) => {
                    event!(
                        Level::DEBUG,
                        key = %speculation.key,
                        "key changed since speculation; reverting edit only"
                    );
                    self.cache
                        .update_data(&speculation.key, |value| speculation.undo.revert(value));
                }
                // Evicted or cleared meanwhile; nothing left to restore.
                None => {}
            }
        }
    }

    async fn settle(&self, plan: &MutationPlan) {
        for filter in &plan.remove_on_success {
            for key in self.cache.keys_matching(filter) {
                self.cache.remove(&key);
            }
        }
        for filter in &plan.invalidate {
            self.cache.invalidate(filter);
        }
        for filter in &plan.invalidate {
            self.cache.refetch_active(filter).await;
        }
    }

    /// Hand a failure to the notifier. 401s are reported once by the session
    /// handler, not per operation.
    pub(crate) fn report(&self, operation: &str, err: &ApiError) {
        if err.is_unauthorized() {
            return;
        }
        if let Some(notification) = self.policy.classify(operation, err) {
            self.notifier.notify(notification);
        }
    }

    /// Reject `err` before anything is sent: reported like a backend failure.
    pub(crate) fn reject<T>(&self, operation: &str, err: ApiError) -> Result<T> {
        self.report(operation, &err);
        Err(err)
    }

    /// Latest cached copy of entity `id`, searching every cached value of the
    /// entity's resource.
    pub fn cached<E: Entity>(&self, id: EntityId) -> Option<E> {
        let mut keys = vec![CacheKey::detail_of::<E>(id)];
        keys.extend(
            self.cache
                .keys_matching(&KeyFilter::Prefix(CacheKey::list_of::<E>())),
        );
        keys.iter()
            .filter_map(|key| self.cache.get_data(key))
            .find_map(|value| {
                find_in(&value, id).and_then(|found| serde_json::from_value(found.clone()).ok())
            })
    }

    /// Cached list keys of `E`.
    pub(crate) fn list_keys<E: Entity>(&self) -> Vec<CacheKey> {
        self.cache
            .keys_matching(&KeyFilter::Prefix(CacheKey::list_of::<E>()))
    }
}

/// Serialize an entity for insertion into cached values.
pub(crate) fn to_entity_value<T: Serialize>(resource: &str, entity: &T) -> Result<Value> {
    serde_json::to_value(entity).map_err(|e| ApiError::decode(resource, e.to_string()))
}

/// Serialize changes into the field map merged by [`Edit::Patch`].
pub(crate) fn to_fields<T: Serialize>(resource: &str, changes: &T) -> Result<Map<String, Value>> {
    match to_entity_value(resource, changes)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(ApiError::invalid_input(resource, "changes must be an object")),
    }
}

pub(crate) fn confirm_as<E: Entity>(id: EntityId) -> impl FnOnce(&E) -> Option<Reconcile> {
    move |confirmed: &E| {
        serde_json::to_value(confirmed)
            .ok()
            .map(|confirmed| Reconcile { id, confirmed })
    }
}
