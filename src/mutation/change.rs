// ============================================================================
// Reversible Cache Edits
// ============================================================================
//
// Command pattern over cached JSON values. An `Edit` is applied to a cached
// value during speculation and yields an `Undo` that reverts exactly that
// edit. Undos are idempotent by entity id, so they stay correct when other
// writers changed the value in between.
//
// A cached value is either a list (`[...]`), a page (`{"items": [...],
// "total": n, ...}`) or a single entity (`{"id": n, ...}`).
//
// ============================================================================

use crate::core::EntityId;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Front,
    Back,
}

/// Speculative change to one cached value.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Add a placeholder entity to a list or page.
    Insert { entity: Value, at: Position },
    /// Merge `fields` into the entity with `id`.
    Patch { id: EntityId, fields: Map<String, Value> },
    /// Drop the entity with `id`.
    Remove { id: EntityId },
}

/// Inverse of an applied [`Edit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Undo {
    /// Remove the inserted placeholder again.
    Discard { id: EntityId },
    /// Put back the entity as it was before the patch.
    Restore { id: EntityId, old: Value },
    /// Re-insert a removed entity at its former index.
    Reinsert { old: Value, index: usize },
}

/// Server-confirmed replacement applied after a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconcile {
    /// Id the speculative entity carries (temporary for creates).
    pub id: EntityId,
    pub confirmed: Value,
}

pub(crate) fn id_of(entity: &Value) -> Option<EntityId> {
    entity.get("id").and_then(Value::as_i64)
}

fn items_mut(value: &mut Value) -> Option<&mut Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get_mut("items").and_then(Value::as_array_mut),
        _ => None,
    }
}

fn items(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get("items").and_then(Value::as_array),
        _ => None,
    }
}

/// Single-entity values (detail entries) are objects with an `id` and no
/// `items` member.
fn is_single(value: &Value) -> bool {
    value.is_object() && value.get("items").is_none() && id_of(value).is_some()
}

fn adjust_total(value: &mut Value, delta: i64) {
    if let Some(total) = value.get_mut("total") {
        if let Some(current) = total.as_i64() {
            *total = Value::from((current + delta).max(0));
        }
    }
}

fn index_of(items: &[Value], id: EntityId) -> Option<usize> {
    items.iter().position(|item| id_of(item) == Some(id))
}

/// Entity with `id` inside a cached value of any shape.
pub(crate) fn find_in(value: &Value, id: EntityId) -> Option<&Value> {
    if is_single(value) {
        return (id_of(value) == Some(id)).then_some(value);
    }
    items(value)?.iter().find(|item| id_of(item) == Some(id))
}

fn merge(target: &mut Value, fields: &Map<String, Value>) {
    if let Value::Object(map) = target {
        for (name, field) in fields {
            map.insert(name.clone(), field.clone());
        }
    }
}

impl Edit {
    /// Apply to `value`. Returns `None` when the edit does not concern the
    /// value (entity absent, wrong shape), in which case nothing changed.
    pub fn apply(&self, value: &mut Value) -> Option<Undo> {
        match self {
            Edit::Insert { entity, at } => {
                let id = id_of(entity)?;
                let list = items_mut(value)?;
                if index_of(list, id).is_some() {
                    return None;
                }
                match at {
                    Position::Front => list.insert(0, entity.clone()),
                    Position::Back => list.push(entity.clone()),
                }
                adjust_total(value, 1);
                Some(Undo::Discard { id })
            }
            Edit::Patch { id, fields } => {
                if is_single(value) {
                    if id_of(value) != Some(*id) {
                        return None;
                    }
                    let old = value.clone();
                    merge(value, fields);
                    return Some(Undo::Restore { id: *id, old });
                }
                let list = items_mut(value)?;
                let index = index_of(list, *id)?;
                let old = list[index].clone();
                merge(&mut list[index], fields);
                Some(Undo::Restore { id: *id, old })
            }
            Edit::Remove { id } => {
                let list = items_mut(value)?;
                let index = index_of(list, *id)?;
                let old = list.remove(index);
                adjust_total(value, -1);
                Some(Undo::Reinsert { old, index })
            }
        }
    }
}

impl Undo {
    /// Revert the edit on the current `value`.
    pub fn revert(&self, value: &mut Value) {
        match self {
            Undo::Discard { id } => {
                let Some(list) = items_mut(value) else {
                    return;
                };
                let before = list.len();
                list.retain(|item| id_of(item) != Some(*id));
                let removed = (before - list.len()) as i64;
                if removed > 0 {
                    adjust_total(value, -removed);
                }
            }
            Undo::Restore { id, old } => {
                if is_single(value) {
                    if id_of(value) == Some(*id) {
                        *value = old.clone();
                    }
                    return;
                }
                if let Some(list) = items_mut(value) {
                    if let Some(index) = index_of(list, *id) {
                        list[index] = old.clone();
                    }
                }
            }
            Undo::Reinsert { old, index } => {
                let Some(id) = id_of(old) else {
                    return;
                };
                let Some(list) = items_mut(value) else {
                    return;
                };
                if index_of(list, id).is_some() {
                    return;
                }
                let at = (*index).min(list.len());
                list.insert(at, old.clone());
                adjust_total(value, 1);
            }
        }
    }
}

impl Reconcile {
    /// Swap the speculative entity for the confirmed one. A create never
    /// leaves both the placeholder and the confirmed entity in a list: any
    /// copy of the confirmed id is dropped before the placeholder is
    /// replaced in place. Values that no longer hold the speculative entity
    /// (refetched meanwhile) are left alone.
    pub fn apply(&self, value: &mut Value) {
        if is_single(value) {
            if id_of(value) == Some(self.id) {
                *value = self.confirmed.clone();
            }
            return;
        }

        let confirmed_id = id_of(&self.confirmed);
        let Some(list) = items_mut(value) else {
            return;
        };
        let Some(index) = index_of(list, self.id) else {
            return;
        };
        list[index] = self.confirmed.clone();

        if confirmed_id != Some(self.id) {
            let mut duplicates = 0i64;
            let mut position = 0;
            list.retain(|item| {
                let keep = position == index || id_of(item) != confirmed_id;
                position += 1;
                if !keep {
                    duplicates += 1;
                }
                keep
            });
            if duplicates > 0 {
                adjust_total(value, -duplicates);
            }
        }
    }
}
