use std::collections::{hash_map::Entry, HashMap, HashSet};

use super::identity::{IdentityKey, Persisted};

/// Operations that turn a persisted child collection into a proposed one.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<Id, P> {
    pub to_create: Vec<P>,
    pub to_update: Vec<(Id, P)>,
    pub to_delete: Vec<Id>,
}

impl<Id, P> Reconciliation<Id, P> {
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Diffs `existing` rows against `proposed` items by natural key.
///
/// Items whose key has no row are created, items whose key matches a row
/// update that row, and rows matched by nothing are deleted. When `proposed`
/// repeats a key the last payload wins, placed where the key first appeared.
/// When `existing` repeats a key the first row owns it and the rest are
/// deleted.
pub fn reconcile<E, P>(existing: &[E], proposed: Vec<P>) -> Reconciliation<E::Id, P>
where
    E: IdentityKey + Persisted,
    P: IdentityKey<Key = E::Key>,
{
    let mut by_key: HashMap<E::Key, E::Id> = HashMap::with_capacity(existing.len());
    for row in existing {
        by_key
            .entry(row.identity_key())
            .or_insert_with(|| row.persisted_id());
    }

    let mut slots: HashMap<E::Key, usize> = HashMap::with_capacity(proposed.len());
    let mut deduped: Vec<P> = Vec::with_capacity(proposed.len());
    for item in proposed {
        match slots.entry(item.identity_key()) {
            Entry::Occupied(slot) => deduped[*slot.get()] = item,
            Entry::Vacant(slot) => {
                slot.insert(deduped.len());
                deduped.push(item);
            }
        }
    }

    let mut kept: HashSet<E::Id> = HashSet::with_capacity(existing.len());
    let mut to_create = vec![];
    let mut to_update = vec![];
    for item in deduped {
        match by_key.get(&item.identity_key()) {
            Some(&id) => {
                kept.insert(id);
                to_update.push((id, item));
            }
            None => to_create.push(item),
        }
    }

    let to_delete = existing
        .iter()
        .map(|row| row.persisted_id())
        .filter(|id| !kept.contains(id))
        .collect();

    Reconciliation {
        to_create,
        to_update,
        to_delete,
    }
}
