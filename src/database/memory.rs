//! In-memory implementation of [`PersistenceGateway`].
//!
//! [`MemoryGateway`] keeps the three tables in `BTreeMap`s and enforces the
//! same rules as the Postgres schema: unique `(recipe_id, name)` for
//! ingredients and tags, children must reference an existing recipe, and
//! deleting a recipe cascades to its children.
//!
//! A transaction works on a private copy of the tables and records every
//! write in a journal. Commit replays the journal onto the shared tables in
//! one step; dropping the transaction throws the journal away.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use super::{
    error::StorageError,
    gateway::{GatewayTx, PersistenceGateway},
    schema::{
        IngredientId, IngredientPayload, IngredientRow, OwnerId, RecipeFields, RecipeId,
        RecipeRow, TagId, TagRow,
    },
};

#[derive(Debug, Clone, Default)]
struct Tables {
    recipes: BTreeMap<RecipeId, RecipeRow>,
    ingredients: BTreeMap<IngredientId, IngredientRow>,
    tags: BTreeMap<TagId, TagRow>,
}

#[derive(Debug, Clone)]
enum Write {
    InsertRecipe(RecipeRow),
    UpdateRecipe(RecipeId, RecipeFields),
    DeleteRecipe(RecipeId),
    InsertIngredient(IngredientRow),
    UpdateIngredient(IngredientId, IngredientPayload),
    DeleteIngredient(IngredientId),
    InsertTag(TagRow),
    DeleteTag(TagId),
}

impl Tables {
    fn apply(&mut self, write: &Write) -> Result<(), StorageError> {
        match write {
            Write::InsertRecipe(row) => {
                self.recipes.insert(row.id, row.clone());
            }
            Write::UpdateRecipe(id, fields) => {
                if let Some(row) = self.recipes.get_mut(id) {
                    row.name = fields.name.to_owned();
                    row.cooking_time = fields.cooking_time.to_owned();
                    row.description = fields.description.to_owned();
                    row.instructions = fields.instructions.to_owned();
                }
            }
            Write::DeleteRecipe(id) => {
                self.recipes.remove(id);
                self.ingredients.retain(|_, row| row.recipe_id != *id);
                self.tags.retain(|_, row| row.recipe_id != *id);
            }
            Write::InsertIngredient(row) => {
                self.check_parent(row.recipe_id)?;
                if row.quantity.is_nan() || row.quantity < 0. {
                    return Err(StorageError::Constraint(format!(
                        "ingredients.quantity must be non-negative, got {}",
                        row.quantity
                    )));
                }
                if self
                    .ingredients
                    .values()
                    .any(|other| other.recipe_id == row.recipe_id && other.name == row.name)
                {
                    return Err(StorageError::Constraint(format!(
                        "duplicate ingredient {:?} in recipe {}",
                        row.name, row.recipe_id
                    )));
                }
                self.ingredients.insert(row.id, row.clone());
            }
            Write::UpdateIngredient(id, payload) => {
                if let Some(row) = self.ingredients.get_mut(id) {
                    row.quantity = payload.quantity;
                    row.unit = payload.unit.to_owned();
                }
            }
            Write::DeleteIngredient(id) => {
                self.ingredients.remove(id);
            }
            Write::InsertTag(row) => {
                self.check_parent(row.recipe_id)?;
                if self
                    .tags
                    .values()
                    .any(|other| other.recipe_id == row.recipe_id && other.name == row.name)
                {
                    return Err(StorageError::Constraint(format!(
                        "duplicate tag {:?} in recipe {}",
                        row.name, row.recipe_id
                    )));
                }
                self.tags.insert(row.id, row.clone());
            }
            Write::DeleteTag(id) => {
                self.tags.remove(id);
            }
        }

        Ok(())
    }

    fn check_parent(&self, recipe_id: RecipeId) -> Result<(), StorageError> {
        if self.recipes.contains_key(&recipe_id) {
            Ok(())
        } else {
            Err(StorageError::Constraint(format!(
                "recipe {recipe_id} does not exist"
            )))
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    next_id: AtomicI64,
    locks: Mutex<HashMap<RecipeId, Arc<tokio::sync::Mutex<()>>>>,
    write_budget: Mutex<Option<usize>>,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the guard cannot leave the tables half
        // written: commits build the new state on a copy first.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn recipe_lock(&self, id: RecipeId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id).or_default().clone()
    }

    /// Forgets the locks of `ids` that no other transaction holds or waits on.
    fn release_locks(&self, ids: &[RecipeId]) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        for id in ids {
            if locks.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(id);
            }
        }
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn spend_write(&self) -> Result<(), StorageError> {
        let mut budget = self.write_budget.lock().unwrap_or_else(|e| e.into_inner());
        match *budget {
            Some(0) => Err(StorageError::Unavailable(format!(
                "Injected write failure"
            ))),
            Some(ref mut remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Gateway over process-local tables. Cloning shares the tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    shared: Arc<Shared>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the next `writes` statements succeed and fails every one after
    /// that with [`StorageError::Unavailable`]. Used to exercise rollback.
    pub fn fail_after_writes(&self, writes: usize) {
        *self
            .shared
            .write_budget
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(writes);
    }

    pub fn clear_write_failures(&self) {
        *self
            .shared
            .write_budget
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn recipe_count(&self) -> usize {
        self.shared.tables().recipes.len()
    }

    pub fn ingredient_count(&self) -> usize {
        self.shared.tables().ingredients.len()
    }

    pub fn tag_count(&self) -> usize {
        self.shared.tables().tags.len()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StorageError> {
        let working = self.shared.tables().clone();

        Ok(MemoryTx {
            shared: self.shared.clone(),
            working,
            journal: vec![],
            held: HeldLocks {
                shared: self.shared.clone(),
                guards: vec![],
            },
        })
    }
}

/// Recipe locks taken by one transaction, released together on commit or
/// drop.
struct HeldLocks {
    shared: Arc<Shared>,
    guards: Vec<(RecipeId, OwnedMutexGuard<()>)>,
}

impl HeldLocks {
    fn holds(&self, id: RecipeId) -> bool {
        self.guards.iter().any(|(held, _)| *held == id)
    }
}

impl Drop for HeldLocks {
    fn drop(&mut self) {
        let ids: Vec<RecipeId> = self
            .guards
            .drain(..)
            .map(|(id, guard)| {
                drop(guard);
                id
            })
            .collect();
        self.shared.release_locks(&ids);
    }
}

pub struct MemoryTx {
    shared: Arc<Shared>,
    working: Tables,
    journal: Vec<Write>,
    held: HeldLocks,
}

impl MemoryTx {
    fn write(&mut self, write: Write) -> Result<(), StorageError> {
        self.shared.spend_write()?;
        self.working.apply(&write)?;
        self.journal.push(write);
        Ok(())
    }

    /// Re-reads the shared tables and replays this transaction's own writes
    /// on top, so reads after acquiring a lock see the latest committed rows.
    fn refresh(&mut self) -> Result<(), StorageError> {
        let mut working = self.shared.tables().clone();
        for write in &self.journal {
            working.apply(write)?;
        }
        self.working = working;
        Ok(())
    }

    fn owned_recipe(&self, owner: OwnerId, id: RecipeId) -> Option<RecipeRow> {
        self.working
            .recipes
            .get(&id)
            .filter(|row| row.owner_id == owner)
            .cloned()
    }
}

#[async_trait]
impl GatewayTx for MemoryTx {
    async fn lock_recipe(
        &mut self,
        owner: OwnerId,
        id: RecipeId,
    ) -> Result<Option<RecipeRow>, StorageError> {
        if !self.held.holds(id) {
            let lock = self.shared.recipe_lock(id);
            let guard = lock.lock_owned().await;
            self.held.guards.push((id, guard));
            self.refresh()?;
        }

        Ok(self.owned_recipe(owner, id))
    }

    async fn recipe(
        &mut self,
        owner: OwnerId,
        id: RecipeId,
    ) -> Result<Option<RecipeRow>, StorageError> {
        Ok(self.owned_recipe(owner, id))
    }

    async fn recipes(&mut self, owner: OwnerId) -> Result<Vec<RecipeRow>, StorageError> {
        Ok(self
            .working
            .recipes
            .values()
            .filter(|row| row.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn ingredients(
        &mut self,
        recipe_id: RecipeId,
    ) -> Result<Vec<IngredientRow>, StorageError> {
        Ok(self
            .working
            .ingredients
            .values()
            .filter(|row| row.recipe_id == recipe_id)
            .cloned()
            .collect())
    }

    async fn ingredient_by_name(
        &mut self,
        recipe_id: RecipeId,
        name: &str,
    ) -> Result<Option<IngredientRow>, StorageError> {
        Ok(self
            .working
            .ingredients
            .values()
            .find(|row| row.recipe_id == recipe_id && row.name == name)
            .cloned())
    }

    async fn ingredient_names(&mut self, owner: OwnerId) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self
            .working
            .ingredients
            .values()
            .filter(|row| row.owner_id == owner)
            .map(|row| row.name.to_owned())
            .collect();
        names.sort();
        names.dedup();

        Ok(names)
    }

    async fn tags(&mut self, recipe_id: RecipeId) -> Result<Vec<TagRow>, StorageError> {
        Ok(self
            .working
            .tags
            .values()
            .filter(|row| row.recipe_id == recipe_id)
            .cloned()
            .collect())
    }

    async fn tag_by_name(
        &mut self,
        recipe_id: RecipeId,
        name: &str,
    ) -> Result<Option<TagRow>, StorageError> {
        Ok(self
            .working
            .tags
            .values()
            .find(|row| row.recipe_id == recipe_id && row.name == name)
            .cloned())
    }

    async fn insert_recipe(
        &mut self,
        owner: OwnerId,
        fields: &RecipeFields,
    ) -> Result<RecipeId, StorageError> {
        let id = self.shared.allocate_id();
        self.write(Write::InsertRecipe(RecipeRow {
            id,
            owner_id: owner,
            name: fields.name.to_owned(),
            cooking_time: fields.cooking_time.to_owned(),
            description: fields.description.to_owned(),
            instructions: fields.instructions.to_owned(),
        }))?;

        Ok(id)
    }

    async fn update_recipe(
        &mut self,
        id: RecipeId,
        fields: &RecipeFields,
    ) -> Result<(), StorageError> {
        self.write(Write::UpdateRecipe(id, fields.clone()))
    }

    async fn delete_recipe(&mut self, id: RecipeId) -> Result<bool, StorageError> {
        let existed = self.working.recipes.contains_key(&id);
        self.write(Write::DeleteRecipe(id))?;

        Ok(existed)
    }

    async fn insert_ingredient(
        &mut self,
        owner: OwnerId,
        recipe_id: RecipeId,
        name: &str,
        payload: &IngredientPayload,
    ) -> Result<IngredientId, StorageError> {
        let id = self.shared.allocate_id();
        self.write(Write::InsertIngredient(IngredientRow {
            id,
            owner_id: owner,
            recipe_id,
            name: name.to_string(),
            quantity: payload.quantity,
            unit: payload.unit.to_owned(),
        }))?;

        Ok(id)
    }

    async fn update_ingredient(
        &mut self,
        id: IngredientId,
        payload: &IngredientPayload,
    ) -> Result<(), StorageError> {
        self.write(Write::UpdateIngredient(id, payload.clone()))
    }

    async fn delete_ingredient(&mut self, id: IngredientId) -> Result<(), StorageError> {
        self.write(Write::DeleteIngredient(id))
    }

    async fn insert_tag(&mut self, recipe_id: RecipeId, name: &str) -> Result<TagId, StorageError> {
        let id = self.shared.allocate_id();
        self.write(Write::InsertTag(TagRow {
            id,
            recipe_id,
            name: name.to_string(),
        }))?;

        Ok(id)
    }

    async fn delete_tag(&mut self, id: TagId) -> Result<(), StorageError> {
        self.write(Write::DeleteTag(id))
    }

    async fn commit(self) -> Result<(), StorageError> {
        let mut tables = self.shared.tables();
        let mut next = tables.clone();
        for write in &self.journal {
            next.apply(write)?;
        }
        *tables = next;
        drop(tables);
        drop(self.held);

        Ok(())
    }

    async fn rollback(self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    async fn committed_recipe(gateway: &MemoryGateway, name: &str) -> RecipeId {
        let mut tx = gateway.begin().await.unwrap();
        let id = tx.insert_recipe(OwnerId(1), &fields(name)).await.unwrap();
        tx.commit().await.unwrap();
        id
    }

    fn lock_entries(gateway: &MemoryGateway) -> usize {
        gateway.shared.locks.lock().unwrap().len()
    }

    fn fields(name: &str) -> RecipeFields {
        RecipeFields {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn payload(quantity: f64) -> IngredientPayload {
        IngredientPayload {
            quantity,
            unit: "g".to_string(),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_rows() {
        let gateway = MemoryGateway::new();
        let mut tx = gateway.begin().await.unwrap();
        let id = tx.insert_recipe(OwnerId(1), &fields("Soup")).await.unwrap();
        tx.insert_tag(id, "dinner").await.unwrap();
        drop(tx);

        assert_eq!(gateway.recipe_count(), 0);
        assert_eq!(gateway.tag_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_ingredient_name_is_a_constraint_violation() {
        let gateway = MemoryGateway::new();
        let mut tx = gateway.begin().await.unwrap();
        let id = tx.insert_recipe(OwnerId(1), &fields("Soup")).await.unwrap();
        tx.insert_ingredient(OwnerId(1), id, "salt", &payload(1.))
            .await
            .unwrap();

        let err = tx
            .insert_ingredient(OwnerId(1), id, "salt", &payload(2.))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)));
    }

    #[tokio::test]
    async fn child_of_missing_recipe_is_rejected() {
        let gateway = MemoryGateway::new();
        let mut tx = gateway.begin().await.unwrap();

        let err = tx.insert_tag(42, "dinner").await.unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)));
    }

    #[tokio::test]
    async fn deleting_a_recipe_cascades() {
        let gateway = MemoryGateway::new();
        let mut tx = gateway.begin().await.unwrap();
        let id = tx.insert_recipe(OwnerId(1), &fields("Soup")).await.unwrap();
        tx.insert_ingredient(OwnerId(1), id, "salt", &payload(1.))
            .await
            .unwrap();
        tx.insert_tag(id, "dinner").await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = gateway.begin().await.unwrap();
        assert!(tx.delete_recipe(id).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(gateway.recipe_count(), 0);
        assert_eq!(gateway.ingredient_count(), 0);
        assert_eq!(gateway.tag_count(), 0);
    }

    #[tokio::test]
    async fn lock_recipe_is_scoped_by_owner() {
        let gateway = MemoryGateway::new();
        let id = committed_recipe(&gateway, "Soup").await;

        let mut tx = gateway.begin().await.unwrap();
        assert!(tx.lock_recipe(OwnerId(2), id).await.unwrap().is_none());

        // the transaction already holds this lock
        let relocked = timeout(WAIT, tx.lock_recipe(OwnerId(1), id))
            .await
            .expect("relocking within one transaction must not wait");
        assert!(relocked.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_writer_waits_for_the_lock_and_sees_committed_rows() {
        let gateway = MemoryGateway::new();
        let id = committed_recipe(&gateway, "Soup").await;

        let mut first = gateway.begin().await.unwrap();
        first.lock_recipe(OwnerId(1), id).await.unwrap();
        first
            .insert_ingredient(OwnerId(1), id, "salt", &payload(1.))
            .await
            .unwrap();

        let mut second = gateway.begin().await.unwrap();
        assert!(timeout(WAIT, second.lock_recipe(OwnerId(1), id))
            .await
            .is_err());

        first.commit().await.unwrap();

        let locked = timeout(WAIT, second.lock_recipe(OwnerId(1), id))
            .await
            .expect("lock is free after commit");
        assert!(locked.unwrap().is_some());

        let names: Vec<_> = second
            .ingredients(id)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.name)
            .collect();
        assert_eq!(names, vec!["salt"]);
    }

    #[tokio::test]
    async fn different_recipes_do_not_contend() {
        let gateway = MemoryGateway::new();
        let soup = committed_recipe(&gateway, "Soup").await;
        let stew = committed_recipe(&gateway, "Stew").await;

        let mut first = gateway.begin().await.unwrap();
        first.lock_recipe(OwnerId(1), soup).await.unwrap();

        let mut second = gateway.begin().await.unwrap();
        let locked = timeout(WAIT, second.lock_recipe(OwnerId(1), stew))
            .await
            .expect("another recipe's lock is independent");
        assert!(locked.unwrap().is_some());
    }

    #[tokio::test]
    async fn released_locks_are_forgotten() {
        let gateway = MemoryGateway::new();
        let id = committed_recipe(&gateway, "Soup").await;

        let mut tx = gateway.begin().await.unwrap();
        tx.lock_recipe(OwnerId(1), id).await.unwrap();
        tx.lock_recipe(OwnerId(1), 404).await.unwrap();
        assert_eq!(lock_entries(&gateway), 2);
        drop(tx);
        assert_eq!(lock_entries(&gateway), 0);

        let mut tx = gateway.begin().await.unwrap();
        tx.lock_recipe(OwnerId(1), id).await.unwrap();
        tx.delete_recipe(id).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(lock_entries(&gateway), 0);
    }

    #[tokio::test]
    async fn waiting_writer_keeps_the_lock_entry() {
        let gateway = MemoryGateway::new();
        let id = committed_recipe(&gateway, "Soup").await;

        let mut first = gateway.begin().await.unwrap();
        first.lock_recipe(OwnerId(1), id).await.unwrap();

        let waiter = {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                let mut tx = gateway.begin().await.unwrap();
                tx.lock_recipe(OwnerId(1), id).await.unwrap().is_some()
            })
        };
        tokio::task::yield_now().await;

        first.rollback().await.unwrap();
        assert!(waiter.await.unwrap());
        assert_eq!(lock_entries(&gateway), 0);
    }

    #[tokio::test]
    async fn write_budget_fails_later_statements() {
        let gateway = MemoryGateway::new();
        gateway.fail_after_writes(1);

        let mut tx = gateway.begin().await.unwrap();
        let id = tx.insert_recipe(OwnerId(1), &fields("Soup")).await.unwrap();
        let err = tx.insert_tag(id, "dinner").await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));

        gateway.clear_write_failures();
        assert!(tx.insert_tag(id, "dinner").await.is_ok());
    }
}
