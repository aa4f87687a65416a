//! The storage contract the recipe store runs against.
//!
//! A [`PersistenceGateway`] hands out transactions; every read and write of a
//! store operation goes through one [`GatewayTx`]. Dropping a transaction
//! without calling [`GatewayTx::commit`] discards all of its writes, which is
//! what makes an aborted or cancelled operation leave no partial state.
//!
//! "No row" is reported as `Ok(None)`; errors are reserved for real storage
//! failures.

use async_trait::async_trait;

use super::{
    error::StorageError,
    schema::{
        IngredientId, IngredientPayload, IngredientRow, OwnerId, RecipeFields, RecipeId,
        RecipeRow, TagId, TagRow,
    },
};

#[async_trait]
pub trait PersistenceGateway: Send + Sync + 'static {
    type Tx: GatewayTx;

    async fn begin(&self) -> Result<Self::Tx, StorageError>;
}

#[async_trait]
pub trait GatewayTx: Send + Sized {
    /// Loads an owner's recipe and holds a write lock on it until the
    /// transaction ends. Writers of other recipes are not blocked.
    async fn lock_recipe(
        &mut self,
        owner: OwnerId,
        id: RecipeId,
    ) -> Result<Option<RecipeRow>, StorageError>;

    async fn recipe(
        &mut self,
        owner: OwnerId,
        id: RecipeId,
    ) -> Result<Option<RecipeRow>, StorageError>;

    async fn recipes(&mut self, owner: OwnerId) -> Result<Vec<RecipeRow>, StorageError>;

    async fn ingredients(&mut self, recipe_id: RecipeId)
        -> Result<Vec<IngredientRow>, StorageError>;

    async fn ingredient_by_name(
        &mut self,
        recipe_id: RecipeId,
        name: &str,
    ) -> Result<Option<IngredientRow>, StorageError>;

    /// Distinct ingredient names across all of an owner's recipes, sorted.
    async fn ingredient_names(&mut self, owner: OwnerId) -> Result<Vec<String>, StorageError>;

    async fn tags(&mut self, recipe_id: RecipeId) -> Result<Vec<TagRow>, StorageError>;

    async fn tag_by_name(
        &mut self,
        recipe_id: RecipeId,
        name: &str,
    ) -> Result<Option<TagRow>, StorageError>;

    async fn insert_recipe(
        &mut self,
        owner: OwnerId,
        fields: &RecipeFields,
    ) -> Result<RecipeId, StorageError>;

    async fn update_recipe(
        &mut self,
        id: RecipeId,
        fields: &RecipeFields,
    ) -> Result<(), StorageError>;

    /// Removes the recipe together with its ingredients and tags. Returns
    /// whether a row was removed.
    async fn delete_recipe(&mut self, id: RecipeId) -> Result<bool, StorageError>;

    async fn insert_ingredient(
        &mut self,
        owner: OwnerId,
        recipe_id: RecipeId,
        name: &str,
        payload: &IngredientPayload,
    ) -> Result<IngredientId, StorageError>;

    async fn update_ingredient(
        &mut self,
        id: IngredientId,
        payload: &IngredientPayload,
    ) -> Result<(), StorageError>;

    async fn delete_ingredient(&mut self, id: IngredientId) -> Result<(), StorageError>;

    async fn insert_tag(&mut self, recipe_id: RecipeId, name: &str) -> Result<TagId, StorageError>;

    async fn delete_tag(&mut self, id: TagId) -> Result<(), StorageError>;

    async fn commit(self) -> Result<(), StorageError>;

    async fn rollback(self) -> Result<(), StorageError>;
}
