use crate::{
    error::StoreError,
    gateway::{GatewayTx, PersistenceGateway},
    schema::{Ingredient, OwnerId, Recipe, RecipeId, RecipeInput, RecipeSummary},
};

use super::{
    ingredients::{
        create_ingredients, delete_ingredients, list_ingredients_by_recipes,
        reconcile_ingredients, update_ingredients, IngredientPlan,
    },
    tags::{create_tags, delete_tags, list_tag_names, reconcile_tags, TagPlan},
};

/// Owner-scoped recipe operations over an injected gateway.
///
/// Every operation runs in a single transaction. `update` and `delete` take
/// a row lock on the recipe before reading its children, so two writers of
/// the same recipe are serialized while writers of different recipes are
/// not. Any error drops the transaction and with it every write made so far.
#[derive(Debug, Clone)]
pub struct RecipeStore<G> {
    gateway: G,
}

impl<G: PersistenceGateway> RecipeStore<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub async fn list(&self, owner: OwnerId) -> Result<Vec<RecipeSummary>, StoreError> {
        let mut tx = self.gateway.begin().await?;

        let rows = tx.recipes(owner).await?;
        let mut recipes = Vec::with_capacity(rows.len());
        for row in rows {
            let tags = list_tag_names(&mut tx, row.id).await?;
            recipes.push(RecipeSummary {
                id: row.id,
                name: row.name,
                cooking_time: row.cooking_time,
                description: row.description,
                tags,
            });
        }

        tx.rollback().await?;
        Ok(recipes)
    }

    pub async fn get(&self, owner: OwnerId, id: RecipeId) -> Result<Recipe, StoreError> {
        let mut tx = self.gateway.begin().await?;

        let row = tx
            .recipe(owner, id)
            .await?
            .ok_or_else(|| StoreError::recipe_not_found(id))?;
        let ingredients = tx.ingredients(id).await?;
        let tags = tx.tags(id).await?;

        tx.rollback().await?;
        Ok(Recipe::from_rows(row, ingredients, tags))
    }

    pub async fn create(&self, owner: OwnerId, input: RecipeInput) -> Result<RecipeId, StoreError> {
        input.validate()?;
        let RecipeInput {
            fields,
            ingredients,
            tags,
        } = input;

        let mut tx = self.gateway.begin().await?;
        let id = tx.insert_recipe(owner, &fields).await?;

        let ingredient_plan = reconcile_ingredients(&[], ingredients);
        let tag_plan = reconcile_tags(&[], tags);
        apply(&mut tx, owner, id, &ingredient_plan, &tag_plan).await?;

        tx.commit().await?;
        log::info!(
            "Created recipe {id} for owner {owner} ({} ingredients, {} tags)",
            ingredient_plan.to_create.len(),
            tag_plan.to_create.len()
        );

        Ok(id)
    }

    pub async fn update(
        &self,
        owner: OwnerId,
        id: RecipeId,
        input: RecipeInput,
    ) -> Result<RecipeId, StoreError> {
        input.validate()?;
        let RecipeInput {
            fields,
            ingredients,
            tags,
        } = input;

        let mut tx = self.gateway.begin().await?;
        if tx.lock_recipe(owner, id).await?.is_none() {
            return Err(StoreError::recipe_not_found(id));
        }

        tx.update_recipe(id, &fields).await?;

        let current_ingredients = tx.ingredients(id).await?;
        let current_tags = tx.tags(id).await?;
        let ingredient_plan = reconcile_ingredients(&current_ingredients, ingredients);
        let tag_plan = reconcile_tags(&current_tags, tags);
        log::debug!(
            "Recipe {id}: ingredients +{} ~{} -{}, tags +{} -{}",
            ingredient_plan.to_create.len(),
            ingredient_plan.to_update.len(),
            ingredient_plan.to_delete.len(),
            tag_plan.to_create.len(),
            tag_plan.to_delete.len()
        );

        apply(&mut tx, owner, id, &ingredient_plan, &tag_plan).await?;

        tx.commit().await?;
        Ok(id)
    }

    pub async fn delete(&self, owner: OwnerId, id: RecipeId) -> Result<(), StoreError> {
        let mut tx = self.gateway.begin().await?;
        if tx.lock_recipe(owner, id).await?.is_none() {
            return Err(StoreError::recipe_not_found(id));
        }

        if !tx.delete_recipe(id).await? {
            return Err(StoreError::recipe_not_found(id));
        }

        tx.commit().await?;
        log::info!("Deleted recipe {id} for owner {owner}");

        Ok(())
    }

    pub async fn list_ingredient_names(&self, owner: OwnerId) -> Result<Vec<String>, StoreError> {
        let mut tx = self.gateway.begin().await?;
        let names = tx.ingredient_names(owner).await?;
        tx.rollback().await?;

        Ok(names)
    }

    pub async fn list_ingredients_by_recipes(
        &self,
        owner: OwnerId,
        recipe_ids: &[RecipeId],
    ) -> Result<Vec<Ingredient>, StoreError> {
        let mut tx = self.gateway.begin().await?;
        let ingredients = list_ingredients_by_recipes(&mut tx, owner, recipe_ids).await?;
        tx.rollback().await?;

        Ok(ingredients)
    }
}

/// Applies both plans phase by phase: every create, then every update, then
/// every delete.
async fn apply<T: GatewayTx>(
    tx: &mut T,
    owner: OwnerId,
    recipe_id: RecipeId,
    ingredients: &IngredientPlan,
    tags: &TagPlan,
) -> Result<(), StoreError> {
    create_ingredients(tx, owner, recipe_id, ingredients).await?;
    create_tags(tx, recipe_id, tags).await?;

    update_ingredients(tx, ingredients).await?;

    delete_ingredients(tx, ingredients).await?;
    delete_tags(tx, tags).await?;

    Ok(())
}
