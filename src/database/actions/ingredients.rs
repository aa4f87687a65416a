use crate::{
    error::StorageError,
    gateway::GatewayTx,
    reconcile::{reconcile, Reconciliation},
    schema::{Ingredient, IngredientId, IngredientInput, IngredientRow, OwnerId, RecipeId},
};

pub type IngredientPlan = Reconciliation<IngredientId, IngredientInput>;

/// Matches proposed ingredients to a recipe's rows by exact name. A matched
/// row keeps its id and takes the proposed quantity and unit; a renamed
/// ingredient shows up as one delete plus one create.
pub fn reconcile_ingredients(
    existing: &[IngredientRow],
    proposed: Vec<IngredientInput>,
) -> IngredientPlan {
    reconcile(existing, proposed)
}

pub async fn create_ingredients<T: GatewayTx>(
    tx: &mut T,
    owner: OwnerId,
    recipe_id: RecipeId,
    plan: &IngredientPlan,
) -> Result<(), StorageError> {
    for ingredient in &plan.to_create {
        tx.insert_ingredient(owner, recipe_id, &ingredient.name, &ingredient.payload)
            .await?;
    }

    Ok(())
}

pub async fn update_ingredients<T: GatewayTx>(
    tx: &mut T,
    plan: &IngredientPlan,
) -> Result<(), StorageError> {
    for (id, ingredient) in &plan.to_update {
        tx.update_ingredient(*id, &ingredient.payload).await?;
    }

    Ok(())
}

pub async fn delete_ingredients<T: GatewayTx>(
    tx: &mut T,
    plan: &IngredientPlan,
) -> Result<(), StorageError> {
    for id in &plan.to_delete {
        tx.delete_ingredient(*id).await?;
    }

    Ok(())
}

/// Ingredients of each requested recipe the owner has, in request order.
/// Ids that are unknown or belong to someone else contribute nothing; a
/// repeated id lists its ingredients again.
pub async fn list_ingredients_by_recipes<T: GatewayTx>(
    tx: &mut T,
    owner: OwnerId,
    recipe_ids: &[RecipeId],
) -> Result<Vec<Ingredient>, StorageError> {
    let mut ingredients = vec![];

    for &recipe_id in recipe_ids {
        if tx.recipe(owner, recipe_id).await?.is_none() {
            continue;
        }

        let rows = tx.ingredients(recipe_id).await?;
        ingredients.extend(rows.into_iter().map(Ingredient::from));
    }

    Ok(ingredients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gateway::PersistenceGateway, memory::MemoryGateway, schema::RecipeFields};

    fn row(id: IngredientId, name: &str, quantity: f64, unit: &str) -> IngredientRow {
        IngredientRow {
            id,
            owner_id: OwnerId(1),
            recipe_id: 10,
            name: name.to_string(),
            quantity,
            unit: unit.to_string(),
        }
    }

    #[test]
    fn matched_names_carry_the_new_payload() {
        let existing = vec![row(1, "flour", 200., "g"), row(2, "milk", 3., "dl")];
        let plan = reconcile_ingredients(
            &existing,
            vec![
                IngredientInput::new("flour", 250., "g"),
                IngredientInput::new("milk", 0.5, "l"),
            ],
        );

        assert!(plan.to_create.is_empty());
        assert!(plan.to_delete.is_empty());
        assert_eq!(
            plan.to_update,
            vec![
                (1, IngredientInput::new("flour", 250., "g")),
                (2, IngredientInput::new("milk", 0.5, "l")),
            ]
        );
    }

    #[test]
    fn rename_is_delete_plus_create() {
        let existing = vec![row(1, "sugar", 1., "tbsp")];
        let plan = reconcile_ingredients(&existing, vec![IngredientInput::new("honey", 1., "tbsp")]);

        assert_eq!(plan.to_create, vec![IngredientInput::new("honey", 1., "tbsp")]);
        assert!(plan.to_update.is_empty());
        assert_eq!(plan.to_delete, vec![1]);
    }

    #[test]
    fn names_compare_case_sensitively() {
        let existing = vec![row(1, "Salt", 1., "tsp")];
        let plan = reconcile_ingredients(&existing, vec![IngredientInput::new("salt", 1., "tsp")]);

        assert_eq!(plan.to_create.len(), 1);
        assert_eq!(plan.to_delete, vec![1]);
    }

    #[test]
    fn duplicate_names_collapse_to_the_last() {
        let plan = reconcile_ingredients(
            &[],
            vec![
                IngredientInput::new("salt", 1., ""),
                IngredientInput::new("salt", 2., ""),
            ],
        );

        assert_eq!(plan.to_create, vec![IngredientInput::new("salt", 2., "")]);
    }

    #[tokio::test]
    async fn repeated_recipe_ids_are_listed_each_time() {
        let gateway = MemoryGateway::new();
        let mut tx = gateway.begin().await.unwrap();
        let fields = RecipeFields {
            name: "Soup".to_string(),
            ..Default::default()
        };
        let id = tx.insert_recipe(OwnerId(1), &fields).await.unwrap();
        let salt = IngredientInput::new("salt", 1., "tsp");
        tx.insert_ingredient(OwnerId(1), id, &salt.name, &salt.payload)
            .await
            .unwrap();

        let listed = list_ingredients_by_recipes(&mut tx, OwnerId(1), &[id, id])
            .await
            .unwrap();
        let names: Vec<_> = listed.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["salt", "salt"]);

        let foreign = list_ingredients_by_recipes(&mut tx, OwnerId(2), &[id])
            .await
            .unwrap();
        assert!(foreign.is_empty());
    }
}
