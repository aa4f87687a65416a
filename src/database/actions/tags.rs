use crate::{
    error::StorageError,
    gateway::GatewayTx,
    reconcile::{reconcile, Reconciliation},
    schema::{RecipeId, TagId, TagRow},
};

pub type TagPlan = Reconciliation<TagId, String>;

/// Matches proposed tag names to a recipe's tag rows. Tags carry nothing
/// besides their name, so `to_update` only records which rows survive.
pub fn reconcile_tags(existing: &[TagRow], proposed: Vec<String>) -> TagPlan {
    reconcile(existing, proposed)
}

pub async fn create_tags<T: GatewayTx>(
    tx: &mut T,
    recipe_id: RecipeId,
    plan: &TagPlan,
) -> Result<(), StorageError> {
    for name in &plan.to_create {
        tx.insert_tag(recipe_id, name).await?;
    }

    Ok(())
}

pub async fn delete_tags<T: GatewayTx>(tx: &mut T, plan: &TagPlan) -> Result<(), StorageError> {
    for id in &plan.to_delete {
        tx.delete_tag(*id).await?;
    }

    Ok(())
}

pub async fn list_tag_names<T: GatewayTx>(
    tx: &mut T,
    recipe_id: RecipeId,
) -> Result<Vec<String>, StorageError> {
    let tags = tx.tags(recipe_id).await?;
    Ok(tags.into_iter().map(|tag| tag.name).collect())
}
