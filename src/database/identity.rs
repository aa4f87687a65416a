use std::hash::Hash;

use super::schema::{IngredientId, IngredientInput, IngredientRow, TagId, TagRow};

/// Natural key of a child entity within its recipe.
///
/// Two entities with equal keys are the same child for diffing purposes,
/// regardless of their store-assigned ids. Keys compare exactly, so `Salt`
/// and `salt` are different ingredients.
pub trait IdentityKey {
    type Key: Eq + Hash + Clone;

    fn identity_key(&self) -> Self::Key;
}

/// A child entity that already has a row in storage.
pub trait Persisted {
    type Id: Copy + Eq + Hash;

    fn persisted_id(&self) -> Self::Id;
}

impl IdentityKey for IngredientRow {
    type Key = String;

    fn identity_key(&self) -> String {
        self.name.to_owned()
    }
}

impl Persisted for IngredientRow {
    type Id = IngredientId;

    fn persisted_id(&self) -> IngredientId {
        self.id
    }
}

impl IdentityKey for IngredientInput {
    type Key = String;

    fn identity_key(&self) -> String {
        self.name.to_owned()
    }
}

impl IdentityKey for TagRow {
    type Key = String;

    fn identity_key(&self) -> String {
        self.name.to_owned()
    }
}

impl Persisted for TagRow {
    type Id = TagId;

    fn persisted_id(&self) -> TagId {
        self.id
    }
}

/// A proposed tag is nothing but its name.
impl IdentityKey for String {
    type Key = String;

    fn identity_key(&self) -> String {
        self.to_owned()
    }
}
