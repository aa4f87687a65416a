use serde::{Deserialize, Serialize};

pub type RecipeId = i64;
pub type IngredientId = i64;
pub type TagId = i64;

/// The authenticated subject every query is scoped by.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type, Serialize, Deserialize,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar columns of a recipe, shared by inserts and updates.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeFields {
    pub name: String,
    pub cooking_time: String,
    pub description: String,
    pub instructions: String,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct RecipeRow {
    pub id: RecipeId,
    pub owner_id: OwnerId,
    pub name: String,
    pub cooking_time: String,
    pub description: String,
    pub instructions: String,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct IngredientRow {
    pub id: IngredientId,
    pub owner_id: OwnerId,
    pub recipe_id: RecipeId,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct TagRow {
    pub id: TagId,
    pub recipe_id: RecipeId,
    pub name: String,
}

/// Mutable part of an ingredient. The name is its identity and never changes
/// through an update.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct IngredientPayload {
    pub quantity: f64,
    pub unit: String,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct IngredientInput {
    pub name: String,
    #[serde(flatten)]
    pub payload: IngredientPayload,
}

impl IngredientInput {
    pub fn new(name: &str, quantity: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            payload: IngredientPayload {
                quantity,
                unit: unit.to_string(),
            },
        }
    }
}

/// Proposed state of a recipe, as sent by the owner on create and update.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeInput {
    #[serde(flatten)]
    pub fields: RecipeFields,
    pub ingredients: Vec<IngredientInput>,
    pub tags: Vec<String>,
}

impl RecipeInput {
    pub fn named(name: &str) -> Self {
        Self {
            fields: RecipeFields {
                name: name.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_ingredient(mut self, name: &str, quantity: f64, unit: &str) -> Self {
        self.ingredients.push(IngredientInput::new(name, quantity, unit));
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub id: IngredientId,
    pub recipe_id: RecipeId,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

impl From<IngredientRow> for Ingredient {
    fn from(row: IngredientRow) -> Self {
        Self {
            id: row.id,
            recipe_id: row.recipe_id,
            name: row.name,
            quantity: row.quantity,
            unit: row.unit,
        }
    }
}

/// Listing view of a recipe; leaves out ingredients and instructions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSummary {
    pub id: RecipeId,
    pub name: String,
    pub cooking_time: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: RecipeId,
    pub owner_id: OwnerId,
    pub name: String,
    pub cooking_time: String,
    pub description: String,
    pub instructions: String,
    pub ingredients: Vec<Ingredient>,
    pub tags: Vec<String>,
}

impl Recipe {
    pub fn from_rows(row: RecipeRow, ingredients: Vec<IngredientRow>, tags: Vec<TagRow>) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            cooking_time: row.cooking_time,
            description: row.description,
            instructions: row.instructions,
            ingredients: ingredients.into_iter().map(Ingredient::from).collect(),
            tags: tags.into_iter().map(|tag| tag.name).collect(),
        }
    }
}
