pub mod ingredients;
pub mod recipes;
pub mod tags;

pub use recipes::RecipeStore;
