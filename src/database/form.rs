use std::collections::HashMap;

use serde_json::Value;

use super::{
    error::StoreError,
    schema::{IngredientInput, IngredientPayload, RecipeFields, RecipeInput},
};

pub type FormData = HashMap<String, Value>;

/// Loosely typed request body. Field lookups turn missing keys and wrong
/// types into validation errors naming the field.
pub struct Form {
    inner: HashMap<String, Value>,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    pub fn from_value(value: Value, field: &str) -> Result<Self, StoreError> {
        match value {
            Value::Object(map) => Ok(Self::from_data(map.into_iter().collect())),
            _ => Err(StoreError::validation(field, "expected an object")),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<String, StoreError> {
        match self.get_optional_str(key)? {
            Some(v) => Ok(v),
            None => Err(StoreError::validation(key, "missing field")),
        }
    }

    pub fn get_optional_str(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.inner.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => match value.as_str() {
                Some(v) => Ok(Some(v.to_string())),
                None => Err(StoreError::validation(key, "expected a string")),
            },
        }
    }

    pub fn get_optional_number(&self, key: &str) -> Result<Option<f64>, StoreError> {
        match self.inner.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => match value.as_f64() {
                Some(v) => Ok(Some(v)),
                None => Err(StoreError::validation(key, "expected a number")),
            },
        }
    }

    pub fn get_list(&self, key: &str) -> Result<Vec<Value>, StoreError> {
        match self.inner.get(key) {
            None | Some(Value::Null) => Ok(vec![]),
            Some(Value::Array(values)) => Ok(values.to_owned()),
            Some(_) => Err(StoreError::validation(key, "expected an array")),
        }
    }
}

impl TryFrom<Form> for RecipeInput {
    type Error = StoreError;

    fn try_from(form: Form) -> Result<Self, Self::Error> {
        let fields = RecipeFields {
            name: form.get_str("name")?,
            cooking_time: form.get_optional_str("cookingTime")?.unwrap_or_default(),
            description: form.get_optional_str("description")?.unwrap_or_default(),
            instructions: form.get_optional_str("instructions")?.unwrap_or_default(),
        };

        let ingredients = form
            .get_list("ingredients")?
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let field = format!("ingredients[{i}]");
                IngredientInput::try_from(Form::from_value(value, &field)?)
                    .map_err(|e| prefix_field(e, &field))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tags = form
            .get_list("tags")?
            .into_iter()
            .enumerate()
            .map(|(i, value)| match value {
                Value::String(tag) => Ok(tag),
                _ => Err(StoreError::validation(
                    &format!("tags[{i}]"),
                    "expected a string",
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RecipeInput {
            fields,
            ingredients,
            tags,
        })
    }
}

impl TryFrom<Form> for IngredientInput {
    type Error = StoreError;

    fn try_from(form: Form) -> Result<Self, Self::Error> {
        Ok(IngredientInput {
            name: form.get_str("name")?,
            payload: IngredientPayload {
                quantity: form.get_optional_number("quantity")?.unwrap_or(0.),
                unit: form.get_optional_str("unit")?.unwrap_or_default(),
            },
        })
    }
}

fn prefix_field(error: StoreError, prefix: &str) -> StoreError {
    match error {
        StoreError::Validation { field, reason } => StoreError::Validation {
            field: format!("{prefix}.{field}"),
            reason,
        },
        e => e,
    }
}

impl RecipeInput {
    /// Checks the invariants storage relies on. Runs before any write.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.fields.name.trim().is_empty() {
            return Err(StoreError::validation("name", "must not be blank"));
        }

        for (i, ingredient) in self.ingredients.iter().enumerate() {
            if ingredient.name.trim().is_empty() {
                return Err(StoreError::validation(
                    &format!("ingredients[{i}].name"),
                    "must not be blank",
                ));
            }
            let quantity = ingredient.payload.quantity;
            if !quantity.is_finite() || quantity < 0. {
                return Err(StoreError::validation(
                    &format!("ingredients[{i}].quantity"),
                    "must be a non-negative number",
                ));
            }
        }

        for (i, tag) in self.tags.iter().enumerate() {
            if tag.trim().is_empty() {
                return Err(StoreError::validation(
                    &format!("tags[{i}]"),
                    "must not be blank",
                ));
            }
        }

        Ok(())
    }
}
