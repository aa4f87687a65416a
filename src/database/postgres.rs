use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres, Transaction};

use super::{
    error::StorageError,
    gateway::{GatewayTx, PersistenceGateway},
    schema::{
        IngredientId, IngredientPayload, IngredientRow, OwnerId, RecipeFields, RecipeId,
        RecipeRow, TagId, TagRow,
    },
};

/// Postgres-backed gateway. Cloning shares the underlying pool.
#[derive(Clone, Debug)]
pub struct PostgresGateway {
    pool: Pool<Postgres>,
}

impl PostgresGateway {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self::new(pool))
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for PostgresGateway {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx, StorageError> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTx { tx })
    }
}

pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl GatewayTx for PostgresTx {
    async fn lock_recipe(
        &mut self,
        owner: OwnerId,
        id: RecipeId,
    ) -> Result<Option<RecipeRow>, StorageError> {
        let row: Option<RecipeRow> = sqlx::query_as(
            "
            SELECT id, owner_id, name, cooking_time, description, instructions
            FROM recipes
            WHERE id = $1 AND owner_id = $2
            FOR UPDATE
        ",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn recipe(
        &mut self,
        owner: OwnerId,
        id: RecipeId,
    ) -> Result<Option<RecipeRow>, StorageError> {
        let row: Option<RecipeRow> = sqlx::query_as(
            "SELECT id, owner_id, name, cooking_time, description, instructions FROM recipes WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn recipes(&mut self, owner: OwnerId) -> Result<Vec<RecipeRow>, StorageError> {
        let rows: Vec<RecipeRow> = sqlx::query_as(
            "SELECT id, owner_id, name, cooking_time, description, instructions FROM recipes WHERE owner_id = $1 ORDER BY id",
        )
        .bind(owner)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows)
    }

    async fn ingredients(
        &mut self,
        recipe_id: RecipeId,
    ) -> Result<Vec<IngredientRow>, StorageError> {
        let rows: Vec<IngredientRow> = sqlx::query_as(
            "SELECT id, owner_id, recipe_id, name, quantity, unit FROM ingredients WHERE recipe_id = $1 ORDER BY id",
        )
        .bind(recipe_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows)
    }

    async fn ingredient_by_name(
        &mut self,
        recipe_id: RecipeId,
        name: &str,
    ) -> Result<Option<IngredientRow>, StorageError> {
        let row: Option<IngredientRow> = sqlx::query_as(
            "SELECT id, owner_id, recipe_id, name, quantity, unit FROM ingredients WHERE recipe_id = $1 AND name = $2",
        )
        .bind(recipe_id)
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn ingredient_names(&mut self, owner: OwnerId) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT name FROM ingredients WHERE owner_id = $1 ORDER BY name",
        )
        .bind(owner)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    async fn tags(&mut self, recipe_id: RecipeId) -> Result<Vec<TagRow>, StorageError> {
        let rows: Vec<TagRow> = sqlx::query_as(
            "SELECT id, recipe_id, name FROM recipe_tags WHERE recipe_id = $1 ORDER BY id",
        )
        .bind(recipe_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows)
    }

    async fn tag_by_name(
        &mut self,
        recipe_id: RecipeId,
        name: &str,
    ) -> Result<Option<TagRow>, StorageError> {
        let row: Option<TagRow> = sqlx::query_as(
            "SELECT id, recipe_id, name FROM recipe_tags WHERE recipe_id = $1 AND name = $2",
        )
        .bind(recipe_id)
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn insert_recipe(
        &mut self,
        owner: OwnerId,
        fields: &RecipeFields,
    ) -> Result<RecipeId, StorageError> {
        let id: (RecipeId,) = sqlx::query_as(
            "
            INSERT INTO recipes (owner_id, name, cooking_time, description, instructions)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
        ",
        )
        .bind(owner)
        .bind(&fields.name)
        .bind(&fields.cooking_time)
        .bind(&fields.description)
        .bind(&fields.instructions)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id.0)
    }

    async fn update_recipe(
        &mut self,
        id: RecipeId,
        fields: &RecipeFields,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE recipes SET name = $1, cooking_time = $2, description = $3, instructions = $4 WHERE id = $5",
        )
        .bind(&fields.name)
        .bind(&fields.cooking_time)
        .bind(&fields.description)
        .bind(&fields.instructions)
        .bind(id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_recipe(&mut self, id: RecipeId) -> Result<bool, StorageError> {
        let query = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(query.rows_affected() > 0)
    }

    async fn insert_ingredient(
        &mut self,
        owner: OwnerId,
        recipe_id: RecipeId,
        name: &str,
        payload: &IngredientPayload,
    ) -> Result<IngredientId, StorageError> {
        let id: (IngredientId,) = sqlx::query_as(
            "
            INSERT INTO ingredients (owner_id, recipe_id, name, quantity, unit)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
        ",
        )
        .bind(owner)
        .bind(recipe_id)
        .bind(name)
        .bind(payload.quantity)
        .bind(&payload.unit)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id.0)
    }

    async fn update_ingredient(
        &mut self,
        id: IngredientId,
        payload: &IngredientPayload,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE ingredients SET quantity = $1, unit = $2 WHERE id = $3")
            .bind(payload.quantity)
            .bind(&payload.unit)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_ingredient(&mut self, id: IngredientId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM ingredients WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn insert_tag(&mut self, recipe_id: RecipeId, name: &str) -> Result<TagId, StorageError> {
        let id: (TagId,) =
            sqlx::query_as("INSERT INTO recipe_tags (recipe_id, name) VALUES ($1, $2) RETURNING id")
                .bind(recipe_id)
                .bind(name)
                .fetch_one(&mut *self.tx)
                .await?;

        Ok(id.0)
    }

    async fn delete_tag(&mut self, id: TagId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM recipe_tags WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StorageError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
