use sqlx::{sqlite::SqliteRow, Row};

use souschef_core::domain::recipe::RecipeSummary;

use super::{decode_string_list, RecipeRepository, RepositoryError};
use crate::DbPool;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecipeQuery {
    pub text: String,
    pub cuisine: Option<String>,
    pub max_total_minutes: Option<u32>,
    pub limit: u32,
}

impl RecipeQuery {
    pub fn matches(&self, recipe: &RecipeSummary) -> bool {
        let needle = self.text.trim().to_lowercase();
        let text_match = needle.is_empty()
            || recipe.name.to_lowercase().contains(&needle)
            || recipe
                .description
                .as_deref()
                .map(|description| description.to_lowercase().contains(&needle))
                .unwrap_or(false)
            || recipe.ingredients.iter().any(|ingredient| ingredient.to_lowercase().contains(&needle));
        let cuisine_match = match (&self.cuisine, &recipe.cuisine) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        };
        let time_match = match (self.max_total_minutes, recipe.total_time_minutes) {
            (None, _) => true,
            (Some(max), Some(actual)) => actual <= max,
            (Some(_), None) => false,
        };
        text_match && cuisine_match && time_match
    }
}

pub struct SqlRecipeRepository {
    pool: DbPool,
}

impl SqlRecipeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, recipe: &RecipeSummary) -> Result<(), RepositoryError> {
        let ingredients = serde_json::to_string(&recipe.ingredients)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        sqlx::query(
            "INSERT INTO recipes (id, name, description, cuisine, total_time_minutes, ingredients)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                cuisine = excluded.cuisine,
                total_time_minutes = excluded.total_time_minutes,
                ingredients = excluded.ingredients",
        )
        .bind(&recipe.id)
        .bind(&recipe.name)
        .bind(&recipe.description)
        .bind(&recipe.cuisine)
        .bind(recipe.total_time_minutes)
        .bind(ingredients)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn recipe_from_row(row: &SqliteRow) -> Result<RecipeSummary, RepositoryError> {
    let total_time_minutes: Option<i64> = row.try_get("total_time_minutes")?;
    Ok(RecipeSummary {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        cuisine: row.try_get("cuisine")?,
        total_time_minutes: total_time_minutes.and_then(|value| u32::try_from(value).ok()),
        ingredients: decode_string_list(row.try_get("ingredients")?, "ingredients")?,
    })
}

#[async_trait::async_trait]
impl RecipeRepository for SqlRecipeRepository {
    async fn search(&self, query: &RecipeQuery) -> Result<Vec<RecipeSummary>, RepositoryError> {
        let pattern = format!("%{}%", query.text.trim().to_lowercase());
        let rows = sqlx::query(
            "SELECT id, name, description, cuisine, total_time_minutes, ingredients
             FROM recipes
             WHERE published = 1
               AND (lower(name) LIKE ?1 OR lower(COALESCE(description, '')) LIKE ?1
                    OR lower(ingredients) LIKE ?1)
               AND (?2 IS NULL OR lower(cuisine) = lower(?2))
               AND (?3 IS NULL OR total_time_minutes <= ?3)
             ORDER BY name
             LIMIT ?4",
        )
        .bind(pattern)
        .bind(&query.cuisine)
        .bind(query.max_total_minutes)
        .bind(query.limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(recipe_from_row).collect()
    }
}
