use sqlx::Row;

use souschef_core::domain::reference::{AllergenEntry, FoodSafetyRule, IngredientAlias};
use souschef_core::domain::user::Language;

use super::{ReferenceRepository, RepositoryError};
use crate::DbPool;

/// Bulk reads over the near-static reference tables.
pub struct SqlReferenceRepository {
    pool: DbPool,
}

impl SqlReferenceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReferenceRepository for SqlReferenceRepository {
    async fn ingredient_aliases(&self) -> Result<Vec<IngredientAlias>, RepositoryError> {
        let rows = sqlx::query("SELECT canonical, alias, language FROM ingredient_aliases")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<IngredientAlias, RepositoryError> {
                let language: String = row.try_get("language")?;
                Ok(IngredientAlias {
                    canonical: row.try_get("canonical")?,
                    alias: row.try_get("alias")?,
                    language: Language::parse_or_default(Some(&language)),
                })
            })
            .collect()
    }

    async fn allergen_groups(&self) -> Result<Vec<AllergenEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT category, ingredient_canonical, name_en, name_es
             FROM allergen_groups
             ORDER BY category, ingredient_canonical",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<AllergenEntry, RepositoryError> {
                Ok(AllergenEntry {
                    category: row.try_get("category")?,
                    ingredient_canonical: row.try_get("ingredient_canonical")?,
                    name_en: row.try_get("name_en")?,
                    name_es: row.try_get("name_es")?,
                })
            })
            .collect()
    }

    async fn food_safety_rules(&self) -> Result<Vec<FoodSafetyRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT ingredient_canonical, category, min_temp_c, min_temp_f, min_cook_minutes
             FROM food_safety_rules",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<FoodSafetyRule, RepositoryError> {
                let min_temp_c: i64 = row.try_get("min_temp_c")?;
                let min_temp_f: i64 = row.try_get("min_temp_f")?;
                let min_cook_minutes: Option<i64> = row.try_get("min_cook_minutes")?;
                Ok(FoodSafetyRule {
                    ingredient_canonical: row.try_get("ingredient_canonical")?,
                    category: row.try_get("category")?,
                    min_temp_c: i32::try_from(min_temp_c)
                        .map_err(|error| RepositoryError::Decode(format!("min_temp_c: {error}")))?,
                    min_temp_f: i32::try_from(min_temp_f)
                        .map_err(|error| RepositoryError::Decode(format!("min_temp_f: {error}")))?,
                    min_cook_minutes: min_cook_minutes.and_then(|value| u32::try_from(value).ok()),
                })
            })
            .collect()
    }
}
