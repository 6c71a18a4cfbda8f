use sqlx::{sqlite::SqliteRow, Row};

use super::{decode_string_list, ProfileRepository, RepositoryError};
use crate::DbPool;

/// `(language, dietary_restrictions, diet_types)` from the profile table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileRow {
    pub language: Option<String>,
    pub dietary_restrictions: Vec<String>,
    pub diet_types: Vec<String>,
}

/// Cooking preferences kept separately from the account profile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CookingContextRow {
    pub skill_level: Option<String>,
    pub household_size: Option<u32>,
    pub ingredient_dislikes: Vec<String>,
    pub dietary_restrictions: Vec<String>,
    pub measurement_system: Option<String>,
    pub kitchen_equipment: Vec<String>,
    pub custom_allergies: Vec<String>,
}

pub struct SqlProfileRepository {
    pool: DbPool,
}

impl SqlProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save_profile(&self, user_id: &str, row: &ProfileRow) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_profiles (user_id, language, dietary_restrictions, diet_types)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                language = excluded.language,
                dietary_restrictions = excluded.dietary_restrictions,
                diet_types = excluded.diet_types",
        )
        .bind(user_id)
        .bind(&row.language)
        .bind(encode_list(&row.dietary_restrictions)?)
        .bind(encode_list(&row.diet_types)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_cooking_context(
        &self,
        user_id: &str,
        row: &CookingContextRow,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_cooking_context
                (user_id, skill_level, household_size, ingredient_dislikes,
                 dietary_restrictions, measurement_system, kitchen_equipment, custom_allergies)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                skill_level = excluded.skill_level,
                household_size = excluded.household_size,
                ingredient_dislikes = excluded.ingredient_dislikes,
                dietary_restrictions = excluded.dietary_restrictions,
                measurement_system = excluded.measurement_system,
                kitchen_equipment = excluded.kitchen_equipment,
                custom_allergies = excluded.custom_allergies",
        )
        .bind(user_id)
        .bind(&row.skill_level)
        .bind(row.household_size.map(i64::from))
        .bind(encode_list(&row.ingredient_dislikes)?)
        .bind(encode_list(&row.dietary_restrictions)?)
        .bind(&row.measurement_system)
        .bind(encode_list(&row.kitchen_equipment)?)
        .bind(encode_list(&row.custom_allergies)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn encode_list(values: &[String]) -> Result<String, RepositoryError> {
    serde_json::to_string(values).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn profile_from_row(row: SqliteRow) -> Result<ProfileRow, RepositoryError> {
    Ok(ProfileRow {
        language: row.try_get("language")?,
        dietary_restrictions: decode_string_list(
            row.try_get("dietary_restrictions")?,
            "dietary_restrictions",
        )?,
        diet_types: decode_string_list(row.try_get("diet_types")?, "diet_types")?,
    })
}

fn cooking_context_from_row(row: SqliteRow) -> Result<CookingContextRow, RepositoryError> {
    let household_size: Option<i64> = row.try_get("household_size")?;
    Ok(CookingContextRow {
        skill_level: row.try_get("skill_level")?,
        household_size: household_size.and_then(|size| u32::try_from(size).ok()),
        ingredient_dislikes: decode_string_list(
            row.try_get("ingredient_dislikes")?,
            "ingredient_dislikes",
        )?,
        dietary_restrictions: decode_string_list(
            row.try_get("dietary_restrictions")?,
            "dietary_restrictions",
        )?,
        measurement_system: row.try_get("measurement_system")?,
        kitchen_equipment: decode_string_list(
            row.try_get("kitchen_equipment")?,
            "kitchen_equipment",
        )?,
        custom_allergies: decode_string_list(row.try_get("custom_allergies")?, "custom_allergies")?,
    })
}

#[async_trait::async_trait]
impl ProfileRepository for SqlProfileRepository {
    async fn find_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, RepositoryError> {
        let row = sqlx::query(
            "SELECT language, dietary_restrictions, diet_types
             FROM user_profiles
             WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(profile_from_row).transpose()
    }

    async fn find_cooking_context(
        &self,
        user_id: &str,
    ) -> Result<Option<CookingContextRow>, RepositoryError> {
        let row = sqlx::query(
            "SELECT skill_level, household_size, ingredient_dislikes, dietary_restrictions,
                    measurement_system, kitchen_equipment, custom_allergies
             FROM user_cooking_context
             WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(cooking_context_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::{CookingContextRow, ProfileRow, SqlProfileRepository};
    use crate::repositories::ProfileRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlProfileRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlProfileRepository::new(pool)
    }

    #[tokio::test]
    async fn missing_user_reads_as_none() {
        let repo = setup().await;

        assert_eq!(repo.find_profile("nobody").await.expect("profile"), None);
        assert_eq!(repo.find_cooking_context("nobody").await.expect("context"), None);
    }

    #[tokio::test]
    async fn profile_and_cooking_context_round_trip_lists() {
        let repo = setup().await;
        let profile = ProfileRow {
            language: Some("es".to_string()),
            dietary_restrictions: vec!["nuts".to_string()],
            diet_types: vec!["vegetarian".to_string()],
        };
        let context = CookingContextRow {
            skill_level: Some("beginner".to_string()),
            household_size: Some(4),
            ingredient_dislikes: vec!["cilantro".to_string()],
            dietary_restrictions: vec!["dairy".to_string()],
            measurement_system: None,
            kitchen_equipment: vec!["air fryer".to_string()],
            custom_allergies: vec!["kiwi".to_string()],
        };

        repo.save_profile("user-1", &profile).await.expect("save profile");
        repo.save_cooking_context("user-1", &context).await.expect("save context");

        assert_eq!(repo.find_profile("user-1").await.expect("profile"), Some(profile));
        assert_eq!(repo.find_cooking_context("user-1").await.expect("context"), Some(context));
    }
}
