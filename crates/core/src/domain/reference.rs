use serde::{Deserialize, Serialize};

use super::user::Language;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientAlias {
    pub canonical: String,
    pub alias: String,
    pub language: Language,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllergenEntry {
    pub category: String,
    pub ingredient_canonical: String,
    pub name_en: String,
    pub name_es: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FoodSafetyRule {
    pub ingredient_canonical: String,
    pub category: String,
    pub min_temp_c: i32,
    pub min_temp_f: i32,
    pub min_cook_minutes: Option<u32>,
}

/// Spaces and underscores are interchangeable in canonical ids, so matching
/// compares both spellings.
pub fn canonical_contains(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let underscored = (haystack.replace(' ', "_"), needle.replace(' ', "_"));
    let spaced = (haystack.replace('_', " "), needle.replace('_', " "));
    underscored.0.contains(&underscored.1) || spaced.0.contains(&spaced.1)
}

/// Words of an ingredient name; anything that is not alphanumeric separates
/// them, so `ground_beef`, `ground beef` and `ground-beef` agree.
pub fn ingredient_words(value: &str) -> Vec<&str> {
    value.split(|c: char| !c.is_alphanumeric()).filter(|word| !word.is_empty()).collect()
}

/// True when `needle`'s words appear as a contiguous run of `haystack`'s
/// words. Unlike [`canonical_contains`], "eggplant" does not contain "egg".
pub fn contains_words(haystack: &str, needle: &str) -> bool {
    let needle = ingredient_words(needle);
    if needle.is_empty() {
        return false;
    }
    ingredient_words(haystack).windows(needle.len()).any(|window| window == needle.as_slice())
}
