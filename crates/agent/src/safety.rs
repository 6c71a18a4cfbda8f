//! Allergen screening and cooking-temperature checks.
//!
//! Both checks run against reference data rather than model output. When the
//! data cannot be read, results say so explicitly: an allergen screen is
//! reported as unverified and a safety report carries a "verification
//! unavailable" warning instead of claiming the recipe is safe.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use souschef_core::domain::recipe::RecipeSummary;
use souschef_core::domain::reference::{
    canonical_contains, contains_words, AllergenEntry, FoodSafetyRule,
};
use souschef_core::domain::user::{Language, MeasurementSystem};

use crate::normalizer::{ingredient_key, resolve};
use crate::reference::{AliasMap, AllergenMap, ReferenceData};

pub const CUSTOM_ALLERGY_CATEGORY: &str = "custom";
pub const LARGE_BATCH_PORTIONS: u32 = 12;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AllergenMatch {
    pub category: String,
    pub allergen: AllergenEntry,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AllergenVerdict {
    Safe,
    Match(AllergenMatch),
    /// No match found, but aliases or allergen groups could not be loaded.
    Unverified,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AllergenConflict {
    pub ingredient: String,
    pub category: String,
    pub allergen: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AllergenScreen {
    pub conflicts: Vec<AllergenConflict>,
    pub verified: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllergenFilter {
    pub recipes: Vec<RecipeSummary>,
    pub verification_unavailable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SafetyReport {
    pub safe: bool,
    pub warnings: Vec<String>,
    pub verified: bool,
}

#[derive(Clone)]
pub struct SafetyValidator {
    reference: Arc<ReferenceData>,
}

impl SafetyValidator {
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self { reference }
    }

    pub async fn check_ingredient_for_allergens<S>(
        &self,
        name: &str,
        restrictions: &[S],
    ) -> AllergenVerdict
    where
        S: AsRef<str>,
    {
        if restrictions.is_empty() {
            return AllergenVerdict::Safe;
        }
        let (aliases, allergens) =
            tokio::join!(self.reference.try_aliases(), self.reference.allergens());
        match_allergen(aliases.as_deref(), &allergens, name, restrictions)
    }

    /// Screens every ingredient with a single read of each cache.
    pub async fn screen_ingredients<S, R>(&self, ingredients: &[S], restrictions: &[R]) -> AllergenScreen
    where
        S: AsRef<str>,
        R: AsRef<str>,
    {
        if restrictions.is_empty() {
            return AllergenScreen { conflicts: Vec::new(), verified: true };
        }
        let (aliases, allergens) =
            tokio::join!(self.reference.try_aliases(), self.reference.allergens());

        let mut screen = AllergenScreen { conflicts: Vec::new(), verified: true };
        for ingredient in ingredients {
            match match_allergen(aliases.as_deref(), &allergens, ingredient.as_ref(), restrictions) {
                AllergenVerdict::Safe => {}
                AllergenVerdict::Unverified => screen.verified = false,
                AllergenVerdict::Match(found) => screen.conflicts.push(AllergenConflict {
                    ingredient: ingredient.as_ref().trim().to_string(),
                    category: found.category,
                    allergen: found.allergen.ingredient_canonical,
                }),
            }
        }
        screen
    }

    /// Drops every recipe with an ingredient matching a restriction. An empty
    /// restriction list returns the input untouched without reading the
    /// caches.
    pub async fn filter_by_allergens<S>(
        &self,
        recipes: Vec<RecipeSummary>,
        restrictions: &[S],
    ) -> AllergenFilter
    where
        S: AsRef<str>,
    {
        if restrictions.is_empty() {
            return AllergenFilter { recipes, verification_unavailable: false };
        }
        let (aliases, allergens) =
            tokio::join!(self.reference.try_aliases(), self.reference.allergens());

        let verification_unavailable = aliases.is_none() || allergens.is_empty();
        let recipes = recipes
            .into_iter()
            .filter(|recipe| {
                !recipe.ingredients.iter().any(|ingredient| {
                    matches!(
                        match_allergen(aliases.as_deref(), &allergens, ingredient, restrictions),
                        AllergenVerdict::Match(_)
                    )
                })
            })
            .collect();

        AllergenFilter { recipes, verification_unavailable }
    }

    pub async fn check_recipe_safety<S>(
        &self,
        ingredients: &[S],
        portions: u32,
        measurement_system: MeasurementSystem,
        language: Language,
    ) -> SafetyReport
    where
        S: AsRef<str>,
    {
        let (aliases, rules) =
            tokio::join!(self.reference.try_aliases(), self.reference.food_safety_rules());

        let Some(aliases) = aliases else {
            warn!(event_name = "safety.aliases.unavailable", "ingredient aliases unavailable");
            return unverified_report(portions, language);
        };
        let rules = match rules {
            Ok(rules) if !rules.is_empty() => rules,
            Ok(_) => {
                warn!(event_name = "safety.rules.empty", "food safety rule table is empty");
                return unverified_report(portions, language);
            }
            Err(error) => {
                warn!(
                    event_name = "safety.rules.fetch_failed",
                    error = %error,
                    "food safety rules unavailable"
                );
                return unverified_report(portions, language);
            }
        };

        let mut applied = BTreeSet::new();
        let mut warnings = Vec::new();
        for ingredient in ingredients {
            let display = ingredient.as_ref().trim();
            let canonical = resolve(&aliases, display);
            let Some(rule) = select_rule(&rules, &canonical) else {
                continue;
            };
            if applied.insert(rule.ingredient_canonical.clone()) {
                warnings.push(temperature_warning(display, rule, measurement_system, language));
            }
        }

        let safe = warnings.is_empty();
        if portions >= LARGE_BATCH_PORTIONS {
            warnings.push(cooling_note(language).to_string());
        }

        SafetyReport { safe, warnings, verified: true }
    }
}

/// Exact canonical match first, then the longest rule id contained in the
/// ingredient as whole words. `ground_beef` therefore beats `beef` for
/// "ground beef", "beef steak" (canonical `beef`) gets the whole-cut rule, and
/// "eggplant" matches no `egg` rule.
pub fn select_rule<'a>(rules: &'a [FoodSafetyRule], canonical: &str) -> Option<&'a FoodSafetyRule> {
    if let Some(exact) = rules.iter().find(|rule| rule.ingredient_canonical == canonical) {
        return Some(exact);
    }
    rules
        .iter()
        .filter(|rule| contains_words(canonical, &rule.ingredient_canonical))
        .max_by(|left, right| {
            left.ingredient_canonical
                .chars()
                .count()
                .cmp(&right.ingredient_canonical.chars().count())
                .then_with(|| right.ingredient_canonical.cmp(&left.ingredient_canonical))
        })
}

/// A match stands even with partial data; "safe" needs both tables.
fn match_allergen<S>(
    aliases: Option<&AliasMap>,
    allergens: &AllergenMap,
    name: &str,
    restrictions: &[S],
) -> AllergenVerdict
where
    S: AsRef<str>,
{
    let no_aliases = AliasMap::new();
    let alias_map = aliases.unwrap_or(&no_aliases);
    let canonical = resolve(alias_map, name);

    for restriction in restrictions {
        let key = ingredient_key(restriction.as_ref());
        if key.is_empty() {
            continue;
        }
        match allergens.get(&key) {
            Some(entries) => {
                if let Some(entry) = entries
                    .iter()
                    .find(|entry| canonical_contains(&canonical, &entry.ingredient_canonical))
                {
                    return AllergenVerdict::Match(AllergenMatch {
                        category: key,
                        allergen: entry.clone(),
                    });
                }
            }
            None => {
                // Not a known category: treat it as a literal ingredient.
                let literal = resolve(alias_map, &key);
                if canonical_contains(&canonical, &literal) {
                    return AllergenVerdict::Match(AllergenMatch {
                        category: CUSTOM_ALLERGY_CATEGORY.to_string(),
                        allergen: AllergenEntry {
                            category: CUSTOM_ALLERGY_CATEGORY.to_string(),
                            ingredient_canonical: literal,
                            name_en: key.clone(),
                            name_es: key,
                        },
                    });
                }
            }
        }
    }

    if aliases.is_none() || allergens.is_empty() {
        AllergenVerdict::Unverified
    } else {
        AllergenVerdict::Safe
    }
}

fn temperature_label(rule: &FoodSafetyRule, measurement_system: MeasurementSystem) -> String {
    match measurement_system {
        MeasurementSystem::Imperial => format!("{}°F", rule.min_temp_f),
        MeasurementSystem::Metric => format!("{}°C", rule.min_temp_c),
    }
}

fn temperature_warning(
    display: &str,
    rule: &FoodSafetyRule,
    measurement_system: MeasurementSystem,
    language: Language,
) -> String {
    let temperature = temperature_label(rule, measurement_system);
    let mut warning = match language {
        Language::En => {
            format!("Cook {display} to an internal temperature of at least {temperature}.")
        }
        Language::Es => {
            format!("Cocina {display} hasta una temperatura interna de al menos {temperature}.")
        }
    };
    if let Some(minutes) = rule.min_cook_minutes {
        warning.push_str(&match language {
            Language::En => format!(" Let it rest for {minutes} minutes before serving."),
            Language::Es => format!(" Déjalo reposar {minutes} minutos antes de servir."),
        });
    }
    warning
}

fn cooling_note(language: Language) -> &'static str {
    match language {
        Language::En => {
            "Large batch: cool leftovers quickly in shallow containers and refrigerate within 2 hours."
        }
        Language::Es => {
            "Lote grande: enfría las sobras rápido en recipientes poco profundos y refrigéralas antes de 2 horas."
        }
    }
}

pub fn verification_unavailable_warning(language: Language) -> &'static str {
    match language {
        Language::En => {
            "Food safety verification is unavailable right now. Follow standard safe cooking temperatures."
        }
        Language::Es => {
            "La verificación de seguridad alimentaria no está disponible ahora. Sigue las temperaturas de cocción seguras habituales."
        }
    }
}

fn unverified_report(portions: u32, language: Language) -> SafetyReport {
    let mut warnings = vec![verification_unavailable_warning(language).to_string()];
    if portions >= LARGE_BATCH_PORTIONS {
        warnings.push(cooling_note(language).to_string());
    }
    SafetyReport { safe: false, warnings, verified: false }
}
