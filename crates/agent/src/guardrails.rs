use serde_json::Value;

use souschef_core::domain::user::Language;

use crate::tools::{ToolName, ToolOutcome};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    /// Withhold generated recipes that contain a restricted ingredient.
    pub withhold_conflicting_recipes: bool,
    /// Attach a caveat when allergen or safety data could not be checked.
    pub flag_unverified_results: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { withhold_conflicting_recipes: true, flag_unverified_results: true }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, outcome: &ToolOutcome, language: Language) -> GuardrailDecision {
        match outcome.tool {
            ToolName::GenerateCustomRecipe => self.evaluate_custom_recipe(&outcome.raw, language),
            ToolName::SearchRecipes
                if outcome.raw.get("allergen_verification").and_then(Value::as_str)
                    == Some("unavailable") =>
            {
                self.unverified(language)
            }
            ToolName::CheckFoodSafety
                if outcome.raw.get("verified").and_then(Value::as_bool) == Some(false) =>
            {
                self.unverified(language)
            }
            _ => GuardrailDecision::Allow,
        }
    }

    fn evaluate_custom_recipe(&self, raw: &Value, language: Language) -> GuardrailDecision {
        let recipe = raw.get("customRecipe").unwrap_or(&Value::Null);

        let conflicts = recipe
            .get("allergen_conflicts")
            .and_then(Value::as_array)
            .map(|conflicts| {
                conflicts
                    .iter()
                    .filter_map(|conflict| conflict.get("ingredient").and_then(Value::as_str))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if !conflicts.is_empty() {
            let listed = conflicts.join(", ");
            return if self.withhold_conflicting_recipes {
                GuardrailDecision::Deny {
                    reason_code: "allergen_conflict",
                    user_message: match language {
                        Language::En => format!(
                            "I can't share that recipe because it contains {listed}, which conflicts with your dietary restrictions. Try swapping those ingredients."
                        ),
                        Language::Es => format!(
                            "No puedo compartir esa receta porque contiene {listed}, que no es compatible con tus restricciones alimentarias. Prueba a sustituir esos ingredientes."
                        ),
                    },
                    fallback_path: "suggest_substitutions",
                }
            } else {
                GuardrailDecision::Degrade {
                    reason_code: "allergen_conflict_flagged",
                    user_message: match language {
                        Language::En => format!("Heads up: this recipe contains {listed}."),
                        Language::Es => format!("Atención: esta receta contiene {listed}."),
                    },
                    fallback_path: "show_with_warning",
                }
            };
        }

        let allergens_verified =
            recipe.get("allergen_verified").and_then(Value::as_bool).unwrap_or(false);
        let safety_verified =
            recipe.pointer("/safety/verified").and_then(Value::as_bool).unwrap_or(false);
        if !allergens_verified || !safety_verified {
            return self.unverified(language);
        }

        GuardrailDecision::Allow
    }

    fn unverified(&self, language: Language) -> GuardrailDecision {
        if !self.flag_unverified_results {
            return GuardrailDecision::Allow;
        }
        GuardrailDecision::Degrade {
            reason_code: "verification_unavailable",
            user_message: match language {
                Language::En => "I couldn't fully verify allergens or food safety for this answer. Please double-check ingredients against your restrictions.".to_string(),
                Language::Es => "No pude verificar por completo los alérgenos o la seguridad alimentaria de esta respuesta. Revisa los ingredientes según tus restricciones.".to_string(),
            },
            fallback_path: "show_with_caveat",
        }
    }
}
