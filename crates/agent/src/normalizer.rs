use std::sync::Arc;

use souschef_core::domain::reference::{contains_words, ingredient_words};

use crate::reference::{AliasMap, ReferenceData};

/// Lookup key for free-text ingredient names: trimmed, lower-cased, inner
/// whitespace collapsed.
pub fn ingredient_key(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Resolves `input` against an already-loaded alias map. An exact key wins;
/// otherwise the longest alias found as whole words inside the input, so
/// "500 g carne molida" resolves like "carne molida". Unknown names come back
/// as their own lookup key.
pub fn resolve(aliases: &AliasMap, input: &str) -> String {
    let key = ingredient_key(input);
    if let Some(canonical) = aliases.get(&key) {
        return canonical.clone();
    }

    aliases
        .iter()
        .filter(|(alias, _)| contains_words(&key, alias))
        .max_by(|(left, _), (right, _)| {
            ingredient_words(left)
                .len()
                .cmp(&ingredient_words(right).len())
                .then_with(|| left.chars().count().cmp(&right.chars().count()))
                .then_with(|| right.cmp(left))
        })
        .map(|(_, canonical)| canonical.clone())
        .unwrap_or(key)
}

#[derive(Clone)]
pub struct IngredientNormalizer {
    reference: Arc<ReferenceData>,
}

impl IngredientNormalizer {
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self { reference }
    }

    pub async fn normalize(&self, input: &str) -> String {
        let aliases = self.reference.aliases().await;
        resolve(&aliases, input)
    }

    /// One alias-cache read for the whole batch.
    pub async fn normalize_many<S>(&self, inputs: &[S]) -> Vec<String>
    where
        S: AsRef<str>,
    {
        let aliases = self.reference.aliases().await;
        inputs.iter().map(|input| resolve(&aliases, input.as_ref())).collect()
    }
}
