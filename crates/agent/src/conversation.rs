//! Transcript compaction before every model call.
//!
//! Tool output is never resent verbatim. Each assistant tool-call message and
//! the tool messages that answer it collapse into one assistant message whose
//! text carries a short summary per result, so the resent transcript stays
//! roughly constant in size and the model never sees internal tool JSON.

use serde_json::{Map, Value};

use souschef_core::domain::chat::{ChatMessage, ToolCall};
use souschef_core::text::truncate_chars;

/// Tool output shorter than this is resent unchanged.
/// Untyped results shorter than this many characters pass through verbatim.
pub const PASSTHROUGH_LIMIT: usize = 300;
const MAX_LISTED_RECIPES: usize = 5;
const STANDALONE_TOOL_LABEL: &str = "tool";

pub fn normalize_for_model(transcript: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut normalized = Vec::with_capacity(transcript.len());
    let mut index = 0;

    while index < transcript.len() {
        match &transcript[index] {
            ChatMessage::Assistant { content, tool_calls } if !tool_calls.is_empty() => {
                let (results, next) = consume_tool_messages(transcript, index + 1);
                let lines = results
                    .iter()
                    .map(|(call_id, output)| {
                        format!("{}: {}", tool_label(tool_calls, call_id), summarize_tool_output(output))
                    })
                    .collect::<Vec<_>>();
                normalized.push(ChatMessage::assistant(splice(content, &lines)));
                index = next;
            }
            ChatMessage::Tool { .. } => {
                let (results, next) = consume_tool_messages(transcript, index);
                let lines = results
                    .iter()
                    .map(|(_, output)| {
                        format!("{STANDALONE_TOOL_LABEL}: {}", summarize_tool_output(output))
                    })
                    .collect::<Vec<_>>();
                normalized.push(ChatMessage::assistant(lines.join("\n")));
                index = next;
            }
            other => {
                normalized.push(other.clone());
                index += 1;
            }
        }
    }

    normalized
}

/// One line of model-facing text for a single tool result.
pub fn summarize_tool_output(output: &str) -> String {
    let parsed = serde_json::from_str::<Value>(output).ok();

    if let Some(Value::Object(object)) = &parsed {
        if let Some(summary) = summarize_recipes(object).or_else(|| summarize_custom_recipe(object)) {
            return summary;
        }
    }

    if output.chars().count() < PASSTHROUGH_LIMIT {
        return output.to_string();
    }

    match parsed {
        Some(Value::Object(object)) => {
            let keys = object.keys().map(String::as_str).collect::<Vec<_>>();
            format!("returned object with keys: {}", keys.join(", "))
        }
        Some(Value::Array(items)) => format!("returned list with {} items", items.len()),
        _ => truncate_chars(output, PASSTHROUGH_LIMIT),
    }
}

fn consume_tool_messages(transcript: &[ChatMessage], start: usize) -> (Vec<(&str, &str)>, usize) {
    let mut results = Vec::new();
    let mut index = start;
    while let Some(ChatMessage::Tool { tool_call_id, content }) = transcript.get(index) {
        results.push((tool_call_id.as_str(), content.as_str()));
        index += 1;
    }
    (results, index)
}

fn tool_label<'a>(tool_calls: &'a [ToolCall], call_id: &str) -> &'a str {
    tool_calls
        .iter()
        .find(|call| call.id == call_id)
        .map(|call| call.name.as_str())
        .unwrap_or(STANDALONE_TOOL_LABEL)
}

fn splice(content: &str, lines: &[String]) -> String {
    let content = content.trim();
    match (content.is_empty(), lines.is_empty()) {
        (true, _) => lines.join("\n"),
        (false, true) => content.to_string(),
        (false, false) => format!("{content}\n{}", lines.join("\n")),
    }
}

fn summarize_recipes(object: &Map<String, Value>) -> Option<String> {
    let recipes = object.get("recipes")?.as_array()?;
    if recipes.is_empty() {
        return Some("Found no recipes.".to_string());
    }

    let names = recipes
        .iter()
        .filter_map(|recipe| recipe.get("name").and_then(Value::as_str))
        .take(MAX_LISTED_RECIPES)
        .collect::<Vec<_>>();
    let mut summary = format!("Found {} recipes: {}", recipes.len(), names.join(", "));
    if recipes.len() > names.len() {
        summary.push_str(&format!(" and {} more", recipes.len() - names.len()));
    }
    Some(summary)
}

fn summarize_custom_recipe(object: &Map<String, Value>) -> Option<String> {
    let recipe = object.get("customRecipe")?.as_object()?;
    let name = recipe.get("name").and_then(Value::as_str).unwrap_or("untitled");

    let mut summary = format!("Generated custom recipe \"{name}\"");
    if let Some(servings) = recipe.get("servings").and_then(Value::as_u64) {
        summary.push_str(&format!(", {servings} servings"));
    }
    if let Some(ingredients) = recipe.get("ingredients").and_then(Value::as_array) {
        summary.push_str(&format!(", {} ingredients", ingredients.len()));
    }

    let flagged = recipe
        .get("allergen_conflicts")
        .and_then(Value::as_array)
        .map(|conflicts| {
            conflicts
                .iter()
                .filter_map(|conflict| conflict.get("ingredient").and_then(Value::as_str))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if !flagged.is_empty() {
        summary.push_str(&format!("; flagged allergens: {}", flagged.join(", ")));
    }
    Some(summary)
}
