use tera::{Context, Tera};

use souschef_core::domain::session::ResumableSession;
use souschef_core::domain::user::UserContext;

const SYSTEM_PROMPT: &str = "system_prompt";

const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are Souschef, a friendly home-cooking assistant.
{% if language == "es" %}Always answer in Spanish.{% else %}Always answer in English.{% endif %}
Use {{ measurement_system }} units for quantities and temperatures.
{% if restrictions %}The user must avoid: {{ restrictions | join(sep=", ") }}. Never suggest ingredients from these groups.
{% endif %}{% if dislikes %}The user dislikes: {{ dislikes | join(sep=", ") }}.
{% endif %}{% if diet_types %}Diet: {{ diet_types | join(sep=", ") }}.
{% endif %}{% if equipment %}Available equipment: {{ equipment | join(sep=", ") }}.
{% endif %}{% if skill_level %}Skill level: {{ skill_level }}.
{% endif %}{% if household_size %}Cooking for {{ household_size }} people by default.
{% endif %}{% if resumable %}The user has an unfinished cooking session for {{ resumable.recipe_name }} (step {{ resumable.current_step }} of {{ resumable.total_steps }}). Offer to resume it.
{% endif %}Use tools for recipes and food safety. Only state cooking temperatures that a tool returned."#;

pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template(SYSTEM_PROMPT, SYSTEM_PROMPT_TEMPLATE)?;
        Ok(Self { tera })
    }

    pub fn render_system_prompt(
        &self,
        user: &UserContext,
        resumable: Option<&ResumableSession>,
    ) -> Result<String, tera::Error> {
        let mut context = Context::new();
        context.insert("language", user.language.as_str());
        context.insert("measurement_system", user.measurement_system.as_str());
        context.insert("restrictions", &user.allergen_screen());
        context.insert("dislikes", &user.ingredient_dislikes);
        context.insert("diet_types", &user.diet_types);
        context.insert("equipment", &user.kitchen_equipment);
        context.insert("skill_level", &user.skill_level);
        context.insert("household_size", &user.household_size);
        context.insert("resumable", &resumable);

        self.tera.render(SYSTEM_PROMPT, &context)
    }
}
