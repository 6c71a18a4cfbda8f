use rust_decimal::Decimal;

pub const PRICING_TABLE_VERSION: &str = "2025-06-01";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelPrice {
    pub model_prefix: &'static str,
    /// USD per million input tokens, as hundredths of a cent.
    input_per_million_e4: i64,
    output_per_million_e4: i64,
}

impl ModelPrice {
    const fn new(model_prefix: &'static str, input_e4: i64, output_e4: i64) -> Self {
        Self { model_prefix, input_per_million_e4: input_e4, output_per_million_e4: output_e4 }
    }

    pub fn input_per_million(&self) -> Decimal {
        Decimal::new(self.input_per_million_e4, 4)
    }

    pub fn output_per_million(&self) -> Decimal {
        Decimal::new(self.output_per_million_e4, 4)
    }
}

const PRICE_TABLE: &[ModelPrice] = &[
    ModelPrice::new("gpt-4o-mini", 1_500, 6_000),
    ModelPrice::new("gpt-4o", 25_000, 100_000),
    ModelPrice::new("gpt-4.1-nano", 1_000, 4_000),
    ModelPrice::new("gpt-4.1-mini", 4_000, 16_000),
    ModelPrice::new("gpt-4.1", 20_000, 80_000),
    ModelPrice::new("claude-3-5-haiku", 8_000, 40_000),
    ModelPrice::new("claude-sonnet-4", 30_000, 150_000),
];

/// Longest-prefix lookup so dated variants (`gpt-4o-mini-2024-07-18`)
/// resolve to their base model rather than a shorter sibling (`gpt-4o`).
pub fn find_price(model: &str) -> Option<&'static ModelPrice> {
    let model = model.trim().to_ascii_lowercase();
    PRICE_TABLE
        .iter()
        .filter(|price| model.starts_with(price.model_prefix))
        .max_by_key(|price| price.model_prefix.len())
}

/// `None` for models missing from the table; never an error.
pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> Option<Decimal> {
    let price = find_price(model)?;
    let million = Decimal::from(1_000_000u64);
    let input = Decimal::from(input_tokens) * price.input_per_million() / million;
    let output = Decimal::from(output_tokens) * price.output_per_million() / million;
    Some((input + output).normalize())
}
