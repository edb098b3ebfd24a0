//! `CostCalculator`: resolves a model name to a price table —
//! exact match, then alias, then longest-prefix match — and prices a
//! `TokenUsage` against it in USD per 1M tokens, one multiply-and-sum per
//! bucket.

use std::collections::HashMap;

use agentcore_middleware::TokenUsage;

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceTable {
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub reasoning_per_million: f64,
    pub cache_read_per_million: f64,
    pub cache_creation_per_million: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CostBreakdown {
    pub input: f64,
    pub output: f64,
    pub reasoning: f64,
    pub cache_read: f64,
    pub cache_creation: f64,
    pub total: f64,
}

pub struct CostCalculator {
    exact: HashMap<String, PriceTable>,
    aliases: HashMap<String, String>,
    prefixes: Vec<(String, PriceTable)>,
}

impl CostCalculator {
    pub fn new() -> Self {
        Self { exact: HashMap::new(), aliases: HashMap::new(), prefixes: Vec::new() }
    }

    /// Pricing for the model ids this workspace already names elsewhere
    /// (`agentcore-core::config::resolve_virtual_model`'s targets), plus a
    /// `claude-` prefix fallback so an unlisted Claude model still prices
    /// at a sane default instead of silently reporting zero cost.
    pub fn with_default_pricing() -> Self {
        let mut calc = Self::new();
        calc.register("claude-haiku-4-5", PriceTable { input_per_million: 1.0, output_per_million: 5.0, reasoning_per_million: 5.0, cache_read_per_million: 0.1, cache_creation_per_million: 1.25 });
        calc.register("claude-sonnet-4-6", PriceTable { input_per_million: 3.0, output_per_million: 15.0, reasoning_per_million: 15.0, cache_read_per_million: 0.3, cache_creation_per_million: 3.75 });
        calc.register("claude-opus-4-6", PriceTable { input_per_million: 15.0, output_per_million: 75.0, reasoning_per_million: 75.0, cache_read_per_million: 1.5, cache_creation_per_million: 18.75 });
        calc.register_prefix("claude-", PriceTable { input_per_million: 3.0, output_per_million: 15.0, reasoning_per_million: 15.0, cache_read_per_million: 0.3, cache_creation_per_million: 3.75 });
        calc
    }

    pub fn register(&mut self, model: impl Into<String>, price: PriceTable) -> &mut Self {
        self.exact.insert(model.into(), price);
        self
    }

    pub fn alias(&mut self, alias: impl Into<String>, canonical: impl Into<String>) -> &mut Self {
        self.aliases.insert(alias.into(), canonical.into());
        self
    }

    /// Registers a prefix match; prefixes are tried longest-first so a more
    /// specific prefix always wins over a shorter, more general one.
    pub fn register_prefix(&mut self, prefix: impl Into<String>, price: PriceTable) -> &mut Self {
        self.prefixes.push((prefix.into(), price));
        self.prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    fn resolve(&self, model: &str) -> Option<PriceTable> {
        if let Some(p) = self.exact.get(model) {
            return Some(*p);
        }
        if let Some(canonical) = self.aliases.get(model) {
            if let Some(p) = self.exact.get(canonical) {
                return Some(*p);
            }
        }
        self.prefixes.iter().find(|(prefix, _)| model.starts_with(prefix.as_str())).map(|(_, p)| p).copied()
    }

    pub fn cost(&self, model: &str, usage: &TokenUsage) -> Option<CostBreakdown> {
        let price = self.resolve(model)?;
        let priced = |count: u64, per_million: f64| (count as f64 / 1_000_000.0) * per_million;
        let input = priced(usage.input, price.input_per_million);
        let output = priced(usage.output, price.output_per_million);
        let reasoning = priced(usage.reasoning, price.reasoning_per_million);
        let cache_read = priced(usage.cache_read, price.cache_read_per_million);
        let cache_creation = priced(usage.cache_creation, price.cache_creation_per_million);
        Some(CostBreakdown { input, output, reasoning, cache_read, cache_creation, total: input + output + reasoning + cache_read + cache_creation })
    }
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage() -> TokenUsage {
        TokenUsage { input: 1_000_000, output: 500_000, reasoning: 0, cache_read: 0, cache_creation: 0 }
    }

    #[test]
    fn exact_match_wins_over_prefix() {
        let mut calc = CostCalculator::new();
        calc.register("model-x", PriceTable { input_per_million: 1.0, ..Default::default() });
        calc.register_prefix("model-", PriceTable { input_per_million: 99.0, ..Default::default() });
        let cost = calc.cost("model-x", &usage()).unwrap();
        assert_eq!(cost.input, 1.0);
    }

    #[test]
    fn alias_resolves_through_to_exact_entry() {
        let mut calc = CostCalculator::new();
        calc.register("claude-sonnet-4-6", PriceTable { input_per_million: 3.0, output_per_million: 15.0, ..Default::default() });
        calc.alias("agentcore:balanced", "claude-sonnet-4-6");
        let cost = calc.cost("agentcore:balanced", &usage()).unwrap();
        assert_eq!(cost.input, 3.0);
        assert_eq!(cost.output, 7.5);
    }

    #[test]
    fn longest_prefix_wins_among_several_matches() {
        let mut calc = CostCalculator::new();
        calc.register_prefix("claude-", PriceTable { input_per_million: 1.0, ..Default::default() });
        calc.register_prefix("claude-opus-", PriceTable { input_per_million: 10.0, ..Default::default() });
        let cost = calc.cost("claude-opus-4-6", &usage()).unwrap();
        assert_eq!(cost.input, 10.0);
    }

    #[test]
    fn unresolved_model_returns_none() {
        let calc = CostCalculator::new();
        assert!(calc.cost("totally-unknown-model", &usage()).is_none());
    }

    #[test]
    fn default_pricing_covers_the_virtual_model_targets() {
        let calc = CostCalculator::with_default_pricing();
        assert!(calc.cost("claude-haiku-4-5", &usage()).is_some());
        assert!(calc.cost("claude-sonnet-4-7-some-future-snapshot", &usage()).is_some());
    }
}
