use std::collections::BTreeMap;

use crewline_core::api::{PricingConfig, PricingTable};

/// Per-model USD rates per 1k tokens, read once from config.
#[derive(Debug, Clone, Default)]
pub struct StaticPricingTable {
    per_1k: BTreeMap<String, f64>,
    default_per_1k: f64,
}

impl StaticPricingTable {
    pub fn new(per_1k: BTreeMap<String, f64>, default_per_1k: f64) -> Self {
        Self {
            per_1k,
            default_per_1k,
        }
    }

    pub fn from_config(cfg: &PricingConfig) -> Self {
        Self::new(cfg.models.clone(), cfg.default_usd_per_1k)
    }

    pub fn rate(&self, model: &str) -> f64 {
        self.per_1k
            .get(model)
            .copied()
            .unwrap_or(self.default_per_1k)
    }
}

impl PricingTable for StaticPricingTable {
    fn cost(&self, model: &str, tokens: u64) -> f64 {
        if tokens == 0 {
            return 0.0;
        }
        self.rate(model) * tokens as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> StaticPricingTable {
        let mut models = BTreeMap::new();
        models.insert("gpt-4o".to_string(), 5.0);
        models.insert("gpt-4o-mini".to_string(), 0.15);
        StaticPricingTable::new(models, 1.0)
    }

    #[test]
    fn test_known_model_rate() {
        let t = table();
        assert!((t.cost("gpt-4o", 2000) - 10.0).abs() < 1e-9);
        assert!((t.cost("gpt-4o-mini", 1000) - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_uses_default_rate() {
        let t = table();
        assert!((t.cost("llama-3", 500) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_tokens_cost_nothing() {
        assert_eq!(table().cost("gpt-4o", 0), 0.0);
    }

    #[test]
    fn test_from_config() {
        let cfg: PricingConfig = toml::from_str(
            r#"
            default_usd_per_1k = 0.2
            [models]
            "m" = 2.0
            "#,
        )
        .unwrap();
        let t = StaticPricingTable::from_config(&cfg);
        assert_eq!(t.rate("m"), 2.0);
        assert_eq!(t.rate("other"), 0.2);
    }
}
