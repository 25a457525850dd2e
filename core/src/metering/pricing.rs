/// Cost of a model call. Prices live outside the engine.
pub trait PricingTable: Send + Sync {
    /// USD for `tokens` tokens of `model`. Must be a pure function.
    fn cost(&self, model: &str, tokens: u64) -> f64;
}

/// Charges nothing; used when no pricing is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct FreePricing;

impl PricingTable for FreePricing {
    fn cost(&self, _model: &str, _tokens: u64) -> f64 {
        0.0
    }
}
