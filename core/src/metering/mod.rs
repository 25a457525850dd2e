//! Logging & metering: the append-only audit trail and the token/cost
//! counters derived from it.

pub mod pricing;
pub mod sink;

pub use pricing::{FreePricing, PricingTable};
pub use sink::{MeteringSink, Totals};
