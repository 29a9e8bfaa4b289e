//! Query complexity routing: pick the cheapest model tier that a query's
//! surface features and its domain's rule allow.
pub mod features;
mod router;

pub use features::extract_features;
pub use router::{ComplexityRouter, PRO_SCORE_CUT};
