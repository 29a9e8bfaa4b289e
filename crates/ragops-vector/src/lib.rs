//! Vector indexes behind [`ragops_core::traits::VectorIndex`].
//!
//! Distances are squared Euclidean throughout, so callers can map them to a
//! similarity with `1 / (1 + d)` regardless of which backend answered.
mod memory;
#[cfg(feature = "lance")]
mod lance;
#[cfg(feature = "lance")]
pub mod schema;

pub use memory::MemoryVectorIndex;
#[cfg(feature = "lance")]
pub use lance::LanceVectorIndex;

/// Squared L2 distance between equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
