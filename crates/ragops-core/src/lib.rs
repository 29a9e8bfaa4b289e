pub mod config;
pub mod domain;
pub mod error;
pub mod traits;
pub mod types;

pub use domain::{Domain, DomainRegistry, DomainRule, DEFAULT_DOMAIN};
pub use error::{with_deadline, Error, Result};
