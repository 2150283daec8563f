//! Data Validation
//!
//! Range checking for wind observations at the upstream boundary. Values that
//! fail validation are discarded before they reach the latest-value store.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{ValidationConfig, ValidationResult, Validator};
