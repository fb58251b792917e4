pub mod error;
pub mod mask;
pub mod process;
pub mod validate;

pub use error::ConfigError;
pub use mask::{mask_sensitive_fields, MASK};
pub use process::ProcessConfig;
pub use validate::validate_config;
