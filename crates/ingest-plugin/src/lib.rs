pub mod demo;
pub mod error;
pub mod registry;
pub mod source;

pub use demo::DemoSource;
pub use error::PluginError;
pub use registry::PluginRegistry;
pub use source::{PluginMeta, Source};
