#![doc = include_str!("../README.md")]

use std::sync::Arc;

pub mod report;

pub use roundtrip_codec as codec;
pub use roundtrip_core as core;
pub use thiserror;

use roundtrip_codec::{Codec, RegistryError, process::ToolConfig, registry};

/// Open a catalogued codec with tools resolved from the environment.
///
/// # Example
/// ```rust
/// let jpeg = roundtrip::open("jpeg")?;
/// assert!(jpeg.available());
/// assert!(roundtrip::open("gif").is_err());
/// # Ok::<(), roundtrip::codec::RegistryError>(())
/// ```
pub fn open(name: &str) -> Result<Arc<dyn Codec>, RegistryError> {
    open_with(name, &ToolConfig::from_env())
}

/// Open a catalogued codec with an explicit tool configuration.
pub fn open_with(name: &str, config: &ToolConfig) -> Result<Arc<dyn Codec>, RegistryError> {
    registry::build(name, config).ok_or_else(|| RegistryError::NotFound(name.to_string()))
}

pub mod prelude {
    pub use crate::report::{ReportError, RoundTripReport, measure, sweep};
    pub use crate::{open, open_with};
    pub use roundtrip_codec::prelude::*;
}
