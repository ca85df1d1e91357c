//! Object manager configuration.

use serde::Deserialize;

use crate::error::{ObjectError, ObjectResult};

/// Settings for a [`CoreObjectManager`](crate::CoreObjectManager).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Sync payload budget per frame, in bytes. Exceeding it is logged, not
    /// refused.
    pub frame_budget_bytes: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            frame_budget_bytes: 256 * 1024,
        }
    }
}

impl ManagerConfig {
    /// Production preset: room for a few thousand dirty objects a frame.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            frame_budget_bytes: 4 * 1024 * 1024,
        }
    }

    /// Parses and validates a TOML table. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectError::InvalidConfig`] if the TOML is malformed or the
    /// values do not validate.
    pub fn from_toml_str(source: &str) -> ObjectResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| ObjectError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectError::InvalidConfig`] if `frame_budget_bytes` is zero.
    pub fn validate(&self) -> ObjectResult<()> {
        if self.frame_budget_bytes == 0 {
            return Err(ObjectError::InvalidConfig(
                "frame_budget_bytes must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}
