//! Walkthrough configuration, resolved from the environment
//!
//! | Variable                | Required | Default          |
//! |-------------------------|----------|------------------|
//! | `PROJECT_ID`            | yes      |                  |
//! | `ZONE_1`                | no       | `us-central1-a`  |
//! | `ZONE_2`                | no       | `us-central1-b`  |
//! | `REGION`                | no       | `us-central1`    |
//! | `VPCLAB_GCLOUD_COMMAND` | no       | `gcloud`         |
//!
//! Empty values are treated as unset.

use serde::Serialize;

pub const DEFAULT_ZONE_1: &str = "us-central1-a";
pub const DEFAULT_ZONE_2: &str = "us-central1-b";
pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_GCLOUD_COMMAND: &str = "gcloud";

/// Overrides the gcloud program (the test suite points this at a mock)
pub const GCLOUD_COMMAND_VAR: &str = "VPCLAB_GCLOUD_COMMAND";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("PROJECT_ID environment variable is not set")]
    MissingProjectId,

    #[error("Invalid value for {variable}: {message}")]
    Invalid { variable: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabConfig {
    pub project_id: String,
    pub zone_1: String,
    pub zone_2: String,
    pub region: String,
    pub gcloud_command: String,
}

impl LabConfig {
    /// Reads the configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingProjectId`] if `PROJECT_ID` is unset, or
    /// [`ConfigError::Invalid`] for a malformed zone or region.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the configuration through an arbitrary lookup function
    ///
    /// # Errors
    ///
    /// Same as [`LabConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let project_id = get("PROJECT_ID").ok_or(ConfigError::MissingProjectId)?;

        let config = Self {
            project_id: project_id.trim().to_string(),
            zone_1: get("ZONE_1").unwrap_or_else(|| DEFAULT_ZONE_1.to_string()),
            zone_2: get("ZONE_2").unwrap_or_else(|| DEFAULT_ZONE_2.to_string()),
            region: get("REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            gcloud_command: get(GCLOUD_COMMAND_VAR)
                .unwrap_or_else(|| DEFAULT_GCLOUD_COMMAND.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        use crate::validators::{validate_region, validate_zone};

        validate_zone(&self.zone_1).map_err(|message| ConfigError::Invalid {
            variable: "ZONE_1",
            message,
        })?;
        validate_zone(&self.zone_2).map_err(|message| ConfigError::Invalid {
            variable: "ZONE_2",
            message,
        })?;
        validate_region(&self.region).map_err(|message| ConfigError::Invalid {
            variable: "REGION",
            message,
        })?;

        // gcloud has the final say on project IDs
        if let Err(message) = crate::validators::validate_project_id(&self.project_id) {
            tracing::warn!("PROJECT_ID '{}' looks unusual: {message}", self.project_id);
        }

        Ok(())
    }
}
