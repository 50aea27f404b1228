//! Sync configuration.

use serde::{Deserialize, Serialize};

/// Tuning for import and synchronisation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of object writes accumulated before a flush to the store.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Skip the full-import obsolescence sweep when any object failed before
    /// its external identifier could be read. Such an object may be one of
    /// the persisted CSOs the sweep would otherwise obsolete.
    #[serde(default = "default_skip_sweep")]
    pub skip_sweep_on_unidentified_failures: bool,

    /// Maximum number of CSO ids per external-id lookup request.
    #[serde(default = "default_reference_lookup_batch_size")]
    pub reference_lookup_batch_size: usize,
}

fn default_batch_size() -> usize {
    100
}

fn default_skip_sweep() -> bool {
    true
}

fn default_reference_lookup_batch_size() -> usize {
    500
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            skip_sweep_on_unidentified_failures: default_skip_sweep(),
            reference_lookup_batch_size: default_reference_lookup_batch_size(),
        }
    }
}

impl SyncConfig {
    /// Upper bound for `batch_size`.
    pub const MAX_BATCH_SIZE: usize = 10_000;

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let batch_size = reader("MERIDIAN_SYNC_BATCH_SIZE")
            .unwrap_or_else(|_| default_batch_size().to_string())
            .parse::<usize>()
            .map_err(|e| {
                ConfigError::InvalidValue("MERIDIAN_SYNC_BATCH_SIZE".into(), e.to_string())
            })?;

        let skip_sweep_on_unidentified_failures =
            reader("MERIDIAN_SYNC_SKIP_SWEEP_ON_UNIDENTIFIED_FAILURES")
                .unwrap_or_else(|_| default_skip_sweep().to_string())
                .parse::<bool>()
                .map_err(|e| {
                    ConfigError::InvalidValue(
                        "MERIDIAN_SYNC_SKIP_SWEEP_ON_UNIDENTIFIED_FAILURES".into(),
                        e.to_string(),
                    )
                })?;

        let reference_lookup_batch_size = reader("MERIDIAN_SYNC_REFERENCE_LOOKUP_BATCH_SIZE")
            .unwrap_or_else(|_| default_reference_lookup_batch_size().to_string())
            .parse::<usize>()
            .map_err(|e| {
                ConfigError::InvalidValue(
                    "MERIDIAN_SYNC_REFERENCE_LOOKUP_BATCH_SIZE".into(),
                    e.to_string(),
                )
            })?;

        let config = Self {
            batch_size,
            skip_sweep_on_unidentified_failures,
            reference_lookup_batch_size,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > Self::MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidValue(
                "MERIDIAN_SYNC_BATCH_SIZE".into(),
                format!(
                    "must be between 1 and {}, got {}",
                    Self::MAX_BATCH_SIZE,
                    self.batch_size
                ),
            ));
        }
        if self.reference_lookup_batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "MERIDIAN_SYNC_REFERENCE_LOOKUP_BATCH_SIZE".into(),
                "must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Set the write batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set whether unidentified failures suppress the obsolescence sweep.
    #[must_use]
    pub fn with_skip_sweep_on_unidentified_failures(mut self, skip: bool) -> Self {
        self.skip_sweep_on_unidentified_failures = skip;
        self
    }
}

impl From<ConfigError> for crate::error::SyncError {
    fn from(err: ConfigError) -> Self {
        crate::error::SyncError::configuration(err.to_string())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
