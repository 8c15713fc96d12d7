//! Actor System Configuration
//!
//! Supports loading from an optional TOML file with `ACTRIX_`-prefixed
//! environment variable overrides, e.g. `ACTRIX_LOG_PAYLOADS=true`.

use anyhow::{Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Default mailbox backlog before a warning is logged
pub const DEFAULT_MAILBOX_HIGH_WATER_MARK: usize = 1024;

/// Per-system settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ActorSystemConfig {
    /// System name announced in handshakes; a UUID is generated when absent
    pub name: Option<String>,

    /// Queued entries per actor above which a backlog warning is logged
    pub mailbox_high_water_mark: usize,

    /// Include message payloads in debug logs
    pub log_payloads: bool,
}

impl Default for ActorSystemConfig {
    fn default() -> Self {
        Self {
            name: None,
            mailbox_high_water_mark: DEFAULT_MAILBOX_HIGH_WATER_MARK,
            log_payloads: false,
        }
    }
}

impl ActorSystemConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            debug!("Loading actor system config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(Environment::with_prefix("ACTRIX").try_parsing(true));

        let config = builder
            .build()
            .context("Failed to build actor system configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize actor system configuration")
    }

    /// Configured name, or a fresh UUID
    pub fn resolve_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}
