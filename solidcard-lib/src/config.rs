use std::{fs, path::Path, sync::Arc, time::Duration};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result, fs::config_dir};

const CURRENT_CONFIG_VERSION: u16 = 1;
const FILE_NAME: &str = "core.toml";

/// Handle to the core configuration
pub type Cfg = Arc<RwLock<CoreConfig>>;

/// The core configuration, serialized to TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    version: u16,
    /// Seconds before an in-flight request to the pod is abandoned
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            request_timeout_secs: 30,
            user_agent: concat!("solidcard/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl CoreConfig {
    /// Load the configuration from the user's config directory, writing out the defaults if no
    /// file exists yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join(FILE_NAME))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            toml::from_str(&contents).map_err(|source| Error::Deserialize {
                file: path.display().to_string(),
                source,
            })
        } else {
            debug!("No config at {}, writing defaults", path.display());
            let cfg = Self::default();
            cfg.save_to(path)?;
            Ok(cfg)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_dir()?.join(FILE_NAME))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn into_handle(self) -> Cfg {
        Arc::new(RwLock::new(self))
    }
}
