use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use solidcard_lib::fs::config_dir;
use tracing::warn;

use crate::config::theme::Theme;

mod theme;

const FILE_NAME: &str = "gui.toml";

/// The GUI's own configuration, serialized to TOML.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiConfig {
    pub theme: Theme,
}

impl GuiConfig {
    /// Load the configuration, falling back to the defaults if it can't be read.
    pub fn load() -> Self {
        match config_dir() {
            Ok(dir) => Self::load_from(&dir.join(FILE_NAME)),
            Err(e) => {
                warn!("No config directory: {e}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            fs::read_to_string(path)
                .ok()
                .and_then(|contents| toml::from_str(&contents).ok())
                .unwrap_or_else(|| {
                    warn!("Ignoring unreadable {}", path.display());
                    Self::default()
                })
        } else {
            let cfg = Self::default();
            cfg.save_to(path);
            cfg
        }
    }

    pub fn save_to(&self, path: &Path) {
        let result = toml::to_string_pretty(self)
            .map_err(|e| e.to_string())
            .and_then(|contents| fs::write(path, contents).map_err(|e| e.to_string()));

        if let Err(e) = result {
            warn!("Failed to save {}: {e}", path.display());
        }
    }

    pub fn theme(&self) -> iced::Theme {
        (&self.theme).into()
    }
}
