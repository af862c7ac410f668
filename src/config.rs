//! Where the settings and workspace documents live.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::Scope;
use crate::{Error, Result};

pub const SETTINGS_FILE: &str = "settings.json";
pub const WORKSPACE_FILE: &str = "workspace.json";

/// Paths of the two persisted documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub settings_path: PathBuf,
    pub workspace_path: PathBuf,
}

impl StoreConfig {
    pub fn new(settings_path: impl Into<PathBuf>, workspace_path: impl Into<PathBuf>) -> Self {
        Self {
            settings_path: settings_path.into(),
            workspace_path: workspace_path.into(),
        }
    }

    /// `settings.json` and `workspace.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(SETTINGS_FILE), dir.join(WORKSPACE_FILE))
    }

    /// Documents under the platform config directory, in a folder named
    /// after the application. Falls back to `~/.<app_name>` on platforms
    /// without a config directory.
    pub fn for_app(app_name: &str) -> Result<Self> {
        let dir = dirs::config_dir()
            .map(|d| d.join(app_name))
            .or_else(|| dirs::home_dir().map(|h| h.join(format!(".{app_name}"))))
            .ok_or_else(|| Error::StorageUnavailable {
                path: PathBuf::from(app_name),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no config or home directory for this user",
                ),
            })?;
        Ok(Self::in_dir(dir))
    }

    pub fn path(&self, scope: Scope) -> &Path {
        match scope {
            Scope::Settings => &self.settings_path,
            Scope::Workspace => &self.workspace_path,
        }
    }
}
