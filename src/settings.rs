use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::models::AcademicYear;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// SIMAK snapshot (read-only).
    #[serde(default = "default_legacy_db")]
    pub legacy_db: String,
    /// Billing database the sync writes to.
    #[serde(default = "default_target_db")]
    pub target_db: String,
    /// Oldest academic year synced when no year is given.
    #[serde(default = "default_min_academic_year")]
    pub min_academic_year: u16,
}

fn default_legacy_db() -> String {
    default_data_dir().join("simak.db").to_string_lossy().to_string()
}

fn default_target_db() -> String {
    default_data_dir().join("billing.db").to_string_lossy().to_string()
}

fn default_min_academic_year() -> u16 {
    AcademicYear::DEFAULT_FLOOR.value()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            legacy_db: default_legacy_db(),
            target_db: default_target_db(),
            min_academic_year: default_min_academic_year(),
        }
    }
}

impl Settings {
    pub fn legacy_path(&self) -> PathBuf {
        PathBuf::from(&self.legacy_db)
    }

    pub fn target_path(&self) -> PathBuf {
        PathBuf::from(&self.target_db)
    }

    pub fn year_floor(&self) -> AcademicYear {
        AcademicYear::new(self.min_academic_year)
    }

    /// Command-line paths win over the settings file.
    pub fn with_overrides(mut self, legacy_db: Option<&str>, target_db: Option<&str>) -> Self {
        if let Some(path) = legacy_db {
            self.legacy_db = expand_path(path);
        }
        if let Some(path) = target_db {
            self.target_db = expand_path(path);
        }
        self
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// `~/.config/simak-sync/settings.json`
fn settings_file() -> PathBuf {
    home().join(".config/simak-sync/settings.json")
}

fn default_data_dir() -> PathBuf {
    home().join(".local/share/simak-sync")
}

impl Settings {
    pub fn load() -> Self {
        Self::load_from(&settings_file())
    }

    /// A missing file means defaults. An unreadable or malformed one also
    /// falls back to defaults, with a warning naming the file.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read settings, using defaults");
                return Self::default();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "settings file is not valid JSON, using defaults");
            Self::default()
        })
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&settings_file())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, format!("{json}\n"))?;
        Ok(())
    }
}

/// Expand a leading `~` and resolve the path when it already exists.
pub fn expand_path(raw: &str) -> String {
    let expanded = match raw.strip_prefix('~') {
        Some(rest) => home().join(rest.trim_start_matches('/')),
        None => PathBuf::from(raw),
    };
    std::fs::canonicalize(&expanded)
        .unwrap_or(expanded)
        .to_string_lossy()
        .into_owned()
}
