//! Path resolution for campus-market configuration and data files.
//!
//! All data lives in `~/.campus-market/`:
//! - `config.yaml` - Backend and sync settings
//! - `campus-market.db` - SQLite key-value substrate holding the offline queue

use std::path::PathBuf;

use crate::error::MarketError;

/// Paths to configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.campus-market/`
    pub root: PathBuf,
    /// Config file: `~/.campus-market/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.campus-market/campus-market.db`
    pub database: PathBuf,
}

impl Paths {
    /// Create paths based on the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, MarketError> {
        let home = std::env::var("HOME")
            .map_err(|_| MarketError::Config("Could not determine home directory".to_string()))?;

        Ok(Self::with_root(PathBuf::from(home).join(".campus-market")))
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("campus-market.db"),
            root,
        }
    }

    /// Ensure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), MarketError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                MarketError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }
        Ok(())
    }
}
