//! Filesystem-based configuration repository.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::repo::ConfigurationRepo;
use crate::Configuration;

const CONFIG_FILE_NAME: &str = ".insulator.config";

/// Reads the configuration from one JSON file.
pub struct FilesystemRepo {
    path: PathBuf,
}

impl FilesystemRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$HOME/.insulator.config`
    pub fn default_path() -> Result<PathBuf> {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .context("Neither HOME nor USERPROFILE is set; pass the configuration path explicitly")?;
        Ok(PathBuf::from(home).join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigurationRepo for FilesystemRepo {
    async fn get_configuration(&self) -> Result<Configuration> {
        if !self.path.exists() {
            tracing::debug!(
                "No configuration at {}, using an empty one",
                self.path.display()
            );
            return Ok(Configuration::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read configuration {}", self.path.display()))?;
        let configuration: Configuration = serde_json::from_str(&content)
            .with_context(|| format!("Invalid configuration file {}", self.path.display()))?;

        tracing::info!(
            "Loaded {} cluster(s) from {}",
            configuration.clusters.len(),
            self.path.display()
        );
        Ok(configuration)
    }
}

