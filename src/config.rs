//! Locating the configuration file and resolving clusters from it.

pub mod duration;

use anyhow::Context;
use insulator_config::{Configuration, ConfigurationRepo, FilesystemRepo};
use insulator_kafka::Cluster;

pub use duration::parse_duration;

use crate::{ClusterOpts, ConfigOpts};

/// Repository for `--config`, falling back to `$HOME/.insulator.config`.
pub fn repo(opts: &ConfigOpts) -> anyhow::Result<FilesystemRepo> {
    let path = match &opts.config {
        Some(path) => path.clone(),
        None => FilesystemRepo::default_path()?,
    };
    Ok(FilesystemRepo::new(path))
}

pub async fn load_configuration(opts: &ConfigOpts) -> anyhow::Result<Configuration> {
    let repo = repo(opts)?;
    repo.get_configuration()
        .await
        .with_context(|| format!("Failed to load {}", repo.path().display()))
}

pub async fn resolve_cluster(opts: &ClusterOpts) -> anyhow::Result<Cluster> {
    let repo = repo(&opts.config)?;
    repo.find_cluster(&opts.cluster).await
}
