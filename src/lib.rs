//! Insulator Library
//!
//! Terminal front end for the insulator record stream: it plays the part of
//! the topic view, driving a [`RecordStreamController`] and printing what the
//! record table would show.
//!
//! # CLI Usage
//!
//! ```bash
//! # List the clusters of ~/.insulator.config
//! insulator clusters
//!
//! # Topic details and deletion
//! insulator topic describe --cluster local orders
//! insulator topic delete --cluster local orders
//!
//! # Tail a topic, or replay what it holds and exit
//! insulator consume --cluster local orders --from last-hour --filter paid
//! insulator consume --cluster local orders --from beginning --no-follow
//! ```
//!
//! [`RecordStreamController`]: insulator_record_stream::RecordStreamController

use std::path::PathBuf;

use clap::Parser;

pub mod config;
pub mod consume;
pub mod topic;

#[derive(Parser, Clone, Debug)]
pub struct ConfigOpts {
    /// Configuration file listing the clusters [default: ~/.insulator.config]
    #[arg(long, env = "INSULATOR_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
pub struct ClusterOpts {
    #[command(flatten)]
    pub config: ConfigOpts,

    /// Cluster name or guid
    #[arg(long, short = 'c', env = "INSULATOR_CLUSTER")]
    pub cluster: String,
}
