//! Cluster configuration for insulator
//!
//! The configuration file lists the cluster connection profiles. The record
//! stream only ever reads it, so this crate exposes lookups and no mutation.
//!
//! ## Storage Backends
//!
//! - `FilesystemRepo` - a single JSON file, `$HOME/.insulator.config` by default

mod filesystem;
mod model;
mod repo;


pub use filesystem::FilesystemRepo;
pub use model::Configuration;
pub use repo::ConfigurationRepo;
