//! Shared types, error model, and configuration for jetmaster.
//!
//! This crate is the foundation depended on by all other jetmaster crates.
//! It provides:
//! - [`MasterError`], the unified error type
//! - Descriptor types ([`ReleaseDescriptor`], [`ComponentDescriptor`], [`MasterSection`])
//!   and the [`merge_components`] helper
//! - Configuration ([`AppConfig`], [`MasterSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, Credentials, MASTER_RELEASE_FILE, MasterConfig, MasterSettings, RELEASE_FILE,
    SiteConfig, StorageConfig, config_file_path, init_config, load_config, load_config_from,
    region_from_public_path,
};
pub use error::{MasterError, Result};
pub use types::{ComponentDescriptor, MasterSection, ReleaseDescriptor, merge_components};
