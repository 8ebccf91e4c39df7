//! # Bank Router (library root)
//!
//! Semantic intent routing for a banking assistant:
//! - Route definitions and matching settings (`route`).
//! - Text embeddings through Candle (`embeddings`) and an ANN-backed reference store
//!   (`reference_store`).
//! - The router itself with SQLite persistence (`router`, `models`, `schema`, `config`).
//! - Session-tagged conversation memory (`history`).
//! - The built-in banking intent catalogue (`banking`) and the tools it routes to (`tools`).
//! - CLI parsing (`commands`).
//!
//! ## Routing in one picture
//! ```text
//! query ──embed──▶ vector ──within(max threshold)──▶ reference hits
//!        ──group by route──▶ aggregate (avg|min|sum) ──distance < threshold──▶ top max_k
//! ```
//!
//! ## Configuration directory
//! [`config_dir`] resolves the per-platform directory holding `config.yaml` and
//! `routes.yaml`, e.g. `~/.config/bank-router` on Linux.

use directories::ProjectDirs;
use std::error::Error;

pub mod banking;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod history;
pub mod models;
pub mod reference_store;
pub mod route;
pub mod router;
pub mod schema;
pub mod tools;

pub use error::{Result, RouterError};

/// Return the per-platform configuration directory.
///
/// The directory is **not** created by this function; callers that need it should
/// create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined.
pub fn config_dir() -> std::result::Result<std::path::PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "bank-router", "bank-router")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_named() {
        if let Ok(dir) = config_dir() {
            assert!(dir.to_string_lossy().contains("bank-router"));
        }
    }
}
