//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the `BankRouterConfig` struct, which holds the configuration parameters,
//! a `load_config` function to load the configuration from a YAML file, and the SQLite
//! connection helpers shared by the router and the message history.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use bank_router::config::{BankRouterConfig, load_config};
//!
//! let config: BankRouterConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::{env, error::Error, fs, path::Path};
use tracing::*;

use crate::embeddings::{DEFAULT_MODEL_ID, DEFAULT_REVISION};
use crate::reference_store::IndexKind;
use crate::route::{DistanceAggregationMethod, RoutingConfig};

/// Environment variable overriding [`BankRouterConfig::session_db_url`].
pub const DB_URL_ENV: &str = "BANK_ROUTER_DB_URL";
/// Environment variable overriding [`BankRouterConfig::history_name`].
pub const HISTORY_NAME_ENV: &str = "HISTORY_INDEX";
/// Environment variable overriding [`BankRouterConfig::router_name`].
pub const ROUTER_NAME_ENV: &str = "ROUTER_NAME";

fn default_db_url() -> String {
    "bank_router.db".to_string()
}

fn default_router_name() -> String {
    "banking_router".to_string()
}

fn default_history_name() -> String {
    "bank:msg:history".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL_ID.to_string()
}

fn default_revision() -> String {
    DEFAULT_REVISION.to_string()
}

fn default_routing() -> RoutingConfig {
    RoutingConfig::new(3, DistanceAggregationMethod::Avg)
}

fn default_context_limit() -> usize {
    6
}

/// Represents the application's configuration.
///
/// Every field has a default, so an empty YAML document is a valid configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct BankRouterConfig {
    /// SQLite database holding router references and message history.
    #[serde(default = "default_db_url")]
    pub session_db_url: String,

    /// Name under which the banking router is persisted.
    #[serde(default = "default_router_name")]
    pub router_name: String,

    /// Name of the message history collection.
    #[serde(default = "default_history_name")]
    pub history_name: String,

    /// Hugging Face model id of the sentence embedding model.
    #[serde(default = "default_model")]
    pub embedding_model: String,

    #[serde(default = "default_revision")]
    pub embedding_revision: String,

    /// ANN structure for reference lookups.
    #[serde(default)]
    pub index_kind: IndexKind,

    #[serde(default = "default_routing")]
    pub routing: RoutingConfig,

    /// Number of recent messages rendered into the conversation context.
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,

    /// Optional YAML file with route definitions; the built-in banking routes otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes_path: Option<String>,
}

impl Default for BankRouterConfig {
    fn default() -> Self {
        Self {
            session_db_url: default_db_url(),
            router_name: default_router_name(),
            history_name: default_history_name(),
            embedding_model: default_model(),
            embedding_revision: default_revision(),
            index_kind: IndexKind::default(),
            routing: default_routing(),
            context_limit: default_context_limit(),
            routes_path: None,
        }
    }
}

impl BankRouterConfig {
    /// Apply `BANK_ROUTER_DB_URL`, `HISTORY_INDEX` and `ROUTER_NAME` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var(DB_URL_ENV) {
            debug!("{DB_URL_ENV} overrides session_db_url");
            self.session_db_url = url;
        }
        if let Ok(name) = env::var(HISTORY_NAME_ENV) {
            debug!("{HISTORY_NAME_ENV} overrides history_name");
            self.history_name = name;
        }
        if let Ok(name) = env::var(ROUTER_NAME_ENV) {
            debug!("{ROUTER_NAME_ENV} overrides router_name");
            self.router_name = name;
        }
    }

    /// Write this configuration as YAML.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }
}

/// Loads the application's configuration from a YAML file.
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid YAML for
/// `BankRouterConfig`, or if the routing section is invalid.
pub fn load_config(file: &str) -> Result<BankRouterConfig, Box<dyn Error>> {
    info!("Loading config from {file}");
    let content = fs::read_to_string(file)?;
    let config: BankRouterConfig = serde_yaml::from_str(&content)?;
    config.routing.validate()?;
    Ok(config)
}

/// Open a SQLite connection and make sure the schema exists.
pub fn establish_connection(db_url: &str) -> Result<SqliteConnection, crate::RouterError> {
    let mut connection = SqliteConnection::establish(db_url)?;
    ensure_schema(&mut connection)?;
    Ok(connection)
}

/// Create the `routers`, `route_references` and `messages` tables if missing.
pub fn ensure_schema(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    diesel::sql_query(
        "CREATE TABLE IF NOT EXISTS routers (
            name TEXT PRIMARY KEY NOT NULL,
            definition TEXT NOT NULL,
            dimension INTEGER NOT NULL
        )",
    )
    .execute(conn)?;
    diesel::sql_query(
        "CREATE TABLE IF NOT EXISTS route_references (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            router_name TEXT NOT NULL,
            route_name TEXT NOT NULL,
            reference_hash TEXT NOT NULL,
            reference TEXT NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE (router_name, route_name, reference_hash)
        )",
    )
    .execute(conn)?;
    diesel::sql_query(
        "CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            history_name TEXT NOT NULL,
            session_tag TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            intent TEXT,
            score DOUBLE,
            created_at BIGINT NOT NULL
        )",
    )
    .execute(conn)?;
    diesel::sql_query(
        "CREATE INDEX IF NOT EXISTS messages_session_idx ON messages (history_name, session_tag, id)",
    )
    .execute(conn)?;
    Ok(())
}
