//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use bank_router::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! if let Commands::Route { query, .. } = cli.command {
//!     println!("routing {query}");
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Configuration file. Defaults to `config.yaml` in the platform config directory.
    #[arg(short = 'c', long, global = true, env = "BANK_ROUTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write a default configuration and the banking routes file.
    Init {
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },

    /// Drop and recreate the banking router, then run the smoke queries.
    Rebuild,

    /// Route a single query and print the matching intents.
    #[clap(name = "route", alias = "r")]
    Route {
        query: String,

        /// Maximum number of matches (defaults to the configured `max_k`).
        #[arg(short = 'k', long)]
        max_k: Option<usize>,

        /// Aggregation method: avg, min or sum.
        #[arg(short = 'a', long)]
        aggregation: Option<String>,
    },

    /// Build the topic router and walk through routing, updates and YAML export.
    Demo {
        /// Where the router definition is exported.
        #[arg(long, default_value = "router_config.yaml")]
        yaml: PathBuf,

        /// Keep the demo router in the database afterwards.
        #[arg(long)]
        keep: bool,
    },

    /// Route a query, record it in the session history and print the context.
    #[clap(name = "ask", alias = "a")]
    Ask {
        query: String,

        #[arg(short = 's', long, default_value = "default")]
        session: String,
    },

    /// Show or clear a session's conversation history.
    History {
        #[arg(short = 's', long, default_value = "default")]
        session: String,

        /// Number of recent messages to show.
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        #[arg(long)]
        clear: bool,
    },

    /// List the banking tools and their parameters.
    Tools,

    /// Call a banking tool with JSON arguments.
    Tool {
        name: String,

        /// Arguments as a JSON object.
        #[arg(default_value = "{}")]
        args: String,
    },
}
