//! Main module for the Bank Router CLI application (`bank-router`).
//!
//! Handles command parsing, configuration loading and initialization, then dispatches
//! to the router, the session history or the banking tools.
//!
//! # Examples
//!
//! ```sh
//! bank-router init
//! bank-router rebuild
//! bank-router route "I need a credit card" -k 3
//! bank-router ask "what is my EMI for 5 lakh" -s alice
//! bank-router tool calculate_emi '{"principal": 500000, "annual_rate": 10.5, "tenure_months": 36}'
//! ```

use bank_router::banking::{
    REBUILD_SMOKE_QUERIES, TOPIC_DEMO_EXTRA_REFERENCES, TOPIC_DEMO_QUERIES, banking_router_definition,
    topic_router_definition,
};
use bank_router::commands::{Cli, Commands};
use bank_router::config::{self, BankRouterConfig, establish_connection};
use bank_router::embeddings::SentenceEmbeddingsModel;
use bank_router::history::{HistoryCache, Role};
use bank_router::route::{DistanceAggregationMethod, RouteMatch, RouterDefinition, RoutingConfig};
use bank_router::router::SemanticRouter;
use bank_router::tools::ToolRegistry;
use bank_router::{RouterError, config_dir};
use clap::Parser;
use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, Print, SetAttribute, SetForegroundColor},
};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::{error::Error, fs};
use tracing::{debug, info, warn};

static TRACING: OnceCell<()> = OnceCell::new();

const TOPIC_ROUTER_NAME: &str = "topic_router";

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Main asynchronous function of the CLI.
///
/// Parses arguments, loads the configuration (falling back to defaults when the file is
/// missing), applies environment overrides and executes the command.
async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config_dir()?.join("config.yaml"),
    };

    let config = match cli.command {
        Commands::Init { .. } => BankRouterConfig::default(),
        _ => runtime_config(&config_path)?,
    };

    match cli.command {
        Commands::Init { force } => init(&config_path, force)?,
        Commands::Rebuild => rebuild(&config).await?,
        Commands::Route {
            query,
            max_k,
            aggregation,
        } => {
            let aggregation = aggregation
                .map(|a| a.parse::<DistanceAggregationMethod>())
                .transpose()?;
            let router = open_router(&config, false).await?;
            let matches = router.route_many(&query, max_k, aggregation)?;
            print_matches(&router, &query, &matches)?;
        }
        Commands::Demo { yaml, keep } => demo(&config, &yaml, keep).await?,
        Commands::Ask { query, session } => ask(&config, &query, &session).await?,
        Commands::History {
            session,
            limit,
            clear,
        } => {
            let mut cache = HistoryCache::new(&config.session_db_url, &config.history_name);
            if clear {
                let removed = cache.clear_conversation(&session)?;
                println!("Cleared {removed} messages for session '{session}'");
            } else {
                match cache.get_context(&session, limit.unwrap_or(config.context_limit))? {
                    Some(context) => println!("{context}"),
                    None => println!("No messages for session '{session}'"),
                }
            }
        }
        Commands::Tools => {
            let registry = tool_registry(&config).await?;
            for definition in registry.definitions() {
                print_colored(Color::Cyan, &definition.name)?;
                println!(" - {}", definition.description);
                println!("{}", serde_json::to_string_pretty(&definition.parameters)?);
            }
        }
        Commands::Tool { name, args } => {
            let args: serde_json::Value = serde_json::from_str(&args)?;
            let registry = tool_registry(&config).await?;
            let output = registry.call(&name, args)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Configuration file contents (or defaults when missing) with environment overrides.
fn runtime_config(config_path: &Path) -> Result<BankRouterConfig, Box<dyn Error>> {
    let mut config = if config_path.exists() {
        config::load_config(&config_path.to_string_lossy())?
    } else {
        warn!(
            "No config at {}, using defaults (run `bank-router init` to create one)",
            config_path.display()
        );
        BankRouterConfig::default()
    };
    config.apply_env_overrides();
    debug!("Config loaded: {:?}", config);
    Ok(config)
}

async fn load_model(config: &BankRouterConfig) -> Result<SentenceEmbeddingsModel, Box<dyn Error>> {
    info!("Loading embedding model {}", config.embedding_model);
    Ok(SentenceEmbeddingsModel::load(&config.embedding_model, &config.embedding_revision).await?)
}

/// Banking router definition: the routes file when configured, the built-in catalogue
/// otherwise. Name and routing settings always come from the configuration.
fn banking_definition(config: &BankRouterConfig) -> Result<RouterDefinition, Box<dyn Error>> {
    let mut definition = match &config.routes_path {
        Some(path) => {
            debug!("Loading routes from {path}");
            RouterDefinition::from_yaml_str(&fs::read_to_string(path)?)?
        }
        None => banking_router_definition(&config.router_name, config.routing.clone()),
    };
    definition.name = config.router_name.clone();
    definition.routing_config = config.routing.clone();
    Ok(definition)
}

async fn open_router(config: &BankRouterConfig, overwrite: bool) -> Result<SemanticRouter, Box<dyn Error>> {
    let definition = banking_definition(config)?;
    let model = load_model(config).await?;
    let connection = establish_connection(&config.session_db_url)?;
    match SemanticRouter::new(definition, Box::new(model), connection, overwrite, config.index_kind) {
        Err(RouterError::ExistingRouter(name)) => Err(format!(
            "router '{name}' was stored with different routes; run `bank-router rebuild`"
        )
        .into()),
        other => Ok(other?),
    }
}

async fn tool_registry(config: &BankRouterConfig) -> Result<ToolRegistry, Box<dyn Error>> {
    let model = load_model(config).await?;
    Ok(ToolRegistry::with_defaults(Box::new(model))?)
}

async fn rebuild(config: &BankRouterConfig) -> Result<(), Box<dyn Error>> {
    print_header("Rebuilding semantic router index")?;
    let router = open_router(config, true).await?;
    println!(
        "Router '{}' created with {} routes and {} reference embeddings\n",
        router.name(),
        router.routes().len(),
        router.reference_count()
    );

    for query in REBUILD_SMOKE_QUERIES {
        match router.route(query)? {
            Some(best) => {
                print_colored(Color::Green, "✓ ")?;
                println!("'{query}' -> {} (distance: {:.3})", best.name, best.distance);
            }
            None => {
                print_colored(Color::Red, "✗ ")?;
                println!("'{query}' -> unknown");
            }
        }
    }
    Ok(())
}

async fn ask(config: &BankRouterConfig, query: &str, session: &str) -> Result<(), Box<dyn Error>> {
    let router = open_router(config, false).await?;
    let best = router.route(query)?;
    let intent = best.as_ref().map(|m| m.name.as_str());
    let score = best.as_ref().map(|m| m.distance as f64);

    // The routing result is stored on the user message; the rendered context only
    // shows intent on assistant lines.
    let mut cache = HistoryCache::new(&config.session_db_url, &config.history_name);
    cache.add_message(session, Role::User, query, intent, score)?;

    match &best {
        Some(m) => {
            print_colored(Color::Green, &format!("Intent: {} ({:.2})", m.name, m.distance))?;
            println!();
            if let Some(tool) = router
                .get(&m.name)
                .and_then(|r| r.metadata.get("tool"))
                .filter(|t| !t.is_empty())
            {
                println!("Suggested tool: {tool}");
            }
        }
        None => {
            print_colored(Color::Yellow, "Intent: unknown")?;
            println!();
        }
    }

    if let Some(context) = cache.get_context(session, config.context_limit)? {
        print_header("Conversation context")?;
        println!("{context}");
    }
    Ok(())
}

async fn demo(config: &BankRouterConfig, yaml: &Path, keep: bool) -> Result<(), Box<dyn Error>> {
    print_header("Semantic router demo")?;
    let definition = topic_router_definition(
        TOPIC_ROUTER_NAME,
        RoutingConfig::new(3, DistanceAggregationMethod::Avg),
    );
    let model = load_model(config).await?;
    let connection = establish_connection(&config.session_db_url)?;
    let mut router = SemanticRouter::new(definition, Box::new(model), connection, true, config.index_kind)?;

    println!("Router name: {}", router.name());
    println!("Number of routes: {}", router.routes().len());
    println!("Available routes: {}", router.route_names().join(", "));
    println!("Max K: {}", router.routing_config().max_k);
    println!("Aggregation method: {}", router.routing_config().aggregation_method);

    print_header("Testing queries")?;
    for query in TOPIC_DEMO_QUERIES {
        let matches = router.route_many(query, None, None)?;
        print_matches(&router, query, &matches)?;
    }

    print_header("Adding new references")?;
    let references: Vec<String> = TOPIC_DEMO_EXTRA_REFERENCES.iter().map(|r| r.to_string()).collect();
    let keys = router.add_route_references("technology", &references)?;
    println!("Added {} new references to 'technology'", keys.len());

    print_header("Updating route thresholds")?;
    router.update_route_thresholds(&HashMap::from([
        ("technology".to_string(), 0.35),
        ("sports".to_string(), 0.45),
    ]))?;
    println!("Updated thresholds for technology and sports");

    router.to_yaml(yaml, true)?;
    println!("Router configuration saved to '{}'", yaml.display());

    if let Some(route) = router.get("technology") {
        print_header("Route details")?;
        println!("Route: {}", route.name);
        println!("Number of references: {}", route.references.len());
        println!("Distance threshold: {}", route.distance_threshold);
        println!("Metadata: {:?}", route.metadata);
    }

    if !keep {
        router.delete()?;
        info!("Demo router removed");
    }
    Ok(())
}

fn print_matches(router: &SemanticRouter, query: &str, matches: &[RouteMatch]) -> Result<(), Box<dyn Error>> {
    println!();
    print_colored(Color::Cyan, &format!("Query: '{query}'"))?;
    println!();
    if matches.is_empty() {
        print_colored(Color::Yellow, "  No matching routes found")?;
        println!();
        return Ok(());
    }
    for (i, m) in matches.iter().enumerate() {
        println!("  {}. {} (distance: {:.4})", i + 1, m.name, m.distance);
        if let Some(route) = router.get(&m.name) {
            for (key, value) in route.metadata.iter().filter(|(_, v)| !v.is_empty()) {
                println!("     {key}: {value}");
            }
            println!("     threshold: {}", route.distance_threshold);
        }
    }
    Ok(())
}

fn print_colored(color: Color, text: &str) -> Result<(), Box<dyn Error>> {
    let mut out = stdout();
    out.execute(SetForegroundColor(color))?;
    out.execute(Print(text))?;
    out.execute(SetForegroundColor(Color::Reset))?;
    Ok(())
}

fn print_header(title: &str) -> Result<(), Box<dyn Error>> {
    let mut out = stdout();
    out.execute(SetAttribute(Attribute::Bold))?;
    out.execute(SetForegroundColor(Color::Cyan))?;
    out.execute(Print(format!("\n{}\n  {title}\n{}\n", "=".repeat(60), "=".repeat(60))))?;
    out.execute(SetAttribute(Attribute::Reset))?;
    out.execute(SetForegroundColor(Color::Reset))?;
    Ok(())
}

/// Write the default configuration and the banking routes file.
///
/// Existing files are kept unless `force` is set.
fn init(config_path: &Path, force: bool) -> Result<(), Box<dyn Error>> {
    let dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    info!("Creating config directory: {}", dir.display());
    fs::create_dir_all(&dir)?;

    let routes_path = dir.join("routes.yaml");
    let config = BankRouterConfig {
        routes_path: Some(routes_path.to_string_lossy().into_owned()),
        ..BankRouterConfig::default()
    };

    if routes_path.exists() && !force {
        warn!("{} exists, leaving it untouched", routes_path.display());
    } else {
        info!("Creating routes file: {}", routes_path.display());
        let definition = banking_router_definition(&config.router_name, config.routing.clone());
        fs::write(&routes_path, definition.to_yaml_string()?)?;
    }

    if config_path.exists() && !force {
        warn!("{} exists, leaving it untouched", config_path.display());
    } else {
        info!("Creating config file: {}", config_path.display());
        config.save(config_path)?;
    }

    println!("Configuration written to {}", dir.display());
    Ok(())
}
