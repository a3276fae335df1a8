#![deny(unsafe_code)]

//! arcs CLI: runs the server and talks to a running one.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use arcs_config::AppConfig;
use arcs_core::{ArcsClient, Attributes, Server};

/// arcs: attribute-routed configuration for remote collectors.
#[derive(Parser)]
#[command(name = "arcs", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "arcs.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Server URL for client commands. Defaults to the configured listener.
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load manifests and serve configs.
    Serve,

    /// Validate the configuration and manifests without serving.
    Check {
        /// Print the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    /// Manage config sources on a running server.
    #[command(subcommand)]
    Configs(ConfigsCommand),

    /// Manage collectors on a running server.
    #[command(subcommand)]
    Collectors(CollectorsCommand),
}

#[derive(Subcommand)]
enum ConfigsCommand {
    /// List config sources, optionally filtered by attributes.
    List {
        #[arg(value_parser = parse_attributes)]
        attributes: Option<Attributes>,
    },

    /// Resolve the config a collector would receive.
    Get {
        #[arg(long)]
        collector: String,

        #[arg(value_parser = parse_attributes)]
        attributes: Option<Attributes>,

        /// Hash the collector already holds.
        #[arg(long)]
        hash: Option<String>,
    },

    /// Add or replace a config source (`protocol://path`).
    Add {
        source: String,

        #[arg(value_parser = parse_attributes)]
        attributes: Option<Attributes>,
    },

    /// Remove a config source by id.
    Remove { id: String },
}

#[derive(Subcommand)]
enum CollectorsCommand {
    /// List collectors, optionally filtered by attributes.
    List {
        #[arg(value_parser = parse_attributes)]
        attributes: Option<Attributes>,
    },

    /// Show one collector.
    Get { id: String },

    /// Register a collector.
    Add {
        id: String,
        name: String,

        #[arg(value_parser = parse_attributes)]
        attributes: Option<Attributes>,
    },

    /// Unregister a collector.
    Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    // RUST_LOG wins, then -v, then the configured level.
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Serve => cmd_serve(config).await?,
        Commands::Check { show } => cmd_check(&cli.config, &config, show).await?,
        Commands::Configs(command) => {
            let client = client_for(cli.server.as_deref(), &config)?;
            cmd_configs(&client, command).await?;
        }
        Commands::Collectors(command) => {
            let client = client_for(cli.server.as_deref(), &config)?;
            cmd_collectors(&client, command).await?;
        }
    }

    Ok(())
}

async fn cmd_serve(config: AppConfig) -> Result<()> {
    let server = Server::new(config).context("failed to initialise server")?;
    server.bootstrap().await.context("failed to load manifests")?;
    info!(addr = %server.config().listen_socket(), "starting arcs server");
    server.run().await?;
    Ok(())
}

async fn cmd_check(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let rendered = toml::to_string_pretty(config).context("failed to render config")?;
        println!("{rendered}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }

    let path = Path::new(&config.manifests.path);
    let loaded = arcs_core::manifest::load(path)
        .await
        .with_context(|| format!("failed to load manifests from {}", path.display()))?;
    for record in &loaded.rejected {
        warn!(error = %record, "rejected manifest record");
    }
    println!(
        "Loaded {} config source(s) from '{}', {} record(s) rejected.",
        loaded.sources.len(),
        path.display(),
        loaded.rejected.len()
    );

    if config.manifests.strict && !loaded.is_clean() {
        bail!(
            "{} manifest record(s) rejected in strict mode",
            loaded.rejected.len()
        );
    }
    Ok(())
}

async fn cmd_configs(client: &ArcsClient, command: ConfigsCommand) -> Result<()> {
    match command {
        ConfigsCommand::List { attributes } => {
            let configs = client.list_configs(&attributes.unwrap_or_default()).await?;
            print_json(&configs)?;
        }
        ConfigsCommand::Get {
            collector,
            attributes,
            hash,
        } => {
            let resolved = client
                .get_config(&collector, attributes.unwrap_or_default(), hash)
                .await?;
            if resolved.not_modified {
                eprintln!("not modified ({})", resolved.hash);
            } else {
                println!("{}", resolved.content);
                eprintln!("hash: {}", resolved.hash);
            }
        }
        ConfigsCommand::Add { source, attributes } => {
            let id = client
                .add_config(&source, attributes.unwrap_or_default())
                .await?;
            println!("{id}");
        }
        ConfigsCommand::Remove { id } => {
            if client.remove_config(&id).await? {
                println!("Removed config {id}.");
            } else {
                println!("No config with id {id}.");
            }
        }
    }
    Ok(())
}

async fn cmd_collectors(client: &ArcsClient, command: CollectorsCommand) -> Result<()> {
    match command {
        CollectorsCommand::List { attributes } => {
            let collectors = client
                .list_collectors(&attributes.unwrap_or_default())
                .await?;
            print_json(&collectors)?;
        }
        CollectorsCommand::Get { id } => {
            print_json(&client.get_collector(&id).await?)?;
        }
        CollectorsCommand::Add {
            id,
            name,
            attributes,
        } => {
            let resp = client
                .register_collector(&id, &name, attributes.unwrap_or_default())
                .await?;
            if resp.created {
                println!("Registered collector {id}.");
            } else {
                println!("Collector {id} already registered.");
            }
        }
        CollectorsCommand::Remove { id } => {
            if client.unregister_collector(&id).await? {
                println!("Unregistered collector {id}.");
            } else {
                println!("Collector {id} was not registered.");
            }
        }
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load config from {}", path.display()))
    } else {
        Ok(AppConfig::default())
    }
}

fn client_for(server: Option<&str>, config: &AppConfig) -> Result<ArcsClient> {
    let url = match server {
        Some(url) => url.to_string(),
        None => default_server_url(config),
    };
    Ok(ArcsClient::new(&url)?)
}

/// The configured listener as a URL. Wildcard bind addresses are reached
/// over loopback.
fn default_server_url(config: &AppConfig) -> String {
    let host = match config.server.listen_addr.as_str() {
        "0.0.0.0" | "" => "127.0.0.1",
        "::" | "[::]" => "[::1]",
        addr => addr,
    };
    format!("http://{host}:{}", config.server.listen_port)
}

/// Parse `key=value,key2=value2`. An empty string yields no attributes.
fn parse_attributes(s: &str) -> Result<Attributes, String> {
    let mut attributes = Attributes::new();
    for pair in s.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("attribute {pair:?} is not of the form key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("attribute {pair:?} has an empty key"));
        }
        attributes.insert(key.to_string(), value.trim().to_string());
    }
    Ok(attributes)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
