use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use esg_analytics::cli;

#[derive(Debug, Parser)]
#[command(name = "esg-analytics")]
#[command(about = "Multi-tenant ESG analytics API and offline query tool")]
struct App {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Listen address, overriding `server.addr` (e.g. 0.0.0.0:5000)
        #[arg(long)]
        addr: Option<String>,
        /// Worker threads, overriding `server.workers`
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Run one analytics view over a local CSV or JSON file
    Query {
        /// View: filters, overview, top-performers, industry-analysis,
        /// regional-insights, trends, correlations, export
        view: String,
        /// Dataset file (.csv, or .json with an array of records)
        #[arg(long)]
        file: PathBuf,
        /// Filter object as JSON, e.g. '{"minESGScore": 60}'
        #[arg(long)]
        filters: Option<String>,
        /// Ranking category for top-performers
        #[arg(long)]
        category: Option<String>,
        /// Number of companies for top-performers
        #[arg(long)]
        limit: Option<usize>,
        /// Output format: table (default), json
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Show or edit configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the effective merged configuration
    Show,
    /// Write the default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Set one key, e.g. `config set dataset.fallback sample`
    Set { key: String, value: String },
    /// Rewrite the config file with defaults
    Reset,
}

fn main() -> Result<()> {
    let app = App::parse();

    match app.command {
        Commands::Serve { addr, workers } => cli::run_serve(addr, workers),
        Commands::Query {
            view,
            file,
            filters,
            category,
            limit,
            format,
        } => cli::run_query(&cli::QueryOptions {
            view: &view,
            file: &file,
            filters: filters.as_deref(),
            category: category.as_deref(),
            limit,
            format: cli::OutputFormat::from_str_opt(Some(&format)),
        }),
        Commands::Config { action } => match action {
            ConfigAction::Show => cli::run_config_show(),
            ConfigAction::Init { force } => cli::run_config_init(force),
            ConfigAction::Set { key, value } => cli::run_config_set(&key, &value),
            ConfigAction::Reset => cli::run_config_reset(),
        },
    }
}
