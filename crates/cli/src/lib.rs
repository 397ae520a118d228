pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use vendedor_core::config::{ConfigOverrides, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "vendedor",
    about = "Vendedor sales assistant CLI",
    long_about = "Chat with the sales assistant, query the product catalog, and inspect configuration.",
    after_help = "Examples:\n  vendedor chat\n  vendedor search televisor --max-price \"1.5 millones\" --brand lg\n  vendedor doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a vendedor.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the product catalog CSV path")]
    catalog: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the log level (trace|debug|info|warn|error)")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive conversation with the assistant")]
    Chat {
        #[arg(long, help = "Session id to use (a random one is generated when omitted)")]
        session: Option<String>,
    },
    #[command(about = "Run a deterministic catalog search and print the results as JSON")]
    Search {
        #[arg(help = "Product category or synonym, e.g. `televisor` or `tv`")]
        category: String,
        #[arg(long, help = "Inclusive price ceiling, e.g. `1500000` or `1.5 millones`")]
        max_price: Option<String>,
        #[arg(long, help = "Case-insensitive brand filter")]
        brand: Option<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, catalog availability, and model endpoint settings")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                catalog_path: self.catalog.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    let result = match cli.command {
        Command::Chat { session } => commands::chat::run(options, session),
        Command::Search { category, max_price, brand } => {
            commands::search::run(options, &category, max_price.as_deref(), brand)
        }
        Command::Config => commands::config::run(options),
        Command::Doctor { json } => commands::doctor::run(options, json),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
