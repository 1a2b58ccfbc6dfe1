pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "registrar")]
#[command(about = "Registrar CLI - operator tools for the registrar API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply embedded database migrations to DATABASE_URL")]
    Migrate,

    #[command(about = "Mint a bearer token for a principal (development use)")]
    Token(commands::token::TokenArgs),

    #[command(about = "Price a document request without storing it")]
    Quote(commands::quote::QuoteArgs),

    #[command(about = "Check the /health endpoint of a running server")]
    Ping(commands::ping::PingArgs),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate => commands::migrate::handle(output_format).await,
        Commands::Token(args) => commands::token::handle(args, output_format),
        Commands::Quote(args) => commands::quote::handle(args, output_format),
        Commands::Ping(args) => commands::ping::handle(args, output_format).await,
    }
}
