pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "atlas-api")]
#[command(about = "Atlas API - accounts, uploads and OAuth client administration")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Apply pending migrations before listening")]
        migrate: bool,
    },

    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "Create the default accounts")]
    Seed {
        #[arg(long, default_value_t = 0, help = "Additional random users to create")]
        extra: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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

    match cli.command.unwrap_or(Commands::Serve { migrate: false }) {
        Commands::Serve { migrate } => commands::serve::handle(migrate).await,
        Commands::Migrate => commands::migrate::handle(output_format).await,
        Commands::Seed { extra } => commands::seed::handle(extra, output_format).await,
    }
}
