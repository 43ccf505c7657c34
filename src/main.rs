use clap::{Parser, Subcommand};
use portfolio_qa::Result;
use portfolio_qa::commands::{chat, init_config, reload, serve, show_config, status};
use portfolio_qa::config::{Config, default_config_dir};

#[derive(Parser)]
#[command(name = "portfolio-qa")]
#[command(about = "Retrieval-augmented Q&A assistant for a personal portfolio")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask questions interactively on the terminal
    Chat,
    /// Start the HTTP API and web page
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 5000)]
        port: u16,
    },
    /// Re-ingest all documents from the data folder
    Reload,
    /// Show index size, embedding server health, and settings
    Status,
    /// Write a starter configuration file, or show the active one
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(default_config_dir()?)?;

    match cli.command {
        Commands::Chat => {
            chat(config).await?;
        }
        Commands::Serve { port } => {
            serve(config, port).await?;
        }
        Commands::Reload => {
            reload(config).await?;
        }
        Commands::Status => {
            status(config).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                init_config(&config)?;
            }
        }
    }

    Ok(())
}
