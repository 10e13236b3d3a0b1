use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ojsandbox::config::Config;

mod commands;

const AUTH_SECRET_ENV: &str = "OJSANDBOX_AUTH_SECRET";

#[derive(Parser)]
#[command(name = "ojsandbox")]
#[command(
    author,
    version,
    about = "Online-judge code execution sandbox backed by pooled Docker containers"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to ojsandbox.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP sandbox (default)
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Shared secret for the `auth` header (overrides config)
        #[arg(long, env = "OJSANDBOX_AUTH_SECRET", hide_env_values = true)]
        auth_secret: Option<String>,
    },

    /// Submit a source file to a running sandbox
    Submit(commands::submit::SubmitArgs),

    /// Verify or pull the language images
    Image {
        #[command(subcommand)]
        action: commands::image::ImageAction,
    },

    /// Remove sandbox containers left behind by a previous run
    Prune,

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    let _log_guard = ojsandbox::logging::init(&config.logging, cli.verbose)?;

    let command = cli.command.unwrap_or_else(|| Commands::Serve {
        bind: None,
        auth_secret: std::env::var(AUTH_SECRET_ENV).ok(),
    });

    match command {
        Commands::Serve { bind, auth_secret } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(secret) = auth_secret {
                config.server.auth_secret = secret;
            }
            config.validate()?;
            commands::serve::run(config).await?;
        }
        Commands::Submit(args) => {
            commands::submit::run(args, &config).await?;
        }
        Commands::Image { action } => {
            commands::image::run(action, &config).await?;
        }
        Commands::Prune => {
            commands::prune::run(&config).await?;
        }
        Commands::Config => {
            commands::config::run(&config)?;
        }
    }

    Ok(())
}
