use clap::{Parser, Subcommand};
use matchbook::{config, engine, script};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "matchbook", about = "Matchbook Limit Order Book Engine")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted order flow and verify its terminal assertion.
    Replay {
        /// Path to the script file.
        file: PathBuf,
    },
}

fn init_logging(cfg: &config::AppConfig) {
    match cfg.logger.format {
        config::LogFormat::JSON => {
            tracing_subscriber::fmt()
                .json()
                .with_max_level(cfg.logger.level)
                .with_current_span(true)
                .init();
        }
        config::LogFormat::COMPACT => {
            tracing_subscriber::fmt()
                .compact()
                .with_max_level(cfg.logger.level)
                .init();
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = config::AppConfig::load(cli.config_path.as_ref()).expect("could not load config");

    init_logging(&config);

    match cli.command {
        Commands::Replay { file } => {
            let input = std::fs::read_to_string(&file).expect("could not read script file");
            let engine = engine::Engine::new(&config.session).expect("could not start engine");

            match script::verify(&engine, &input) {
                Ok(totals) => {
                    info!(
                        orders = totals.orders,
                        bid_levels = totals.bid_levels,
                        ask_levels = totals.ask_levels,
                        "script verified"
                    );
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    error!(script = %file.display(), "replay failed: {err}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
