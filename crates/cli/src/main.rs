use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "botrelay")]
#[command(about = "Relay between chat bots and local HTTP clients", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a starter config (one bot, HTTP ingress, delivery endpoint).
    Init {
        /// Config file path (default: BOTRELAY_CONFIG_PATH or ~/.botrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the relay: one poller per bot, the HTTP ingress and the dispatch worker. Stops on SIGINT/SIGTERM or when any worker exits.
    Run {
        /// Config file path (default: BOTRELAY_CONFIG_PATH or ~/.botrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Show how a message would be rendered (directives, markdown, buttons) as JSON.
    Classify {
        /// Message file (default: stdin)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("botrelay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config }) => {
            if let Err(e) = lib::relay::run_from_config(config).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Classify { file }) => {
            if let Err(e) = run_classify(file) {
                eprintln!("{:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn run_classify(file: Option<PathBuf>) -> anyhow::Result<()> {
    let data = match file {
        Some(path) => std::fs::read(&path)?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };
    let classification = lib::message::classify(&data)?;
    println!("{}", serde_json::to_string_pretty(&classification)?);
    Ok(())
}
