mod commands;
mod services;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use roomstage::config::{default_config_path, load_config};
use roomstage::PhotoStatus;

use crate::services::Services;

#[derive(Parser, Debug)]
#[command(name = "roomstage", version, about = "Submit room photos for AI staging and track the results")]
struct Cli {
    /// Config file (defaults to ~/.roomstage/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a room photo and create an empty-room version of it
    Create {
        image: String,
        #[arg(long)]
        room_type: Option<String>,
    },
    /// Apply a style to the empty version of an existing photo
    Style {
        empty_image: String,
        #[arg(long)]
        style: String,
        #[arg(long = "photo")]
        photo_id: String,
    },
    /// List cached photos, newest first
    List {
        #[arg(long)]
        status: Option<PhotoStatus>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print one cached photo as JSON
    Show { photo_id: String },
    /// Mark processing photos without a valid job as failed
    Sweep,
    /// Resume polling for every processing photo with a job
    Resume,
}

fn init_logging(json: bool, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "roomstage={lvl},roomstage_cli={lvl}",
            lvl = default_level
        ))
    });

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)));

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install tracing subscriber: {}", e);
        return;
    }
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }
}

async fn run(cli: Cli) -> roomstage::Result<()> {
    let config_path = cli
        .config
        .or_else(default_config_path)
        .ok_or_else(|| roomstage::ConfigError::Validation {
            message: "Could not determine config path; pass --config".to_string(),
        })?;
    let config = load_config(&config_path)?;
    log::info!("Loaded config from {}", config_path.display());

    let services = Services::build(&config)?;

    match cli.command {
        Command::Create { image, room_type } => {
            commands::create(&services, &image, room_type.as_deref()).await
        }
        Command::Style {
            empty_image,
            style,
            photo_id,
        } => commands::style(&services, &empty_image, &style, &photo_id).await,
        Command::List { status, limit } => {
            commands::list(&services, status, limit);
            Ok(())
        }
        Command::Show { photo_id } => commands::show(&services, &photo_id),
        Command::Sweep => {
            commands::sweep(&services);
            Ok(())
        }
        Command::Resume => {
            commands::resume(&services).await;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json, cli.verbose);

    log::info!("roomstage v{}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
