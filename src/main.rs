use amplitude_importer::cli::run::{RunError, RunOptions};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "amplitude-importer")]
#[command(about = "Import line-delimited JSON events into Amplitude", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    import: ImportArgs,
}

#[derive(clap::Args)]
struct ImportArgs {
    /// Event file, one JSON object per line
    file: Option<PathBuf>,

    /// Environment variable holding the API key
    #[arg(long, value_name = "VAR")]
    api_key_env: Option<String>,

    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum concurrent uploads
    #[arg(long)]
    concurrency: Option<usize>,

    /// Log and skip lines that cannot be parsed instead of aborting
    #[arg(long)]
    skip_malformed: bool,
}

#[derive(Subcommand)]
enum Commands {
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

/// Some batches were never accepted by the endpoint
const EXIT_PARTIAL_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout is reserved for `config init --stdout`
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "amplitude_importer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { action }) => {
            let result = match action {
                ConfigAction::Init { stdout } => amplitude_importer::cli::config::init(stdout),
                ConfigAction::Validate => {
                    let path = amplitude_importer::config::resolve_config_path(cli.config.as_deref());
                    amplitude_importer::cli::config::validate(path)
                }
            };
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        None => run_import(cli.config, cli.import).await,
    }
}

async fn run_import(config_path: Option<PathBuf>, args: ImportArgs) -> ExitCode {
    let Some(file) = args.file else {
        eprintln!("Error: no input file given");
        eprintln!("Usage: amplitude-importer <FILE>");
        return ExitCode::FAILURE;
    };

    let options = RunOptions {
        file,
        config_path,
        api_key_env: args.api_key_env,
        endpoint: args.endpoint,
        batch_size: args.batch_size,
        concurrency: args.concurrency,
        skip_malformed: args.skip_malformed,
    };

    match amplitude_importer::cli::run::run(options).await {
        Ok(summary) if summary.all_delivered() => ExitCode::SUCCESS,
        Ok(summary) => {
            tracing::error!(
                failed_batches = summary.failed_batches,
                failed_events = summary.failed_events,
                "Some batches were not delivered"
            );
            ExitCode::from(EXIT_PARTIAL_FAILURE)
        }
        Err(RunError::Config(e)) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Import failed");
            ExitCode::FAILURE
        }
    }
}
