//! Command-line entry point for the split-archive ingestion service.

use clap::{Args, Parser, Subcommand};
use split_ingest::{Config, Event, Ingestor, JobOutcome, run_with_shutdown};
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "split-ingest")]
#[command(version, about = "Watch a folder for split archives and extract them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the incoming folder and sweep it periodically until interrupted
    Run(ConfigArgs),

    /// Sweep the incoming folder once, process what is found, then exit
    Once(ConfigArgs),

    /// Print the effective configuration as JSON
    ShowConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory holding Incoming, Temp, Completed, Processed and Failed
    #[arg(short, long)]
    base_path: Option<PathBuf>,

    /// Seconds between reconciliation sweeps
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Seconds a first part must keep the same size
    #[arg(long)]
    stability_wait: Option<u64>,

    /// Minimum age in seconds before the sweep considers a first part
    #[arg(long)]
    sweep_min_age: Option<u64>,

    /// Extraction attempts per archive
    #[arg(long)]
    max_retries: Option<u32>,

    /// Path to the 7-Zip binary
    #[arg(long)]
    tool: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(&self) -> split_ingest::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(base_path) = &self.base_path {
            config.base_path = base_path.clone();
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.stability_wait {
            config.stability_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = self.sweep_min_age {
            config.sweep_min_age = Duration::from_secs(secs);
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(tool) = &self.tool {
            config.tool.path = Some(tool.clone());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => handle_run(args).await,
        Commands::Once(args) => handle_once(args).await,
        Commands::ShowConfig(args) => handle_show_config(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn handle_run(args: ConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.load()?;
    init_tracing(&config)?;

    let notify_bell = config.notify_bell;
    let ingestor = Ingestor::new(config).await?;
    if notify_bell {
        spawn_bell(&ingestor);
    }

    ingestor.start()?;
    run_with_shutdown(ingestor).await?;
    Ok(())
}

async fn handle_once(args: ConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.load()?;
    init_tracing(&config)?;

    let ingestor = Ingestor::new(config).await?;
    let outcomes = ingestor.run_once().await?;

    let succeeded = count(&outcomes, |o| matches!(o, JobOutcome::Succeeded { .. }));
    let failed = count(&outcomes, |o| matches!(o, JobOutcome::Failed { .. }));
    let abandoned = count(&outcomes, |o| matches!(o, JobOutcome::Abandoned { .. }));
    println!("{succeeded} succeeded, {failed} failed, {abandoned} left for later");

    if failed > 0 {
        process::exit(2);
    }
    Ok(())
}

fn handle_show_config(args: ConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.load()?;
    config.validate()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn count(outcomes: &[JobOutcome], pred: impl Fn(&JobOutcome) -> bool) -> usize {
    outcomes.iter().filter(|o| pred(o)).count()
}

/// Log to stdout and append to `<base_path>/<log_file_name>`
fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.base_path)?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_file())?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)))
        .init();
    Ok(())
}

/// Ring the terminal bell whenever a job reaches a terminal state
fn spawn_bell(ingestor: &Ingestor) {
    let mut events = ingestor.subscribe();
    tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match events.recv().await {
                Ok(Event::Succeeded { .. } | Event::Failed { .. }) => {
                    let mut stdout = std::io::stdout();
                    stdout.write_all(b"\x07").ok();
                    stdout.flush().ok();
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });
}
