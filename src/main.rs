use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use alloy_migrator::cli;
use alloy_migrator::cli::migrate::PromtailOptions;
use alloy_migrator::{ExternalValidator, MigratorSettings, TranslationMode};

#[derive(Parser)]
#[command(
    name = "alloy-migrator",
    about = "Migrate Promtail and node_exporter configurations to Grafana Alloy",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Set the log level")]
    log_level: Option<Level>,

    #[arg(
        long,
        global = true,
        env = "ALLOY_MIGRATOR_SETTINGS",
        help = "Path to a TOML settings file"
    )]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Migrate a Promtail configuration")]
    MigratePromtail {
        #[arg(help = "Path to the Promtail YAML file, or - for stdin")]
        config: String,

        #[arg(short, long, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,

        #[arg(short = 'd', long, help = "Show a unified diff against the current output")]
        diff: bool,

        #[arg(long, help = "Skip unsupported stages and features with a warning")]
        best_effort: bool,

        #[arg(long, help = "Validate the result with the alloy binary before writing")]
        validate: bool,
    },

    #[command(about = "Migrate a node_exporter systemd unit or ExecStart line")]
    MigrateNodeExporter {
        #[arg(
            short,
            long,
            conflicts_with = "exec_start",
            required_unless_present = "exec_start",
            help = "Path to the systemd service file"
        )]
        service_file: Option<PathBuf>,

        #[arg(short, long, help = "ExecStart line from the service file")]
        exec_start: Option<String>,

        #[arg(short, long, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,

        #[arg(long, help = "Remote write endpoint for collected metrics")]
        remote_write_url: Option<String>,
    },

    #[command(about = "Migrate several configurations, one output file each")]
    MigrateAll {
        #[arg(short, long = "promtail", help = "Promtail YAML file (repeatable)")]
        promtail: Vec<PathBuf>,

        #[arg(short, long, help = "node_exporter systemd service file")]
        node_service: Option<PathBuf>,

        #[arg(short, long, default_value = ".", help = "Output directory")]
        output_dir: PathBuf,

        #[arg(long, help = "Skip unsupported stages and features with a warning")]
        best_effort: bool,

        #[arg(long, help = "Remote write endpoint for collected metrics")]
        remote_write_url: Option<String>,
    },

    #[command(about = "Validate an Alloy configuration file")]
    Validate {
        #[arg(help = "Path to the Alloy configuration file")]
        file: PathBuf,
    },

    #[command(about = "List supported pipeline stages")]
    ListStages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => MigratorSettings::from_file(path).await?,
        None => MigratorSettings::default(),
    };

    // Initialize logging; stdout is reserved for generated configuration
    let log_level = match cli.log_level {
        Some(level) => level,
        None => settings.global.log_level.parse().unwrap_or(Level::INFO),
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &cli.settings {
        debug!("Loaded settings from {:?}", path);
    }

    let mode_for = |best_effort: bool| {
        if best_effort {
            TranslationMode::BestEffort
        } else {
            settings.global.mode
        }
    };

    match cli.command {
        Commands::MigratePromtail {
            config,
            output,
            diff,
            best_effort,
            validate,
        } => {
            let validator = validate.then(|| ExternalValidator::from_settings(&settings.validator));
            let options = PromtailOptions {
                output,
                show_diff: diff,
                mode: mode_for(best_effort),
            };
            cli::migrate::migrate_promtail(&config, options, validator.as_ref()).await?;
        }

        Commands::MigrateNodeExporter {
            service_file,
            exec_start,
            output,
            remote_write_url,
        } => {
            let url = remote_write_url.unwrap_or_else(|| settings.node_exporter.remote_write_url.clone());
            cli::migrate::migrate_node_exporter(service_file, exec_start, output, &url).await?;
        }

        Commands::MigrateAll {
            promtail,
            node_service,
            output_dir,
            best_effort,
            remote_write_url,
        } => {
            let url = remote_write_url.unwrap_or_else(|| settings.node_exporter.remote_write_url.clone());
            let items = cli::migrate::migrate_all(
                promtail,
                node_service,
                &output_dir,
                mode_for(best_effort),
                &url,
            )
            .await?;

            let failed = items.iter().filter(|item| item.result.is_err()).count();
            if failed > 0 {
                anyhow::bail!("{} of {} migration(s) failed", failed, items.len());
            }
        }

        Commands::Validate { file } => {
            let validator = ExternalValidator::from_settings(&settings.validator);
            cli::validate::validate_file(&file, &validator).await?;
        }

        Commands::ListStages => {
            cli::list_stages()?;
        }
    }

    Ok(())
}
