/// Version injected at compile time via AZTAG_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("AZTAG_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use aztag::azure::auth::AzureCredentials;
use aztag::azure::client::AzureClient;
use aztag::compliance::{run_scan, ComplianceReport, Remediator, ScanOptions};
use aztag::config::Config;
use aztag::notification::{format_message, Notifier, Platform};
use aztag::report::history::append_history;
use aztag::report::{json, reporters_for, summary_table, write_reports, OutputFormat};
use aztag::resource::ResourceFilter;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Azure tag compliance scanner
#[derive(Parser, Debug)]
#[command(name = "aztag", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan resources, optionally remediate, and write reports
    Scan(ScanArgs),

    /// Re-render an existing JSON report
    Report {
        /// Path to a compliance_report_*.json
        report: PathBuf,

        /// Output formats (comma separated)
        #[arg(long, value_enum, value_delimiter = ',')]
        format: Vec<OutputFormat>,

        /// Output directory (defaults to the configured output_dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Configuration directory
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },

    /// Send a notification for a report (latest by default)
    Notify {
        /// Report to notify about
        #[arg(long)]
        report: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "both")]
        platform: Platform,

        /// Link to the full report
        #[arg(long)]
        report_url: Option<String>,

        /// Configuration directory
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },

    /// Write the default configuration into a directory
    InitConfig {
        dir: PathBuf,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Configuration directory (default: ./config, then the user config dir)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Subscription to scan (repeatable); all enabled subscriptions if omitted
    #[arg(long, value_delimiter = ',')]
    subscription: Vec<String>,

    /// Only scan this resource group
    #[arg(long)]
    resource_group: Option<String>,

    /// Only scan this resource type (e.g. Microsoft.Compute/virtualMachines)
    #[arg(long)]
    resource_type: Option<String>,

    /// Apply remediation instead of a dry run
    #[arg(long, conflicts_with = "dry_run")]
    remediate: bool,

    /// Never write tags, even if enabled in configuration
    #[arg(long)]
    dry_run: bool,

    /// Output formats (comma separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    format: Vec<OutputFormat>,

    /// Output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Send notifications when the scan completes
    #[arg(long)]
    notify: bool,

    /// Link to the full report, included in notifications
    #[arg(long)]
    report_url: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> Option<&'static str> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some("error"),
            LogLevel::Warn => Some("warn"),
            LogLevel::Info => Some("info"),
            LogLevel::Debug => Some("debug"),
            LogLevel::Trace => Some("trace"),
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(directive) = level.as_directive() else {
        return Ok(None);
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("aztag={}", directive)));

    let Some(log_path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(None);
    };

    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("aztag {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = setup_logging(cli.log_level, cli.log_file.as_deref())?;

    match cli.command {
        Command::Scan(args) => scan(args).await,
        Command::Report {
            report,
            format,
            output_dir,
            config_dir,
        } => rerender(&report, format, output_dir, config_dir.as_deref()),
        Command::Notify {
            report,
            platform,
            report_url,
            config_dir,
        } => notify(report, platform, report_url.as_deref(), config_dir.as_deref()).await,
        Command::InitConfig { dir, force } => {
            let written = Config::defaults().export(&dir, force)?;
            for path in written {
                println!("Wrote {}", path.display());
            }
            Ok(())
        }
    }
}

async fn scan(args: ScanArgs) -> Result<()> {
    let config_dir = Config::resolve_dir(args.config_dir.as_deref());
    let config = Config::load(&config_dir)?;
    let settings = &config.settings;

    let credentials = AzureCredentials::from_env(settings.request_timeout())?;
    let client = AzureClient::new(
        credentials,
        &settings.management_endpoint,
        settings.request_timeout(),
    )
    .context("Failed to create Azure client")?;

    let remediate = !args.dry_run && (args.remediate || config.auto_remediation_enabled());
    let remediator = Remediator::new(remediate, settings.retry);

    let options = ScanOptions {
        subscriptions: args.subscription,
        filter: ResourceFilter {
            resource_group: args.resource_group,
            resource_type: args.resource_type,
        },
    };

    let mut report = run_scan(&client, &config, &options, &remediator).await?;

    let output_dir = args
        .output_dir
        .unwrap_or_else(|| settings.output_dir.clone());
    write_outputs(&mut report, &config, args.format, &output_dir);

    if let Err(e) = append_history(&report, &output_dir) {
        tracing::warn!("Failed to update compliance history: {:#}", e);
    }

    print!("{}", summary_table(&report));

    if report.summary.overall_compliance_rate < settings.compliance_threshold {
        tracing::warn!(
            "Compliance rate {:.2}% is below the threshold of {:.2}%",
            report.summary.overall_compliance_rate,
            settings.compliance_threshold
        );
    }

    if args.notify {
        if settings.notification_enabled {
            send_notification(&report, &config, Platform::Both, args.report_url.as_deref()).await?;
        } else {
            tracing::info!("Notifications are disabled in settings, skipping");
        }
    }

    Ok(())
}

fn write_outputs(
    report: &mut ComplianceReport,
    config: &Config,
    formats: Vec<OutputFormat>,
    output_dir: &Path,
) {
    let formats = if formats.is_empty() {
        config.settings.formats.clone()
    } else {
        formats
    };

    let reporters = reporters_for(&formats, config.settings.compliance_threshold);
    let written = write_reports(report, &reporters, output_dir);
    for path in written {
        println!("Saved {}", path.display());
    }
}

fn rerender(
    path: &Path,
    formats: Vec<OutputFormat>,
    output_dir: Option<PathBuf>,
    config_dir: Option<&Path>,
) -> Result<()> {
    let config = Config::load(&Config::resolve_dir(config_dir))?;
    let mut report = json::load(path)?;

    let output_dir = output_dir.unwrap_or_else(|| config.settings.output_dir.clone());
    write_outputs(&mut report, &config, formats, &output_dir);
    print!("{}", summary_table(&report));
    Ok(())
}

async fn notify(
    report: Option<PathBuf>,
    platform: Platform,
    report_url: Option<&str>,
    config_dir: Option<&Path>,
) -> Result<()> {
    let config = Config::load(&Config::resolve_dir(config_dir))?;

    let path = match report {
        Some(path) => path,
        None => json::find_latest(&config.settings.output_dir)?,
    };
    tracing::info!("Notifying for report {}", path.display());

    let report = json::load(&path)?;
    send_notification(&report, &config, platform, report_url).await
}

async fn send_notification(
    report: &ComplianceReport,
    config: &Config,
    platform: Platform,
    report_url: Option<&str>,
) -> Result<()> {
    let notifier = Notifier::from_env(config.settings.request_timeout())?;
    let message = format_message(report, report_url);
    let delivered = notifier.send(platform, &message).await;
    tracing::info!("{} notification(s) delivered", delivered);
    Ok(())
}
