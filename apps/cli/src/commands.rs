//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use jetmaster_core::builder::{self, BuildOutcome};
use jetmaster_core::progress::ProgressReporter;
use jetmaster_core::promoter::{self, PromoteOutcome, PublishMode};
use jetmaster_fetch::{FetchOptions, HttpFetcher};
use jetmaster_shared::{AppConfig, MasterSettings, init_config, load_config, load_config_from};
use jetmaster_storage::{S3ReleaseStore, Workspace};
use tracing::{error, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// jetmaster: merge component bundles into a site's master bundle.
#[derive(Parser)]
#[command(
    name = "jetmaster",
    version,
    about = "Merge a component bundle into its site's master bundle and publish the master release.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Project working directory (defaults to the current directory).
    #[arg(long, global = true)]
    pub working_dir: Option<PathBuf>,

    /// Site name, overriding JETPACK_SITE and the config file.
    #[arg(long, global = true)]
    pub site: Option<String>,

    /// Config file (defaults to jetmaster.toml in the working directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Merge the project into the master bundle and write the master descriptor locally.
    Build,

    /// Write the master descriptor from the built release.json without publishing.
    Manifest,

    /// Write the master descriptor and publish it as the site's master release.
    Release,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "jetmaster=info",
        1 => "jetmaster=debug",
        _ => "jetmaster=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command. Failures are logged here before they end the process.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let result = match &cli.command {
        Command::Build => cmd_build(&cli).await,
        Command::Manifest => cmd_promote(&cli, PublishMode::LocalOnly).await,
        Command::Release => cmd_promote(&cli, PublishMode::Publish).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&cli),
            ConfigAction::Show => cmd_config_show(&cli),
        },
    };

    if let Err(err) = &result {
        error!(error = %err, "command failed");
    }
    result
}

/// Load config from file, overlay the environment, then apply CLI flags.
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let working_dir = match &cli.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()
            .map_err(|e| eyre!("cannot determine working directory: {e}"))?,
    };

    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config(&working_dir)?,
    };
    config.apply_env();

    match &cli.working_dir {
        Some(dir) => config.site.working_dir = dir.clone(),
        None if config.site.working_dir.is_relative() => {
            config.site.working_dir = working_dir.join(&config.site.working_dir);
        }
        None => {}
    }
    if let Some(site) = &cli.site {
        config.site.name = Some(site.clone());
    }

    Ok(config)
}

async fn cmd_build(cli: &Cli) -> Result<()> {
    let config = resolve_config(cli)?;
    if !config.master.merge_enabled() {
        info!("no master path configured, no bundle merge performed");
        println!("No master path configured, no bundle merge performed.");
        return Ok(());
    }

    let settings = MasterSettings::resolve(&config)?;

    let store = S3ReleaseStore::connect(&config.storage).await;
    let fetcher = HttpFetcher::new(&FetchOptions::with_base(
        settings.component_base.as_deref(),
    )?)?;
    let workspace = Workspace::new(&settings.site_dist_dir);

    info!(site = %settings.site, "building master bundle");

    let reporter = CliProgress::new();
    let outcome =
        builder::build_master(&settings, &store, &fetcher, &workspace, &reporter).await;
    reporter.finish();

    match outcome? {
        BuildOutcome::Skipped => {
            println!("No master path configured, no bundle merge performed.");
        }
        BuildOutcome::Built(report) => {
            let master = report.descriptor.master.as_ref();
            println!();
            println!("  Master bundle built!");
            println!("  Site:       {}", settings.site);
            println!(
                "  Components: {}",
                master.map(|m| m.components.len()).unwrap_or_default()
            );
            println!("  Artifact:   {}", report.artifact.path.display());
            println!("  Size:       {} bytes", report.artifact.size_bytes);
            println!("  SHA-256:    {}", report.artifact.sha256);
            println!("  Manifest:   {}", report.candidate_path.display());
            println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
            println!();
        }
    }

    Ok(())
}

async fn cmd_promote(cli: &Cli, mode: PublishMode) -> Result<()> {
    let config = resolve_config(cli)?;
    if !config.master.merge_enabled() {
        info!("no master path configured, no master release performed");
        println!("No master path configured, no master release performed.");
        return Ok(());
    }

    let settings = MasterSettings::resolve(&config)?;

    let store = S3ReleaseStore::connect(&config.storage).await;
    let workspace = Workspace::new(&settings.site_dist_dir);

    info!(site = %settings.site, ?mode, "promoting master release");

    let reporter = CliProgress::new();
    let outcome = promoter::promote(&settings, &store, &workspace, mode, &reporter).await;
    reporter.finish();

    match outcome? {
        PromoteOutcome::Skipped => {
            println!("No master path configured, no master release performed.");
        }
        PromoteOutcome::Promoted(report) => {
            println!();
            println!("  Master descriptor written: {}", report.candidate_path.display());
            println!("  Bundle:    {}", report.descriptor.bundle);
            if let Some(url) = report.published_url {
                println!("  Published: {url}");
            }
            println!();
        }
    }

    Ok(())
}

fn cmd_config_init(cli: &Cli) -> Result<()> {
    let working_dir = match &cli.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let path = init_config(&working_dir)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

/// Print the resolved configuration. Only credential variable names are part
/// of the config, never their values.
fn cmd_config_show(cli: &Cli) -> Result<()> {
    let config = resolve_config(cli)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn component_fetched(&self, label: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetching [{current}/{total}] {label}"));
    }
}
