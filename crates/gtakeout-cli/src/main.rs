use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};

use gtakeout_core::config::LogLevel;
use gtakeout_core::progress::ProgressReporter;
use gtakeout_core::report::SessionReport;
use gtakeout_core::update::{self, UpdateStatus};
use gtakeout_core::download::DownloadStats;
use gtakeout_core::extract::ExtractStats;
use gtakeout_core::organize::OrganizeStats;
use gtakeout_core::utils::{format_bytes, format_duration};
use gtakeout_core::{logging, Config, Takeout};

#[derive(Parser)]
#[command(name = "gtakeout")]
#[command(about = "Download, extract and organize Google Takeout photo archives")]
#[command(version)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write a rotating log file here instead of logging to the console
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Number of worker threads for extraction and organizing (0 = auto)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Export the session report as CSV
    #[arg(long, global = true)]
    report_csv: Option<PathBuf>,

    /// Export the session report as HTML
    #[arg(long, global = true)]
    report_html: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every archive part from a Takeout page
    Download {
        /// Takeout "manage exports" page URL
        #[arg(long)]
        url: String,

        /// Where archives are saved
        #[arg(long)]
        download_dir: Option<PathBuf>,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Extract all downloaded archives
    Extract {
        /// Directory holding the downloaded archives
        #[arg(long)]
        download_dir: Option<PathBuf>,

        /// Directory to extract into
        #[arg(long)]
        extract_dir: Option<PathBuf>,
    },

    /// Sort photos into Year/Month/Day folders
    Organize {
        /// Directory to scan for photos
        #[arg(long)]
        source_dir: PathBuf,

        /// Root of the organized tree
        #[arg(long)]
        dest_dir: Option<PathBuf>,

        /// Log planned moves without touching any file
        #[arg(long)]
        dry_run: bool,
    },

    /// Download, extract and organize in one go
    Run {
        #[arg(long)]
        url: String,

        #[arg(long)]
        download_dir: Option<PathBuf>,

        #[arg(long)]
        extract_dir: Option<PathBuf>,

        #[arg(long)]
        dest_dir: Option<PathBuf>,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Path to save configuration file
        #[arg(default_value = "gtakeout.json")]
        path: PathBuf,
    },

    /// Check GitHub for a newer release
    CheckUpdate {
        /// Open the releases page when an update is available
        #[arg(long)]
        open: bool,
    },
}

#[derive(clap::Args)]
struct BrowserArgs {
    /// Chrome profile to reuse so the Google sign-in is remembered
    #[arg(long)]
    chrome_profile_dir: Option<PathBuf>,

    /// WebDriver (chromedriver) endpoint
    #[arg(long)]
    webdriver_url: Option<String>,

    /// Download every part again, ignoring the progress record
    #[arg(long)]
    no_resume: bool,
}

impl BrowserArgs {
    fn apply(self, config: &mut Config) {
        if let Some(dir) = self.chrome_profile_dir {
            config.chrome_profile_dir = Some(dir);
        }
        if let Some(url) = self.webdriver_url {
            config.webdriver_url = url;
        }
        if self.no_resume {
            config.resume = false;
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    dotenv::dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env();

    // Set log level based on verbosity
    if cli.verbose > 0 {
        config.log_level = match cli.verbose {
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        };
    }
    init_logging(cli.log_dir.as_deref(), config.log_level)?;

    if let Some(workers) = cli.workers {
        config.extract_workers = workers;
        config.organize_workers = workers;
    }

    let reports = ReportTargets {
        csv: cli.report_csv,
        html: cli.report_html,
    };

    match cli.command {
        Commands::Download {
            url,
            download_dir,
            browser,
        } => {
            set_dir(&mut config.download_dir, download_dir);
            browser.apply(&mut config);
            config.validate()?;

            run_session(config, &reports, |takeout, reporter| {
                let stats = block_on(takeout.download(&url, &reporter.sink()))?;
                println!(
                    "Download finished: {} downloaded, {} skipped, {} failed ({} parts)",
                    stats.downloaded, stats.skipped, stats.failed, stats.targets
                );
                Ok(())
            })
        }

        Commands::Extract {
            download_dir,
            extract_dir,
        } => {
            set_dir(&mut config.download_dir, download_dir);
            set_dir(&mut config.extract_dir, extract_dir);
            require_dir(&config.download_dir, "download")?;
            config.validate()?;

            run_session(config, &reports, |takeout, reporter| {
                let stats = takeout.extract(&reporter.sink())?;
                println!("{}", extract_summary(&stats));
                Ok(())
            })
        }

        Commands::Organize {
            source_dir,
            dest_dir,
            dry_run,
        } => {
            set_dir(&mut config.dest_dir, dest_dir);
            config.dry_run = config.dry_run || dry_run;
            require_dir(&source_dir, "source")?;
            config.validate()?;

            run_session(config, &reports, |takeout, reporter| {
                let stats = takeout.organize(&source_dir, &reporter.sink())?;
                println!(
                    "Organizing finished: {} photos, {} moved, {} skipped, {} failed",
                    stats.found, stats.moved, stats.skipped, stats.failed
                );
                Ok(())
            })
        }

        Commands::Run {
            url,
            download_dir,
            extract_dir,
            dest_dir,
            browser,
        } => {
            set_dir(&mut config.download_dir, download_dir);
            set_dir(&mut config.extract_dir, extract_dir);
            set_dir(&mut config.dest_dir, dest_dir);
            browser.apply(&mut config);
            config.validate()?;

            run_session(config, &reports, |takeout, reporter| {
                let downloaded = block_on(takeout.download(&url, &reporter.sink()))?;
                if takeout.cancel_token().is_cancelled() {
                    println!("Paused after downloading {} parts; re-run to resume", downloaded.downloaded);
                    return Ok(());
                }
                if downloaded.failed > 0 {
                    warn!("{} parts failed to download, continuing with what is on disk", downloaded.failed);
                }

                let (extracted, organized) = takeout.extract_and_organize(&reporter.sink())?;
                println!("{}", run_summary(&downloaded, &extracted, &organized));
                Ok(())
            })
        }

        Commands::GenerateConfig { path } => {
            let config = Config::default();
            config.save_to_file(&path)?;
            println!("Configuration file generated at: {}", path.display());
            Ok(())
        }

        Commands::CheckUpdate { open } => {
            match update::check_for_update(env!("CARGO_PKG_VERSION"), &config.release_repo) {
                UpdateStatus::UpToDate { current } => {
                    println!("gtakeout {} is up to date", current);
                }
                UpdateStatus::Available { current, latest } => {
                    println!("A new version is available: {} (you have {})", latest, current);
                    if let Some(url) = update::releases_page_url(&config.release_repo) {
                        if open {
                            open::that(&url).with_context(|| format!("Failed to open {}", url))?;
                        } else {
                            println!("Download it from {}", url);
                        }
                    }
                }
                UpdateStatus::Unknown { current } => {
                    println!("Could not check for updates (running {})", current);
                }
                UpdateStatus::NotConfigured { current } => {
                    println!(
                        "No release repository configured (running {}); set release_repo or {}",
                        current,
                        gtakeout_core::config::RELEASE_REPO_ENV
                    );
                }
            }
            Ok(())
        }
    }
}

struct ReportTargets {
    csv: Option<PathBuf>,
    html: Option<PathBuf>,
}

fn init_logging(log_dir: Option<&Path>, level: LogLevel) -> anyhow::Result<()> {
    match log_dir {
        Some(dir) => logging::init_logger(dir, level.to_level_filter())
            .map_err(|e| anyhow!("Failed to initialize logging: {}", e)),
        None => {
            env_logger::Builder::new()
                .filter_level(level.to_level_filter())
                .parse_default_env()
                .init();
            Ok(())
        }
    }
}

fn set_dir(target: &mut PathBuf, value: Option<PathBuf>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn require_dir(path: &Path, what: &str) -> anyhow::Result<()> {
    if !path.is_dir() {
        bail!("The {} directory {} does not exist", what, path.display());
    }
    Ok(())
}

fn block_on<T, F>(future: F) -> anyhow::Result<T>
where
    F: std::future::Future<Output = gtakeout_core::Result<T>>,
{
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    Ok(runtime.block_on(future)?)
}

/// Run `stage` with Ctrl-C pausing and a progress reporter, then print and export the report
fn run_session<F>(config: Config, reports: &ReportTargets, stage: F) -> anyhow::Result<()>
where
    F: FnOnce(&Takeout, &ProgressReporter) -> anyhow::Result<()>,
{
    let takeout = Takeout::new(config);
    takeout
        .cancel_token()
        .install_ctrlc_handler()
        .context("Failed to install Ctrl-C handler")?;

    let started = std::time::Instant::now();
    let reporter = ProgressReporter::start(true).context("Failed to start progress reporter")?;
    let result = stage(&takeout, &reporter);
    let report = reporter.finish();

    info!("Session took {}", format_duration(started.elapsed()));
    export_reports(&report, reports)?;
    result
}

fn extract_summary(stats: &ExtractStats) -> String {
    format!(
        "Extraction finished: {} of {} archives extracted ({}), {} failed",
        stats.extracted,
        stats.archives,
        format_bytes(stats.bytes),
        stats.failed
    )
}

fn run_summary(downloaded: &DownloadStats, extracted: &ExtractStats, organized: &OrganizeStats) -> String {
    format!(
        "Done: {} parts downloaded, {} archives extracted, {} photos moved, {} skipped",
        downloaded.downloaded, extracted.extracted, organized.moved, organized.skipped
    )
}

fn export_reports(report: &SessionReport, targets: &ReportTargets) -> anyhow::Result<()> {
    if report.is_empty() {
        return Ok(());
    }

    let summary = report.summarize();
    println!(
        "Summary: download {}/{}/{} (done/skipped/errors), extract {}/{} (done/errors), organize {}/{}/{} (done/skipped/errors)",
        summary.download_completed,
        summary.download_skipped,
        summary.download_errors,
        summary.extract_completed,
        summary.extract_errors,
        summary.organize_completed,
        summary.organize_skipped,
        summary.organize_errors,
    );

    if let Some(path) = &targets.csv {
        report.export_csv(path)?;
        println!("Report written to {}", path.display());
    }
    if let Some(path) = &targets.html {
        report.export_html(path)?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}
