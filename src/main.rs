use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use compscan::{
    analyzer::default_analyzers,
    cache::Cache,
    config::{DatastoreKind, Settings},
    datastore::open_datastore,
    discovery::discover,
    model::{ScanReport, Severity},
    output::{format_result_to_string, print_result, OutputFormat},
    Engine, Mode,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const CRITICAL_VULN: u8 = 2;
    pub const HIGH_VULN: u8 = 3;
    pub const MEDIUM_VULN: u8 = 4;
    pub const LOW_VULN: u8 = 5;
    pub const ERROR: u8 = 1;
}

#[derive(Parser)]
#[command(name = "compscan")]
#[command(
    author,
    version,
    about = "Identify third-party components and match them against known vulnerabilities"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory or file
    Scan {
        /// Directory or file to scan
        path: PathBuf,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Settings file to use instead of the default location
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// JSON file mapping identifiers to vulnerabilities
        #[arg(long, conflicts_with = "osv")]
        datastore: Option<PathBuf>,

        /// Look up vulnerabilities on OSV.dev
        #[arg(long)]
        osv: bool,

        /// Pipeline mode (standalone, evidence-collection, evidence-processing)
        #[arg(long)]
        mode: Option<String>,

        /// Also run experimental analyzers
        #[arg(long)]
        experimental: bool,

        /// Maximum concurrent analyzer invocations (0 = number of CPUs)
        #[arg(long)]
        workers: Option<usize>,

        /// Write output to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Clear the lookup cache before scanning
        #[arg(long)]
        clear_cache: bool,

        /// Exit with error if vulnerabilities at or above this severity are found
        #[arg(long, value_enum)]
        fail_on: Option<FailLevel>,
    },

    /// List the built-in analyzers
    ListAnalyzers {
        /// Settings file to use instead of the default location
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Clear the lookup cache
    ClearCache,
}

#[derive(Clone, Copy, ValueEnum)]
enum FailLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl FailLevel {
    fn threshold(self) -> Severity {
        match self {
            FailLevel::Critical => Severity::Critical,
            FailLevel::High => Severity::High,
            FailLevel::Medium => Severity::Medium,
            FailLevel::Low => Severity::Low,
        }
    }
}

struct ScanArgs {
    path: PathBuf,
    format: String,
    output: Option<PathBuf>,
    clear_cache: bool,
    fail_on: Option<FailLevel>,
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            path,
            format,
            config,
            datastore,
            osv,
            mode,
            experimental,
            workers,
            output,
            clear_cache,
            fail_on,
        } => {
            let mut settings = load_settings(config.as_deref())?;
            if let Some(mode) = mode {
                settings.mode = Mode::from_str(&mode).map_err(|e| anyhow::anyhow!(e))?;
            }
            if experimental {
                settings.allow_experimental = true;
            }
            if let Some(workers) = workers {
                settings.worker_threads = workers;
            }
            if osv {
                settings.datastore.kind = DatastoreKind::Osv;
            } else if let Some(file) = datastore {
                settings.datastore.kind = DatastoreKind::Local;
                settings.datastore.path = Some(file);
            }

            run_scan(
                settings,
                ScanArgs {
                    path,
                    format,
                    output,
                    clear_cache,
                    fail_on,
                },
            )
            .await
        }
        Commands::ListAnalyzers { config } => {
            let settings = load_settings(config.as_deref())?;
            list_analyzers(settings)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::ClearCache => {
            let settings = Settings::load().unwrap_or_default();
            Cache::new(settings.datastore.cache_ttl_hours).clear()?;
            println!("Cache cleared.");
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    Ok(pb)
}

async fn run_scan(settings: Settings, args: ScanArgs) -> Result<u8> {
    let format = OutputFormat::from_str(&args.format).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table;

    if args.clear_cache {
        Cache::new(settings.datastore.cache_ttl_hours).clear()?;
    }

    let datastore = open_datastore(&settings)?;
    let mut engine = Engine::new(settings, default_analyzers(datastore));

    let progress = if is_interactive {
        Some(spinner("Discovering files...")?)
    } else {
        None
    };

    let discovered = discover(&engine, &args.path)?;
    if let Some(ref pb) = progress {
        pb.set_message(format!("Analyzing {} files...", discovered));
    }

    let outcome = match engine.analyze_dependencies().await {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(pb) = progress {
                pb.finish_and_clear();
            }
            return Err(e).context("Scan aborted");
        }
    };
    let report = engine.report(outcome);

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "Found {} dependencies, {} vulnerabilities",
            report.dependencies.len(),
            report.vulnerability_count()
        ));
    }

    if let Some(path) = args.output {
        let content = format_result_to_string(&report, format)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if is_interactive {
            println!("Results written to: {}", path.display());
        }
    } else {
        print_result(&report, format)?;
    }

    Ok(determine_exit_code(&report, args.fail_on))
}

/// Determine the exit code based on vulnerabilities found and --fail-on setting
fn determine_exit_code(report: &ScanReport, fail_on: Option<FailLevel>) -> u8 {
    let Some(fail_on) = fail_on else {
        return exit_codes::SUCCESS;
    };
    let Some(worst) = report.max_severity() else {
        return exit_codes::SUCCESS;
    };
    if worst < fail_on.threshold() {
        return exit_codes::SUCCESS;
    }
    match worst {
        Severity::Critical => exit_codes::CRITICAL_VULN,
        Severity::High => exit_codes::HIGH_VULN,
        Severity::Medium => exit_codes::MEDIUM_VULN,
        Severity::Low => exit_codes::LOW_VULN,
        Severity::Unknown => exit_codes::SUCCESS,
    }
}

fn list_analyzers(settings: Settings) -> Result<()> {
    let datastore = open_datastore(&settings)?;
    let engine = Engine::new(settings, default_analyzers(datastore));

    println!("Available analyzers:");
    println!();
    for info in engine.describe_analyzers() {
        let enabled = if info.enabled { "yes" } else { "no" };
        println!(
            "  {:<36} {:<30} [enabled: {}]",
            info.name,
            info.phase.as_str(),
            enabled
        );
        println!(
            "  {:<36} key: {}, {}{}",
            "",
            info.setting_key,
            info.stability.as_str(),
            if info.parallel_safe { "" } else { ", serial" }
        );
        println!();
    }
    Ok(())
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Settings::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let settings = Settings::default();
        settings.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Settings::generate_default_config());
        return Ok(());
    }

    // Show current config
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'compscan config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use compscan::model::{Dependency, DependencyReport, Vulnerability, VulnerabilitySource};

    fn report_with(score: f32) -> ScanReport {
        let dep = Dependency::new("/app/package.json");
        dep.update(|s| {
            s.add_vulnerability(Vulnerability::new("CVE-2021-0001", VulnerabilitySource::Nvd).with_score(score));
        });
        ScanReport::new(vec![DependencyReport::from_dependency(&dep)], Vec::new())
    }

    #[test]
    fn test_exit_code_without_fail_on() {
        assert_eq!(determine_exit_code(&report_with(9.8), None), exit_codes::SUCCESS);
    }

    #[test]
    fn test_exit_code_reports_worst_severity() {
        assert_eq!(
            determine_exit_code(&report_with(9.8), Some(FailLevel::Low)),
            exit_codes::CRITICAL_VULN
        );
        assert_eq!(
            determine_exit_code(&report_with(5.0), Some(FailLevel::Medium)),
            exit_codes::MEDIUM_VULN
        );
    }

    #[test]
    fn test_exit_code_below_threshold() {
        assert_eq!(
            determine_exit_code(&report_with(5.0), Some(FailLevel::High)),
            exit_codes::SUCCESS
        );
        let empty = ScanReport::new(Vec::new(), Vec::new());
        assert_eq!(determine_exit_code(&empty, Some(FailLevel::Low)), exit_codes::SUCCESS);
    }
}
