//! SwiftInstall CLI entry point

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swiftinstall::export::{self, ConfigDocument, ScriptKind};
use swiftinstall::{
    detect_package_manager, validate_dependencies, BatchInstaller, ErrorCategory, InstallSession,
    InstallStatus, InstallerConfig, PackageDescriptor, ProcessEnvironment,
};

#[derive(Parser, Debug)]
#[command(name = "swiftinstall", version, about = "Batch software installer for winget and Homebrew")]
struct Cli {
    /// Config file (default: <config dir>/swiftinstall/config.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install every package in a package list (.json, .yml, .yaml)
    Install {
        packages: PathBuf,

        /// Install one package at a time
        #[arg(long)]
        sequential: bool,

        /// Stop dispatching after the first failure
        #[arg(long)]
        stop_on_error: bool,

        /// Worker count (capped at 4)
        #[arg(long)]
        workers: Option<usize>,

        /// Retry failed packages once the batch has drained
        #[arg(long)]
        retry: bool,

        /// Write environment changes to this shell snippet
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Export a package list as an install script or another document format
    Export {
        packages: PathBuf,

        /// Script type: powershell, bash or python
        #[arg(long)]
        script: Option<ScriptKind>,

        /// Output file; scripts go to stdout when omitted and get the
        /// script's extension when the path has none
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a package list and its dependencies
    Check { packages: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = InstallerConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    let level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::debug!("swiftinstall v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Install {
            packages,
            sequential,
            stop_on_error,
            workers,
            retry,
            profile,
        } => {
            let options = InstallOptions {
                parallel: config.parallel && !sequential,
                stop_on_error: config.stop_on_error || stop_on_error,
                workers: workers.unwrap_or(config.max_workers),
                retry,
                profile: profile.or_else(|| config.profile_path.clone()),
            };
            install(&packages, &config, options).await
        }
        Commands::Export {
            packages,
            script,
            output,
        } => export(&packages, script, output.as_deref()),
        Commands::Check { packages } => check(&packages),
    }
}

struct InstallOptions {
    parallel: bool,
    stop_on_error: bool,
    workers: usize,
    retry: bool,
    profile: Option<PathBuf>,
}

fn load_packages(path: &Path) -> Result<Vec<PackageDescriptor>> {
    let document = export::read_config(path)
        .with_context(|| format!("Failed to load package list {}", path.display()))?;
    Ok(document.packages)
}

async fn install(path: &Path, config: &InstallerConfig, options: InstallOptions) -> Result<()> {
    let packages = load_packages(path)?;

    let adapter = detect_package_manager();
    if !adapter.is_available() {
        log::warn!("{} does not respond, installs will likely fail", adapter.name());
    }

    let mut env = ProcessEnvironment::new();
    if let Some(profile) = options.profile {
        env = env.with_profile_path(profile);
    }

    let mut installer = BatchInstaller::new(Arc::from(adapter), Arc::new(env))
        .with_max_workers(options.workers)
        .with_max_retries(config.max_retries)
        .with_non_interactive(config.non_interactive);

    installer.set_progress_callback(|id, status, _| {
        if status.is_terminal() {
            println!("  [{}] {} ({})", status.glyph(), id, status);
        }
    });

    let token = installer.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling, waiting for running installs to finish...");
            token.cancel();
        }
    });

    let mut session = installer
        .install_all(&packages, options.parallel, options.stop_on_error)
        .await?;

    if options.retry && session.failed > 0 && !session.was_cancelled() {
        println!("Retrying {} failed packages...", session.failed);
        session = installer.retry_failed().await?;
    }

    println!("{}", installer.get_session_report());
    print_suggestions(&session);

    if session.failed > 0 {
        anyhow::bail!("{} of {} packages failed", session.failed, session.total_packages);
    }
    Ok(())
}

fn print_suggestions(session: &InstallSession) {
    let mut categories: Vec<ErrorCategory> = session
        .tasks()
        .filter(|t| t.status == InstallStatus::Failed)
        .filter_map(|t| t.error_category)
        .collect();
    categories.sort_by_key(|c| c.to_string());
    categories.dedup();

    for category in categories {
        println!("{} errors:", category);
        for hint in category.suggestions() {
            println!("  - {}", hint);
        }
    }
}

fn export(path: &Path, script: Option<ScriptKind>, output: Option<&Path>) -> Result<()> {
    let packages = load_packages(path)?;
    let now = Utc::now();

    match (script, output) {
        (Some(kind), Some(output)) => {
            let output = if output.extension().is_none() {
                output.with_extension(kind.extension())
            } else {
                output.to_path_buf()
            };
            export::write_script(&output, &packages, kind, now)?;
            println!("Wrote {} script to {}", kind, output.display());
        }
        (Some(kind), None) => print!("{}", export::generate_script(&packages, kind, now)?),
        (None, Some(output)) => {
            export::write_config(output, &ConfigDocument::new(packages, now))?;
            println!("Wrote package list to {}", output.display());
        }
        (None, None) => anyhow::bail!("Nothing to export: pass --script and/or --output"),
    }
    Ok(())
}

fn check(path: &Path) -> Result<()> {
    let packages = load_packages(path)?;
    let issues = validate_dependencies(&packages);

    for issue in &issues {
        eprintln!("warning: {}", issue);
    }
    if !issues.is_empty() {
        anyhow::bail!("{} dependency issues in {}", issues.len(), path.display());
    }

    println!("{}: {} packages OK", path.display(), packages.len());
    Ok(())
}
