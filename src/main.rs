//! contrib-lister - collect contributions across project-hosting sources
//!
//! Reads a configuration of identities and projects, counts commits in
//! git repositories, edits on MediaWiki instances and revisions on Open
//! Build Service packages, and renders the totals as a report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Fatal error (invalid config, template or output failure)
//!   2 - Sources failed or the scan was incomplete, with --fail-on-warnings

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod repo;
mod report;
mod scanner;
mod sources;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::Configuration;
use indicatif::{ProgressBar, ProgressStyle};
use models::Report;
use scanner::ContributionScanner;
use sources::AdapterSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handled before logging so stdout stays clean for redirection
    if args.example_config {
        println!("{}", Configuration::example_json()?);
        return Ok(());
    }

    if args.list_templates {
        return handle_list_templates(&args);
    }

    init_logging(&args);

    info!("contrib-lister v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --list-templates.
fn handle_list_templates(args: &Args) -> Result<()> {
    match args.templates_path {
        Some(ref dir) => {
            println!("Templates in {}:", dir.display());
            for name in report::template::user_templates(dir)? {
                println!("  {}", name);
            }
        }
        None => {
            println!("Bundled templates:");
            for name in report::template::bundled_names() {
                println!("  {}", name);
            }
        }
    }
    Ok(())
}

/// Initialize logging based on verbosity settings. `RUST_LOG` wins when set.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Scan, render and write the report. Returns the exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    info!("Loading config from: {}", args.config.display());
    let mut config = Configuration::load(&args.config)?;
    config.merge_with_args(&args);
    config.validate()?;

    if config.emails.is_empty() {
        warn!("No Emails configured; git repositories will count zero");
    }
    for project in config.projects.iter().filter(|p| p.has_no_sources()) {
        warn!("{}: no sources configured, it will count zero", project.name);
    }

    // Fail on template problems before spending time on the scan
    let template = match args.format {
        OutputFormat::Template => Some(report::template::load_template(
            &args.template,
            args.templates_path.as_deref(),
        )?),
        _ => None,
    };

    let client = sources::http_client(config.settings.request_timeout_seconds)?;
    let adapters = AdapterSet::standard(client, &config.settings);

    let mut scanner = ContributionScanner::new(Arc::new(adapters), config.settings.concurrency);
    if !args.quiet {
        scanner = scanner.with_progress(project_progress(config.projects.len()));
    }

    println!(
        "🔍 Scanning {} projects (concurrency {})...",
        config.projects.len(),
        config.settings.concurrency
    );

    let outcome = scanner.scan_until(&config, interrupted()).await;
    if outcome.cancelled {
        warn!(
            "Scan did not finish; incomplete projects: {}",
            outcome.incomplete_projects().join(", ")
        );
    }

    let duration = start_time.elapsed().as_secs_f64();
    let report = Report::new(outcome, config.emails.len(), duration);

    let output = match template {
        Some(ref template) => report::template::render(
            template,
            &report,
            report::template::is_html(&args.template),
        )
        .with_context(|| format!("Failed to render template {}", args.template))?,
        None if args.format == OutputFormat::Json => report::generate_json_report(&report)?,
        None => report::generate_markdown_report(&report),
    };

    std::fs::write(&args.output, &output)
        .with_context(|| format!("Failed to write report to {}", args.output.display()))?;

    println!("\n📊 Summary:");
    println!("   Projects: {}", report.metadata.projects);
    println!("   Total contributions: {}", report.metadata.total);
    println!("   Duration: {:.1}s", duration);

    if !report.warnings.is_empty() {
        eprintln!("\n⚠️  {} source(s) reported problems:", report.warnings.len());
        for warning in &report.warnings {
            eprintln!("   {}", warning);
        }
    }

    println!("\n✅ Report saved to: {}", args.output.display());

    if args.fail_on_warnings && (!report.warnings.is_empty() || report.metadata.cancelled) {
        eprintln!("\n⛔ Scan was not clean. Failing (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

/// Resolves on Ctrl-C.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handling available; only the deadline can cancel
        std::future::pending::<()>().await;
    }
    warn!("Interrupted");
}

fn project_progress(projects: usize) -> ProgressBar {
    let pb = ProgressBar::new(projects as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} projects")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
