//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// contrib-lister - collect your contributions into one report
///
/// Counts your commits in git repositories, your edits on MediaWiki
/// instances and your revisions on Open Build Service packages, then
/// renders them as a report.
///
/// Examples:
///   contrib-lister --config contributions.json
///   contrib-lister --config contrib.toml --format markdown --output contributions.md
///   contrib-lister --template mine.html   (with CONTRIB_TEMPLATES_PATH set)
///   contrib-lister --example-config > contributions.json
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Configuration file (JSON, or TOML when the name ends in .toml)
    #[arg(short, long, default_value = "contributions.json", value_name = "FILE")]
    pub config: PathBuf,

    /// Template used with --format template
    ///
    /// Looked up in CONTRIB_TEMPLATES_PATH when that is set, otherwise
    /// one of the bundled templates (default.html, default.md).
    #[arg(short, long, default_value = "default.html", value_name = "NAME")]
    pub template: String,

    /// Directory holding user templates
    #[arg(long, env = "CONTRIB_TEMPLATES_PATH", value_name = "DIR")]
    pub templates_path: Option<PathBuf>,

    /// Output file path for the report
    #[arg(short, long, default_value = "output.html", value_name = "FILE")]
    pub output: PathBuf,

    /// Output format (template, markdown, json)
    #[arg(long, default_value = "template", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Maximum number of source queries in flight
    ///
    /// Overrides Settings.Concurrency from the configuration file.
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Deadline for the whole scan, in seconds
    ///
    /// Sources still running when it expires are reported as incomplete.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Exit with code 2 if any source failed or the scan was incomplete
    #[arg(long)]
    pub fail_on_warnings: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Print an example configuration file and exit
    #[arg(long)]
    pub example_config: bool,

    /// List available templates and exit
    #[arg(long)]
    pub list_templates: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Render a template (default)
    #[default]
    Template,
    /// Markdown generated without a template
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.example_config || self.list_templates {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.template.trim().is_empty() {
            return Err("Template name must not be empty".to_string());
        }

        if let Some(ref dir) = self.templates_path {
            if !dir.is_dir() {
                return Err(format!(
                    "Templates directory does not exist: {}",
                    dir.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            config: PathBuf::from("contributions.json"),
            template: "default.html".to_string(),
            templates_path: None,
            output: PathBuf::from("output.html"),
            format: OutputFormat::Template,
            concurrency: None,
            timeout: None,
            fail_on_warnings: false,
            verbose: false,
            quiet: false,
            example_config: false,
            list_templates: false,
        }
    }

    #[test]
    fn test_defaults_from_command_line() {
        let args = Args::try_parse_from(["contrib-lister"]).unwrap();
        assert_eq!(args.config, PathBuf::from("contributions.json"));
        assert_eq!(args.template, "default.html");
        assert_eq!(args.output, PathBuf::from("output.html"));
        assert_eq!(args.format, OutputFormat::Template);
    }

    #[test]
    fn test_parse_format_and_overrides() {
        let args = Args::try_parse_from([
            "contrib-lister",
            "--format",
            "json",
            "--concurrency",
            "2",
            "--timeout",
            "60",
        ])
        .unwrap();
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.concurrency, Some(2));
        assert_eq!(args.timeout, Some(60));
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_concurrency() {
        let mut args = make_args();
        args.concurrency = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_templates_dir() {
        let mut args = make_args();
        args.templates_path = Some(PathBuf::from("/nonexistent/templates"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_example_config_skips_validation() {
        let mut args = make_args();
        args.example_config = true;
        args.concurrency = Some(0);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
