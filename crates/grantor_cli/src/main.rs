//! Grantor CLI - bulk GitHub access provisioning from mannequin exports.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::{Term, style};
use grantor::UnknownRolePolicy;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "grantor")]
#[command(version)]
#[command(about = "Bulk-provision GitHub organization and repository access from a CSV export")]
#[command(
    long_about = "Grantor reads a mannequin export produced by a GitHub Enterprise Importer \
migration and, for every row, invites the user to an organization or adds them as a \
repository collaborator. Rate limits are waited out, transient failures are retried, and \
a failing row never stops the rest of the batch."
)]
#[command(args_conflicts_with_subcommands = true)]
#[command(after_long_help = r#"EXAMPLES
    Grant everything listed in an export:
        $ grantor --file mannequins.csv

    Resolve identities and map roles without granting anything:
        $ grantor --file mannequins.csv --dry-run

    Send every row to one organization:
        $ grantor --file mannequins.csv --org acme

    Generate shell completions:
        $ grantor completions bash > ~/.local/share/bash-completion/completions/grantor

INPUT
    The CSV header must be one of:
      mannequin_username,mannequin_id,role,target
      mannequin_user,mannequin_id,target_user,role,target
      mannequin_username,mannequin_id,role          (needs --org or --repo)

    A target containing '/' is a repository (owner/name); anything else is an
    organization.

CONFIGURATION
    Grantor reads configuration from, lowest priority first:
      1. ~/.config/grantor/config.toml (or $XDG_CONFIG_HOME/grantor/config.toml)
      2. ./grantor.toml
      3. Environment variables (GRANTOR_* prefix, nested keys joined with '__')
      4. GITHUB_TOKEN, CSV_FILE, GITHUB_ORG, GITHUB_REPO
      5. Command-line flags
    A .env file in the current directory is loaded first.

ENVIRONMENT VARIABLES
    GRANTOR_GITHUB__TOKEN     GitHub token (or GITHUB_TOKEN)
    GRANTOR_GITHUB__API_URL   API root, for GitHub Enterprise Server
    GRANTOR_INPUT__FILE       CSV file (or CSV_FILE)
    GRANTOR_INPUT__ORG        Organization override (or GITHUB_ORG)
    GRANTOR_INPUT__REPO       Repository override (or GITHUB_REPO)

EXIT STATUS
    0   Batch completed, even if some rows failed
    1   Configuration missing or invalid, input not found, or bad header
    2   Some rows failed and --fail-on-error was given
"#)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Options for a provisioning run. Each one overrides configuration.
#[derive(Debug, Clone, Default, clap::Args)]
struct RunArgs {
    /// CSV file to process
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Send every row without a target to this organization
    #[arg(long, conflicts_with = "repo")]
    org: Option<String>,

    /// Send every row without a target to this repository (owner/name)
    #[arg(long)]
    repo: Option<String>,

    /// GitHub API root (for GitHub Enterprise Server)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Resolve identities and map roles without granting anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Rows processed at once
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Attempts per request for network and server errors
    #[arg(long)]
    max_attempts: Option<usize>,

    /// Pace requests to at most this many per second
    #[arg(long, value_name = "N")]
    requests_per_second: Option<u32>,

    /// What to do with role labels missing from the role table
    #[arg(long, value_name = "POLICY", value_parser = ["reject", "default"])]
    unknown_role: Option<String>,

    /// Exit with status 2 when any row failed
    #[arg(long)]
    fail_on_error: bool,
}

impl RunArgs {
    /// Layer the flags that were given over the loaded configuration.
    fn apply(&self, config: &mut config::Config) -> Result<(), config::ConfigError> {
        if let Some(ref file) = self.file {
            config.input.file = Some(file.clone());
        }
        if let Some(ref org) = self.org {
            config.input.org = Some(org.clone());
            config.input.repo = None;
        }
        if let Some(ref repo) = self.repo {
            config.input.repo = Some(repo.clone());
            config.input.org = None;
        }
        if let Some(ref api_url) = self.api_url {
            config.github.api_url = Some(api_url.clone());
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.retry.max_attempts = max_attempts;
        }
        if let Some(rps) = self.requests_per_second {
            config.requests_per_second = Some(rps);
        }
        if let Some(ref policy) = self.unknown_role {
            config.roles.unknown = policy
                .parse::<UnknownRolePolicy>()
                .map_err(config::ConfigError::Invalid)?;
        }
        if self.fail_on_error {
            config.fail_on_error = true;
        }
        Ok(())
    }
}

fn init_tracing() {
    // Interactive runs render progress bars; log lines only when asked for.
    let is_tty = Term::stdout().is_term();
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if is_tty => return,
        Err(_) => EnvFilter::new("grantor=info,grantor_cli=info"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Completions { shell }) => commands::meta::handle_completions(shell),
        Some(Commands::Man { output }) => commands::meta::handle_man(output),
        None => {
            let stop = shutdown::StopRequest::listen();
            commands::run::handle_run(&cli.run, &stop).await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Aborted");
            eprintln!("{} {}", style("error:").red().bold(), e);
            ExitCode::from(1)
        }
    }
}
