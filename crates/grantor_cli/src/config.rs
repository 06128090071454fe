//! Configuration file support for grantor.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Legacy environment variables (`GITHUB_TOKEN`, `CSV_FILE`, `GITHUB_ORG`, `GITHUB_REPO`)
//! 3. Environment variables prefixed with `GRANTOR_`, nested keys joined by `__`
//!    (e.g., `GRANTOR_RETRY__MAX_ATTEMPTS`)
//! 4. Local config file (./grantor.toml)
//! 5. XDG config file (~/.config/grantor/config.toml)
//! 6. Built-in defaults
//!
//! The loaded [`Config`] is checked once by [`Config::resolve`], which produces
//! the immutable [`RunSettings`] used for the rest of the run.
//!
//! Example config file:
//! ```toml
//! dry_run = false
//! concurrency = 1
//! requests_per_second = 10
//! fail_on_error = false
//!
//! [github]
//! token = "ghp_..."  # or use GITHUB_TOKEN / GRANTOR_GITHUB__TOKEN
//! api_url = "https://github.example.com/api/v3"
//!
//! [input]
//! file = "mannequins.csv"
//! org = "acme"  # or repo = "acme/widgets"
//!
//! [retry]
//! max_attempts = 3
//! initial_backoff_secs = 1
//!
//! [roles]
//! default = "pull"
//! unknown = "reject"  # or "default"
//!
//! [roles.table]
//! Admin = "admin"
//! Write = "push"
//! Read = "pull"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use grantor::github::{ClientOptions, GITHUB_API_URL};
use grantor::retry::{DEFAULT_MAX_ATTEMPTS, MAX_BACKOFF_MS};
use grantor::role::{DEFAULT_PERMISSION, DEFAULT_ROLE_TABLE};
use grantor::{BatchOptions, RetryConfig, RoleMapper, Target, TargetOverride, UnknownRolePolicy};
use serde::Deserialize;
use thiserror::Error;

/// Environment variables from before the `GRANTOR_` prefix existed.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("GITHUB_TOKEN", "github.token"),
    ("CSV_FILE", "input.file"),
    ("GITHUB_ORG", "input.org"),
    ("GITHUB_REPO", "input.repo"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "no GitHub token configured; set GITHUB_TOKEN or GRANTOR_GITHUB__TOKEN, or add [github] token to grantor.toml"
    )]
    MissingToken,

    #[error("no input file configured; pass --file or set CSV_FILE")]
    MissingFile,

    #[error("input file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid target override: {0}")]
    InvalidTarget(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Top-level configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub input: InputConfig,
    pub retry: RetrySettings,
    pub roles: RolesConfig,
    /// Proactive request pacing; unset disables it.
    pub requests_per_second: Option<u32>,
    /// Rows processed at once.
    pub concurrency: usize,
    pub dry_run: bool,
    /// Exit with status 2 when any row failed.
    pub fail_on_error: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github: GitHubConfig::default(),
            input: InputConfig::default(),
            retry: RetrySettings::default(),
            roles: RolesConfig::default(),
            requests_per_second: None,
            concurrency: grantor::batch::DEFAULT_CONCURRENCY,
            dry_run: false,
            fail_on_error: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub token: Option<String>,
    /// API root; defaults to api.github.com.
    pub api_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub file: Option<PathBuf>,
    /// Organization for rows without a target.
    pub org: Option<String>,
    /// Repository (owner/name) for rows without a target.
    pub repo: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub initial_backoff_secs: u64,
    /// Cap on consecutive rate-limit waits per request; unset waits forever.
    pub max_rate_limit_waits: Option<u32>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_secs: 1,
            max_rate_limit_waits: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    /// Label → permission. Replaces the built-in table when set.
    pub table: Option<BTreeMap<String, String>>,
    pub default: String,
    pub unknown: UnknownRolePolicy,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            table: None,
            default: DEFAULT_PERMISSION.to_string(),
            unknown: UnknownRolePolicy::default(),
        }
    }
}

/// Everything a run needs, validated. Nothing below the CLI reads the
/// environment.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub token: String,
    pub api_url: String,
    pub input: PathBuf,
    pub client: ClientOptions,
    pub roles: RoleMapper,
    pub batch: BatchOptions,
    pub fail_on_error: bool,
}

impl Config {
    /// Load configuration from files and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let env: config::Map<String, String> = std::env::vars().collect();
        Self::load_from(&Self::config_files(), env)
    }

    /// Config files that exist, lowest priority first.
    fn config_files() -> Vec<PathBuf> {
        let mut files = Vec::new();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "grantor") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                files.push(xdg_config);
            }
        }

        let local_config = PathBuf::from("grantor.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./grantor.toml");
            files.push(local_config);
        }

        files
    }

    /// Layer `files` and the given environment snapshot.
    fn load_from(files: &[PathBuf], env: config::Map<String, String>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        for file in files {
            builder = builder.add_source(
                File::from(file.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        for (var, key) in LEGACY_ENV {
            if let Some(value) = env.get(*var).filter(|v| !v.trim().is_empty()) {
                builder = builder.set_override(*key, value.clone())?;
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("GRANTOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(env)),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Validate and freeze the configuration.
    pub fn resolve(self) -> Result<RunSettings, ConfigError> {
        let token = self
            .github
            .token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let input = self.input.file.ok_or(ConfigError::MissingFile)?;
        if !input.is_file() {
            return Err(ConfigError::FileNotFound(input));
        }

        let target_override = target_override(self.input.org, self.input.repo)?;

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.requests_per_second == Some(0) {
            return Err(ConfigError::Invalid(
                "requests_per_second must be at least 1".into(),
            ));
        }

        let retry = RetryConfig::new(
            self.retry.max_attempts,
            Duration::from_secs(self.retry.initial_backoff_secs),
            Duration::from_millis(MAX_BACKOFF_MS),
        );

        let roles = match self.roles.table {
            Some(table) if !table.is_empty() => {
                RoleMapper::new(table, &self.roles.default, self.roles.unknown)
            }
            _ => RoleMapper::new(
                DEFAULT_ROLE_TABLE.iter().copied(),
                &self.roles.default,
                self.roles.unknown,
            ),
        };

        Ok(RunSettings {
            token,
            api_url: self
                .github
                .api_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| GITHUB_API_URL.to_string()),
            input,
            client: ClientOptions {
                retry,
                max_rate_limit_waits: self.retry.max_rate_limit_waits,
                requests_per_second: self.requests_per_second,
            },
            roles,
            batch: BatchOptions {
                dry_run: self.dry_run,
                concurrency: self.concurrency,
                target_override,
            },
            fail_on_error: self.fail_on_error,
        })
    }
}

fn target_override(
    org: Option<String>,
    repo: Option<String>,
) -> Result<Option<TargetOverride>, ConfigError> {
    let org = org.map(|o| o.trim().to_string()).filter(|o| !o.is_empty());
    let repo = repo.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());

    match (org, repo) {
        (Some(_), Some(_)) => Err(ConfigError::InvalidTarget(
            "set an organization or a repository, not both".into(),
        )),
        (Some(org), None) => match Target::parse(&org) {
            Ok(Target::Organization(_)) => Ok(Some(TargetOverride::Org(org))),
            _ => Err(ConfigError::InvalidTarget(format!(
                "organization '{org}' must not contain '/'"
            ))),
        },
        (None, Some(repo)) => match Target::parse(&repo) {
            Ok(Target::Repository { .. }) => Ok(Some(TargetOverride::Repo(repo))),
            Ok(Target::Organization(_)) => Err(ConfigError::InvalidTarget(format!(
                "repository '{repo}' must have the form owner/name"
            ))),
            Err(e) => Err(ConfigError::InvalidTarget(e)),
        },
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> config::Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn csv_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".csv")
            .tempfile()
            .expect("temp file");
        writeln!(file, "mannequin_username,mannequin_id,role,target").expect("write");
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_secs, 1);
        assert!(config.retry.max_rate_limit_waits.is_none());
        assert_eq!(config.roles.default, "pull");
        assert_eq!(config.roles.unknown, UnknownRolePolicy::Reject);
        assert!(!config.dry_run);
        assert!(!config.fail_on_error);
    }

    #[test]
    fn test_legacy_variables_are_read() {
        let config = Config::load_from(
            &[],
            env(&[
                ("GITHUB_TOKEN", "ghp_legacy"),
                ("CSV_FILE", "users.csv"),
                ("GITHUB_ORG", "acme"),
            ]),
        )
        .expect("config loads");

        assert_eq!(config.github.token.as_deref(), Some("ghp_legacy"));
        assert_eq!(config.input.file, Some(PathBuf::from("users.csv")));
        assert_eq!(config.input.org.as_deref(), Some("acme"));
    }

    #[test]
    fn test_prefixed_variables_use_double_underscore() {
        let config = Config::load_from(
            &[],
            env(&[
                ("GRANTOR_RETRY__MAX_ATTEMPTS", "5"),
                ("GRANTOR_GITHUB__API_URL", "https://ghe.example.com/api/v3"),
                ("GRANTOR_DRY_RUN", "true"),
            ]),
        )
        .expect("config loads");

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(
            config.github.api_url.as_deref(),
            Some("https://ghe.example.com/api/v3")
        );
        assert!(config.dry_run);
    }

    #[test]
    fn test_legacy_variables_win_over_prefixed() {
        let config = Config::load_from(
            &[],
            env(&[
                ("GRANTOR_GITHUB__TOKEN", "ghp_prefixed"),
                ("GITHUB_TOKEN", "ghp_legacy"),
            ]),
        )
        .expect("config loads");
        assert_eq!(config.github.token.as_deref(), Some("ghp_legacy"));
    }

    #[test]
    fn test_config_file_is_layered_under_env() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        write!(
            file,
            r#"
            concurrency = 4

            [github]
            token = "ghp_file"

            [roles]
            default = "triage"
            unknown = "default"

            [roles.table]
            Maintainer = "maintain"
            "#
        )
        .expect("write");

        let config = Config::load_from(
            &[file.path().to_path_buf()],
            env(&[("GITHUB_TOKEN", "ghp_env")]),
        )
        .expect("config loads");

        assert_eq!(config.concurrency, 4);
        assert_eq!(config.github.token.as_deref(), Some("ghp_env"));
        assert_eq!(config.roles.default, "triage");
        assert_eq!(config.roles.unknown, UnknownRolePolicy::Default);
        let table = config.roles.table.expect("table");
        assert_eq!(
            table
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("maintainer"))
                .map(|(_, v)| v.as_str()),
            Some("maintain")
        );
    }

    #[test]
    fn test_resolve_requires_token() {
        let file = csv_file();
        let mut config = Config::default();
        config.input.file = Some(file.path().to_path_buf());
        config.github.token = Some("   ".into());

        assert!(matches!(config.resolve(), Err(ConfigError::MissingToken)));
    }

    #[test]
    fn test_resolve_requires_existing_file() {
        let mut config = Config::default();
        config.github.token = Some("ghp_x".into());
        assert!(matches!(config.resolve(), Err(ConfigError::MissingFile)));

        let mut config = Config::default();
        config.github.token = Some("ghp_x".into());
        config.input.file = Some(PathBuf::from("/definitely/not/here.csv"));
        assert!(matches!(config.resolve(), Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_resolve_builds_settings() {
        let file = csv_file();
        let mut config = Config::default();
        config.github.token = Some(" ghp_x ".into());
        config.input.file = Some(file.path().to_path_buf());
        config.input.repo = Some("acme/widgets".into());
        config.retry.max_attempts = 4;
        config.requests_per_second = Some(5);

        let settings = config.resolve().expect("valid");
        assert_eq!(settings.token, "ghp_x");
        assert_eq!(settings.api_url, GITHUB_API_URL);
        assert_eq!(settings.client.retry.max_attempts, 4);
        assert_eq!(settings.client.requests_per_second, Some(5));
        assert_eq!(
            settings.batch.target_override,
            Some(TargetOverride::Repo("acme/widgets".into()))
        );
        assert_eq!(settings.roles.map_role("Write"), "push");
    }

    #[test]
    fn test_target_override_validation() {
        assert!(matches!(
            target_override(Some("acme".into()), Some("acme/widgets".into())),
            Err(ConfigError::InvalidTarget(_))
        ));
        assert!(matches!(
            target_override(Some("acme/widgets".into()), None),
            Err(ConfigError::InvalidTarget(_))
        ));
        assert!(matches!(
            target_override(None, Some("widgets".into())),
            Err(ConfigError::InvalidTarget(_))
        ));
        assert_eq!(
            target_override(Some(" acme ".into()), None).expect("valid"),
            Some(TargetOverride::Org("acme".into()))
        );
        assert_eq!(target_override(Some("".into()), None).expect("valid"), None);
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let file = csv_file();
        let mut config = Config::default();
        config.github.token = Some("ghp_x".into());
        config.input.file = Some(file.path().to_path_buf());
        config.concurrency = 0;
        assert!(matches!(config.resolve(), Err(ConfigError::Invalid(_))));
    }
}
