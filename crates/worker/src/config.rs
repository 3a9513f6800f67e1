//! Migration configuration loaded from environment variables.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use casebridge_core::results::OrphanCommentPolicy;
use casebridge_pipeline::settings::{DEFAULT_PAGE_SIZE, DEFAULT_USERS_GROUP};
use casebridge_pipeline::MigrationSettings;
use casebridge_qase::{QaseConfig, ScimConfig};
use casebridge_runtime::retry::{DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_RETRIES};
use casebridge_runtime::{RateLimitedExecutor, RetryPolicy};
use casebridge_testrail::TestrailConfig;
use url::Url;

const DEFAULT_TARGET_URL: &str = "https://api.qase.io/v1";
const DEFAULT_SCIM_URL: &str = "https://app.qase.io/scim/v2";

/// A missing or malformed setting. Raised before any remote call is made.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Tuning of one executor pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_workers: usize,
    /// Requests admitted per `interval`.
    pub requests: u32,
    pub interval: Duration,
}

impl PoolConfig {
    pub fn executor(&self, name: &str) -> RateLimitedExecutor {
        RateLimitedExecutor::new(name, self.max_workers, self.requests, self.interval)
    }
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub source: TestrailConfig,
    pub target: QaseConfig,
    /// Set when users are provisioned in the target directory.
    pub directory: Option<ScimConfig>,
    pub settings: MigrationSettings,
    pub source_pool: PoolConfig,
    pub target_pool: PoolConfig,
    pub retry: RetryPolicy,
    /// Directory the statistics file is written to.
    pub stats_dir: PathBuf,
    pub stats_prefix: String,
    pub log_format: LogFormat,
}

impl MigrationConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                     | Default                  |
    /// |-----------------------------|--------------------------|
    /// | `SOURCE_URL`                | required                 |
    /// | `SOURCE_USER`               | required                 |
    /// | `SOURCE_PASSWORD`           | required                 |
    /// | `TARGET_URL`                | `https://api.qase.io/v1` |
    /// | `TARGET_TOKEN`              | required                 |
    /// | `PROJECTS_IMPORT`           | all projects             |
    /// | `PROJECTS_IMPORT_COMPLETED` | `false`                  |
    /// | `FIELDS_IMPORT`             | all `custom_` fields     |
    /// | `REFS_ENABLE`               | `false`                  |
    /// | `REFS_URL`                  | none                     |
    /// | `DEFAULT_USER_ID`           | `1`                      |
    /// | `USERS_CREATE`              | `false`                  |
    /// | `USERS_GROUP_NAME`          | `TestRail Migration`     |
    /// | `SCIM_URL`                  | `https://app.qase.io/scim/v2` |
    /// | `SCIM_TOKEN`                | required with `USERS_CREATE` |
    /// | `RUNS_CREATED_AFTER`        | none (unix seconds)      |
    /// | `ORPHAN_COMMENTS`           | `drop`                   |
    /// | `ATTACHMENTS_BULK_IMPORT`   | `false`                  |
    /// | `SOURCE_MAX_WORKERS`        | `8`                      |
    /// | `SOURCE_REQUESTS`           | `180`                    |
    /// | `SOURCE_INTERVAL_SECS`      | `60`                     |
    /// | `TARGET_MAX_WORKERS`        | `8`                      |
    /// | `TARGET_REQUESTS`           | `230`                    |
    /// | `TARGET_INTERVAL_SECS`      | `10`                     |
    /// | `MAX_RETRIES`               | `5`                      |
    /// | `BACKOFF_FACTOR_SECS`       | `1`                      |
    /// | `STATS_DIR`                 | `.`                      |
    /// | `STATS_PREFIX`              | `migration`              |
    /// | `LOG_FORMAT`                | `text`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of
    /// a variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let source = TestrailConfig {
            base_url: vars.url("SOURCE_URL")?.ok_or(ConfigError::Missing("SOURCE_URL"))?,
            user: vars.required("SOURCE_USER")?,
            password: vars.required("SOURCE_PASSWORD")?,
        };
        let target = QaseConfig {
            base_url: match vars.url("TARGET_URL")? {
                Some(url) => url,
                None => parse_url("TARGET_URL", DEFAULT_TARGET_URL)?,
            },
            token: vars.required("TARGET_TOKEN")?,
        };

        let create_users = vars.flag("USERS_CREATE", false)?;
        let directory = if create_users {
            Some(ScimConfig {
                base_url: match vars.url("SCIM_URL")? {
                    Some(url) => url,
                    None => parse_url("SCIM_URL", DEFAULT_SCIM_URL)?,
                },
                token: vars.required("SCIM_TOKEN")?,
            })
        } else {
            None
        };

        let settings = MigrationSettings {
            projects: vars.list("PROJECTS_IMPORT"),
            import_completed: vars.flag("PROJECTS_IMPORT_COMPLETED", false)?,
            fields: vars.list("FIELDS_IMPORT"),
            refs_enabled: vars.flag("REFS_ENABLE", false)?,
            refs_base: vars.url("REFS_URL")?,
            default_user_id: vars.parse("DEFAULT_USER_ID", 1)?,
            create_users,
            users_group_name: vars
                .optional("USERS_GROUP_NAME")
                .unwrap_or_else(|| DEFAULT_USERS_GROUP.to_string()),
            runs_created_after: vars.parse_opt("RUNS_CREATED_AFTER")?,
            orphan_comments: vars.parse("ORPHAN_COMMENTS", OrphanCommentPolicy::Drop)?,
            attachments_bulk_import: vars.flag("ATTACHMENTS_BULK_IMPORT", false)?,
            page_size: DEFAULT_PAGE_SIZE,
        };

        let source_pool = PoolConfig {
            max_workers: vars.parse("SOURCE_MAX_WORKERS", 8)?,
            requests: vars.parse("SOURCE_REQUESTS", 180)?,
            interval: Duration::from_secs(vars.parse("SOURCE_INTERVAL_SECS", 60)?),
        };
        let target_pool = PoolConfig {
            max_workers: vars.parse("TARGET_MAX_WORKERS", 8)?,
            requests: vars.parse("TARGET_REQUESTS", 230)?,
            interval: Duration::from_secs(vars.parse("TARGET_INTERVAL_SECS", 10)?),
        };
        let retry = RetryPolicy {
            max_retries: vars.parse("MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            backoff_factor: Duration::from_secs(
                vars.parse("BACKOFF_FACTOR_SECS", DEFAULT_BACKOFF_FACTOR.as_secs())?,
            ),
        };

        let log_format = match vars.optional("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Text,
            Some(format) if format == "text" => LogFormat::Text,
            Some(format) if format == "json" => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    reason: format!("expected 'text' or 'json', got '{other}'"),
                })
            }
        };

        Ok(Self {
            source,
            target,
            directory,
            settings,
            source_pool,
            target_pool,
            retry,
            stats_dir: vars.optional("STATS_DIR").unwrap_or_else(|| ".".into()).into(),
            stats_prefix: vars.optional("STATS_PREFIX").unwrap_or_else(|| "migration".into()),
            log_format,
        })
    }

    /// Path of the statistics file written at the end of the run.
    pub fn stats_path(&self) -> PathBuf {
        self.stats_dir.join(format!("{}_stats.json", self.stats_prefix))
    }
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value, `None` when unset or blank.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_opt<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.optional(key)
            .map(|raw| {
                raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                    key,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key).map(|raw| raw.to_ascii_lowercase()).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes") => Ok(true),
            Some("false" | "0" | "no") => Ok(false),
            Some(other) => Err(ConfigError::Invalid {
                key,
                reason: format!("expected a boolean, got '{other}'"),
            }),
        }
    }

    /// Comma-separated list; blank entries are dropped.
    fn list(&self, key: &str) -> Vec<String> {
        self.optional(key)
            .map(|raw| {
                raw.split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn url(&self, key: &'static str) -> Result<Option<Url>, ConfigError> {
        self.optional(key).map(|raw| parse_url(key, &raw)).transpose()
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
