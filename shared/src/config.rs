//! Configuration management for the scheduler.

use chrono_tz::Tz;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Scopes requested when impersonating the meeting owner.
pub const GOOGLE_API_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/meetings.space.settings",
];

const DEFAULT_CALENDAR_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
const DEFAULT_MEET_API_BASE_URL: &str = "https://meet.googleapis.com/v2";
const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";

/// Where the service-account key is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAccountSource {
    /// ARN of a Secrets Manager secret holding the key JSON
    Secret(String),
    /// Path to the key JSON on disk
    File(PathBuf),
}

/// Application configuration loaded from environment variables.
///
/// Built once at startup and passed explicitly to every client.
#[derive(Debug, Clone)]
pub struct Config {
    /// Slack bot token (xoxb-...)
    pub slack_bot_token: String,
    /// Slack signing secret for request verification
    pub slack_signing_secret: String,
    /// Service-account key location
    pub service_account: ServiceAccountSource,
    /// Organization domain owners must belong to
    pub workspace_domain: String,
    /// Directory holding one prefix file per channel. Must be writable and
    /// shared by every instance, e.g. an EFS access point under `/mnt`.
    pub storage_dir: PathBuf,
    /// Bound on prefix lock acquisition
    pub lock_timeout: Duration,
    /// Per-call timeout for every outbound HTTP request
    pub http_timeout: Duration,
    /// Timezone used when rendering meeting times
    pub display_timezone: Tz,
    pub calendar_api_base_url: String,
    pub meet_api_base_url: String,
    pub slack_api_base_url: String,
    /// Slash command that sets or clears a channel prefix
    pub set_prefix_command: String,
    /// Slash command that schedules a meeting
    pub schedule_command: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{} environment variable not set", key)))
        };

        let service_account = match (
            lookup("GOOGLE_SERVICE_ACCOUNT_SECRET_ARN").filter(|v| !v.is_empty()),
            lookup("GOOGLE_SERVICE_ACCOUNT_FILE").filter(|v| !v.is_empty()),
        ) {
            (Some(arn), _) => ServiceAccountSource::Secret(arn),
            (None, Some(path)) => ServiceAccountSource::File(PathBuf::from(path)),
            (None, None) => {
                return Err(Error::Config(
                    "GOOGLE_SERVICE_ACCOUNT_SECRET_ARN or GOOGLE_SERVICE_ACCOUNT_FILE must be set"
                        .to_string(),
                ))
            }
        };

        let timezone_name = lookup("DISPLAY_TIMEZONE").unwrap_or_else(|| "Asia/Tokyo".to_string());
        let display_timezone: Tz = timezone_name
            .parse()
            .map_err(|_| Error::Config(format!("Invalid DISPLAY_TIMEZONE: {}", timezone_name)))?;

        Ok(Self {
            slack_bot_token: required("SLACK_BOT_TOKEN")?,
            slack_signing_secret: required("SLACK_SIGNING_SECRET")?,
            service_account,
            workspace_domain: required("GOOGLE_WORKSPACE_DOMAIN")?,
            storage_dir: PathBuf::from(required("PREFIX_STORAGE_DIR")?),
            lock_timeout: Duration::from_secs(parse_secs(&lookup, "PREFIX_LOCK_TIMEOUT_SECS", 3)?),
            http_timeout: Duration::from_secs(parse_secs(&lookup, "HTTP_TIMEOUT_SECS", 10)?),
            display_timezone,
            calendar_api_base_url: lookup("CALENDAR_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_CALENDAR_API_BASE_URL.to_string()),
            meet_api_base_url: lookup("MEET_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_MEET_API_BASE_URL.to_string()),
            slack_api_base_url: lookup("SLACK_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SLACK_API_BASE_URL.to_string()),
            set_prefix_command: lookup("SET_PREFIX_COMMAND")
                .unwrap_or_else(|| "/reg-mtg-prefix".to_string()),
            schedule_command: lookup("SCHEDULE_COMMAND").unwrap_or_else(|| "/mtg".to_string()),
        })
    }
}

fn parse_secs<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a whole number of seconds", key))),
        None => Ok(default),
    }
}
