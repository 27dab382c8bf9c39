use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::anyhow;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channels::{ChannelEntry, ChannelRoster, RosterError};
use crate::pipeline::select::SelectionLimits;

pub const DEFAULT_YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3/";

/// 品質スコアのテーマ関連度で使う既定キーワード（英語・ドイツ語）。
pub const DEFAULT_QUALITY_KEYWORDS: [&str; 22] = [
    "economy",
    "market",
    "stocks",
    "finance",
    "business",
    "technology",
    "politics",
    "policy",
    "health",
    "science",
    "education",
    "analysis",
    "wirtschaft",
    "markt",
    "aktien",
    "finanzen",
    "technologie",
    "politik",
    "gesundheit",
    "wissenschaft",
    "bildung",
    "analyse",
];

const DEFAULT_LOOKBACK_DAYS: u32 = 1;
const DEFAULT_MAX_FETCH_PER_CHANNEL: usize = 20;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_TOTAL_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to read config file at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid channel roster: {0}")]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Arguments(#[from] clap::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Log line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Compact human-readable lines
    Text,
}

/// Visibility of a playlist created by the curator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistPrivacy {
    Public,
    #[default]
    Private,
    Unlisted,
}

impl PlaylistPrivacy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PlaylistPrivacy::Public => "public",
            PlaylistPrivacy::Private => "private",
            PlaylistPrivacy::Unlisted => "unlisted",
        }
    }
}

/// Command line and environment options.
///
/// Unset numeric options fall back to the config file, then to built-in
/// defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML file with channel roster and run options
    #[arg(long, env = "CURATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only consider uploads from the last N days
    #[arg(long, env = "CURATOR_LOOKBACK_DAYS")]
    pub lookback_days: Option<u32>,

    /// Maximum uploads fetched per channel
    #[arg(long, env = "CURATOR_MAX_FETCH_PER_CHANNEL")]
    pub max_fetch_per_channel: Option<usize>,

    /// Maximum scored-group videos kept per channel
    #[arg(long, env = "CURATOR_MAX_SELECTED_PER_CHANNEL")]
    pub max_selected_per_channel: Option<usize>,

    /// Maximum playlist length
    #[arg(long, env = "CURATOR_MAX_TOTAL_SELECTED")]
    pub max_total_selected: Option<usize>,

    /// Comma separated topic keywords for the quality score
    #[arg(long, env = "CURATOR_QUALITY_KEYWORDS", value_delimiter = ',')]
    pub quality_keywords: Option<Vec<String>>,

    /// Read candidates from a JSON snapshot instead of the API
    #[arg(long, env = "CURATOR_INPUT")]
    pub input: Option<PathBuf>,

    /// Write the selected videos to this JSON file
    #[arg(long, env = "CURATOR_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Target playlist
    #[arg(long, env = "YOUTUBE_PLAYLIST_ID")]
    pub playlist_id: Option<String>,

    /// File holding the target playlist id; a created playlist's id is saved here
    #[arg(long, env = "YOUTUBE_PLAYLIST_ID_FILE")]
    pub playlist_id_file: Option<PathBuf>,

    /// Title for a playlist created when no id is configured
    #[arg(long, env = "YOUTUBE_PLAYLIST_TITLE")]
    pub playlist_title: Option<String>,

    /// Description for a created playlist
    #[arg(long, env = "YOUTUBE_PLAYLIST_DESCRIPTION")]
    pub playlist_description: Option<String>,

    /// Privacy of a created playlist
    #[arg(long, env = "YOUTUBE_PLAYLIST_PRIVACY")]
    pub playlist_privacy: Option<PlaylistPrivacy>,

    /// Report the target playlist's title, size and URL, then exit
    #[arg(long, env = "CURATOR_STATUS_ONLY")]
    pub status_only: bool,

    /// API key for read requests
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// OAuth access token, required for publishing
    #[arg(long, env = "YOUTUBE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// YouTube Data API base URL
    #[arg(long, env = "YOUTUBE_BASE_URL")]
    pub youtube_base_url: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(long, env = "YOUTUBE_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: Option<u64>,

    /// Total request timeout in milliseconds
    #[arg(long, env = "YOUTUBE_TOTAL_TIMEOUT_MS")]
    pub total_timeout_ms: Option<u64>,

    /// Log the playlist instead of publishing it
    #[arg(long, env = "CURATOR_DRY_RUN")]
    pub dry_run: bool,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,

    /// Write Prometheus metrics to this file after the run
    #[arg(long, env = "CURATOR_METRICS_FILE")]
    pub metrics_file: Option<PathBuf>,
}

/// YAML config file. Every key is optional.
///
/// ```yaml
/// lookback_days: 1
/// max_total_selected: 25
/// channels:
///   - id: UCupvZG-5ko_eiXAupbDfxWw
///     class: scored
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub lookback_days: Option<u32>,
    #[serde(default)]
    pub max_fetch_per_channel: Option<usize>,
    #[serde(default)]
    pub max_selected_per_channel: Option<usize>,
    #[serde(default)]
    pub max_total_selected: Option<usize>,
    #[serde(default)]
    pub quality_keywords: Option<Vec<String>>,
    #[serde(default)]
    pub playlist_id: Option<String>,
    #[serde(default)]
    pub playlist_id_file: Option<PathBuf>,
    #[serde(default)]
    pub playlist_title: Option<String>,
    #[serde(default)]
    pub playlist_description: Option<String>,
    #[serde(default)]
    pub playlist_privacy: Option<PlaylistPrivacy>,
    #[serde(default)]
    pub youtube_base_url: Option<String>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub channels: Option<Vec<ChannelEntry>>,
}

impl FileConfig {
    /// # Errors
    /// Returns [`ConfigError::Io`] or [`ConfigError::Deserialize`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Deserialize {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved, validated settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    roster: ChannelRoster,
    lookback_days: u32,
    max_fetch_per_channel: usize,
    limits: SelectionLimits,
    quality_keywords: Vec<String>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    playlist_id: Option<String>,
    playlist_id_file: Option<PathBuf>,
    playlist_title: Option<String>,
    playlist_description: Option<String>,
    playlist_privacy: PlaylistPrivacy,
    status_only: bool,
    api_key: Option<String>,
    access_token: Option<String>,
    youtube_base_url: String,
    connect_timeout: Duration,
    total_timeout: Duration,
    dry_run: bool,
    log_level: LogLevel,
    log_format: LogFormat,
    metrics_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roster: ChannelRoster::builtin(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            max_fetch_per_channel: DEFAULT_MAX_FETCH_PER_CHANNEL,
            limits: SelectionLimits::default(),
            quality_keywords: DEFAULT_QUALITY_KEYWORDS
                .iter()
                .map(ToString::to_string)
                .collect(),
            input: None,
            output: None,
            playlist_id: None,
            playlist_id_file: None,
            playlist_title: None,
            playlist_description: None,
            playlist_privacy: PlaylistPrivacy::default(),
            status_only: false,
            api_key: None,
            access_token: None,
            youtube_base_url: DEFAULT_YOUTUBE_BASE_URL.to_string(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            total_timeout: Duration::from_millis(DEFAULT_TOTAL_TIMEOUT_MS),
            dry_run: false,
            log_level: LogLevel::Info,
            log_format: LogFormat::Json,
            metrics_file: None,
        }
    }
}

impl Config {
    /// コマンドライン引数（と環境変数）から設定を読み込み、検証する。
    ///
    /// # Errors
    /// 引数の解析、設定ファイルの読み込み、検証のいずれかに失敗した場合は [`ConfigError`] を返す。
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args)?;
        Self::from_cli(cli)
    }

    /// CLI/env values win over the config file, which wins over defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the config file cannot be loaded or the
    /// merged settings fail [`Config::validate`].
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let defaults = Self::default();

        let roster = match file.channels {
            Some(entries) => ChannelRoster::from_entries(entries)?,
            None => defaults.roster,
        };
        let limits = SelectionLimits {
            max_per_channel: cli
                .max_selected_per_channel
                .or(file.max_selected_per_channel)
                .unwrap_or(defaults.limits.max_per_channel),
            max_total: cli
                .max_total_selected
                .or(file.max_total_selected)
                .unwrap_or(defaults.limits.max_total),
        };
        let quality_keywords = cli
            .quality_keywords
            .or(file.quality_keywords)
            .map(|keywords| {
                keywords
                    .into_iter()
                    .map(|keyword| keyword.trim().to_string())
                    .filter(|keyword| !keyword.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.quality_keywords);

        let playlist_id_file = cli.playlist_id_file.or(file.playlist_id_file);
        let playlist_id = match non_blank(cli.playlist_id).or_else(|| non_blank(file.playlist_id)) {
            Some(id) => Some(id),
            None => match &playlist_id_file {
                Some(path) => read_playlist_id(path)?,
                None => None,
            },
        };

        let config = Self {
            roster,
            lookback_days: cli
                .lookback_days
                .or(file.lookback_days)
                .unwrap_or(defaults.lookback_days),
            max_fetch_per_channel: cli
                .max_fetch_per_channel
                .or(file.max_fetch_per_channel)
                .unwrap_or(defaults.max_fetch_per_channel),
            limits,
            quality_keywords,
            input: cli.input,
            output: cli.output.or(file.output),
            playlist_id,
            playlist_id_file,
            playlist_title: non_blank(cli.playlist_title).or_else(|| non_blank(file.playlist_title)),
            playlist_description: non_blank(cli.playlist_description)
                .or_else(|| non_blank(file.playlist_description)),
            playlist_privacy: cli
                .playlist_privacy
                .or(file.playlist_privacy)
                .unwrap_or_default(),
            status_only: cli.status_only,
            api_key: non_blank(cli.api_key),
            access_token: non_blank(cli.access_token),
            youtube_base_url: non_blank(cli.youtube_base_url)
                .or_else(|| non_blank(file.youtube_base_url))
                .unwrap_or(defaults.youtube_base_url),
            connect_timeout: cli
                .connect_timeout_ms
                .map_or(defaults.connect_timeout, Duration::from_millis),
            total_timeout: cli
                .total_timeout_ms
                .map_or(defaults.total_timeout, Duration::from_millis),
            dry_run: cli.dry_run,
            log_level: cli.log_level,
            log_format: cli.log_format,
            metrics_file: cli.metrics_file,
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`ConfigError`] describing the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback_days == 0 {
            return Err(invalid("lookback_days", "must be at least 1"));
        }
        if self.max_fetch_per_channel == 0 {
            return Err(invalid("max_fetch_per_channel", "must be at least 1"));
        }
        if self.limits.max_per_channel == 0 {
            return Err(invalid("max_selected_per_channel", "must be at least 1"));
        }
        if self.limits.max_total == 0 {
            return Err(invalid("max_total_selected", "must be at least 1"));
        }
        if self.roster.is_empty() {
            return Err(invalid("channels", "roster must list at least one channel"));
        }
        self.roster.validate()?;
        if self.connect_timeout.is_zero() || self.total_timeout.is_zero() {
            return Err(invalid("timeout", "timeouts must be greater than zero"));
        }
        reqwest::Url::parse(&self.youtube_base_url).map_err(|source| ConfigError::Invalid {
            name: "youtube_base_url",
            source: source.into(),
        })?;

        let has_credentials = self.api_key.is_some() || self.access_token.is_some();
        if self.status_only {
            if self.playlist_id.is_none() {
                return Err(ConfigError::Missing("playlist_id"));
            }
            if !has_credentials {
                return Err(ConfigError::Missing("api_key or access_token"));
            }
            return Ok(());
        }

        if self.input.is_none() && !has_credentials {
            return Err(ConfigError::Missing("api_key or access_token"));
        }
        // Without a playlist id, publishing creates one.
        if !self.dry_run && self.access_token.is_none() {
            return Err(ConfigError::Missing("access_token"));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_roster(mut self, roster: ChannelRoster) -> Self {
        self.roster = roster;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: SelectionLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_quality_keywords(mut self, keywords: Vec<String>) -> Self {
        self.quality_keywords = keywords;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn roster(&self) -> &ChannelRoster {
        &self.roster
    }

    #[must_use]
    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    #[must_use]
    pub fn max_fetch_per_channel(&self) -> usize {
        self.max_fetch_per_channel
    }

    #[must_use]
    pub fn limits(&self) -> SelectionLimits {
        self.limits
    }

    #[must_use]
    pub fn quality_keywords(&self) -> &[String] {
        &self.quality_keywords
    }

    #[must_use]
    pub fn input(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    #[must_use]
    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    #[must_use]
    pub fn playlist_id(&self) -> Option<&str> {
        self.playlist_id.as_deref()
    }

    #[must_use]
    pub fn playlist_id_file(&self) -> Option<&Path> {
        self.playlist_id_file.as_deref()
    }

    #[must_use]
    pub fn playlist_title(&self) -> Option<&str> {
        self.playlist_title.as_deref()
    }

    #[must_use]
    pub fn playlist_description(&self) -> Option<&str> {
        self.playlist_description.as_deref()
    }

    #[must_use]
    pub fn playlist_privacy(&self) -> PlaylistPrivacy {
        self.playlist_privacy
    }

    #[must_use]
    pub fn status_only(&self) -> bool {
        self.status_only
    }

    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    #[must_use]
    pub fn youtube_base_url(&self) -> &str {
        &self.youtube_base_url
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn total_timeout(&self) -> Duration {
        self.total_timeout
    }

    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    #[must_use]
    pub fn metrics_file(&self) -> Option<&Path> {
        self.metrics_file.as_deref()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// 保存済みのプレイリスト ID を読む。ファイルが無い、または空なら `None`。
fn read_playlist_id(path: &Path) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(non_blank(Some(contents))),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        source: anyhow!(reason.to_string()),
    }
}
