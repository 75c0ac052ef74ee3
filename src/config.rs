//! Configuration types for udown

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Download defaults applied to every job unless the request overrides them
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Output directory (default: "./downloads")
    #[serde(default = "default_output_dir")]
    #[schema(value_type = String)]
    pub output_dir: PathBuf,

    /// Filename template in the extraction tool's syntax
    #[serde(default = "default_name_template")]
    pub name_template: String,

    /// Template used when a request asks for simple serial naming
    #[serde(default = "default_simple_serial_template")]
    pub simple_serial_template: String,

    /// Quality used when a request does not specify one (default: "best")
    #[serde(default = "default_quality")]
    pub default_quality: String,

    /// Place each playlist in its own subdirectory (default: true)
    #[serde(default = "default_true")]
    pub playlist_subdir: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            name_template: default_name_template(),
            simple_serial_template: default_simple_serial_template(),
            default_quality: default_quality(),
            playlist_subdir: true,
        }
    }
}

/// When a JavaScript runtime is required before starting the extraction tool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JsRuntimePolicy {
    /// Required only for sources hosted on a challenge host
    #[default]
    Auto,
    /// Always required
    Always,
    /// Never checked
    Never,
}

/// External tool paths and behavior
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolsConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub ytdlp_path: Option<PathBuf>,

    /// Path to the JavaScript runtime (deno, node, bun; auto-detected if None)
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub js_runtime_path: Option<PathBuf>,

    /// Whether to search PATH for binaries if explicit paths are not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Cookies file used when a request does not provide one
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub cookies_file: Option<PathBuf>,

    /// Keep going when individual playlist entries fail (default: true)
    #[serde(default = "default_true")]
    pub ignore_item_errors: bool,

    /// JavaScript runtime precondition
    #[serde(default)]
    pub js_runtime_policy: JsRuntimePolicy,

    /// Hosts whose extraction needs a JavaScript runtime
    #[serde(default = "default_challenge_hosts")]
    pub challenge_hosts: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            js_runtime_path: None,
            search_path: true,
            cookies_file: None,
            ignore_item_errors: true,
            js_runtime_policy: JsRuntimePolicy::default(),
            challenge_hosts: default_challenge_hosts(),
        }
    }
}

/// Job lifecycle and event bus tuning
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobConfig {
    /// Per-subscriber queue capacity before log lines and stale progress ticks are dropped (default: 1024)
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,

    /// Events retained for replay to late subscribers (default: 10000)
    #[serde(default = "default_backlog_limit")]
    pub backlog_limit: usize,

    /// How long a finished job without observers stays in the registry (default: 60 seconds)
    #[serde(default = "default_grace_period", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub grace_period: Duration,

    /// How often finished jobs are reaped (default: 15 seconds)
    #[serde(default = "default_reap_interval", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub reap_interval: Duration,

    /// How long a stream for an unknown job stays open (default: 30 seconds)
    #[serde(default = "default_idle_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub idle_timeout: Duration,

    /// Interval of SSE keep-alive comments (default: 15 seconds)
    #[serde(default = "default_keep_alive", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub keep_alive: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
            backlog_limit: default_backlog_limit(),
            grace_period: default_grace_period(),
            reap_interval: default_reap_interval(),
            idle_timeout: default_idle_timeout(),
            keep_alive: default_keep_alive(),
        }
    }
}

/// How the formatter places files into the target directory
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Copy files, leaving sources untouched
    #[default]
    Copy,
    /// Move (rename) files out of the sources
    Move,
}

/// Version formatter defaults
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FormatterConfig {
    /// Root holding the `Version_<n>` folders
    #[serde(default = "default_source_root")]
    #[schema(value_type = String)]
    pub source_root: PathBuf,

    /// Directory receiving the serialized files
    #[serde(default = "default_target_root")]
    #[schema(value_type = String)]
    pub target_root: PathBuf,

    /// First version folder (default: 1)
    #[serde(default = "default_start_version")]
    pub start_version: u32,

    /// Last version folder (default: 7)
    #[serde(default = "default_end_version")]
    pub end_version: u32,

    /// File extensions to include (default: ["mp3"])
    #[serde(default = "default_include_ext")]
    pub include_ext: Vec<String>,

    /// Maximum length of the sanitized base name (default: 100)
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,

    /// Copy or move files (default: copy)
    #[serde(default)]
    pub transfer: TransferMode,

    /// Remove previously serialized files from the target first (default: true)
    #[serde(default = "default_true")]
    pub clear_target: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            target_root: default_target_root(),
            start_version: default_start_version(),
            end_version: default_end_version(),
            include_ext: default_include_ext(),
            max_name_len: default_max_name_len(),
            transfer: TransferMode::default(),
            clear_target: true,
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:5000)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// API and external server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

/// Main configuration for [`JobManager`](crate::JobManager)
///
/// Every field has a default, so `Config::default()` works out of the box and
/// partial JSON/TOML documents deserialize cleanly.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Download defaults
    #[serde(default)]
    pub download: DownloadConfig,

    /// External tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Job lifecycle and event bus tuning
    #[serde(default)]
    pub jobs: JobConfig,

    /// Version formatter defaults
    #[serde(default)]
    pub formatter: FormatterConfig,

    /// API server settings
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Output directory used when a request does not name one
    pub fn output_dir(&self) -> &PathBuf {
        &self.download.output_dir
    }

    /// Overlay `UDOWN_*` environment variables onto this config
    ///
    /// Recognized variables: `UDOWN_HOST`, `UDOWN_PORT`, `UDOWN_OUTPUT_DIR`
    /// and `UDOWN_YTDLP`. Invalid values are logged and ignored.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay environment-style variables resolved by `lookup`
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("UDOWN_HOST") {
            match host.parse::<std::net::IpAddr>() {
                Ok(ip) => self.server.api.bind_address.set_ip(ip),
                Err(e) => tracing::warn!(value = %host, error = %e, "ignoring invalid UDOWN_HOST"),
            }
        }
        if let Some(port) = lookup("UDOWN_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.server.api.bind_address.set_port(p),
                Err(e) => tracing::warn!(value = %port, error = %e, "ignoring invalid UDOWN_PORT"),
            }
        }
        if let Some(dir) = lookup("UDOWN_OUTPUT_DIR").filter(|d| !d.trim().is_empty()) {
            self.download.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("UDOWN_YTDLP").filter(|p| !p.trim().is_empty()) {
            self.tools.ytdlp_path = Some(PathBuf::from(path));
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_name_template() -> String {
    "%(playlist_index)02d - %(title)s.%(ext)s".to_string()
}

fn default_simple_serial_template() -> String {
    "%(playlist_index)02d.%(ext)s".to_string()
}

fn default_quality() -> String {
    "best".to_string()
}

fn default_true() -> bool {
    true
}

fn default_challenge_hosts() -> Vec<String> {
    vec![
        "youtube.com".to_string(),
        "youtu.be".to_string(),
        "youtube-nocookie.com".to_string(),
    ]
}

fn default_subscriber_capacity() -> usize {
    1024
}

fn default_backlog_limit() -> usize {
    10_000
}

fn default_grace_period() -> Duration {
    Duration::from_secs(60)
}

fn default_reap_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(15)
}

fn default_source_root() -> PathBuf {
    PathBuf::from("./downloads/versions")
}

fn default_target_root() -> PathBuf {
    PathBuf::from("./downloads/serialized")
}

fn default_start_version() -> u32 {
    1
}

fn default_end_version() -> u32 {
    7
}

fn default_include_ext() -> Vec<String> {
    vec!["mp3".to_string()]
}

fn default_max_name_len() -> usize {
    100
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// Serialize durations as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
