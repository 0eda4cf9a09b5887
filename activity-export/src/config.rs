use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    // Base of the REST API, e.g. https://gitlab.example.com/api/v4
    #[envconfig(from = "GITLAB_URL")]
    pub gitlab_url: NonEmptyString,

    #[envconfig(from = "ACCESS_TOKEN")]
    pub access_token: NonEmptyString,

    // ISO-8601 instants, both optional. Empty strings count as unset.
    #[envconfig(from = "SINCE")]
    pub since: Option<String>,

    #[envconfig(from = "UNTIL")]
    pub until: Option<String>,

    #[envconfig(from = "PER_PAGE", default = "100")]
    pub per_page: u32,

    #[envconfig(from = "REQUEST_TIMEOUT_MS", default = "30000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(from = "MAX_CONCURRENT_REQUESTS", default = "16")]
    pub max_concurrent_requests: usize,

    #[envconfig(from = "CI_CONFIG_PATH", default = ".gitlab-ci.yml")]
    pub ci_config_path: NonEmptyString,

    #[envconfig(from = "SINK", default = "csv")]
    pub sink: SinkKind,

    // Generated from the time window when unset
    #[envconfig(from = "OUTPUT_DIR")]
    pub output_dir: Option<String>,

    #[envconfig(from = "TIMEZONE", default = "Asia/Shanghai")]
    pub timezone: String,

    #[envconfig(from = "BATCH_SIZE", default = "1000")]
    pub batch_size: usize,

    #[envconfig(nested = true)]
    pub doris: DorisConfig,
}

impl Config {
    /// The API base without a trailing slash, so paths can be appended with `/`.
    pub fn api_base(&self) -> &str {
        self.gitlab_url.as_str().trim_end_matches('/')
    }
}

#[derive(Envconfig, Clone)]
pub struct DorisConfig {
    #[envconfig(from = "DORIS_HOST", default = "127.0.0.1")]
    pub host: String,

    // Doris FE speaks the MySQL protocol on its query port
    #[envconfig(from = "DORIS_PORT", default = "9030")]
    pub port: u16,

    #[envconfig(from = "DORIS_USER", default = "root")]
    pub user: String,

    #[envconfig(from = "DORIS_PASSWORD", default = "")]
    pub password: String,

    #[envconfig(from = "DORIS_DB", default = "gitlab")]
    pub database: String,

    #[envconfig(from = "MAX_DB_CONNECTIONS", default = "4")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Csv,
    Doris,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseSinkKindError(pub String);

impl std::fmt::Display for ParseSinkKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown sink kind: {} (expected csv or doris)", self.0)
    }
}

impl std::error::Error for ParseSinkKindError {}

impl FromStr for SinkKind {
    type Err = ParseSinkKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(SinkKind::Csv),
            "doris" => Ok(SinkKind::Doris),
            other => Err(ParseSinkKindError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl std::fmt::Display for ParseEnvMsDurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected a duration in milliseconds")
    }
}

impl std::error::Error for ParseEnvMsDurationError {}

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl std::fmt::Display for StringIsEmptyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "value must not be empty")
    }
}

impl std::error::Error for StringIsEmptyError {}

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
