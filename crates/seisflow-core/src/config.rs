//! Configuration module
//!
//! Settings for the backend API, the message broker, the scratch workspace root and
//! the outbound notification mailer. Values come from the process environment, with an
//! optional `.env` file loaded first.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

const AUTH_TIMEOUT_SECS: u64 = 30;
const UPLOAD_TIMEOUT_SECS: u64 = 900;
const MQ_PORT: u16 = 5672;
const MQ_CONNECT_TIMEOUT_SECS: u64 = 10;
const MQ_RECONNECT_BACKOFF_SECS: u64 = 5;
const MQ_PREFETCH: u16 = 1;
const SMTP_PORT: u16 = 465;

/// A configured secret. Never printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Backend API location, service credentials and request timeouts.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub url: String,
    pub username: String,
    pub password: Secret,
    pub auth_timeout: Duration,
    pub upload_timeout: Duration,
    /// Probe `GET /users/me` after the startup login.
    pub preflight_probe: bool,
}

/// AMQP broker connection settings.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub virtual_host: String,
    pub username: String,
    pub password: Secret,
    pub queue_name: String,
    pub connect_timeout: Duration,
    pub reconnect_backoff: Duration,
    pub prefetch: u16,
}

impl BrokerConfig {
    /// AMQP URI for the connection, with the virtual host percent-encoded.
    pub fn amqp_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            utf8_percent_encode(&self.username, NON_ALPHANUMERIC),
            utf8_percent_encode(self.password.expose(), NON_ALPHANUMERIC),
            self.host,
            self.port,
            utf8_percent_encode(&self.virtual_host, NON_ALPHANUMERIC),
        )
    }

    /// Same as [`amqp_uri`](Self::amqp_uri) with the password masked, for logging.
    pub fn redacted_uri(&self) -> String {
        format!(
            "amqp://{}:***@{}:{}/{}",
            self.username,
            self.host,
            self.port,
            utf8_percent_encode(&self.virtual_host, NON_ALPHANUMERIC),
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmtpTls {
    /// TLS from the first byte (port 465).
    Implicit,
    StartTls,
    None,
}

impl FromStr for SmtpTls {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "implicit" | "tls" | "ssl" => Ok(SmtpTls::Implicit),
            "starttls" => Ok(SmtpTls::StartTls),
            "none" | "plain" | "false" => Ok(SmtpTls::None),
            other => Err(anyhow::anyhow!("Unsupported SMTP_TLS mode: {}", other)),
        }
    }
}

/// Outbound notification settings.
#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<Secret>,
    pub smtp_from: Option<String>,
    pub smtp_from_name: Option<String>,
    pub smtp_tls: SmtpTls,
    /// Distribution list for the internal "data received" email.
    pub internal_recipients: Vec<String>,
    pub bcc_recipients: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Worker configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub backend: BackendConfig,
    pub broker: BrokerConfig,
    pub email: EmailConfig,
    /// Root directory under which per-message workspaces are created.
    pub work_dir: PathBuf,
    pub download_base_url: String,
    pub environment: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from the environment (after reading `.env` if present).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Required keys that are
    /// absent are reported here; cross-field checks live in [`Config::validate`].
    pub fn from_source<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = BackendConfig {
            url: get("BACKEND_URL")
                .ok_or_else(|| anyhow::anyhow!("BACKEND_URL must be set"))?
                .trim_end_matches('/')
                .to_string(),
            username: get("BACKEND_USERNAME")
                .ok_or_else(|| anyhow::anyhow!("BACKEND_USERNAME must be set"))?,
            password: Secret::new(
                get("BACKEND_PASSWORD")
                    .ok_or_else(|| anyhow::anyhow!("BACKEND_PASSWORD must be set"))?,
            ),
            auth_timeout: Duration::from_secs(parse_or(
                get("BACKEND_AUTH_TIMEOUT_SECS"),
                AUTH_TIMEOUT_SECS,
            )),
            upload_timeout: Duration::from_secs(parse_or(
                get("BACKEND_UPLOAD_TIMEOUT_SECS"),
                UPLOAD_TIMEOUT_SECS,
            )),
            preflight_probe: parse_bool(get("BACKEND_PREFLIGHT_PROBE"), false),
        };

        let broker = BrokerConfig {
            host: get("MQ_HOST_NAME").unwrap_or_else(|| "localhost".to_string()),
            port: parse_or(get("MQ_PORT"), MQ_PORT),
            virtual_host: get("MQ_VIRTUAL_HOST").unwrap_or_else(|| "/".to_string()),
            username: get("MQ_USER_NAME").unwrap_or_else(|| "guest".to_string()),
            password: Secret::new(get("MQ_PASSWORD").unwrap_or_else(|| "guest".to_string())),
            queue_name: get("MQ_QUEUE_NAME").unwrap_or_else(|| "terean_queue".to_string()),
            connect_timeout: Duration::from_secs(parse_or(
                get("MQ_CONNECT_TIMEOUT_SECS"),
                MQ_CONNECT_TIMEOUT_SECS,
            )),
            reconnect_backoff: Duration::from_secs(parse_or(
                get("MQ_RECONNECT_BACKOFF_SECS"),
                MQ_RECONNECT_BACKOFF_SECS,
            )),
            prefetch: parse_or(get("MQ_PREFETCH"), MQ_PREFETCH),
        };

        let smtp_tls = match get("SMTP_TLS") {
            Some(v) => v.parse()?,
            None => SmtpTls::Implicit,
        };

        let email = EmailConfig {
            enabled: parse_bool(get("EMAIL_ENABLED"), true),
            smtp_host: get("SMTP_HOST"),
            smtp_port: parse_or(get("SMTP_PORT"), SMTP_PORT),
            smtp_user: get("SMTP_USER"),
            smtp_password: get("SMTP_PASSWORD").map(Secret::new),
            smtp_from: get("SMTP_FROM"),
            smtp_from_name: get("SMTP_FROM_NAME"),
            smtp_tls,
            internal_recipients: split_list(get("INTERNAL_RECIPIENTS")),
            bcc_recipients: split_list(get("NOTIFICATION_BCC")),
        };

        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_lowercase).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Config {
            backend,
            broker,
            email,
            work_dir: get("MQ_SAVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            download_base_url: get("DOWNLOAD_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            environment: get("ENVIRONMENT")
                .or_else(|| get("APP_ENV"))
                .unwrap_or_else(|| "development".to_string()),
            log_format,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.backend.url.starts_with("http://") && !self.backend.url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "BACKEND_URL must be an http(s) URL, got {}",
                self.backend.url
            ));
        }

        if self.backend.password.is_empty() || self.backend.username.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "BACKEND_USERNAME and BACKEND_PASSWORD must be non-empty"
            ));
        }

        if self.backend.upload_timeout <= self.backend.auth_timeout {
            return Err(anyhow::anyhow!(
                "BACKEND_UPLOAD_TIMEOUT_SECS ({}) must be greater than BACKEND_AUTH_TIMEOUT_SECS ({})",
                self.backend.upload_timeout.as_secs(),
                self.backend.auth_timeout.as_secs()
            ));
        }

        if self.broker.queue_name.trim().is_empty() {
            return Err(anyhow::anyhow!("MQ_QUEUE_NAME must not be empty"));
        }

        if self.broker.connect_timeout.is_zero() {
            return Err(anyhow::anyhow!("MQ_CONNECT_TIMEOUT_SECS must be at least 1"));
        }

        if self.email.enabled && (self.email.smtp_host.is_none() || self.email.smtp_from.is_none())
        {
            return Err(anyhow::anyhow!(
                "EMAIL_ENABLED=true requires SMTP_HOST and SMTP_FROM to be set"
            ));
        }

        Ok(())
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|v| v.trim().to_lowercase()) {
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => false,
        _ => default,
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
