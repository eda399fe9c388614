//! Plugin configuration types and loading.
//!
//! Configuration is loaded once and passed explicitly to the components that
//! need it. Sources, in the order [`default_provider`] tries them:
//! 1. `NOTAKEY_CONFIG_FILE` - path to a YAML file
//! 2. `NOTAKEY_CONFIG_YAML` - inline YAML
//! 3. `/etc/two-factor-notakey/config.yaml` when it exists
//! 4. `NOTAKEY_*` environment variables

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/two-factor-notakey/config.yaml";

/// Placeholder substituted with the subject's login name in request messages.
pub const USER_PLACEHOLDER: &str = "%user%";

const DEFAULT_REQUEST_TITLE: &str = "Wordpress authentication";
const DEFAULT_REQUEST_MESSAGE: &str = "Proceed with login as user %user%?";
const DEFAULT_REQUEST_TTL: u64 = 300;

/// Longest push request lifetime accepted (one day).
pub const MAX_REQUEST_TTL: u64 = 24 * 60 * 60;
const DEFAULT_HTTP_TIMEOUT: u64 = 10;

/// Complete plugin configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct NotakeyConfig {
    /// Authentication server address.
    pub service_url: String,
    /// OAuth client ID from the server's access credentials page.
    pub client_id: String,
    /// Secret for `client_id`.
    pub client_secret: String,
    /// Service (access) identifier.
    pub service_id: String,
    /// Service domain announced to users.
    pub service_domain: String,
    /// Title of the push request.
    pub request_title: String,
    /// Body of the push request; `%user%` is replaced with the login name.
    pub request_message: String,
    /// Seconds a request stays valid.
    pub request_ttl: u64,
    /// Add the Notakey provider to every user's enabled set.
    pub enable_notakey_for_all: bool,
    /// Restrict registered providers to `provider_override_list`.
    pub provider_override_active: bool,
    /// Providers allowed globally when the override is active.
    pub provider_override_list: Vec<String>,
    /// Refuse logins for users without any enabled provider.
    pub reject_login_without_mfa: bool,
    /// Timeout for every HTTP call to the authentication server.
    pub http_timeout_secs: u64,
}

impl Default for NotakeyConfig {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            service_id: String::new(),
            service_domain: String::new(),
            request_title: DEFAULT_REQUEST_TITLE.to_string(),
            request_message: DEFAULT_REQUEST_MESSAGE.to_string(),
            request_ttl: DEFAULT_REQUEST_TTL,
            enable_notakey_for_all: false,
            provider_override_active: false,
            provider_override_list: Vec::new(),
            reject_login_without_mfa: false,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl fmt::Debug for NotakeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.client_secret.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        f.debug_struct("NotakeyConfig")
            .field("service_url", &self.service_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &secret)
            .field("service_id", &self.service_id)
            .field("service_domain", &self.service_domain)
            .field("request_title", &self.request_title)
            .field("request_message", &self.request_message)
            .field("request_ttl", &self.request_ttl)
            .field("enable_notakey_for_all", &self.enable_notakey_for_all)
            .field("provider_override_active", &self.provider_override_active)
            .field("provider_override_list", &self.provider_override_list)
            .field("reject_login_without_mfa", &self.reject_login_without_mfa)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

impl NotakeyConfig {
    /// Load configuration from a YAML file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: NotakeyConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from `NOTAKEY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let strings: [(&str, &mut String); 7] = [
            ("NOTAKEY_SERVICE_URL", &mut config.service_url),
            ("NOTAKEY_CLIENT_ID", &mut config.client_id),
            ("NOTAKEY_CLIENT_SECRET", &mut config.client_secret),
            ("NOTAKEY_SERVICE_ID", &mut config.service_id),
            ("NOTAKEY_SERVICE_DOMAIN", &mut config.service_domain),
            ("NOTAKEY_REQUEST_TITLE", &mut config.request_title),
            ("NOTAKEY_REQUEST_MESSAGE", &mut config.request_message),
        ];
        for (name, slot) in strings {
            if let Ok(value) = std::env::var(name) {
                *slot = value;
            }
        }

        if let Ok(ttl) = std::env::var("NOTAKEY_REQUEST_TTL") {
            config.request_ttl = ttl.parse().map_err(|_| {
                ConfigError::Invalid(format!("NOTAKEY_REQUEST_TTL is not a number: {}", ttl))
            })?;
        }
        if let Ok(timeout) = std::env::var("NOTAKEY_HTTP_TIMEOUT") {
            config.http_timeout_secs = timeout.parse().map_err(|_| {
                ConfigError::Invalid(format!("NOTAKEY_HTTP_TIMEOUT is not a number: {}", timeout))
            })?;
        }

        config.enable_notakey_for_all = env_flag("NOTAKEY_ENABLE_FOR_ALL");
        config.provider_override_active = env_flag("NOTAKEY_PROVIDER_OVERRIDE_ACTIVE");
        config.reject_login_without_mfa = env_flag("NOTAKEY_REJECT_LOGIN_WITHOUT_MFA");

        if let Ok(list) = std::env::var("NOTAKEY_PROVIDER_OVERRIDE_LIST") {
            config.provider_override_list = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that can never work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_ttl == 0 {
            return Err(ConfigError::Invalid(
                "request_ttl must be greater than zero".to_string(),
            ));
        }
        if self.request_ttl > MAX_REQUEST_TTL {
            return Err(ConfigError::Invalid(format!(
                "request_ttl must not exceed {} seconds",
                MAX_REQUEST_TTL
            )));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Names of the settings a remote call requires but are empty.
    pub fn missing_remote_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.service_url.trim().is_empty() {
            missing.push("service_url");
        }
        if self.client_id.trim().is_empty() {
            missing.push("client_id");
        }
        if self.client_secret.is_empty() {
            missing.push("client_secret");
        }
        if self.service_id.trim().is_empty() {
            missing.push("service_id");
        }
        missing
    }

    /// Whether the server settings are complete enough to reach the service.
    pub fn ready(&self) -> bool {
        self.missing_remote_fields().is_empty()
    }

    /// Render the request message for a subject.
    pub fn render_message(&self, subject: &str) -> String {
        self.request_message.replace(USER_PLACEHOLDER, subject)
    }
}

/// Only explicit "true", "1" or "on" enable a flag.
fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1" || v == "on")
        .unwrap_or(false)
}

/// Source of typed plugin configuration.
pub trait ConfigProvider: Send + Sync {
    /// Load the configuration. Called once per request or process.
    fn load(&self) -> Result<NotakeyConfig, ConfigError>;
}

/// Reads configuration from a YAML file.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for FileConfigProvider {
    fn load(&self) -> Result<NotakeyConfig, ConfigError> {
        NotakeyConfig::load_from(&self.path)
    }
}

/// Reads configuration from `NOTAKEY_*` environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigProvider;

impl ConfigProvider for EnvConfigProvider {
    fn load(&self) -> Result<NotakeyConfig, ConfigError> {
        NotakeyConfig::from_env()
    }
}

/// Serves an already constructed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfig(pub NotakeyConfig);

impl ConfigProvider for StaticConfig {
    fn load(&self) -> Result<NotakeyConfig, ConfigError> {
        self.0.validate()?;
        Ok(self.0.clone())
    }
}

/// Pick a configuration source from the environment.
pub fn default_provider() -> Box<dyn ConfigProvider> {
    if let Ok(path) = std::env::var("NOTAKEY_CONFIG_FILE") {
        return Box::new(FileConfigProvider::new(path));
    }

    if let Ok(yaml) = std::env::var("NOTAKEY_CONFIG_YAML") {
        return Box::new(InlineYamlProvider(yaml));
    }

    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        return Box::new(FileConfigProvider::new(DEFAULT_CONFIG_PATH));
    }

    Box::new(EnvConfigProvider)
}

struct InlineYamlProvider(String);

impl ConfigProvider for InlineYamlProvider {
    fn load(&self) -> Result<NotakeyConfig, ConfigError> {
        NotakeyConfig::from_yaml(&self.0)
    }
}
