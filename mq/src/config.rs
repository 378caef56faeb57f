//! mailqtt configuration types and loading
//!
//! Configuration comes from a YAML file (first found of `--config`,
//! `./mailqtt.yml`, `~/.config/mailqtt/mailqtt.yml`) and is then overridden by
//! environment variables, so container deployments can be configured with env
//! alone.

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main mailqtt configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SMTP listener configuration
    pub smtp: SmtpConfig,

    /// MQTT broker and topic configuration
    pub mqtt: MqttConfig,

    /// Debounced reset configuration
    pub reset: ResetConfig,

    /// Attachment capture configuration
    pub attachments: AttachmentsConfig,

    /// Verbose logging
    pub debug: bool,

    /// Explicit log level (overrides `debug`)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// File the configuration was read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.smtp.port == 0 {
            return Err(eyre!("smtp.port must be non-zero"));
        }
        if self.mqtt.port == 0 {
            return Err(eyre!("mqtt.port must be non-zero"));
        }
        if self.mqtt.qos > 2 {
            return Err(eyre!("mqtt.qos must be 0, 1 or 2 (got {})", self.mqtt.qos));
        }
        if self.mqtt.topic.is_empty() {
            return Err(eyre!("mqtt.topic must not be empty"));
        }
        if self.mqtt.topic.contains(['+', '#', '\0']) {
            return Err(eyre!("mqtt.topic must not contain wildcards: {}", self.mqtt.topic));
        }
        // rumqttc panics on client ids that are empty or start with whitespace
        let prefix = &self.mqtt.client_id_prefix;
        if prefix.is_empty() || prefix.starts_with(char::is_whitespace) {
            return Err(eyre!(
                "mqtt.client-id-prefix must be non-empty and not start with whitespace: {:?}",
                prefix
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try working directory config: ./mailqtt.yml
        let local_config = PathBuf::from("mailqtt.yml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        // Try user config: ~/.config/mailqtt/mailqtt.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("mailqtt").join("mailqtt.yml");
            if user_config.exists() {
                return Self::load_from_file(&user_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.source = Some(path.as_ref().to_path_buf());
        Ok(config)
    }

    /// Apply environment-style overrides (`MQTT_HOST=...` etc.)
    ///
    /// Unknown keys are ignored so the whole process environment can be passed.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let key = key.as_ref();
            let value = value.as_ref();
            match key {
                "SMTP_PORT" => self.smtp.port = parse_number(key, value)?,
                "MQTT_HOST" => self.mqtt.host = value.to_string(),
                "MQTT_PORT" => self.mqtt.port = parse_number(key, value)?,
                "MQTT_USERNAME" => self.mqtt.username = value.to_string(),
                "MQTT_PASSWORD" => self.mqtt.password = value.to_string(),
                "MQTT_TOPIC" => self.mqtt.topic = value.to_string(),
                "MQTT_RESET_TIME" => self.reset.time_secs = parse_number(key, value)?,
                "MQTT_RESET_PAYLOAD" => self.reset.payload = value.to_string(),
                "SAVE_ATTACHMENTS" => self.attachments.save = parse_bool(key, value)?,
                "SAVE_ATTACHMENTS_DURING_RESET_TIME" => self.attachments.save_during_reset = parse_bool(key, value)?,
                "SAVE_ATTACHMENTS_DIR" => self.attachments.dir = PathBuf::from(value),
                "DEBUG" => self.debug = parse_bool(key, value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Copy safe to print: the MQTT password is masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.mqtt.password.is_empty() {
            config.mqtt.password = "********".to_string();
        }
        config
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(eyre!("{} must be a boolean (true/false), got '{}'", key, other)),
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .context(format!("{} must be a number, got '{}'", key, value))
}

/// SMTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Address to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// Name announced to clients
    pub hostname: String,

    /// Largest accepted message in bytes
    #[serde(rename = "max-message-bytes")]
    pub max_message_bytes: usize,

    /// Idle timeout per connection in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1025,
            hostname: "mailqtt".to_string(),
            max_message_bytes: 32 * 1024 * 1024,
            timeout_secs: 300,
        }
    }
}

impl SmtpConfig {
    /// `host:port` string for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Listener settings for the SMTP intake
    pub fn server_config(&self) -> smtpintake::ServerConfig {
        smtpintake::ServerConfig {
            hostname: self.hostname.clone(),
            max_message_bytes: self.max_message_bytes,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// MQTT broker and topic configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Username; credentials are only sent when this is non-empty
    pub username: String,

    /// Password
    pub password: String,

    /// Base topic prefix
    pub topic: String,

    /// Publish QoS (0, 1 or 2)
    pub qos: u8,

    /// Publish with the retain flag
    pub retain: bool,

    /// Prefix for the per-publish client id
    #[serde(rename = "client-id-prefix")]
    pub client_id_prefix: String,

    /// Keep-alive interval in seconds
    #[serde(rename = "keep-alive-secs")]
    pub keep_alive_secs: u64,

    /// Upper bound for one publish (connect, send, disconnect) in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            topic: "mqtt".to_string(),
            qos: 0,
            retain: false,
            client_id_prefix: "mailqtt".to_string(),
            keep_alive_secs: 30,
            timeout_ms: 10_000,
        }
    }
}

impl MqttConfig {
    /// Username and password, if a username is configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() {
            None
        } else {
            Some((&self.username, &self.password))
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Debounced reset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetConfig {
    /// Quiet period before a reset is published; 0 disables resets
    #[serde(rename = "time-secs")]
    pub time_secs: u64,

    /// Literal payload published on reset
    pub payload: String,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            time_secs: 300,
            payload: "OFF".to_string(),
        }
    }
}

impl ResetConfig {
    /// The debounce window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.time_secs)
    }
}

/// Attachment capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentsConfig {
    /// Save image attachments at all
    pub save: bool,

    /// Also save images that arrive while a reset is pending
    #[serde(rename = "save-during-reset")]
    pub save_during_reset: bool,

    /// Output directory
    pub dir: PathBuf,
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            save: true,
            save_during_reset: false,
            dir: PathBuf::from("/attachments"),
        }
    }
}
