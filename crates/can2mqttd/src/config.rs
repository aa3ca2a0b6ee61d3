//! Configuration file handling for can2mqttd
//!
//! Settings resolve in this order, later wins: built-in defaults, the TOML
//! file, environment variables, command-line flags. Environment and flags
//! are both handled by clap.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use c2m_bridge::{BridgeConfig, CanConfig, DirMode, MqttConfig};

use crate::cli::{Args, LogFormat};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "can2mqtt.toml";

/// Contents of the TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub can: CanConfig,
    pub mqtt: MqttSection,
    pub bridge: BridgeSection,
    pub logging: LoggingConfig,
}

/// `[mqtt]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSection {
    #[serde(default = "default_mqtt_url")]
    pub url: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub client_id: Option<String>,
    #[serde(default)]
    pub qos: u8,
    pub keep_alive_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

fn default_mqtt_url() -> String {
    "tcp://localhost:1883".to_string()
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            url: default_mqtt_url(),
            username: None,
            password: None,
            client_id: None,
            qos: 0,
            keep_alive_secs: None,
            connect_timeout_secs: None,
        }
    }
}

/// `[bridge]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeSection {
    #[serde(flatten)]
    pub settings: BridgeConfig,
    pub routes_file: Option<PathBuf>,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct Settings {
    pub can: CanConfig,
    pub mqtt: MqttConfig,
    pub bridge: BridgeConfig,
    pub routes_file: Option<PathBuf>,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load `path`, or the default file if it exists, or the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Merge CLI arguments (and their env vars) over config file values
    pub fn merge_with_args(self, args: &Args) -> Result<Settings> {
        let mqtt_section = self.mqtt;

        let url = args.mqtt_url.as_deref().unwrap_or(&mqtt_section.url);
        let mut mqtt = MqttConfig::from_url(url).context("Invalid MQTT broker URL")?;
        if let Some(username) = args.mqtt_username.clone().or(mqtt_section.username) {
            mqtt.username = Some(username);
        }
        if let Some(password) = args.mqtt_password.clone().or(mqtt_section.password) {
            mqtt.password = Some(password);
        }
        if let Some(client_id) = args.client_id.clone().or(mqtt_section.client_id) {
            mqtt.client_id = client_id;
        }
        mqtt.qos = mqtt_section.qos;
        if let Some(secs) = mqtt_section.keep_alive_secs {
            mqtt.keep_alive_secs = secs;
        }
        if let Some(secs) = mqtt_section.connect_timeout_secs {
            mqtt.connect_timeout_secs = secs;
        }

        let mut can = self.can;
        if let Some(interface) = &args.can_interface {
            can.interface = interface.clone();
        }

        let mut bridge = self.bridge.settings;
        if let Some(topic) = &args.routes_topic {
            bridge.routes_topic = topic.clone();
        }
        if let Some(direction) = args.direction {
            bridge.direction = DirMode::try_from(direction).map_err(anyhow::Error::msg)?;
        }

        let mut logging = self.logging;
        if args.verbose {
            logging.level = "debug".to_string();
        }
        if let Some(format) = args.log_format {
            logging.format = format;
        }

        Ok(Settings {
            can,
            mqtt,
            bridge,
            routes_file: args.routes_file.clone().or(self.bridge.routes_file),
            logging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SAMPLE: &str = r#"
[can]
interface = "vcan0"

[mqtt]
url = "tcp://broker.local:1884"
username = "bridge"
password = "secret"
client_id = "gw-1"
qos = 1

[bridge]
queue_capacity = 32
routes_topic = "/site/routes"
direction = 1
routes_file = "routes.csv"

[logging]
level = "warn"
format = "json"
"#;

    fn parse(args: &[&str]) -> Args {
        Args::parse_from(std::iter::once("can2mqttd").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let settings = AppConfig::default().merge_with_args(&Args::default()).unwrap();
        assert_eq!(settings.can.interface, "can0");
        assert_eq!(settings.mqtt.host, "localhost");
        assert_eq!(settings.mqtt.port, 1883);
        assert_eq!(settings.mqtt.client_id, "can2mqtt");
        assert_eq!(settings.bridge.queue_capacity, 10);
        assert_eq!(settings.bridge.routes_topic, "/gateway/routes");
        assert_eq!(settings.bridge.direction, DirMode::Bidirectional);
        assert_eq!(settings.routes_file, None);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_file() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        let settings = config.merge_with_args(&Args::default()).unwrap();

        assert_eq!(settings.can.interface, "vcan0");
        assert_eq!(settings.mqtt.host, "broker.local");
        assert_eq!(settings.mqtt.port, 1884);
        assert_eq!(settings.mqtt.username.as_deref(), Some("bridge"));
        assert_eq!(settings.mqtt.password.as_deref(), Some("secret"));
        assert_eq!(settings.mqtt.client_id, "gw-1");
        assert_eq!(settings.mqtt.qos, 1);
        assert_eq!(settings.bridge.queue_capacity, 32);
        assert_eq!(settings.bridge.routes_topic, "/site/routes");
        assert_eq!(settings.bridge.direction, DirMode::CanToMqttOnly);
        assert_eq!(settings.routes_file, Some(PathBuf::from("routes.csv")));
        assert_eq!(settings.logging.level, "warn");
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_partial_file() {
        let config: AppConfig = toml::from_str("[bridge]\ndirection = 2\n").unwrap();
        assert_eq!(config.bridge.settings.direction, DirMode::MqttToCanOnly);
        assert_eq!(config.bridge.settings.queue_capacity, 10);
        assert_eq!(config.mqtt.url, "tcp://localhost:1883");
    }

    #[test]
    fn test_invalid_direction_in_file() {
        assert!(toml::from_str::<AppConfig>("[bridge]\ndirection = 3\n").is_err());
    }

    #[test]
    fn test_args_override_file() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        let args = parse(&[
            "-c",
            "can1",
            "-m",
            "tcp://user:pw@other:1999",
            "--client-id",
            "cli",
            "-d",
            "2",
            "--routes-topic",
            "/cli/routes",
            "-f",
            "cli.json",
            "-v",
            "--log-format",
            "text",
        ]);
        let settings = config.merge_with_args(&args).unwrap();

        assert_eq!(settings.can.interface, "can1");
        assert_eq!(settings.mqtt.host, "other");
        assert_eq!(settings.mqtt.port, 1999);
        // the file's credentials still override the URL's
        assert_eq!(settings.mqtt.username.as_deref(), Some("bridge"));
        assert_eq!(settings.mqtt.client_id, "cli");
        assert_eq!(settings.bridge.direction, DirMode::MqttToCanOnly);
        assert_eq!(settings.bridge.routes_topic, "/cli/routes");
        assert_eq!(settings.routes_file, Some(PathBuf::from("cli.json")));
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_url_credentials() {
        let args = parse(&["-m", "mqtt://u:p@host"]);
        let settings = AppConfig::default().merge_with_args(&args).unwrap();
        assert_eq!(settings.mqtt.username.as_deref(), Some("u"));
        assert_eq!(settings.mqtt.password.as_deref(), Some("p"));

        let args = parse(&["-m", "mqtt://u:p@host", "--mqtt-username", "x"]);
        let settings = AppConfig::default().merge_with_args(&args).unwrap();
        assert_eq!(settings.mqtt.username.as_deref(), Some("x"));
        assert_eq!(settings.mqtt.password.as_deref(), Some("p"));
    }

    #[test]
    fn test_invalid_url() {
        let args = parse(&["-m", "http://host:80"]);
        assert!(AppConfig::default().merge_with_args(&args).is_err());
    }

    #[test]
    fn test_direction_range() {
        let result = Args::try_parse_from(["can2mqttd", "-d", "3"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.can.interface, "vcan0");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/can2mqtt.toml"))).is_err());
    }

    #[test]
    fn test_load_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[can\ninterface = ").unwrap();
        assert!(AppConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_shipped_config() {
        let config: AppConfig = toml::from_str(include_str!("../../../config/can2mqtt.toml")).unwrap();
        let settings = config.merge_with_args(&Args::default()).unwrap();
        assert_eq!(settings.can.interface, "vcan0");
        assert_eq!(settings.routes_file, Some(PathBuf::from("config/routes.csv")));
    }
}
