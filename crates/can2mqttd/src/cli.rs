//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug, Default)]
#[command(name = "can2mqttd")]
#[command(author, version, about = "Bidirectional CAN <-> MQTT bridge")]
pub struct Args {
    /// Configuration file (TOML); `can2mqtt.toml` is used if present
    #[arg(long, env = "C2M_CONFIG")]
    pub config: Option<PathBuf>,

    /// CAN interface, e.g. can0 or vcan0
    #[arg(short = 'c', long, env = "C2M_CAN_INTERFACE")]
    pub can_interface: Option<String>,

    /// MQTT broker URL, tcp://[user:pass@]host[:port]
    #[arg(short = 'm', long, env = "C2M_MQTT_URL")]
    pub mqtt_url: Option<String>,

    /// MQTT username, overrides the URL
    #[arg(long, env = "C2M_MQTT_USERNAME")]
    pub mqtt_username: Option<String>,

    /// MQTT password, overrides the URL
    #[arg(long, env = "C2M_MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,

    /// MQTT client id
    #[arg(long, env = "C2M_MQTT_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Static route file (.csv or .json)
    #[arg(short = 'f', long, env = "C2M_ROUTES_FILE")]
    pub routes_file: Option<PathBuf>,

    /// Topic carrying route-set updates
    #[arg(long, env = "C2M_ROUTES_TOPIC")]
    pub routes_topic: Option<String>,

    /// 0 = bidirectional, 1 = CAN -> MQTT only, 2 = MQTT -> CAN only
    #[arg(short = 'd', long, env = "C2M_DIRECTION", value_parser = clap::value_parser!(u8).range(0..=2))]
    pub direction: Option<u8>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, env = "C2M_LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
