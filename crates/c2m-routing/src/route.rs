//! Route definition and content hashing

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use c2m_conv::{parse_can_id, Codec};

use crate::error::{RoutingError, RoutingResult};

/// Which way a route translates
///
/// Wire encoding in route payloads: `0` = bidirectional, `1` = MQTT -> CAN,
/// `2` = CAN -> MQTT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Direction {
    #[default]
    Bidirectional,
    MqttToCan,
    CanToMqtt,
}

impl Direction {
    /// Frames from the bus may be published to MQTT
    pub fn can_to_mqtt(self) -> bool {
        matches!(self, Direction::Bidirectional | Direction::CanToMqtt)
    }

    /// Messages from the broker may be sent to the bus
    pub fn mqtt_to_can(self) -> bool {
        matches!(self, Direction::Bidirectional | Direction::MqttToCan)
    }
}

impl TryFrom<u8> for Direction {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Bidirectional),
            1 => Ok(Direction::MqttToCan),
            2 => Ok(Direction::CanToMqtt),
            other => Err(format!("invalid route direction {}, expected 0, 1 or 2", other)),
        }
    }
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Bidirectional => 0,
            Direction::MqttToCan => 1,
            Direction::CanToMqtt => 2,
        }
    }
}

/// Content hash of a route (hex SHA-256 of its JSON form)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteHash(String);

impl RouteHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // first 12 hex chars are plenty for log lines
        f.write_str(self.0.get(..12).unwrap_or(&self.0))
    }
}

/// Binding of one CAN ID to one MQTT topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// CAN identifier, decimal or `0x` hex
    #[serde(rename = "canid")]
    pub can_id: String,
    pub topic: String,
    #[serde(default)]
    pub direction: Direction,
    /// Codec name; `none` when absent
    #[serde(rename = "converter", default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
}

impl Route {
    /// A bidirectional route using the `none` codec
    pub fn new(can_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            can_id: can_id.into(),
            topic: topic.into(),
            direction: Direction::Bidirectional,
            codec: None,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    /// Numeric CAN ID
    pub fn id(&self) -> RoutingResult<u32> {
        Ok(parse_can_id(&self.can_id)?)
    }

    /// Codec name, defaulting to `none`
    pub fn codec_name(&self) -> &str {
        self.codec.as_deref().unwrap_or(Codec::NONE)
    }

    /// Stable content hash over every field
    ///
    /// Any change (direction, codec, topic, id) yields a different hash. An
    /// absent codec and an explicit `none` hash the same.
    pub fn hash(&self) -> RouteHash {
        let codec = match self.codec.as_deref() {
            Some(Codec::NONE) => None,
            codec => codec,
        };
        let canonical = (&self.can_id, &self.topic, self.direction, codec);
        // serializing strings and a u8 cannot fail
        let json = serde_json::to_vec(&canonical).unwrap_or_default();
        RouteHash(hex::encode(Sha256::digest(&json)))
    }

    /// Structural checks done before a route is installed
    pub(crate) fn validate(&self) -> RoutingResult<u32> {
        if self.topic.is_empty() {
            return Err(RoutingError::EmptyTopic);
        }
        self.id()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <-> {} ({}, {:?})",
            self.can_id,
            self.topic,
            self.codec_name(),
            self.direction
        )
    }
}
