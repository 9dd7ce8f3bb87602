//! Configuration management for SFU connections
//!
//! Every connection is built from an immutable [`ConnectionSettings`]:
//! ICE parameters, the payload-type mapping table, the header-extension
//! mapping table and the bandwidth distributor to use.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error raised by the layered config loader
    #[error("Config loader error: {0}")]
    Loader(#[from] config::ConfigError),

    /// A value was present but could not be interpreted
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

/// Media type carried by an m-line, a payload type or a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
}

impl MediaType {
    /// Name used for m-lines, mids and transport names
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
        }
    }
}

/// Payload-type mapping (one `a=rtpmap` entry and its companions)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RtpMap {
    pub payload_type: u8,
    pub encoding_name: String,
    pub clock_rate: u32,
    pub media_type: MediaType,
    #[serde(default = "default_channels")]
    pub channels: u8,
    #[serde(default)]
    pub format_parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub feedback_types: Vec<String>,
}

fn default_channels() -> u8 {
    1
}

/// Header-extension mapping (one `a=extmap` entry)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtMap {
    pub id: u8,
    pub uri: String,
    pub media_type: MediaType,
}

/// ICE configuration handed to every transport
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    pub stun_server: String,
    pub stun_port: u16,
    pub turn_server: String,
    pub turn_port: u16,
    pub turn_username: String,
    pub turn_pass: String,
    pub min_port: u16,
    pub max_port: u16,
    pub network_interface: String,
    /// Signal local candidates one by one instead of waiting for gathering
    pub should_trickle: bool,
}

impl Default for IceConfig {
    fn default() -> Self {
        IceConfig {
            stun_server: String::new(),
            stun_port: 3478,
            turn_server: String::new(),
            turn_port: 3478,
            turn_username: String::new(),
            turn_pass: String::new(),
            min_port: 0,
            max_port: 0,
            network_interface: String::new(),
            should_trickle: false,
        }
    }
}

/// Bandwidth distribution strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributorKind {
    /// Evenly split, capped at each stream's max video bitrate
    MaxVideo,
    /// Each stream gets its target bitrate while budget remains
    #[default]
    TargetVideo,
}

impl DistributorKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "max_video" | "max-video" => Some(DistributorKind::MaxVideo),
            "target_video" | "target-video" => Some(DistributorKind::TargetVideo),
            _ => None,
        }
    }
}

/// Settings for a single connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub ice: IceConfig,
    pub rtp_mappings: Vec<RtpMap>,
    pub ext_mappings: Vec<ExtMap>,
    pub distributor: DistributorKind,
    pub log_level: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            ice: IceConfig::default(),
            rtp_mappings: default_rtp_mappings(),
            ext_mappings: default_ext_mappings(),
            distributor: DistributorKind::default(),
            log_level: None,
        }
    }
}

impl ConnectionSettings {
    /// Load settings from environment variables (a `.env` file is honoured)
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut settings = ConnectionSettings::default();
        let ice = &mut settings.ice;

        if let Ok(server) = env::var("SFU_STUN_SERVER") {
            ice.stun_server = server;
        }
        if let Some(port) = parse_env::<u16>("SFU_STUN_PORT")? {
            ice.stun_port = port;
        }
        if let Ok(server) = env::var("SFU_TURN_SERVER") {
            ice.turn_server = server;
        }
        if let Some(port) = parse_env::<u16>("SFU_TURN_PORT")? {
            ice.turn_port = port;
        }
        if let Ok(username) = env::var("SFU_TURN_USERNAME") {
            ice.turn_username = username;
        }
        if let Ok(pass) = env::var("SFU_TURN_PASSWORD") {
            ice.turn_pass = pass;
        }
        if let Some(port) = parse_env::<u16>("SFU_MIN_PORT")? {
            ice.min_port = port;
        }
        if let Some(port) = parse_env::<u16>("SFU_MAX_PORT")? {
            ice.max_port = port;
        }
        if let Ok(interface) = env::var("SFU_NETWORK_INTERFACE") {
            ice.network_interface = interface;
        }
        if let Some(trickle) = parse_env::<bool>("SFU_TRICKLE")? {
            ice.should_trickle = trickle;
        }

        if let Ok(value) = env::var("SFU_DISTRIBUTOR") {
            settings.distributor = DistributorKind::parse(&value).ok_or(ConfigError::Invalid {
                key: "SFU_DISTRIBUTOR".to_string(),
                value,
            })?;
        }

        settings.log_level = Some(env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()));

        Ok(settings)
    }

    /// Load settings from a file, overridden by `SFU_`-prefixed variables
    /// (nested keys use `__`, e.g. `SFU_ICE__STUN_SERVER`)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("SFU")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Opus, PCMU, VP8 and H264 with the usual feedback set
pub fn default_rtp_mappings() -> Vec<RtpMap> {
    let video_feedback = vec![
        "ccm fir".to_string(),
        "nack".to_string(),
        "nack pli".to_string(),
        "goog-remb".to_string(),
    ];

    let mut opus_fmtp = BTreeMap::new();
    opus_fmtp.insert("minptime".to_string(), "10".to_string());
    opus_fmtp.insert("useinbandfec".to_string(), "1".to_string());

    let mut h264_fmtp = BTreeMap::new();
    h264_fmtp.insert("level-asymmetry-allowed".to_string(), "1".to_string());
    h264_fmtp.insert("packetization-mode".to_string(), "1".to_string());
    h264_fmtp.insert("profile-level-id".to_string(), "42e01f".to_string());

    vec![
        RtpMap {
            payload_type: 111,
            encoding_name: "opus".to_string(),
            clock_rate: 48000,
            media_type: MediaType::Audio,
            channels: 2,
            format_parameters: opus_fmtp,
            feedback_types: Vec::new(),
        },
        RtpMap {
            payload_type: 0,
            encoding_name: "PCMU".to_string(),
            clock_rate: 8000,
            media_type: MediaType::Audio,
            channels: 1,
            format_parameters: BTreeMap::new(),
            feedback_types: Vec::new(),
        },
        RtpMap {
            payload_type: 100,
            encoding_name: "VP8".to_string(),
            clock_rate: 90000,
            media_type: MediaType::Video,
            channels: 1,
            format_parameters: BTreeMap::new(),
            feedback_types: video_feedback.clone(),
        },
        RtpMap {
            payload_type: 101,
            encoding_name: "H264".to_string(),
            clock_rate: 90000,
            media_type: MediaType::Video,
            channels: 1,
            format_parameters: h264_fmtp,
            feedback_types: video_feedback,
        },
    ]
}

/// Header extensions the relay understands
pub fn default_ext_mappings() -> Vec<ExtMap> {
    vec![
        ExtMap {
            id: 1,
            uri: "urn:ietf:params:rtp-hdrext:ssrc-audio-level".to_string(),
            media_type: MediaType::Audio,
        },
        ExtMap {
            id: 3,
            uri: "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time".to_string(),
            media_type: MediaType::Video,
        },
        ExtMap {
            id: 3,
            uri: "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time".to_string(),
            media_type: MediaType::Audio,
        },
        ExtMap {
            id: 4,
            uri: "urn:3gpp:video-orientation".to_string(),
            media_type: MediaType::Video,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_settings_defaults() {
        let settings = ConnectionSettings::default();
        assert!(!settings.ice.should_trickle);
        assert_eq!(settings.distributor, DistributorKind::TargetVideo);
        assert_eq!(settings.log_level(), "info");
        assert!(settings
            .rtp_mappings
            .iter()
            .any(|map| map.encoding_name == "VP8" && map.media_type == MediaType::Video));
    }

    #[test]
    fn test_distributor_kind_parse() {
        assert_eq!(DistributorKind::parse("max_video"), Some(DistributorKind::MaxVideo));
        assert_eq!(DistributorKind::parse("Target-Video"), Some(DistributorKind::TargetVideo));
        assert_eq!(DistributorKind::parse("fastest"), None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
distributor = "max_video"

[ice]
stun_server = "stun.example.org"
stun_port = 19302
should_trickle = true
"#
        )
        .unwrap();

        let settings = ConnectionSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.ice.stun_server, "stun.example.org");
        assert_eq!(settings.ice.stun_port, 19302);
        assert!(settings.ice.should_trickle);
        assert_eq!(settings.distributor, DistributorKind::MaxVideo);
        // Unset tables fall back to the defaults
        assert_eq!(settings.rtp_mappings, default_rtp_mappings());
    }
}
