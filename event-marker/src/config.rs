//! Configuration management for event-marker.
//!
//! A configuration starts from one of the built-in profiles, may be replaced
//! wholesale by a JSON file, and is then adjusted by individual environment
//! variables. Durations are written in milliseconds.
//!
//! | Variable                | Meaning                                    |
//! |-------------------------|--------------------------------------------|
//! | `EVENT_MARKER_PROFILE`  | `event-marker` (default) or `send-event`   |
//! | `EVENT_MARKER_CONFIG`   | path to a JSON file replacing the profile  |
//! | `EVENT_MARKER_PRODUCT`  | match this USB product identifier          |
//! | `EVENT_MARKER_PORT`     | use this device path, skip enumeration     |
//! | `EVENT_MARKER_BAUD`     | line baud rate                             |
//! | `EVENT_MARKER_DELAY_MS` | pause after each event                     |
//! | `EVENT_MARKER_RETRY_MS` | pause between connection attempts          |
//! | `EVENT_MARKER_STTY`     | path of the stty utility                   |
//!
//! The baud rate must equal the rate the firmware passes to `Serial.begin()`.
//! A mismatch is not detectable from the host: bytes arrive garbled and the
//! wrong pins pulse.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Error, Result};
use crate::streamer::StreamerConfig;
use crate::types::EventCode;

/// Product string the event marker firmware reports over USB.
pub const EVENT_MARKER_PRODUCT: &str = "USBEventMarker";

/// Where the stty utility usually lives on Linux.
pub const DEFAULT_STTY_PATH: &str = "/usr/bin/stty";

const ENV_PREFIX: &str = "EVENT_MARKER_";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// How to find the device
    pub target: Target,

    /// Line speed; must match the firmware
    pub baud_rate: u32,

    /// Tool used to put the line in raw mode
    #[serde(default)]
    pub line_tool: LineTool,

    /// Location of stty when `line_tool` is `stty`
    #[serde(default = "default_stty_path")]
    pub stty_path: PathBuf,

    /// Pause between connection attempts
    #[serde(with = "millis")]
    pub retry_interval: Duration,

    /// Pause after each event
    #[serde(with = "millis")]
    pub event_delay: Duration,

    /// Which codes to send
    pub codes: CodeSource,
}

/// How the target device is identified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Enumerate serial ports and match the USB product string exactly.
    Product(String),
    /// Use a fixed device path.
    Path(PathBuf),
}

/// Facility that applies raw mode and baud rate to the line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineTool {
    /// Run `stty -F <path> raw <baud>`.
    #[default]
    Stty,
    /// Set termios attributes in-process.
    Termios,
}

/// Event codes to stream.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CodeSource {
    /// Every code in `start..=end`, once.
    Range { start: i64, end: i64 },
    /// The same code, `count` times or until cancelled.
    Constant {
        code: i64,
        #[serde(default)]
        count: Option<u64>,
    },
}

impl CodeSource {
    /// Validate the source and produce its codes.
    ///
    /// An unbounded constant yields an endless iterator, so nothing here
    /// collects it.
    pub fn codes(&self) -> Result<Box<dyn Iterator<Item = EventCode> + Send>> {
        match *self {
            CodeSource::Range { start, end } => {
                Ok(Box::new(EventCode::range(start, end)?.into_iter()))
            }
            CodeSource::Constant { code, count } => {
                let code = EventCode::new(code)?;
                let repeated = std::iter::repeat(code);
                match count {
                    Some(n) => {
                        let n = usize::try_from(n).map_err(|_| {
                            Error::Config(format!("code count {n} is too large for this host"))
                        })?;
                        Ok(Box::new(repeated.take(n)))
                    }
                    None => Ok(Box::new(repeated)),
                }
            }
        }
    }
}

/// Built-in settings matching the two firmware variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Profile {
    /// Teensy firmware reporting `USBEventMarker`, 9600 baud, codes 1-127
    /// every half second.
    #[default]
    EventMarker,
    /// Arduino firmware at a fixed path, 115200 baud, code 255 every 20 ms.
    SendEvent,
}

impl Profile {
    pub fn config(self) -> Config {
        match self {
            Profile::EventMarker => Config {
                target: Target::Product(EVENT_MARKER_PRODUCT.to_string()),
                baud_rate: 9600,
                line_tool: LineTool::Stty,
                stty_path: default_stty_path(),
                retry_interval: Duration::from_secs(3),
                event_delay: Duration::from_millis(500),
                codes: CodeSource::Range { start: 1, end: 127 },
            },
            Profile::SendEvent => Config {
                target: Target::Path(PathBuf::from("/dev/ttyACM0")),
                baud_rate: 115200,
                line_tool: LineTool::Stty,
                stty_path: default_stty_path(),
                retry_interval: Duration::from_secs(3),
                event_delay: Duration::from_millis(20),
                codes: CodeSource::Constant {
                    code: 255,
                    count: None,
                },
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Profile::default().config()
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect();
        Self::from_vars(&vars)
    }

    /// Load configuration from a set of variables.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let var = |name: &str| vars.get(&format!("{ENV_PREFIX}{name}")).map(String::as_str);

        let mut config = match var("CONFIG") {
            Some(path) => Self::load_from(&PathBuf::from(path))?,
            None => {
                let profile = match var("PROFILE") {
                    Some(name) => Profile::from_str(name)
                        .map_err(|_| Error::Config(format!("unknown profile '{name}'")))?,
                    None => Profile::default(),
                };
                profile.config()
            }
        };

        if let Some(product) = var("PRODUCT") {
            config.target = Target::Product(product.to_string());
        }
        if let Some(port) = var("PORT") {
            config.target = Target::Path(PathBuf::from(port));
        }
        if let Some(baud) = var("BAUD") {
            config.baud_rate = parse_var("BAUD", baud)?;
        }
        if let Some(ms) = var("DELAY_MS") {
            config.event_delay = Duration::from_millis(parse_var("DELAY_MS", ms)?);
        }
        if let Some(ms) = var("RETRY_MS") {
            config.retry_interval = Duration::from_millis(parse_var("RETRY_MS", ms)?);
        }
        if let Some(stty) = var("STTY") {
            config.stty_path = PathBuf::from(stty);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Reject settings that can never work, before any I/O.
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(Error::Config("baud rate must be positive".into()));
        }
        if let Target::Product(product) = &self.target {
            if product.is_empty() {
                return Err(Error::Config("product identifier is empty".into()));
            }
        }
        match self.codes {
            CodeSource::Range { start, end } => {
                EventCode::new(start)?;
                EventCode::new(end)?;
                if start > end {
                    return Err(Error::Config(format!("empty code range {start}..={end}")));
                }
            }
            CodeSource::Constant { code, .. } => {
                EventCode::new(code)?;
            }
        }
        Ok(())
    }

    /// Settings for the streaming side.
    pub fn streamer(&self) -> StreamerConfig {
        StreamerConfig {
            baud_rate: self.baud_rate,
            retry_interval: self.retry_interval,
            event_delay: self.event_delay,
        }
    }
}

fn default_stty_path() -> PathBuf {
    PathBuf::from(DEFAULT_STTY_PATH)
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{ENV_PREFIX}{name}: cannot parse '{value}'")))
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_is_event_marker_profile() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config, Profile::EventMarker.config());
        assert_eq!(config.target, Target::Product("USBEventMarker".into()));
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.event_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_send_event_profile() {
        let config = Config::from_vars(&vars(&[("EVENT_MARKER_PROFILE", "send-event")])).unwrap();
        assert_eq!(config.target, Target::Path(PathBuf::from("/dev/ttyACM0")));
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.event_delay, Duration::from_millis(20));
        assert_eq!(config.retry_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(&vars(&[
            ("EVENT_MARKER_BAUD", "115200"),
            ("EVENT_MARKER_DELAY_MS", "0"),
            ("EVENT_MARKER_RETRY_MS", "10"),
            ("EVENT_MARKER_PORT", "/dev/ttyUSB3"),
        ]))
        .unwrap();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.event_delay, Duration::ZERO);
        assert_eq!(config.retry_interval, Duration::from_millis(10));
        assert_eq!(config.target, Target::Path(PathBuf::from("/dev/ttyUSB3")));

        let streamer = config.streamer();
        assert_eq!(streamer.baud_rate, 115200);
        assert_eq!(streamer.event_delay, Duration::ZERO);
    }

    #[test_case("EVENT_MARKER_BAUD", "fast" ; "unparseable baud")]
    #[test_case("EVENT_MARKER_BAUD", "0" ; "zero baud")]
    #[test_case("EVENT_MARKER_DELAY_MS", "-5" ; "negative delay")]
    #[test_case("EVENT_MARKER_PROFILE", "arduino" ; "unknown profile")]
    #[test_case("EVENT_MARKER_PRODUCT", "" ; "empty product")]
    fn test_rejected_vars(name: &str, value: &str) {
        let err = Config::from_vars(&vars(&[(name, value)])).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn test_json_round_trip() {
        let config = Profile::SendEvent.config();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"event_delay\":20"));
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{
            "target": {"product": "USBEventMarker"},
            "baud_rate": 9600,
            "retry_interval": 3000,
            "event_delay": 500,
            "codes": {"kind": "range", "start": 1, "end": 127}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.line_tool, LineTool::Stty);
        assert_eq!(config.stty_path, PathBuf::from("/usr/bin/stty"));
    }

    #[test]
    fn test_validate_rejects_bad_codes() {
        let mut config = Config::default();
        config.codes = CodeSource::Constant { code: 256, count: None };
        assert!(matches!(config.validate(), Err(Error::InvalidCode(256))));

        config.codes = CodeSource::Range { start: 10, end: 2 };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_code_sources() {
        let range: Vec<u8> = CodeSource::Range { start: 1, end: 3 }
            .codes()
            .unwrap()
            .map(u8::from)
            .collect();
        assert_eq!(range, vec![1, 2, 3]);

        let bounded: Vec<u8> = CodeSource::Constant { code: 255, count: Some(2) }
            .codes()
            .unwrap()
            .map(u8::from)
            .collect();
        assert_eq!(bounded, vec![255, 255]);

        let mut endless = CodeSource::Constant { code: 255, count: None }.codes().unwrap();
        assert!(endless.by_ref().take(1000).all(|c| c == EventCode::MAX));
        assert!(endless.next().is_some());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_huge_count_is_kept_whole() {
        let mut codes = CodeSource::Constant { code: 1, count: Some(u64::MAX) }
            .codes()
            .unwrap();
        assert_eq!(codes.size_hint().0, usize::MAX);
        assert_eq!(codes.next(), Some(EventCode::MIN));
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn test_count_wider_than_usize_is_rejected() {
        let result = CodeSource::Constant { code: 1, count: Some(u64::MAX) }.codes();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
