//! Configuration schema for the robot supervisor.
//!
//! The file is a tree of sections (`robot`, `info`, `wifi`, ...) holding scalar
//! fields. Externally a field is addressed by a dotted path such as
//! `robot.camera`; [`ConfigPath`] validates the section and [`Config::get`] /
//! [`Config::set`] validate the field against the typed schema.
//!
//! Keys found in the file but unknown to the schema are kept in each
//! section's `extra` map so a round-trip never drops them.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Creature used when nothing else is known
pub const DEFAULT_CREATURE: &str = "poppy-ergo-jr";

/// `robot` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RobotConfig {
    /// Hostname of the robot
    pub name: String,
    /// Show the opening page on first connection
    pub first_page: bool,
    /// Start the daemon when the supervisor starts
    pub auto_start: bool,
    /// Enable the camera when the daemon starts
    pub camera: bool,
    /// Number of virtual robot instances
    pub virtual_bot: i64,
    /// Creature identifier, e.g. `poppy-ergo-jr`
    pub creature: String,
    /// Last motor sent to the configure tool
    pub motors: String,
    /// Set when running against dummy collaborators
    #[serde(rename = "use-dummy")]
    pub use_dummy: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            name: "poppy".to_string(),
            first_page: true,
            auto_start: true,
            camera: false,
            virtual_bot: 0,
            creature: DEFAULT_CREATURE.to_string(),
            motors: String::new(),
            use_dummy: false,
            extra: BTreeMap::new(),
        }
    }
}

/// `info` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InfoConfig {
    /// Daemon output log
    pub logfile: String,
    /// Board name shown to the user
    pub board: String,
    pub config_motor_log: String,
    pub virtual_bot_log: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for InfoConfig {
    fn default() -> Self {
        Self {
            logfile: "/tmp/poppy-services.log".to_string(),
            board: "Raspberry Pi".to_string(),
            config_motor_log: "/tmp/poppy-configure-motors.log".to_string(),
            virtual_bot_log: "/tmp/virtual-bot.log".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

impl InfoConfig {
    /// Log of simulated robot `id`: `_<id>` goes before the `.log` extension
    pub fn virtual_bot_log_for(&self, id: u32) -> String {
        match self.virtual_bot_log.strip_suffix(".log") {
            Some(stem) => format!("{}_{}.log", stem, id),
            None => format!("{}_{}", self.virtual_bot_log, id),
        }
    }
}

/// `wifi` section
///
/// The `hostspot_*` spelling matches the keys already deployed on robots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: String,
    pub psk: String,
    pub hostspot_conf_file: String,
    pub hostspot_service: String,
    pub default_ssid: String,
    pub default_password: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            psk: String::new(),
            hostspot_conf_file: "/etc/hotspot.conf".to_string(),
            hostspot_service: "hotspot.service".to_string(),
            default_ssid: "poppy-hotspot".to_string(),
            default_password: "poppyproject".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

/// `hotspot` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotspotConfig {
    /// Whether the hotspot should be running
    pub start: bool,
    pub ssid: String,
    pub psk: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for HotspotConfig {
    fn default() -> Self {
        Self {
            start: false,
            ssid: String::new(),
            psk: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// `update` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub logfile: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            logfile: "/tmp/poppy-update.log".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

/// `poppy_configure` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigureConfig {
    pub logfile: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for ConfigureConfig {
    fn default() -> Self {
        Self {
            logfile: "/tmp/poppy-configure.log".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

/// Full supervisor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub robot: RobotConfig,
    pub info: InfoConfig,
    pub wifi: WifiConfig,
    pub hotspot: HotspotConfig,
    pub update: UpdateConfig,
    pub poppy_configure: ConfigureConfig,
}

impl Config {
    /// Default configuration for a given creature
    pub fn for_creature(creature: &str) -> Self {
        let mut config = Config::default();
        config.robot.creature = creature.to_string();
        config
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Read the value at `path`
    pub fn get(&self, path: &ConfigPath) -> Result<ConfigValue, ConfigError> {
        let tree = serde_yaml::to_value(self)?;
        let raw = tree
            .get(path.section.as_str())
            .and_then(|section| section.get(&path.field))
            .ok_or_else(|| ConfigError::KeyNotFound(path.to_string()))?;

        ConfigValue::from_yaml(raw).ok_or_else(|| ConfigError::InvalidValue {
            path: path.to_string(),
            expected: "a scalar",
        })
    }

    /// Write `value` at `path`, returning the value it replaced
    ///
    /// The new value is coerced to the type of the field it replaces;
    /// a value that cannot be coerced leaves the config untouched.
    pub fn set(&mut self, path: &ConfigPath, value: ConfigValue) -> Result<ConfigValue, ConfigError> {
        let mut tree = serde_yaml::to_value(&*self)?;
        let slot = tree
            .get_mut(path.section.as_str())
            .and_then(|section| section.get_mut(&path.field))
            .ok_or_else(|| ConfigError::KeyNotFound(path.to_string()))?;

        let previous = ConfigValue::from_yaml(slot).ok_or_else(|| ConfigError::InvalidValue {
            path: path.to_string(),
            expected: "a scalar",
        })?;

        let value = value
            .coerce_like(&previous)
            .ok_or_else(|| ConfigError::InvalidValue {
                path: path.to_string(),
                expected: previous.kind(),
            })?;

        *slot = value.to_yaml();
        *self = serde_yaml::from_value(tree).map_err(|_| ConfigError::InvalidValue {
            path: path.to_string(),
            expected: previous.kind(),
        })?;

        Ok(previous)
    }
}

/// Top-level configuration section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Robot,
    Info,
    Wifi,
    Hotspot,
    Update,
    PoppyConfigure,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Robot,
        Section::Info,
        Section::Wifi,
        Section::Hotspot,
        Section::Update,
        Section::PoppyConfigure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Robot => "robot",
            Self::Info => "info",
            Self::Wifi => "wifi",
            Self::Hotspot => "hotspot",
            Self::Update => "update",
            Self::PoppyConfigure => "poppy_configure",
        }
    }
}

impl FromStr for Section {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Section::ALL
            .into_iter()
            .find(|section| section.as_str() == s)
            .ok_or_else(|| ConfigError::KeyNotFound(s.to_string()))
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dotted `section.field` address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigPath {
    pub section: Section,
    pub field: String,
}

impl ConfigPath {
    pub fn new(section: Section, field: &str) -> Self {
        Self {
            section,
            field: field.to_string(),
        }
    }
}

impl FromStr for ConfigPath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (section, field) = s
            .split_once('.')
            .filter(|(_, field)| !field.is_empty() && !field.contains('.'))
            .ok_or_else(|| ConfigError::KeyNotFound(s.to_string()))?;

        let section = section
            .parse::<Section>()
            .map_err(|_| ConfigError::KeyNotFound(s.to_string()))?;

        Ok(Self::new(section, field))
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.field)
    }
}

/// Scalar configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ConfigValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "a boolean",
            Self::Int(_) => "an integer",
            Self::Str(_) => "a string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    fn to_yaml(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Number((*i).into()),
            Self::Str(s) => Value::String(s.clone()),
        }
    }

    /// Convert to the type of `like`, accepting form encodings
    /// (`on`/`off` for booleans, digits for integers).
    fn coerce_like(self, like: &ConfigValue) -> Option<ConfigValue> {
        match (self, like) {
            (Self::Bool(b), Self::Bool(_)) => Some(Self::Bool(b)),
            (Self::Int(i), Self::Int(_)) => Some(Self::Int(i)),
            (Self::Str(s), Self::Str(_)) => Some(Self::Str(s)),
            (Self::Int(i), Self::Str(_)) => Some(Self::Str(i.to_string())),
            (Self::Str(s), Self::Bool(_)) => match s.trim() {
                "on" | "true" => Some(Self::Bool(true)),
                "off" | "false" => Some(Self::Bool(false)),
                _ => None,
            },
            (Self::Str(s), Self::Int(_)) => s.trim().parse().ok().map(Self::Int),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}
