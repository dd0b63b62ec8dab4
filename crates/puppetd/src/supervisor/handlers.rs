//! Configuration keys that trigger side effects when their value changes

use puppet_common::{ConfigPath, Section};

/// Config key with a registered change handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// `robot.camera`: restart the daemon so it picks the camera up
    Camera,
    /// `robot.name`: hostname change, then restart
    Name,
    /// `robot.motors`: run the motor configuration tool for that motor
    Motors,
    /// `hotspot.start`: enable or disable the hotspot
    HotspotStart,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 4] = [
        ConfigKey::Camera,
        ConfigKey::Name,
        ConfigKey::Motors,
        ConfigKey::HotspotStart,
    ];

    pub fn path(&self) -> ConfigPath {
        match self {
            Self::Camera => ConfigPath::new(Section::Robot, "camera"),
            Self::Name => ConfigPath::new(Section::Robot, "name"),
            Self::Motors => ConfigPath::new(Section::Robot, "motors"),
            Self::HotspotStart => ConfigPath::new(Section::Hotspot, "start"),
        }
    }

    /// Handler key for a dotted path, if one is registered
    pub fn from_path(path: &str) -> Option<Self> {
        let path: ConfigPath = path.parse().ok()?;
        Self::ALL.into_iter().find(|key| key.path() == path)
    }
}
