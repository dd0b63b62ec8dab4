//! Persistent configuration store.
//!
//! Every read goes to disk: the file may be edited out-of-band, so nothing is
//! cached between calls. Writers are serialised through one lock and each
//! write lands atomically (temp file + rename), so readers never see a
//! half-written file.

use crate::config::{Config, ConfigPath, ConfigValue};
use crate::error::ConfigError;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

/// Result of a single-key write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub previous: ConfigValue,
    pub current: ConfigValue,
}

impl Change {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Configuration file with single-writer discipline
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a fresh config file, replacing whatever is there
    pub fn create(&self, config: &Config) -> Result<(), ConfigError> {
        let _guard = self.lock();
        self.persist(config)?;
        info!("Created config at {}", self.path.display());
        Ok(())
    }

    /// Load the whole tree from disk
    pub fn load(&self) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;

        Config::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Read one value by dotted path
    pub fn get(&self, path: &str) -> Result<ConfigValue, ConfigError> {
        let path: ConfigPath = path.parse()?;
        self.load()?.get(&path)
    }

    /// Write one value by dotted path and persist
    pub fn set(&self, path: &str, value: impl Into<ConfigValue>) -> Result<(), ConfigError> {
        self.replace(path, value).map(|_| ())
    }

    /// Write one value and report what it replaced
    ///
    /// Load, compare and persist all happen under the writer lock, so two
    /// concurrent callers can never both observe the same previous value.
    pub fn replace(&self, path: &str, value: impl Into<ConfigValue>) -> Result<Change, ConfigError> {
        let path: ConfigPath = path.parse()?;
        let _guard = self.lock();

        let mut config = self.load()?;
        let previous = config.set(&path, value.into())?;
        let current = config.get(&path)?;

        if previous != current {
            self.persist(&config)?;
            debug!("Config {} = {} (was {})", path, current, previous);
        }

        Ok(Change { previous, current })
    }

    /// Exclusive scoped mutation of the whole tree
    ///
    /// The returned guard persists on [`ConfigGuard::commit`], or on drop if
    /// the caller bails out early.
    pub fn edit(&self) -> Result<ConfigGuard<'_>, ConfigError> {
        let lock = self.lock();
        let config = self.load()?;
        Ok(ConfigGuard {
            store: self,
            config,
            committed: false,
            _lock: lock,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, config: &Config) -> Result<(), ConfigError> {
        let content = config.to_yaml()?;
        atomic_write(&self.path, content.as_bytes()).map_err(|source| ConfigError::Persist {
            path: self.path.clone(),
            source,
        })
    }
}

/// Loaded config held under the writer lock
pub struct ConfigGuard<'a> {
    store: &'a ConfigStore,
    config: Config,
    committed: bool,
    _lock: MutexGuard<'a, ()>,
}

impl ConfigGuard<'_> {
    /// Persist now and surface any write error
    pub fn commit(mut self) -> Result<(), ConfigError> {
        self.committed = true;
        self.store.persist(&self.config)
    }
}

impl Deref for ConfigGuard<'_> {
    type Target = Config;

    fn deref(&self) -> &Config {
        &self.config
    }
}

impl DerefMut for ConfigGuard<'_> {
    fn deref_mut(&mut self) -> &mut Config {
        &mut self.config
    }
}

impl Drop for ConfigGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self.store.persist(&self.config) {
            error!("Failed to persist config on scope exit: {}", e);
        }
    }
}

/// Write to a sibling temp file, then rename over the target
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data)?;
    fs::rename(&temp_path, path)
}
