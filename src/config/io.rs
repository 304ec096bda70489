use std::env::current_exe;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::PathBuf;
use std::str;
use std::sync::{Arc, Mutex};
use directories_next::ProjectDirs;
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{info, warn};
use serde_json;

use crate::config::types::HealthConfig;
use crate::error::ConfigError;

// creates a path to pulse-monitor.json in the same directory as the executable
// this could be useful for usb sticks
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            // F:\pulse-monitor.exe => F:\pulse-monitor.json
            if !path.set_extension("json") {
                warn!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            warn!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// creates a path to pulse-monitor.json in an os dependent standard directory, such as %AppData% on
// windows.
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "medinotify", "pulse-monitor").map(|dirs| {
        dirs.config_dir().join("pulse-monitor.json")
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        match std::fs::metadata(&path) {
            Ok(attr) => {
                if attr.is_file() {
                    return Ok(path);
                }
            },
            Err(err) => {
                info!("Could not read metadata of: {}; Using local path instead. ({})", path.to_string_lossy(), err);
            },
        }
    }

    match get_local_config_path() {
        None => Err(ConfigError::NoConfigPath),
        Some(path) => Ok(path),
    }
}

pub struct ConfigIOLocker {
    rw_lock: RwLock<File>,
}

impl ConfigIOLocker {
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<File>, ConfigError> {
        self.rw_lock.try_write().map_err(|source| ConfigError::CanNotLock { source })
    }
}

struct ConfigIOInner {
    file: File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    pub fn new_sync() -> Result<Self, ConfigError> {
        ConfigIO::with_path_sync(get_config_path()?)
    }

    pub fn with_path_sync(path: PathBuf) -> Result<Self, ConfigError> {
        info!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent() {
            std::fs::create_dir_all(directory)?;
        }

        // kept open for the lifetime of the app so that the lock from locker() holds
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(path)?;

        let inner = ConfigIOInner {
            file,
        };
        Ok(ConfigIO { inner: Arc::new(Mutex::new(inner)) })
    }

    /// An exclusive lock on the config file, so that only one instance of the app uses it.
    pub fn locker(&mut self) -> Result<ConfigIOLocker, ConfigError> {
        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(self.get_file()?),
        })
    }

    // The File returned from here should never be closed!
    fn get_file(&self) -> Result<File, ConfigError> {
        let inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(inner.file.try_clone()?)
    }

    /// Read and validate the config. An empty file is initialized with the defaults.
    pub fn read_sync(&self) -> Result<HealthConfig, ConfigError> {
        let mut file = self.get_file()?;
        info!("Reading config file");

        let mut content = vec![];
        file.rewind()?;
        file.read_to_end(&mut content)?;

        if content.is_empty() {
            let config = HealthConfig::default();
            self.save_sync(&config)?;
            return Ok(config);
        }

        let content = str::from_utf8(&content)?;
        let config: HealthConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_sync(&self, config: &HealthConfig) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;
        info!("Saving config");

        let content = serde_json::to_string_pretty(config)?;
        file.rewind()?;
        file.set_len(0)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_file_is_initialized_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("pulse-monitor.json");
        let config_io = ConfigIO::with_path_sync(path.clone()).unwrap();

        assert_eq!(config_io.read_sync().unwrap(), HealthConfig::default());

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"minNormalHeartRate\": 60"));
        assert!(written.contains("\"pulseReadingIntervalMs\": 5000"));

        // reading again must not see an empty file
        assert_eq!(config_io.read_sync().unwrap(), HealthConfig::default());
    }

    #[test]
    fn save_then_read() {
        let dir = tempdir().unwrap();
        let config_io = ConfigIO::with_path_sync(dir.path().join("pulse-monitor.json")).unwrap();

        let mut config = HealthConfig::default();
        config.thresholds.max_acceptable_heart_rate = 140;
        config.device_id = "Huawei Health/watch-7".to_string();
        config_io.save_sync(&config).unwrap();

        assert_eq!(config_io.read_sync().unwrap(), config);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pulse-monitor.json");
        std::fs::write(&path, r#"{"minNormalHeartRate": 110, "maxNormalHeartRate": 100}"#).unwrap();

        let config_io = ConfigIO::with_path_sync(path).unwrap();
        assert!(matches!(config_io.read_sync(), Err(ConfigError::InvalidThresholds { .. })));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pulse-monitor.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config_io = ConfigIO::with_path_sync(path).unwrap();
        assert!(matches!(config_io.read_sync(), Err(ConfigError::JsonError { .. })));
    }

    #[test]
    fn second_instance_can_not_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pulse-monitor.json");

        let mut first = ConfigIO::with_path_sync(path.clone()).unwrap();
        let mut first_locker = first.locker().unwrap();
        let _guard = first_locker.lock().unwrap();

        let mut second = ConfigIO::with_path_sync(path).unwrap();
        let mut second_locker = second.locker().unwrap();
        assert!(matches!(second_locker.lock(), Err(ConfigError::CanNotLock { .. })));
    }
}
