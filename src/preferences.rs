//! Persisted user preferences: theme and response language.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PreferenceError;
use crate::locale::Locale;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// `None` follows the system colour scheme.
    #[serde(default)]
    pub dark_mode: Option<bool>,
    /// `None` uses the default locale.
    #[serde(default)]
    pub locale: Option<Locale>,
}

impl Preferences {
    pub fn locale_or_default(&self) -> Locale {
        self.locale.unwrap_or_default()
    }

    /// Theme name handed to the page: `dark`, `light` or `auto`.
    pub fn theme(&self) -> &'static str {
        match self.dark_mode {
            Some(true) => "dark",
            Some(false) => "light",
            None => "auto",
        }
    }
}

pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<Preferences, PreferenceError>;
    fn save(&self, preferences: &Preferences) -> Result<(), PreferenceError>;
}

/// Preferences stored as a small JSON file.
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: std::io::Error) -> PreferenceError {
        PreferenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load(&self) -> Result<Preferences, PreferenceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No preferences at {}, using defaults", self.path.display());
                Ok(Preferences::default())
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn save(&self, preferences: &Preferences) -> Result<(), PreferenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_string_pretty(preferences)?;
        std::fs::write(&self.path, json).map_err(|e| self.io_error(e))?;
        info!("Saved preferences to {}", self.path.display());
        Ok(())
    }
}

/// Save `locale` as the preferred language, keeping the other settings.
/// An unreadable store is logged and replaced with defaults.
pub fn remember_locale(store: &dyn PreferenceStore, locale: Locale) {
    let mut prefs = store.load().unwrap_or_else(|e| {
        warn!("Failed to load preferences: {}", e);
        Preferences::default()
    });
    prefs.locale = Some(locale);
    if let Err(e) = store.save(&prefs) {
        warn!("Failed to save locale preference: {}", e);
    }
}

/// In-process store, used when nothing should touch the disk.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    inner: Mutex<Preferences>,
}

impl MemoryPreferenceStore {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            inner: Mutex::new(preferences),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Preferences, PreferenceError> {
        Ok(*self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn save(&self, preferences: &Preferences) -> Result<(), PreferenceError> {
        *self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = *preferences;
        Ok(())
    }
}
