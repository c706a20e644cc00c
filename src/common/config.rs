//! Durable endpoint and credential store.
//!
//! Precedence for the endpoint: built-in default < bootstrap document <
//! persisted settings < environment. The bootstrap document is a static
//! `bootstrap.json` next to the settings file and is only consulted when no
//! persisted override exists. All mutations are written through to disk
//! immediately so they survive restarts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::Context;
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";

/// Resolved view consumed before every network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub base_url: String,
    pub key: Option<String>,
}

/// On-disk settings. Absence of either field is a valid, meaningful state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoredSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Shape of the optional bootstrap document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
struct Bootstrap {
    #[serde(rename = "apiUrl")]
    api_url: Option<String>,
}

pub fn settings_path() -> PathBuf {
    ProjectDirs::from("", "", "pressdrop")
        .map(|p| p.config_dir().join("settings.toml"))
        .unwrap_or_else(|| PathBuf::from("pressdrop.toml"))
}

/// Single source of truth for the service endpoint and API key.
///
/// The environment layer is a read-time overlay only: it wins when
/// resolving, but mutations persist just the user-set fields, so an
/// ephemeral env override never ends up written to disk.
pub struct ConfigStore {
    path: PathBuf,
    fallback_endpoint: String,
    env_overlay: StoredSettings,
    settings: RwLock<StoredSettings>,
}

impl ConfigStore {
    /// Load from the default settings location.
    pub fn load() -> Result<Self, AppError> {
        let path = settings_path();
        let bootstrap = path.with_file_name("bootstrap.json");
        Self::load_from(&path, &bootstrap)
    }

    /// Load from explicit paths. Used directly by tests.
    pub fn load_from(path: &Path, bootstrap_path: &Path) -> Result<Self, AppError> {
        Self::load_with_env(path, bootstrap_path, "PRESSDROP_")
    }

    /// Load with an explicit env prefix so tests can isolate their
    /// overlay from the real one.
    pub fn load_with_env(
        path: &Path,
        bootstrap_path: &Path,
        env_prefix: &str,
    ) -> Result<Self, AppError> {
        let bootstrap: Bootstrap = Figment::new()
            .merge(Serialized::defaults(Bootstrap::default()))
            .merge(Json::file(bootstrap_path))
            .extract()?;

        let fallback_endpoint = bootstrap
            .api_url
            .as_deref()
            .map(normalize_endpoint)
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let mut settings: StoredSettings = Figment::new()
            .merge(Serialized::defaults(StoredSettings::default()))
            .merge(Toml::file(path))
            .extract()?;
        settings.endpoint = normalize_opt(settings.endpoint.take());

        let mut env_overlay: StoredSettings = Figment::new()
            .merge(Serialized::defaults(StoredSettings::default()))
            .merge(Env::prefixed(env_prefix))
            .extract()?;
        env_overlay.endpoint = normalize_opt(env_overlay.endpoint.take());

        Ok(Self {
            path: path.to_path_buf(),
            fallback_endpoint,
            env_overlay,
            settings: RwLock::new(settings),
        })
    }

    /// Snapshot of the endpoint and key at this moment. Callers read this
    /// once per request; a concurrent change takes effect on the next one.
    pub fn get(&self) -> ServiceTarget {
        let settings = self.read_settings();
        ServiceTarget {
            base_url: self
                .env_overlay
                .endpoint
                .clone()
                .or_else(|| settings.endpoint.clone())
                .unwrap_or_else(|| self.fallback_endpoint.clone()),
            key: self
                .env_overlay
                .api_key
                .clone()
                .or_else(|| settings.api_key.clone())
                .filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn has_key(&self) -> bool {
        self.get().key.is_some()
    }

    /// Set the endpoint override. Empty input clears the override so the
    /// bootstrap/built-in default applies again.
    pub fn set_endpoint(&self, url: &str) -> Result<(), AppError> {
        let normalized = normalize_endpoint(url);
        let mut settings = self.write_settings();
        settings.endpoint = if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        };
        self.persist(&settings)
    }

    pub fn set_key(&self, key: &str) -> Result<(), AppError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::InvalidSettings(
                "API key must not be empty".to_string(),
            ));
        }
        let mut settings = self.write_settings();
        settings.api_key = Some(key.to_string());
        self.persist(&settings)
    }

    pub fn clear_key(&self) -> Result<(), AppError> {
        let mut settings = self.write_settings();
        settings.api_key = None;
        self.persist(&settings)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, settings: &StoredSettings) -> Result<(), AppError> {
        let contents = toml::to_string_pretty(settings)
            .map_err(|e| AppError::InvalidSettings(e.to_string()))?;
        atomic_write(&self.path, &contents)?;
        Ok(())
    }

    fn read_settings(&self) -> std::sync::RwLockReadGuard<'_, StoredSettings> {
        match self.settings.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Settings lock poisoned during read, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_settings(&self) -> std::sync::RwLockWriteGuard<'_, StoredSettings> {
        match self.settings.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Settings lock poisoned during write, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Strip trailing slashes and surrounding whitespace.
fn normalize_endpoint(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Normalize an optional endpoint, collapsing empty values to `None`.
fn normalize_opt(url: Option<String>) -> Option<String> {
    url.as_deref()
        .map(normalize_endpoint)
        .filter(|u| !u.is_empty())
}

/// Atomically replace the settings file with new contents.
fn atomic_write(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let base_name = path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or("settings.toml");
    let tmp_path = path.with_file_name(format!(".{base_name}.{}.tmp", Uuid::new_v4()));

    fs::write(&tmp_path, contents)?;
    let file = fs::OpenOptions::new().write(true).open(&tmp_path)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Print the settings file contents, with guidance when missing.
pub fn show_settings(path: &Path, out: &mut dyn std::io::Write) -> anyhow::Result<()> {
    if path.exists() {
        let mut file = fs::File::open(path)
            .with_context(|| format!("Failed to open settings file {}", path.display()))?;
        std::io::copy(&mut file, out)?;
    } else {
        writeln!(out, "No settings file found at {}", path.display())?;
        writeln!(out, "Using defaults. Settings are created on first write.")?;
    }
    Ok(())
}
