use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:50505";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const SETTINGS_DIRECTORY_NAME: &str = "docdraft";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "DOCDRAFT_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub auth_enabled: bool,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default = "default_history_enabled")]
    pub history_enabled: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            auth_enabled: false,
            log_filter: default_log_filter(),
            history_enabled: default_history_enabled(),
        }
    }
}

impl ClientSettings {
    pub fn normalized(mut self) -> Self {
        self.base_url = match self.base_url.trim().trim_end_matches('/') {
            "" => default_base_url(),
            base_url => base_url.to_string(),
        };
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }
        self.log_filter = match self.log_filter.trim() {
            "" => default_log_filter(),
            filter => filter.to_string(),
        };

        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> SettingsResult<()> {
        ensure!(
            self.base_url.starts_with("http://") || self.base_url.starts_with("https://"),
            InvalidBaseUrlSnafu {
                stage: "validate-settings",
                base_url: self.base_url.clone(),
            }
        );
        Ok(())
    }
}

/// Settings layered from defaults, the settings file and `DOCDRAFT_*` variables.
pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".docdraft"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_or_default(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    /// Re-reads the layered sources; the previous settings stay in place on failure.
    pub fn reload(&self) -> SettingsResult<Arc<ClientSettings>> {
        let settings = Arc::new(Self::extract(&self.config_path)?);
        self.settings.store(Arc::clone(&settings));
        tracing::info!(path = ?self.config_path, "reloaded settings");
        Ok(settings)
    }

    pub fn extract(path: &Path) -> SettingsResult<ClientSettings> {
        let settings = Figment::from(Serialized::defaults(ClientSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract::<ClientSettings>()
            .context(ExtractSnafu {
                stage: "extract-settings",
                path: path.to_path_buf(),
            })?
            .normalized();

        settings.validate()?;
        Ok(settings)
    }

    fn load_or_default(path: &Path) -> ClientSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        match Self::extract(path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(
                    "failed to load settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ClientSettings::default()
            }
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to read settings from {path:?} on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        path: PathBuf,
        #[snafu(source(from(figment::Error, Box::new)))]
        source: Box<figment::Error>,
    },
    #[snafu(display("base url '{base_url}' on `{stage}` must start with http:// or https://"))]
    InvalidBaseUrl {
        stage: &'static str,
        base_url: String,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_history_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join(SETTINGS_FILE_NAME));

        let settings = store.settings();
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.request_timeout(), Duration::from_secs(60));
        assert!(settings.history_enabled);
        assert!(!settings.auth_enabled);
    }

    #[test]
    fn file_values_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(
            &path,
            r#"{"base_url": "  https://chat.example.com/ ", "request_timeout_secs": 0, "auth_enabled": true, "log_filter": " "}"#,
        )
        .unwrap();

        let settings = SettingsStore::new(path).settings();
        assert_eq!(settings.base_url, "https://chat.example.com");
        assert_eq!(settings.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(settings.log_filter, DEFAULT_LOG_FILTER);
        assert!(settings.auth_enabled);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, r#"{"request_timeout_secs": "soon""#).unwrap();

        let store = SettingsStore::new(path.clone());
        assert_eq!(*store.settings(), ClientSettings::default());
        assert!(matches!(
            SettingsStore::extract(&path),
            Err(SettingsError::Extract { .. })
        ));
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, r#"{"base_url": "ftp://files.example.com"}"#).unwrap();

        let error = SettingsStore::extract(&path).unwrap_err();
        assert!(matches!(error, SettingsError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn reload_picks_up_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());
        assert!(store.settings().history_enabled);

        fs::write(&path, r#"{"history_enabled": false}"#).unwrap();
        let reloaded = store.reload().unwrap();

        assert!(!reloaded.history_enabled);
        assert!(!store.settings().history_enabled);
    }
}
