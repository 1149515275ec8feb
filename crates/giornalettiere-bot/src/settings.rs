//! Bot settings loading and resolution.
//!
//! The settings file is JSON or TOML, picked by extension. Keys written in
//! the legacy camelCase form (`myChannel`, `fileLocation`, ...) are accepted.
//! Relative paths are resolved against the install root, the parent of the
//! directory holding the settings file.

use anyhow::{bail, Context, Result};
use chrono::{NaiveTime, Timelike};
use giornalettiere::{WatchEventKind, WatcherConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the settings live when `--config` is not given.
pub const DEFAULT_SETTINGS_PATH: &str = "Settings/local_settings.json";

/// Environment variable that overrides `telegram_token`.
pub const TOKEN_ENV: &str = "GIORNALETTIERE_TELEGRAM_TOKEN";

const DB_FILE: &str = "Giornalettiere.db";
const FILE_LIST_FILE: &str = "myFileList.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub telegram_token: String,
    #[serde(default = "default_api_url")]
    pub telegram_api_url: String,
    #[serde(alias = "myChannel")]
    pub my_channel: String,
    #[serde(default, alias = "extraChannels")]
    pub extra_channels: Vec<String>,
    #[serde(alias = "fileLocation")]
    pub file_location: PathBuf,
    #[serde(alias = "downloadRequest")]
    pub download_request: String,
    #[serde(default)]
    pub filetypes: Vec<String>,
    #[serde(default)]
    pub json_db: bool,
    /// Minutes between channel-update passes.
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate: u64,
    #[serde(default, alias = "downloadSite")]
    pub download_site: Option<String>,
    /// Local time of the daily scrape cycle, `HH:MM`.
    #[serde(default = "default_fetch_at", alias = "fetchAt")]
    pub fetch_at: String,
    /// Site extraction configs scraped by the daily cycle.
    #[serde(default)]
    pub sites: Vec<PathBuf>,
    #[serde(default = "default_settings_dir", alias = "settingsDir")]
    pub settings_dir: PathBuf,
    #[serde(default)]
    pub watcher: WatcherSettings,
    #[serde(default = "default_large_upload_timeout")]
    pub large_upload_timeout_secs: u64,
}

/// The `[watcher]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    pub recursive: bool,
    pub events: Vec<WatchEventKind>,
    pub settle_interval_ms: u64,
    pub max_settle_attempts: u32,
    pub liveness_check_secs: u64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            recursive: true,
            events: vec![WatchEventKind::Created, WatchEventKind::MovedIn],
            settle_interval_ms: 1000,
            max_settle_attempts: 3600,
            liveness_check_secs: 30,
        }
    }
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_refresh_rate() -> u64 {
    30
}

fn default_fetch_at() -> String {
    "07:30".to_string()
}

fn default_settings_dir() -> PathBuf {
    PathBuf::from("Settings")
}

fn default_large_upload_timeout() -> u64 {
    900
}

impl Settings {
    /// Load, resolve and validate the settings file at `path`.
    ///
    /// A non-empty `GIORNALETTIERE_TELEGRAM_TOKEN` replaces the file's token.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read settings file {}", path.display()))?;
        let mut settings = Self::parse(&contents, path)?;

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                settings.telegram_token = token.trim().to_string();
            }
        }

        settings.resolve_paths(&install_root(path));
        settings.validate()?;
        Ok(settings)
    }

    /// Parse without resolving or validating.
    pub fn parse(contents: &str, path: &Path) -> Result<Self> {
        let origin = path.display();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(contents)
                .with_context(|| format!("invalid JSON settings in {origin}")),
            Some("toml") => {
                toml::from_str(contents).with_context(|| format!("invalid TOML settings in {origin}"))
            }
            _ => toml::from_str(contents).or_else(|toml_err| {
                serde_json::from_str(contents).map_err(|json_err| {
                    anyhow::anyhow!(
                        "cannot parse settings {origin}: toml error: {toml_err}; json error: {json_err}"
                    )
                })
            }),
        }
    }

    /// Make every relative path absolute against `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        self.file_location = absolutize(root, &self.file_location);
        self.settings_dir = absolutize(root, &self.settings_dir);
        self.sites = self.sites.iter().map(|p| absolutize(root, p)).collect();
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram_token.trim().is_empty() {
            bail!("telegram_token is missing (set it in the settings or in {TOKEN_ENV})");
        }
        if self.my_channel.trim().is_empty() {
            bail!("my_channel is missing");
        }
        if self.download_request.trim().is_empty() {
            bail!("download_request is missing");
        }
        if self.filetypes.is_empty() {
            bail!("filetypes must list at least one suffix");
        }
        if self.refresh_rate == 0 {
            bail!("refresh_rate must be at least one minute");
        }
        self.fetch_time()?;
        if self.watcher.events.is_empty() {
            bail!("watcher.events must name at least one event kind");
        }
        if self.watcher.settle_interval_ms == 0 || self.watcher.liveness_check_secs == 0 {
            bail!("watcher intervals must be positive");
        }
        Ok(())
    }

    /// `fetch_at` as `(hour, minute)`.
    pub fn fetch_time(&self) -> Result<(u32, u32)> {
        let time = NaiveTime::parse_from_str(self.fetch_at.trim(), "%H:%M")
            .with_context(|| format!("fetch_at must be HH:MM, got {:?}", self.fetch_at))?;
        Ok((time.hour(), time.minute()))
    }

    /// The channel plus any extra chats, without duplicates.
    pub fn recipients(&self) -> Vec<String> {
        let mut recipients = vec![self.my_channel.clone()];
        for chat in &self.extra_channels {
            if !recipients.contains(chat) {
                recipients.push(chat.clone());
            }
        }
        recipients
    }

    /// The directory downloads land in.
    pub fn observed_dir(&self) -> PathBuf {
        self.file_location.join(&self.download_request)
    }

    pub fn db_path(&self) -> PathBuf {
        self.settings_dir.join(DB_FILE)
    }

    pub fn file_list_path(&self) -> PathBuf {
        self.settings_dir.join(FILE_LIST_FILE)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_rate * 60)
    }

    pub fn large_upload_timeout(&self) -> Duration {
        Duration::from_secs(self.large_upload_timeout_secs)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.watcher.liveness_check_secs)
    }

    /// Watcher configuration for the observed directory.
    pub fn watcher_config(&self) -> WatcherConfig {
        let mut config = WatcherConfig::new(self.observed_dir());
        config.events = self.watcher.events.iter().copied().collect();
        config.recursive = self.watcher.recursive;
        config.settle_interval = Duration::from_millis(self.watcher.settle_interval_ms);
        config.max_settle_attempts = self.watcher.max_settle_attempts;
        config
    }
}

/// Parent of the settings directory, or `.` when there is none.
fn install_root(settings_path: &Path) -> PathBuf {
    settings_path
        .parent()
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_JSON: &str = r#"{
        "telegram_token": "123:abc",
        "myChannel": "@edicola",
        "fileLocation": "/srv/downloads",
        "downloadRequest": "Giornali",
        "filetypes": [".pdf", ".epub"],
        "json_db": false,
        "refresh_rate": 15,
        "downloadSite": "http://nas.local/jd/add",
        "fetcherScript": "GiornalettiereDownloader.py"
    }"#;

    #[test]
    fn test_legacy_json_with_defaults() {
        let settings = Settings::parse(LEGACY_JSON, Path::new("local_settings.json")).unwrap();
        assert_eq!(settings.my_channel, "@edicola");
        assert_eq!(settings.download_request, "Giornali");
        assert_eq!(settings.refresh_rate, 15);
        assert_eq!(settings.download_site.as_deref(), Some("http://nas.local/jd/add"));
        assert_eq!(settings.fetch_at, "07:30");
        assert_eq!(settings.telegram_api_url, "https://api.telegram.org");
        assert_eq!(settings.large_upload_timeout_secs, 900);
        assert!(settings.watcher.recursive);
        assert_eq!(
            settings.watcher.events,
            vec![WatchEventKind::Created, WatchEventKind::MovedIn]
        );
        settings.validate().unwrap();
        assert_eq!(
            settings.observed_dir(),
            PathBuf::from("/srv/downloads/Giornali")
        );
    }

    #[test]
    fn test_toml_with_watcher_table() {
        let toml = r#"
            telegram_token = "t"
            my_channel = "@c"
            extra_channels = ["42", "@c"]
            file_location = "downloads"
            download_request = "Giornali"
            filetypes = [".pdf"]
            fetch_at = "06:05"
            sites = ["sites/edicola.toml"]

            [watcher]
            recursive = false
            events = ["closed_write"]
            settle_interval_ms = 250
        "#;
        let mut settings = Settings::parse(toml, Path::new("bot.toml")).unwrap();
        settings.resolve_paths(Path::new("/opt/giornalettiere"));
        settings.validate().unwrap();

        assert_eq!(settings.recipients(), vec!["@c".to_string(), "42".to_string()]);
        assert_eq!(settings.fetch_time().unwrap(), (6, 5));
        assert_eq!(
            settings.sites,
            vec![PathBuf::from("/opt/giornalettiere/sites/edicola.toml")]
        );
        assert_eq!(
            settings.db_path(),
            PathBuf::from("/opt/giornalettiere/Settings/Giornalettiere.db")
        );

        let watcher = settings.watcher_config();
        assert!(!watcher.recursive);
        assert_eq!(watcher.settle_interval, Duration::from_millis(250));
        assert_eq!(watcher.max_settle_attempts, 3600);
        assert!(watcher.events.contains(&WatchEventKind::ClosedWrite));
        assert_eq!(watcher.events.len(), 1);
        assert_eq!(
            watcher.roots,
            vec![PathBuf::from("/opt/giornalettiere/downloads/Giornali")]
        );
    }

    #[test]
    fn test_unknown_extension_falls_back_to_json() {
        let settings = Settings::parse(LEGACY_JSON, Path::new("settings.conf")).unwrap();
        assert_eq!(settings.filetypes, vec![".pdf", ".epub"]);
    }

    #[test]
    fn test_validation_errors() {
        let mut settings = Settings::parse(LEGACY_JSON, Path::new("s.json")).unwrap();
        settings.fetch_at = "7h30".into();
        assert!(settings.validate().is_err());

        let mut settings = Settings::parse(LEGACY_JSON, Path::new("s.json")).unwrap();
        settings.telegram_token = "  ".into();
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("telegram_token"));

        let mut settings = Settings::parse(LEGACY_JSON, Path::new("s.json")).unwrap();
        settings.watcher.events.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_required_key() {
        let json = r#"{"telegram_token": "t", "myChannel": "@c"}"#;
        assert!(Settings::parse(json, Path::new("s.json")).is_err());
    }

    #[test]
    fn test_install_root() {
        assert_eq!(
            install_root(Path::new("/opt/bot/Settings/local_settings.json")),
            PathBuf::from("/opt/bot")
        );
        assert_eq!(
            install_root(Path::new("Settings/local_settings.json")),
            PathBuf::from(".")
        );
    }

    #[test]
    fn test_load_resolves_against_install_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings_dir = dir.path().join("Settings");
        std::fs::create_dir_all(&settings_dir).unwrap();
        let path = settings_dir.join("local_settings.json");
        std::fs::write(
            &path,
            r#"{"telegram_token": "t", "myChannel": "@c", "fileLocation": "dl",
                "downloadRequest": "Giornali", "filetypes": [".pdf"]}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.file_location, dir.path().join("dl"));
        assert_eq!(settings.file_list_path(), settings_dir.join("myFileList.json"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Settings::load(&dir.path().join("nope.json")).is_err());
    }
}
