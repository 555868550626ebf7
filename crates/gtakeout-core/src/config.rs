use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default WebDriver endpoint (chromedriver's default port)
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Environment variable that overrides the WebDriver endpoint
pub const WEBDRIVER_URL_ENV: &str = "GTAKEOUT_WEBDRIVER_URL";

/// Environment variable that overrides the release repository
pub const RELEASE_REPO_ENV: &str = "GTAKEOUT_RELEASE_REPO";

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Configuration for the download / extract / organize pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where Takeout archives are downloaded to
    pub download_dir: PathBuf,

    /// Where archives are unpacked to
    pub extract_dir: PathBuf,

    /// Root of the Year/Month/Day photo tree
    pub dest_dir: PathBuf,

    /// Persistent Chrome profile, so Google sign-in survives between runs
    pub chrome_profile_dir: Option<PathBuf>,

    /// WebDriver server endpoint (chromedriver)
    pub webdriver_url: String,

    /// Whether to skip parts recorded as complete by a previous run
    pub resume: bool,

    /// How long to wait for sign-in and download links, in seconds
    pub login_timeout_secs: u64,

    /// Poll interval while waiting on the page or the download folder, in milliseconds
    pub poll_interval_ms: u64,

    /// How long a single archive part may take to download, in seconds
    pub download_timeout_secs: u64,

    /// Number of extraction threads (0 = auto)
    pub extract_workers: usize,

    /// Number of organizer threads (0 = auto)
    pub organize_workers: usize,

    /// Whether to log planned moves without touching files
    pub dry_run: bool,

    /// Log level
    pub log_level: LogLevel,

    /// GitHub `owner/repo` checked for new releases (empty = update check disabled)
    pub release_repo: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("takeout-zips"),
            extract_dir: PathBuf::from("takeout-extracted"),
            dest_dir: PathBuf::from("photos"),
            chrome_profile_dir: default_chrome_profile_dir(),
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            resume: true,
            login_timeout_secs: 10 * 60,
            poll_interval_ms: 1500,
            download_timeout_secs: 4 * 60 * 60,
            extract_workers: 0, // Auto
            organize_workers: 0, // Auto
            dry_run: false,
            log_level: LogLevel::Info,
            release_repo: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Apply overrides from the environment
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(WEBDRIVER_URL_ENV) {
            if !url.trim().is_empty() {
                self.webdriver_url = url.trim().to_string();
            }
        }
        if let Ok(repo) = std::env::var(RELEASE_REPO_ENV) {
            if !repo.trim().is_empty() {
                self.release_repo = repo.trim().to_string();
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.webdriver_url.trim().is_empty() {
            return Err(Error::Configuration(
                "WebDriver URL must not be empty".to_string(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(Error::Configuration(
                "Poll interval must be greater than zero".to_string(),
            ));
        }

        if self.download_timeout_secs == 0 {
            return Err(Error::Configuration(
                "Download timeout must be greater than zero".to_string(),
            ));
        }

        if !self.release_repo.trim().is_empty() && crate::update::parse_release_repo(&self.release_repo).is_none() {
            return Err(Error::Configuration(format!(
                "Release repository must look like owner/repo, got {:?}",
                self.release_repo
            )));
        }

        if self.extract_dir == self.download_dir {
            return Err(Error::Configuration(
                "Extract directory must differ from the download directory".to_string(),
            ));
        }

        Ok(())
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Extraction pool size: `max(2, min(4, cpus))` unless overridden
    pub fn extract_threads(&self) -> usize {
        if self.extract_workers > 0 {
            self.extract_workers
        } else {
            num_cpus::get().clamp(2, 4)
        }
    }

    /// Organizer pool size: `max(2, min(8, cpus))` unless overridden
    pub fn organize_threads(&self) -> usize {
        if self.organize_workers > 0 {
            self.organize_workers
        } else {
            num_cpus::get().clamp(2, 8)
        }
    }
}

/// Per-user Chrome profile location, e.g. `~/.local/share/gtakeout/chrome-profile`
pub fn default_chrome_profile_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "gtakeout").map(|dirs| dirs.data_local_dir().join("chrome-profile"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.resume);
        assert_eq!(config.webdriver_url, DEFAULT_WEBDRIVER_URL);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gtakeout.json");

        let config = Config {
            organize_workers: 3,
            dry_run: true,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.organize_workers, 3);
        assert!(loaded.dry_run);
        assert_eq!(loaded.download_dir, config.download_dir);
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "dest_dir": "/tmp/sorted" }"#).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.dest_dir, PathBuf::from("/tmp/sorted"));
        assert_eq!(loaded.poll_interval_ms, 1500);
    }

    #[test]
    fn test_validate_rejects_same_download_and_extract_dir() {
        let config = Config {
            download_dir: PathBuf::from("same"),
            extract_dir: PathBuf::from("same"),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_release_repo_must_be_owner_and_name() {
        let mut config = Config::default();
        assert!(config.release_repo.is_empty());

        config.release_repo = "gtakeout".to_string();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        config.release_repo = "someone/gtakeout".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_counts() {
        let mut config = Config::default();
        assert!((2..=4).contains(&config.extract_threads()));
        assert!((2..=8).contains(&config.organize_threads()));

        config.extract_workers = 1;
        config.organize_workers = 16;
        assert_eq!(config.extract_threads(), 1);
        assert_eq!(config.organize_threads(), 16);
    }
}
