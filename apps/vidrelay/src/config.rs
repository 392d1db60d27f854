//! Application configuration.
//!
//! Reads JSON from `$VIDRELAY_CONFIG`, or `~/.config/vidrelay/config.json`
//! (`%APPDATA%\vidrelay\config.json` on Windows). Every field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use vidrelay_pipeline::{AutoAnswers, PipelineSettings, UploadOptions};
use vidrelay_transfer::DEFAULT_CHUNK_SIZE;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "VIDRELAY_CONFIG";

const DEFAULT_TOKEN_ENV: &str = "VIDRELAY_DRIVE_TOKEN";

/// Where uploads go.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Google Drive with an OAuth access token read from `token_env` or,
    /// failing that, from `token_file`.
    Drive {
        #[serde(default)]
        token_file: Option<PathBuf>,
        #[serde(default = "default_token_env")]
        token_env: String,
    },
    /// A local or mounted directory whose subdirectories are the folders.
    Local { root: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Drive {
            token_file: None,
            token_env: default_token_env(),
        }
    }
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.into()
}

/// On-disk config format.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    watch_dir: Option<PathBuf>,
    extensions: Vec<String>,
    folder_hint: Option<String>,
    poll_interval_ms: Option<u64>,
    max_stable_wait_secs: Option<u64>,
    confirm_timeout_secs: Option<u64>,
    chunk_size: Option<usize>,
    progress_step_percent: Option<u8>,
    chunk_retries: Option<u32>,
    chunk_retry_delay_ms: Option<u64>,
    delete_max_attempts: Option<u32>,
    delete_base_delay_ms: Option<u64>,
    backlog_dir: Option<String>,
    log_file: Option<PathBuf>,
    prompt_rename: Option<bool>,
    interactive: Option<bool>,
    headless: Option<AutoAnswers>,
    store: Option<StoreConfig>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub watch_dir: PathBuf,
    pub extensions: Vec<String>,
    pub folder_hint: Option<String>,
    pub poll_interval: Duration,
    pub max_stable_wait: Option<Duration>,
    pub confirm_timeout: Duration,
    pub chunk_size: usize,
    pub progress_step_percent: u8,
    pub chunk_retries: u32,
    pub chunk_retry_delay: Duration,
    pub delete_max_attempts: u32,
    pub delete_base_delay: Duration,
    pub backlog_dir: String,
    pub log_file: PathBuf,
    pub prompt_rename: bool,
    pub interactive: bool,
    pub headless: AutoAnswers,
    pub store: StoreConfig,
    file_path: PathBuf,
    /// Problems found while loading, logged once logging is up.
    warnings: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let base = config_dir().unwrap_or_else(|_| std::env::temp_dir().join("vidrelay"));
        Self {
            watch_dir: home_dir().join("Videos").join("vidrelay"),
            extensions: vec!["mp4".into()],
            folder_hint: None,
            poll_interval: Duration::from_secs(1),
            max_stable_wait: None,
            confirm_timeout: Duration::from_secs(5),
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_step_percent: 10,
            chunk_retries: 0,
            chunk_retry_delay: Duration::from_secs(2),
            delete_max_attempts: 5,
            delete_base_delay: Duration::from_secs(1),
            backlog_dir: "bypassed".into(),
            log_file: base.join("vidrelay.log"),
            prompt_rename: true,
            interactive: true,
            headless: AutoAnswers::default(),
            store: StoreConfig::default(),
            file_path: base.join("config.json"),
            warnings: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from the default location.
    pub fn load() -> anyhow::Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => config_dir()?.join("config.json"),
        };
        Self::load_from(&path)
    }

    /// Loads configuration from `path`. A missing file yields defaults; a
    /// malformed one yields defaults and a warning for
    /// [`take_warnings`](Self::take_warnings).
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut config = AppConfig {
            file_path: path.to_path_buf(),
            ..Default::default()
        };
        if !path.exists() {
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<ConfigFile>(&content) {
            Ok(file) => config.apply(file),
            Err(e) => config.warnings.push(format!(
                "failed to parse config {}, using defaults: {e}",
                path.display()
            )),
        }
        Ok(config)
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(dir) = file.watch_dir {
            self.watch_dir = dir;
        }
        let extensions: Vec<String> = file
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if !extensions.is_empty() {
            self.extensions = extensions;
        }
        self.folder_hint = file.folder_hint.filter(|h| !h.trim().is_empty());
        if let Some(ms) = file.poll_interval_ms.filter(|ms| *ms > 0) {
            self.poll_interval = Duration::from_millis(ms);
        }
        self.max_stable_wait = file
            .max_stable_wait_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs);
        if let Some(secs) = file.confirm_timeout_secs {
            self.confirm_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = file.chunk_size.filter(|s| *s > 0) {
            self.chunk_size = size;
        }
        if let Some(step) = file.progress_step_percent.filter(|s| (1..=100).contains(s)) {
            self.progress_step_percent = step;
        }
        if let Some(retries) = file.chunk_retries {
            self.chunk_retries = retries;
        }
        if let Some(ms) = file.chunk_retry_delay_ms {
            self.chunk_retry_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = file.delete_max_attempts.filter(|a| *a > 0) {
            self.delete_max_attempts = attempts;
        }
        if let Some(ms) = file.delete_base_delay_ms {
            self.delete_base_delay = Duration::from_millis(ms);
        }
        if let Some(dir) = file.backlog_dir.filter(|d| !d.trim().is_empty()) {
            self.backlog_dir = dir;
        }
        if let Some(log_file) = file.log_file {
            self.log_file = log_file;
        }
        if let Some(prompt_rename) = file.prompt_rename {
            self.prompt_rename = prompt_rename;
        }
        if let Some(interactive) = file.interactive {
            self.interactive = interactive;
        }
        if let Some(headless) = file.headless {
            self.headless = headless;
        }
        if let Some(store) = file.store {
            self.store = store;
        }
    }

    /// Path the configuration was loaded from.
    /// Drains the warnings collected while loading.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Default location of the Drive token file.
    pub fn default_token_file(&self) -> PathBuf {
        self.file_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
            .join("drive_token")
    }

    /// Pipeline settings derived from this configuration.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        let mut settings = PipelineSettings::new(&self.watch_dir);
        settings.extensions = self.extensions.clone();
        settings.folder_hint = self.folder_hint.clone();
        settings.stability.poll_interval = self.poll_interval;
        settings.stability.max_wait = self.max_stable_wait;
        settings.confirm_timeout = self.confirm_timeout;
        settings.upload = UploadOptions {
            progress_step: self.progress_step_percent,
            chunk_retries: self.chunk_retries,
            chunk_retry_delay: self.chunk_retry_delay,
            ..UploadOptions::default()
        };
        settings.delete_max_attempts = self.delete_max_attempts;
        settings.delete_base_delay = self.delete_base_delay;
        settings.backlog_dir = self.backlog_dir.clone();
        settings.prompt_rename = self.prompt_rename;
        settings
    }
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    let var = "USERPROFILE";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";
    std::env::var_os(var)
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

fn config_dir() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("vidrelay"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")
            .map_err(|_| anyhow::anyhow!("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(xdg));
        }
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME is not set"))?;
        Ok(PathBuf::from(home).join(".config"))
    }
}
