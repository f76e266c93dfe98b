use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_CONFIG_PATH: &str = "CADENZA_CONFIG_PATH";
const ENV_SERVER_URL: &str = "CADENZA_SERVER_URL";
const ENV_DOWNLOAD_DIR: &str = "CADENZA_DOWNLOAD_DIR";

const DEFAULT_NUM_NOTES: u32 = 80;
const DEFAULT_TEMPERATURE: f64 = 1.0;
const DEFAULT_TEMPO: u32 = 120;

#[derive(Debug, Clone)]
pub struct AppConfig {
    server_url: Option<String>,
    default_num_notes: u32,
    default_temperature: f64,
    default_tempo: u32,
    download_dir: PathBuf,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = Self::default_config_path() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create config directory {}", parent.display())
                })?;
            }
        }

        if let Some(path) = config_file_override()? {
            if path.exists() {
                let partial = read_partial(&path)?;
                config.apply_partial(partial);
            }
        } else {
            let path = Self::default_config_path()?;
            if path.exists() {
                let partial = read_partial(&path)?;
                config.apply_partial(partial);
            }
        }

        config.apply_env();
        Ok(config)
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    pub fn default_num_notes(&self) -> u32 {
        self.default_num_notes
    }

    pub fn default_temperature(&self) -> f64 {
        self.default_temperature
    }

    pub fn default_tempo(&self) -> u32 {
        self.default_tempo
    }

    pub fn download_dir(&self) -> &PathBuf {
        &self.download_dir
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "Cadenza", "Cadenza")
            .ok_or_else(|| anyhow!("unable to determine config directory"))?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(url) = partial.server_url {
            self.server_url = Some(url);
        }
        if let Some(num_notes) = partial.default_num_notes {
            self.default_num_notes = num_notes;
        }
        if let Some(temperature) = partial.default_temperature {
            self.default_temperature = temperature;
        }
        if let Some(tempo) = partial.default_tempo {
            self.default_tempo = tempo;
        }
        if let Some(dir) = partial.download_dir {
            self.download_dir = dir;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(value) = env::var(ENV_SERVER_URL) {
            if value.trim().is_empty() {
                self.server_url = None;
            } else {
                self.server_url = Some(value);
            }
        }
        if let Ok(value) = env::var(ENV_DOWNLOAD_DIR) {
            if !value.trim().is_empty() {
                self.download_dir = PathBuf::from(value);
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            default_num_notes: DEFAULT_NUM_NOTES,
            default_temperature: DEFAULT_TEMPERATURE,
            default_tempo: DEFAULT_TEMPO,
            download_dir: default_download_dir(),
        }
    }
}

fn config_file_override() -> Result<Option<PathBuf>> {
    if let Some(value) = env::var_os(ENV_CONFIG_PATH) {
        if value.is_empty() {
            return Ok(None);
        }
        let path = PathBuf::from(value);
        if path.is_file() {
            return Ok(Some(path));
        }
        if path.ends_with(CONFIG_FILE_NAME) {
            return Ok(Some(path));
        }
        if path.is_dir() {
            return Ok(Some(path.join(CONFIG_FILE_NAME)));
        }
        return Ok(Some(path));
    }
    Ok(None)
}

fn read_partial(path: &Path) -> Result<PartialConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let partial: PartialConfig =
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(partial)
}

fn default_download_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join("Music").join("Cadenza"))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PartialConfig {
    server_url: Option<String>,
    default_num_notes: Option<u32>,
    default_temperature: Option<f64>,
    default_tempo: Option<u32>,
    download_dir: Option<PathBuf>,
}
