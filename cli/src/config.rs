use anyhow::{Context, Result};
use calori_core::stats::DayBoundary;
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Optional settings from `config.toml`, overridable from the environment.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub google_client_id: Option<String>,
    /// Fixed day boundary as minutes east of UTC. Unset means the system timezone.
    pub utc_offset_minutes: Option<i32>,
}

const ENV_OVERRIDES: [&str; 5] = [
    "CALORI_SUPABASE_URL",
    "CALORI_SUPABASE_ANON_KEY",
    "GEMINI_API_KEY",
    "CALORI_GEMINI_MODEL",
    "CALORI_GOOGLE_CLIENT_ID",
];

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Apply environment overrides. Empty values are ignored.
    #[must_use]
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for key in ENV_OVERRIDES {
            let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            let slot = match key {
                "CALORI_SUPABASE_URL" => &mut self.supabase_url,
                "CALORI_SUPABASE_ANON_KEY" => &mut self.supabase_anon_key,
                "GEMINI_API_KEY" => &mut self.gemini_api_key,
                "CALORI_GEMINI_MODEL" => &mut self.gemini_model,
                _ => &mut self.google_client_id,
            };
            *slot = Some(value);
        }
        self
    }

    /// Supabase URL and anon key, when both are configured.
    pub fn supabase(&self) -> Option<(&str, &str)> {
        Some((
            self.supabase_url.as_deref()?.trim_end_matches('/'),
            self.supabase_anon_key.as_deref()?,
        ))
    }

    pub fn day_boundary(&self) -> Result<DayBoundary> {
        match self.utc_offset_minutes {
            None => Ok(DayBoundary::Local),
            Some(minutes) => DayBoundary::from_offset_minutes(minutes)
                .with_context(|| format!("utc_offset_minutes {minutes} is out of range")),
        }
    }
}

pub struct Config {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub settings: Settings,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "calori").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let config_path = proj_dirs.config_dir().join("config.toml");
        let settings = Settings::from_file(&config_path)?.with_env(|k| std::env::var(k).ok());

        Ok(Config {
            db_path: data_dir.join("calori.db"),
            config_path,
            settings,
        })
    }
}
