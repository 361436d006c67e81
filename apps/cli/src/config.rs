use std::fs;

use serde::Deserialize;

/// Runtime settings for the grid binary, layered defaults ← `grid.toml`
/// ← `GRID_*` environment variables ← command-line flags (applied in
/// `main`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_path: String,
    pub database_url: String,
    pub per_page: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: "./data/records.json".into(),
            database_url: "sqlite://./data/grid.db".into(),
            per_page: 100,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    data_path: Option<String>,
    database_url: Option<String>,
    per_page: Option<usize>,
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("grid.toml") {
        if let Ok(file_settings) = toml::from_str::<FileSettings>(&raw) {
            apply_file_settings(&mut settings, file_settings);
        }
    }

    if let Ok(v) = std::env::var("GRID_DATA_PATH") {
        settings.data_path = v;
    }
    if let Ok(v) = std::env::var("GRID_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Ok(v) = std::env::var("GRID_PER_PAGE") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.per_page = parsed;
        }
    }

    settings
}

fn apply_file_settings(settings: &mut Settings, file_settings: FileSettings) {
    if let Some(v) = file_settings.data_path {
        settings.data_path = v;
    }
    if let Some(v) = file_settings.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_settings.per_page {
        settings.per_page = v;
    }
}
