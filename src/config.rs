use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

use crate::viewer::survey::SURVEY_ORIGIN;
use crate::viewer::view_state::ToggleGranularity;

pub const API_KEY_ENV: &str = "MAPBOX_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_location")]
    pub location: String,
    pub server: ServerConfig,
    pub map: MapSettings,
    pub data: DataConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
    #[serde(default)]
    pub prepare: PrepareConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_style")]
    pub style: String,
    pub center: [f64; 2], // [lng, lat]
    pub zoom: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub static_dir: PathBuf,
    /// Profile set folders, relative to `static_dir`.
    #[serde(default = "default_sets_dir")]
    pub sets_dir: String,
    /// Area of interest document, relative to `static_dir` or `base_url`.
    pub area_path: String,
    /// Fetch documents from here instead of `static_dir` when set.
    pub base_url: Option<String>,
    pub db_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ViewerConfig {
    #[serde(default)]
    pub toggle: ToggleGranularity,
    #[serde(default)]
    pub survey: SurveyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SurveyConfig {
    pub enabled: bool,
    pub item_id: String,
    pub portal_url: String,
    pub origin: String,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            item_id: String::new(),
            portal_url: "https://www.arcgis.com".to_string(),
            origin: SURVEY_ORIGIN.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProfileConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub picks: Vec<PickRule>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PickRule {
    pub category: String,
    #[serde(default = "default_pick_count")]
    pub count: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PrepareConfig {
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
    /// Property used when no rule matches.
    pub fallback_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CategoryRule {
    pub name: String,
    pub matches: Vec<TagMatch>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TagMatch {
    pub key: String,
    /// Any non-null value matches when absent.
    pub values: Option<Vec<String>>,
}

fn default_location() -> String {
    "Concepción, Chile".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_style() -> String {
    "mapbox://styles/mapbox/light-v11".to_string()
}

fn default_sets_dir() -> String {
    "places".to_string()
}

fn default_pick_count() -> usize {
    1
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            config.map.api_key = key;
        }
        Ok(config)
    }

    pub fn sets_root(&self) -> PathBuf {
        self.data.static_dir.join(&self.data.sets_dir)
    }

    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn profile_names(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        port = 8000

        [map]
        api_key = "pk.file"
        center = [-73.05, -36.82]
        zoom = 13.0

        [data]
        static_dir = "static"
        area_path = "geometries/area.geojson"
        db_path = "data/assignments.db"

        [viewer]
        toggle = "all"

        [[profiles]]
        name = "tourist"
        picks = [{ category = "tourist_places", count = 2 }, { category = "pub" }]

        [[prepare.categories]]
        name = "storefront"
        matches = [{ key = "shop" }]
    "#;

    #[test]
    fn parses_with_defaults() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.map.style, "mapbox://styles/mapbox/light-v11");
        assert_eq!(config.viewer.toggle, ToggleGranularity::All);
        assert!(!config.viewer.survey.enabled);
        assert_eq!(config.viewer.survey.origin, SURVEY_ORIGIN);
        assert_eq!(config.sets_root(), PathBuf::from("static/places"));

        let tourist = config.profile("tourist").unwrap();
        assert_eq!(tourist.picks[0].count, 2);
        assert_eq!(tourist.picks[1].count, 1);
        assert!(config.prepare.categories[0].matches[0].values.is_none());
    }

    #[test]
    fn shipped_config_parses() {
        let config = AppConfig::load_from_file(Path::new("config.toml")).unwrap();
        assert_eq!(config.profiles.len(), 6);
        assert_eq!(config.profile("shop_owner").unwrap().picks[0].count, 2);
        assert_eq!(config.prepare.fallback_key.as_deref(), Some("main_category"));
        assert_eq!(config.prepare.categories[0].name, "storefront");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = AppConfig::load_from_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
