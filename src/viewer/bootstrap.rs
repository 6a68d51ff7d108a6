use serde::Serialize;
use thiserror::Error;

pub const MAP_CONTAINER: &str = "map";
pub const ATTRIBUTION: &str = "© OpenStreetMap contributors";
pub const MAP_ERROR_MESSAGE: &str = "Failed to load the map";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("map API key is not configured")]
    MissingApiKey,
}

/// Object handed to the page as `window.mapConfig`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeMapConfig {
    pub api_key: String,
    /// `[lng, lat]`
    pub center: [f64; 2],
    pub zoom: f64,
    pub rel_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlPosition {
    TopRight,
    BottomRight,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MapControl {
    Navigation { position: ControlPosition },
    Fullscreen { position: ControlPosition },
    Attribution { position: ControlPosition, custom: &'static str },
}

/// Constructor arguments for the map instance, plus the callbacks the page
/// has to wire before any data is requested.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOptions {
    pub container: &'static str,
    pub style: String,
    pub center: [f64; 2],
    pub zoom: f64,
    pub attribution_control: bool,
    pub controls: Vec<MapControl>,
    pub on_load: &'static str,
    pub on_error_message: &'static str,
}

impl MapOptions {
    pub fn from_runtime(config: &RuntimeMapConfig, style_url: &str) -> Result<Self, BootstrapError> {
        if config.api_key.trim().is_empty() {
            return Err(BootstrapError::MissingApiKey);
        }
        Ok(Self {
            container: MAP_CONTAINER,
            style: style_url.to_string(),
            center: config.center,
            zoom: config.zoom,
            attribution_control: false,
            controls: vec![
                MapControl::Navigation { position: ControlPosition::TopRight },
                MapControl::Fullscreen { position: ControlPosition::TopRight },
                MapControl::Attribution {
                    position: ControlPosition::BottomRight,
                    custom: ATTRIBUTION,
                },
            ],
            on_load: "loadScene",
            on_error_message: MAP_ERROR_MESSAGE,
        })
    }
}
