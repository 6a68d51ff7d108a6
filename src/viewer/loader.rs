use geojson::{FeatureCollection, GeoJson};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use super::style;
use super::viewport::{self, FitBounds};

pub const POI_SOURCE: &str = "pois";
pub const AREA_SOURCE: &str = "area";
pub const LOAD_ERROR_MESSAGE: &str = "Failed to load map data";
pub const ERROR_DISMISS: Duration = Duration::from_secs(5);

const AREA_COLOR: &str = "#ff6600";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("request for {location} failed: {source}")]
    Network {
        location: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{location} answered HTTP {status}")]
    Status { location: String, status: u16 },
    #[error("failed to read {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{location} is not valid GeoJSON: {source}")]
    Parse {
        location: String,
        #[source]
        source: Box<geojson::Error>,
    },
    #[error("{location} is not a FeatureCollection")]
    NotACollection { location: String },
}

/// Where the map documents come from.
pub trait Fetcher {
    fn fetch_collection(&self, location: &str) -> impl Future<Output = Result<FeatureCollection, LoadError>> + Send;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }

    fn url_for(&self, location: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), location.trim_start_matches('/'))
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch_collection(&self, location: &str) -> Result<FeatureCollection, LoadError> {
        let url = self.url_for(location);
        let network = |source| LoadError::Network { location: url.clone(), source };

        let resp = self.client.get(&url).send().await.map_err(network)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(LoadError::Status { location: url.clone(), status: status.as_u16() });
        }
        let body = resp.text().await.map_err(network)?;
        parse_collection(&url, &body)
    }
}

/// Reads documents relative to a directory on disk.
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Fetcher for FsFetcher {
    async fn fetch_collection(&self, location: &str) -> Result<FeatureCollection, LoadError> {
        let path = self.root.join(location.trim_start_matches('/'));
        let body = tokio::fs::read_to_string(&path).await.map_err(|source| LoadError::Io {
            location: path.display().to_string(),
            source,
        })?;
        parse_collection(location, &body)
    }
}

/// Picks the HTTP or filesystem fetcher from configuration.
pub enum DataSource {
    Http(HttpFetcher),
    Fs(FsFetcher),
}

impl Fetcher for DataSource {
    async fn fetch_collection(&self, location: &str) -> Result<FeatureCollection, LoadError> {
        match self {
            DataSource::Http(f) => f.fetch_collection(location).await,
            DataSource::Fs(f) => f.fetch_collection(location).await,
        }
    }
}

pub fn parse_collection(location: &str, body: &str) -> Result<FeatureCollection, LoadError> {
    let geojson: GeoJson = body.parse().map_err(|e| LoadError::Parse {
        location: location.to_string(),
        source: Box::new(e),
    })?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(LoadError::NotACollection { location: location.to_string() }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Circle,
    Fill,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub id: &'static str,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub source: &'static str,
    pub paint: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Banner {
    pub message: String,
    pub dismiss_after_ms: u64,
}

impl Banner {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            dismiss_after_ms: ERROR_DISMISS.as_millis() as u64,
        }
    }
}

/// The parts of the map library the loader drives.
pub trait MapView {
    fn add_source(&mut self, id: &'static str, data: FeatureCollection);
    fn add_layer(&mut self, layer: LayerSpec);
    fn fit_bounds(&mut self, fit: FitBounds);
    fn show_loading(&mut self);
    fn hide_loading(&mut self);
    fn show_error(&mut self, banner: Banner);
}

#[derive(Debug, Clone)]
pub struct DataLocations {
    pub pois: String,
    pub area: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LoadReport {
    pub poi_count: usize,
    pub area_loaded: bool,
}

pub fn poi_layer() -> LayerSpec {
    LayerSpec {
        id: "pois-pins",
        kind: LayerKind::Circle,
        source: POI_SOURCE,
        paint: style::poi_circle_paint(),
    }
}

pub fn area_layers() -> [LayerSpec; 2] {
    [
        LayerSpec {
            id: "area-fill",
            kind: LayerKind::Fill,
            source: AREA_SOURCE,
            paint: json!({ "fill-color": AREA_COLOR, "fill-opacity": 0.1 }),
        },
        LayerSpec {
            id: "area-line",
            kind: LayerKind::Line,
            source: AREA_SOURCE,
            paint: json!({ "line-color": AREA_COLOR, "line-width": 3, "line-opacity": 0.8 }),
        },
    ]
}

/// Loads the POIs, then the area overlay.
///
/// A POI failure is returned and shown as a banner, and the area is skipped.
/// An area failure is only logged. The loading indicator is cleared either way.
pub async fn load_map_data<F, V>(fetcher: &F, view: &mut V, locations: &DataLocations) -> Result<LoadReport, LoadError>
where
    F: Fetcher,
    V: MapView,
{
    view.show_loading();
    let result = match load_pois(fetcher, view, &locations.pois).await {
        Ok(poi_count) => {
            let area_loaded = load_area(fetcher, view, &locations.area).await;
            Ok(LoadReport { poi_count, area_loaded })
        }
        Err(e) => {
            error!("failed to load POIs: {}", e);
            view.show_error(Banner::error(LOAD_ERROR_MESSAGE));
            Err(e)
        }
    };
    view.hide_loading();
    result
}

async fn load_pois<F: Fetcher, V: MapView>(fetcher: &F, view: &mut V, location: &str) -> Result<usize, LoadError> {
    let data = fetcher.fetch_collection(location).await?;
    if data.features.is_empty() {
        warn!("no POIs found in {}", location);
        return Ok(0);
    }

    let count = data.features.len();
    let fit = viewport::fit_collection(&data);
    view.add_source(POI_SOURCE, data);
    view.add_layer(poi_layer());
    if let Some(fit) = fit {
        view.fit_bounds(fit);
    }
    info!("loaded {} POIs from {}", count, location);
    Ok(count)
}

async fn load_area<F: Fetcher, V: MapView>(fetcher: &F, view: &mut V, location: &str) -> bool {
    match fetcher.fetch_collection(location).await {
        Ok(data) => {
            view.add_source(AREA_SOURCE, data);
            for layer in area_layers() {
                view.add_layer(layer);
            }
            info!("loaded area of interest from {}", location);
            true
        }
        Err(e) => {
            warn!("area of interest unavailable: {}", e);
            false
        }
    }
}
