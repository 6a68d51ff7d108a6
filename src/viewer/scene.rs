use geojson::FeatureCollection;
use serde::Serialize;

use super::loader::{Banner, LayerSpec, MapView, AREA_SOURCE, POI_SOURCE};
use super::view_state::{ToggleButton, ToggleGranularity, ViewState};
use super::viewport::FitBounds;

#[derive(Debug, Clone, Serialize)]
pub struct SceneSource {
    pub id: &'static str,
    pub data: FeatureCollection,
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneControls {
    pub area: Option<ToggleButton>,
    pub pois: Option<ToggleButton>,
}

/// Records what the loader asked of the map so the page can replay it.
#[derive(Debug, Clone, Serialize)]
pub struct MapScene {
    sources: Vec<SceneSource>,
    layers: Vec<LayerSpec>,
    fit: Option<FitBounds>,
    banner: Option<Banner>,
    loading: bool,
    #[serde(skip)]
    view: ViewState,
}

impl MapScene {
    pub fn new(granularity: ToggleGranularity) -> Self {
        Self {
            sources: Vec::new(),
            layers: Vec::new(),
            fit: None,
            banner: None,
            loading: false,
            view: ViewState::new(granularity),
        }
    }

    pub fn source_ids(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.id).collect()
    }

    pub fn layer_ids(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.id).collect()
    }

    pub fn fit(&self) -> Option<FitBounds> {
        self.fit
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn source(&self, id: &str) -> Option<&FeatureCollection> {
        self.sources.iter().find(|s| s.id == id).map(|s| &s.data)
    }

    /// Hands over the view state once loading is done.
    pub fn into_view_state(self) -> ViewState {
        self.view
    }

    /// Toggle buttons the page should render, given what made it onto the map.
    pub fn controls(&self) -> SceneControls {
        let has = |id: &str| self.sources.iter().any(|s| s.id == id);
        SceneControls {
            area: has(AREA_SOURCE).then(|| self.view.area_button()),
            pois: (has(POI_SOURCE) && self.view.granularity() == ToggleGranularity::All)
                .then(|| self.view.pois_button()),
        }
    }
}

impl MapView for MapScene {
    fn add_source(&mut self, id: &'static str, data: FeatureCollection) {
        match id {
            POI_SOURCE => self.view.mark_pois_loaded(),
            AREA_SOURCE => self.view.mark_area_loaded(),
            _ => {}
        }
        self.sources.push(SceneSource { id, data });
    }

    fn add_layer(&mut self, layer: LayerSpec) {
        self.layers.push(layer);
    }

    fn fit_bounds(&mut self, fit: FitBounds) {
        self.fit = Some(fit);
    }

    fn show_loading(&mut self) {
        self.loading = true;
    }

    fn hide_loading(&mut self) {
        self.loading = false;
    }

    fn show_error(&mut self, banner: Banner) {
        self.banner = Some(banner);
    }
}
