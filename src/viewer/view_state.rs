use serde::{Deserialize, Serialize};

pub const POI_LAYERS: &[&str] = &["pois-pins"];
pub const AREA_LAYERS: &[&str] = &["area-fill", "area-line"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    None,
}

impl From<bool> for Visibility {
    fn from(visible: bool) -> Self {
        if visible {
            Visibility::Visible
        } else {
            Visibility::None
        }
    }
}

/// Which layers the page offers a toggle for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleGranularity {
    #[default]
    Area,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutChange {
    pub layer: &'static str,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleButton {
    pub label: &'static str,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct ViewState {
    granularity: ToggleGranularity,
    pois_loaded: bool,
    area_loaded: bool,
    pois_visible: bool,
    area_visible: bool,
}

impl ViewState {
    pub fn new(granularity: ToggleGranularity) -> Self {
        Self {
            granularity,
            pois_loaded: false,
            area_loaded: false,
            pois_visible: true,
            area_visible: true,
        }
    }

    pub fn mark_pois_loaded(&mut self) {
        self.pois_loaded = true;
    }

    pub fn mark_area_loaded(&mut self) {
        self.area_loaded = true;
    }

    pub fn granularity(&self) -> ToggleGranularity {
        self.granularity
    }

    pub fn pois_visible(&self) -> bool {
        self.pois_visible
    }

    pub fn area_visible(&self) -> bool {
        self.area_visible
    }

    /// Flips the area overlay. `None` while the overlay is not on the map.
    pub fn toggle_area(&mut self) -> Option<Vec<LayoutChange>> {
        if !self.area_loaded {
            return None;
        }
        self.area_visible = !self.area_visible;
        Some(changes(AREA_LAYERS, self.area_visible))
    }

    pub fn toggle_pois(&mut self) -> Option<Vec<LayoutChange>> {
        if self.granularity != ToggleGranularity::All || !self.pois_loaded {
            return None;
        }
        self.pois_visible = !self.pois_visible;
        Some(changes(POI_LAYERS, self.pois_visible))
    }

    pub fn area_button(&self) -> ToggleButton {
        ToggleButton {
            label: if self.area_visible { "Hide area" } else { "Show area" },
            active: !self.area_visible,
        }
    }

    pub fn pois_button(&self) -> ToggleButton {
        ToggleButton {
            label: if self.pois_visible { "Hide POIs" } else { "Show POIs" },
            active: !self.pois_visible,
        }
    }
}

fn changes(layers: &[&'static str], visible: bool) -> Vec<LayoutChange> {
    layers
        .iter()
        .map(|layer| LayoutChange {
            layer: *layer,
            visibility: visible.into(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(granularity: ToggleGranularity) -> ViewState {
        let mut state = ViewState::new(granularity);
        state.mark_pois_loaded();
        state.mark_area_loaded();
        state
    }

    #[test]
    fn toggle_is_ignored_before_layers_exist() {
        let mut state = ViewState::new(ToggleGranularity::All);
        assert!(state.toggle_area().is_none());
        assert!(state.toggle_pois().is_none());
        assert!(state.area_visible());
        assert!(state.pois_visible());
    }

    #[test]
    fn area_toggle_hides_both_area_layers() {
        let mut state = loaded(ToggleGranularity::Area);
        let changes = state.toggle_area().unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.visibility == Visibility::None));
        assert_eq!(changes[0].layer, "area-fill");
        assert_eq!(changes[1].layer, "area-line");
        assert_eq!(state.area_button(), ToggleButton { label: "Show area", active: true });
    }

    #[test]
    fn double_toggle_restores_visibility() {
        let mut state = loaded(ToggleGranularity::All);
        state.toggle_area();
        state.toggle_area();
        state.toggle_pois();
        let last = state.toggle_pois().unwrap();
        assert!(state.area_visible());
        assert!(state.pois_visible());
        assert_eq!(last[0].visibility, Visibility::Visible);
        assert_eq!(state.area_button().label, "Hide area");
    }

    #[test]
    fn area_granularity_has_no_poi_toggle() {
        let mut state = loaded(ToggleGranularity::Area);
        assert!(state.toggle_pois().is_none());
        assert!(state.pois_visible());
    }

    #[test]
    fn visibility_serializes_as_layout_value() {
        assert_eq!(serde_json::to_string(&Visibility::None).unwrap(), "\"none\"");
        assert_eq!(serde_json::to_string(&Visibility::Visible).unwrap(), "\"visible\"");
    }
}
