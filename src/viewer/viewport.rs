use geo::{BoundingRect, Geometry, GeometryCollection, Rect};
use geojson::FeatureCollection;
use serde::Serialize;

pub const FIT_PADDING: u32 = 50;

/// Camera request issued once the POIs are on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitBounds {
    /// `[min_lng, min_lat, max_lng, max_lat]`
    pub bbox: [f64; 4],
    pub padding: u32,
}

impl FitBounds {
    pub fn new(rect: Rect<f64>, padding: u32) -> Self {
        Self {
            bbox: [rect.min().x, rect.min().y, rect.max().x, rect.max().y],
            padding,
        }
    }
}

/// Bounding box of every geometry in the collection.
///
/// Features without a geometry, or whose geometry cannot be converted, are
/// skipped. Returns `None` when nothing remains.
pub fn collection_bbox(collection: &FeatureCollection) -> Option<Rect<f64>> {
    let geometries: Vec<Geometry<f64>> = collection
        .features
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .filter_map(|g| Geometry::<f64>::try_from(g.value.clone()).ok())
        .collect();

    GeometryCollection::from(geometries).bounding_rect()
}

pub fn fit_collection(collection: &FeatureCollection) -> Option<FitBounds> {
    collection_bbox(collection).map(|rect| FitBounds::new(rect, FIT_PADDING))
}
