use crate::types::Poi;
use anyhow::{Context, Result, anyhow};
use geo::{Geometry, InteriorPoint, Point};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, Value};
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub fn load_collection(path: &Path) -> Result<FeatureCollection> {
    info!("Loading GeoJSON from {:?}", path);
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let reader = BufReader::new(file);

    let geojson = GeoJson::from_reader(reader)
        .with_context(|| format!("Failed to parse GeoJSON: {:?}", path))?;

    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(anyhow!("{:?} must be a FeatureCollection", path)),
    }
}

pub fn write_collection(path: &Path, collection: &FeatureCollection) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer(BufWriter::new(file), collection)
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

pub fn to_geo(feature: &Feature) -> Option<Geometry<f64>> {
    let geometry = feature.geometry.as_ref()?;
    Geometry::<f64>::try_from(geometry.value.clone()).ok()
}

/// Reduces a geometry to a representative point: points stay as they are,
/// polygons yield a point guaranteed to lie inside them.
pub fn representative_point(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    match geometry {
        Geometry::Point(p) => Some(*p),
        Geometry::Polygon(p) => p.interior_point(),
        Geometry::MultiPolygon(mp) => mp.interior_point(),
        _ => None,
    }
}

/// Turns categorized features into POIs, dropping the ones without a
/// category or a usable geometry.
pub fn collection_to_pois(collection: &FeatureCollection) -> Vec<Poi> {
    let pois: Vec<Poi> = collection
        .features
        .iter()
        .filter_map(|feature| {
            let properties = feature.properties.clone().unwrap_or_default();
            let category = properties.get("category")?.as_str()?.to_string();
            let point = to_geo(feature).as_ref().and_then(representative_point)?;
            Some(Poi { point, category, properties })
        })
        .collect();
    debug!("{} of {} features usable as POIs", pois.len(), collection.features.len());
    pois
}

pub fn pois_to_collection(pois: &[Poi]) -> FeatureCollection {
    let features = pois
        .iter()
        .map(|poi| Feature {
            geometry: Some(geojson::Geometry::new(Value::Point(vec![poi.point.x(), poi.point.y()]))),
            properties: Some(poi.properties.clone()),
            ..Default::default()
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn property_str<'a>(properties: &'a JsonObject, key: &str) -> Option<&'a str> {
    properties.get(key).and_then(|v| v.as_str())
}

/// `*.geojson` files of a set directory, numbered names in numeric order.
pub fn list_sets(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut sets: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "geojson"))
        .collect();
    sets.sort_by(|a, b| natural_cmp(a, b));
    Ok(sets)
}

fn natural_cmp(a: &Path, b: &Path) -> Ordering {
    let key = |p: &Path| {
        let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
        (stem.parse::<u64>().ok(), stem)
    };
    match (key(a), key(b)) {
        ((Some(x), _), (Some(y), _)) => x.cmp(&y),
        ((Some(_), _), (None, _)) => Ordering::Less,
        ((None, _), (Some(_), _)) => Ordering::Greater,
        ((None, x), (None, y)) => x.cmp(&y),
    }
}
