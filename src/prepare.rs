use crate::config::{CategoryRule, PrepareConfig};
use crate::data::{property_str, to_geo};
use anyhow::{Context, Result, anyhow};
use geo::{BoundingRect, Geometry, Intersects, Polygon};
use geojson::{Feature, FeatureCollection, JsonObject};
use rstar::{RTree, RTreeObject, AABB};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::info;

// Area polygons keyed by their envelope for the containment pass.
pub struct AreaPolygon(Polygon<f64>);

impl RTreeObject for AreaPolygon {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        match self.0.bounding_rect() {
            Some(bbox) => AABB::from_corners([bbox.min().x, bbox.min().y], [bbox.max().x, bbox.max().y]),
            None => AABB::from_point([f64::NAN, f64::NAN]),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrepareSummary {
    pub input: usize,
    pub uncategorized: usize,
    pub outside_area: usize,
    pub unnamed: usize,
    pub banned: usize,
    pub kept: usize,
}

pub fn build_area_index(area: &FeatureCollection) -> Result<RTree<AreaPolygon>> {
    let mut polygons = Vec::new();
    for feature in &area.features {
        match to_geo(feature) {
            Some(Geometry::Polygon(p)) => polygons.push(AreaPolygon(p)),
            Some(Geometry::MultiPolygon(mp)) => polygons.extend(mp.into_iter().map(AreaPolygon)),
            _ => {}
        }
    }
    if polygons.is_empty() {
        return Err(anyhow!("Area of interest has no polygons"));
    }
    info!("Building spatial index for {} area polygons", polygons.len());
    Ok(RTree::bulk_load(polygons))
}

pub fn within_area(geometry: &Geometry<f64>, index: &RTree<AreaPolygon>) -> bool {
    let Some(bbox) = geometry.bounding_rect() else {
        return false;
    };
    let envelope = AABB::from_corners([bbox.min().x, bbox.min().y], [bbox.max().x, bbox.max().y]);
    index
        .locate_in_envelope_intersecting(&envelope)
        .any(|area| geometry.intersects(&area.0))
}

/// First rule with a matching tag wins; the fallback property is used when
/// none does.
pub fn assign_category(properties: &JsonObject, rules: &[CategoryRule], fallback_key: Option<&str>) -> Option<String> {
    for rule in rules {
        for tag in &rule.matches {
            let value = match properties.get(&tag.key) {
                Some(Value::Null) | None => continue,
                Some(v) => v,
            };
            let matched = match &tag.values {
                None => true,
                Some(values) => value.as_str().is_some_and(|v| values.iter().any(|x| x == v)),
            };
            if matched {
                return Some(rule.name.clone());
            }
        }
    }
    fallback_key
        .and_then(|key| property_str(properties, key))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Names listed in the first column of a CSV file, trimmed.
pub fn load_banned_names(path: &Path) -> Result<HashSet<String>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open banned names file: {:?}", path))?;
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
    let mut names = HashSet::new();
    for record in rdr.records() {
        let record = record?;
        if let Some(name) = record.get(0).map(str::trim).filter(|n| !n.is_empty()) {
            names.insert(name.to_string());
        }
    }
    info!("Loaded {} banned names", names.len());
    Ok(names)
}

pub fn prepare_pois(
    pois: FeatureCollection,
    config: &PrepareConfig,
    area: &RTree<AreaPolygon>,
    banned: &HashSet<String>,
) -> (FeatureCollection, PrepareSummary) {
    let mut summary = PrepareSummary { input: pois.features.len(), ..Default::default() };
    let mut kept: Vec<Feature> = Vec::new();

    for mut feature in pois.features {
        let mut properties = feature.properties.take().unwrap_or_default();
        let Some(category) = assign_category(&properties, &config.categories, config.fallback_key.as_deref()) else {
            summary.uncategorized += 1;
            continue;
        };

        if !to_geo(&feature).is_some_and(|g| within_area(&g, area)) {
            summary.outside_area += 1;
            continue;
        }

        let name = property_str(&properties, "name").map(str::trim).unwrap_or_default();
        if name.is_empty() {
            summary.unnamed += 1;
            continue;
        }
        if banned.contains(name) {
            summary.banned += 1;
            continue;
        }

        properties.insert("category".to_string(), Value::String(category));
        feature.properties = Some(properties);
        kept.push(feature);
    }

    summary.kept = kept.len();
    info!(?summary, "prepared POIs");
    (
        FeatureCollection {
            bbox: None,
            features: kept,
            foreign_members: None,
        },
        summary,
    )
}
