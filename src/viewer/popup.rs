use geojson::JsonObject;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;
use tera::escape_html;

use super::style;

const IMPORTANT_KEYS: [&str; 5] = ["category", "amenity", "shop", "tourism", "leisure"];
const NAME_KEYS: [&str; 2] = ["name", "Name"];
const MAX_EXTRA_KEYS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct Popup {
    /// `[lng, lat]` after antimeridian correction.
    pub lng_lat: [f64; 2],
    pub html: String,
}

/// Shifts `lng` by whole turns until it lies within 180° of `reference`.
///
/// Non-finite inputs are returned untouched.
pub fn wrap_longitude(lng: f64, reference: f64) -> f64 {
    if !lng.is_finite() || !reference.is_finite() {
        return lng;
    }
    let mut lng = lng;
    while (reference - lng).abs() > 180.0 {
        lng += if reference > lng { 360.0 } else { -360.0 };
    }
    lng
}

pub fn maps_search_url(lng: f64, lat: f64) -> String {
    format!("https://www.google.com/maps/search/?api=1&query={},{}", lat, lng)
}

/// Anchors at the wrapped longitude; the content links the feature's own coordinates.
pub fn build_popup(properties: &JsonObject, coords: [f64; 2], click_lng: f64) -> Popup {
    Popup {
        lng_lat: [wrap_longitude(coords[0], click_lng), coords[1]],
        html: popup_content(properties, coords),
    }
}

pub fn popup_content(properties: &JsonObject, [lng, lat]: [f64; 2]) -> String {
    let category = properties.get("category").and_then(Value::as_str).filter(|c| !c.is_empty());
    let poi_style = style::resolve(category);
    let name = NAME_KEYS
        .iter()
        .filter_map(|k| properties.get(*k))
        .find(|v| is_present(v))
        .map(display_value)
        .unwrap_or_else(|| "Unnamed".to_string());

    let mut html = String::new();
    let _ = write!(
        html,
        r#"<div class="poi-popup"><h3 style="color:{};">{} {}</h3>"#,
        poi_style.color,
        poi_style.icon,
        escape_html(&name)
    );

    for key in IMPORTANT_KEYS {
        if let Some(value) = properties.get(key).filter(|v| is_present(v)) {
            push_property(&mut html, key, value);
        }
    }

    // Take the first five candidates, then drop the empty ones.
    let extras = properties
        .iter()
        .filter(|(k, _)| !NAME_KEYS.contains(&k.as_str()) && !IMPORTANT_KEYS.contains(&k.as_str()))
        .take(MAX_EXTRA_KEYS);
    for (key, value) in extras {
        if is_present(value) {
            push_property(&mut html, key, value);
        }
    }

    let _ = write!(
        html,
        r#"<div class="popup-link"><a href="{}" target="_blank" rel="noopener">View on Google Maps</a></div></div>"#,
        maps_search_url(lng, lat)
    );
    html
}

fn push_property(html: &mut String, key: &str, value: &Value) {
    let _ = write!(
        html,
        r#"<div class="property"><span class="property-key">{}:</span> <span class="property-value">{}</span></div>"#,
        escape_html(key),
        escape_html(&display_value(value))
    );
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn wraps_across_antimeridian() {
        let wrapped = wrap_longitude(179.9, -179.9);
        assert!((wrapped - (-180.1)).abs() < 1e-9);
        assert!((wrapped - (-179.9)).abs() <= 180.0);
    }

    #[test]
    fn leaves_nearby_longitudes_alone() {
        assert_eq!(wrap_longitude(10.0, 20.0), 10.0);
        assert_eq!(wrap_longitude(-73.05, -73.0), -73.05);
    }

    #[test]
    fn wraps_by_several_turns() {
        let wrapped = wrap_longitude(10.0 + 720.0, 10.0);
        assert!((wrapped - 10.0).abs() < 1e-9);
        let wrapped = wrap_longitude(-530.0, 170.0);
        assert!((wrapped - 190.0).abs() < 1e-9);
    }

    #[test]
    fn non_finite_longitude_does_not_loop() {
        assert!(wrap_longitude(f64::NAN, 0.0).is_nan());
        assert_eq!(wrap_longitude(f64::INFINITY, 0.0), f64::INFINITY);
    }

    #[test]
    fn popup_anchors_wrapped_but_links_feature_coordinates() {
        let popup = build_popup(&props(json!({"name": "Edge"})), [179.9, -36.8], -179.9);
        assert!((popup.lng_lat[0] - (-180.1)).abs() < 1e-9);
        assert_eq!(popup.lng_lat[1], -36.8);
        assert!(popup.html.contains("query=-36.8,179.9"));
        assert!(!popup.html.contains("-180.1"));
    }

    #[test]
    fn popup_shows_styled_heading_and_important_keys() {
        let html = popup_content(
            &props(json!({
                "name": "Café Central",
                "category": "cafe",
                "amenity": "cafe",
                "shop": null,
                "tourism": ""
            })),
            [-73.05, -36.82],
        );
        assert!(html.contains(r#"style="color:#4ecdc4;""#));
        assert!(html.contains("☕ Café Central"));
        assert!(html.contains(">category:<"));
        assert!(html.contains(">amenity:<"));
        assert!(!html.contains(">shop:<"));
        assert!(!html.contains(">tourism:<"));
        assert!(html.contains("https://www.google.com/maps/search/?api=1&query=-36.82,-73.05"));
    }

    #[test]
    fn falls_back_to_capitalized_name_then_placeholder() {
        let html = popup_content(&props(json!({"Name": "Plaza"})), [0.0, 0.0]);
        assert!(html.contains("📍 Plaza"));
        let html = popup_content(&props(json!({})), [0.0, 0.0]);
        assert!(html.contains("📍 Unnamed"));
    }

    #[test]
    fn extra_keys_are_capped_before_filtering() {
        let html = popup_content(
            &props(json!({
                "name": "x",
                "a": "1",
                "b": "",
                "c": "3",
                "d": "4",
                "e": "5",
                "f": "6"
            })),
            [0.0, 0.0],
        );
        assert!(html.contains(">a:<"));
        assert!(!html.contains(">b:<"));
        assert!(html.contains(">e:<"));
        assert!(!html.contains(">f:<"));
    }

    #[test]
    fn property_values_are_escaped() {
        let html = popup_content(&props(json!({"name": "<b>bold</b>"})), [0.0, 0.0]);
        assert!(!html.contains("<b>bold</b>"));
        assert!(html.contains("&lt;b&gt;bold&lt;&#x2F;b&gt;"));
    }
}
