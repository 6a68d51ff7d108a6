use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoiStyle {
    pub color: &'static str,
    pub icon: &'static str,
}

pub const DEFAULT_STYLE: PoiStyle = PoiStyle { color: "#74b9ff", icon: "📍" };

// Category keys are matched exactly, case included.
pub const POI_STYLES: &[(&str, PoiStyle)] = &[
    ("restaurant", PoiStyle { color: "#ff6b6b", icon: "🍽️" }),
    ("cafe", PoiStyle { color: "#4ecdc4", icon: "☕" }),
    ("school", PoiStyle { color: "#45b7d1", icon: "🏫" }),
    ("university", PoiStyle { color: "#96ceb4", icon: "🎓" }),
    ("hospital", PoiStyle { color: "#ff9ff3", icon: "🏥" }),
    ("park", PoiStyle { color: "#54a0ff", icon: "🌳" }),
    ("gym", PoiStyle { color: "#5f27cd", icon: "💪" }),
    ("shop", PoiStyle { color: "#00d2d3", icon: "🏪" }),
    ("office", PoiStyle { color: "#ff9500", icon: "🏢" }),
    ("tourist_places", PoiStyle { color: "#e17055", icon: "📷" }),
    ("residential", PoiStyle { color: "#6c5ce7", icon: "🏠" }),
    ("pub", PoiStyle { color: "#fd79a8", icon: "🍺" }),
];

/// Looks up the style for a POI category, falling back to [`DEFAULT_STYLE`].
pub fn resolve(category: Option<&str>) -> PoiStyle {
    category
        .and_then(|c| POI_STYLES.iter().find(|(key, _)| *key == c))
        .map(|(_, style)| *style)
        .unwrap_or(DEFAULT_STYLE)
}

/// `match` expression on the `category` property, one arm per table entry.
pub fn circle_color_expression() -> Value {
    let mut expr = vec![json!("match"), json!(["get", "category"])];
    for (category, style) in POI_STYLES {
        expr.push(json!(category));
        expr.push(json!(style.color));
    }
    expr.push(json!(DEFAULT_STYLE.color));
    Value::Array(expr)
}

pub fn poi_circle_paint() -> Value {
    json!({
        "circle-color": circle_color_expression(),
        "circle-radius": 12,
        "circle-stroke-width": 2,
        "circle-stroke-color": "#fff",
    })
}
