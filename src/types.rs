use geo::Point;
use geojson::JsonObject;

#[derive(Debug, Clone)]
pub struct Poi {
    pub point: Point<f64>,
    pub category: String,
    pub properties: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Assignment {
    pub profile: String,
    pub participant: String,
    /// Relative to the static directory, e.g. `places/student/3.geojson`.
    pub set_path: String,
    pub created_at: i64,
}
