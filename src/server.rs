use crate::assignments::{Allocation, AssignmentStore};
use crate::config::AppConfig;
use crate::data::{list_sets, representative_point, to_geo};
use crate::render::PageRenderer;
use crate::viewer::loader::{load_map_data, DataLocations, DataSource, Fetcher, FsFetcher, HttpFetcher};
use crate::viewer::popup::{build_popup, Popup};
use crate::viewer::scene::MapScene;
use crate::viewer::survey::SurveyEvent;
use crate::viewer::Session;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

type SessionKey = (String, String);

pub struct AppState {
    pub config: AppConfig,
    pub store: AssignmentStore,
    pub renderer: PageRenderer,
    pub source: DataSource,
    sessions: Mutex<HashMap<SessionKey, Session>>,
}

impl AppState {
    pub fn new(config: AppConfig, store: AssignmentStore, source: DataSource) -> Result<Self> {
        Ok(Self {
            config,
            store,
            renderer: PageRenderer::new()?,
            source,
            sessions: Mutex::new(HashMap::new()),
        })
    }
}

/// Fetch from `data.base_url` when set, otherwise straight from the static directory.
pub fn data_source(config: &AppConfig) -> DataSource {
    match &config.data.base_url {
        Some(url) => DataSource::Http(HttpFetcher::new(reqwest::Client::new(), url.clone())),
        None => DataSource::Fs(FsFetcher::new(config.data.static_dir.clone())),
    }
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("request failed: {:#}", err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.data.static_dir);
    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/join/{profile}", get(join_handler))
        .route("/viewer/{profile}/{participant}", get(viewer_handler))
        .route("/api/scene/{profile}/{participant}", get(scene_handler))
        .route("/api/popup/{profile}/{participant}/{index}", get(popup_handler))
        .route("/api/session/{profile}/{participant}/toggle/{layer}", post(toggle_handler))
        .route("/api/session/{profile}/{participant}/survey", post(survey_handler))
        .nest_service("/static", static_files)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let store = AssignmentStore::open(&config.data.db_path).await?;
    let source = data_source(&config);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, store, source)?);

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Starting server on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// Profile and participant ids end up in file paths and URLs.
fn is_plain_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn check_ids(profile: &str, participant: Option<&str>) -> ApiResult<()> {
    if !is_plain_segment(profile) {
        return Err(ApiError::not_found(format!("Profile '{}' not found", profile)));
    }
    if participant.is_some_and(|p| !is_plain_segment(p)) {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Invalid participant id"));
    }
    Ok(())
}

async fn home_handler(State(state): State<Arc<AppState>>) -> ApiResult<Html<String>> {
    Ok(Html(state.renderer.home(&state.config)?))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "location": state.config.location,
        "map_configured": !state.config.map.api_key.is_empty(),
        "profiles": state.config.profile_names(),
    }))
}

#[derive(Deserialize)]
struct JoinParams {
    uuid: Option<String>,
}

async fn join_handler(
    State(state): State<Arc<AppState>>,
    Path(profile): Path<String>,
    Query(params): Query<JoinParams>,
) -> ApiResult<Redirect> {
    let participant = params.uuid.filter(|u| !u.trim().is_empty());
    check_ids(&profile, participant.as_deref())?;

    let dir = state.config.sets_root().join(&profile);
    let sets = if dir.is_dir() { list_sets(&dir)? } else { Vec::new() };
    if sets.is_empty() {
        return Err(ApiError::not_found(format!("Profile '{}' not found", profile)));
    }

    let candidates: Vec<String> = sets
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .map(|name| format!("{}/{}/{}", state.config.data.sets_dir, profile, name))
        .collect();

    let participant = match state.store.assign(&profile, participant.as_deref(), &candidates).await? {
        Allocation::Existing(a) => a.participant,
        Allocation::Created(a) => {
            info!(profile = %profile, participant = %a.participant, set = %a.set_path, "new assignment");
            a.participant
        }
        Allocation::Exhausted => {
            warn!(profile = %profile, "all sets are taken");
            return Err(ApiError::new(StatusCode::GONE, "No sets available for this profile"));
        }
    };

    Ok(Redirect::to(&format!("/viewer/{}/{}", profile, participant)))
}

async fn viewer_handler(
    State(state): State<Arc<AppState>>,
    Path((profile, participant)): Path<(String, String)>,
) -> ApiResult<Response> {
    check_ids(&profile, Some(&participant))?;
    let Some(assignment) = state.store.get(&profile, &participant).await? else {
        let notice = state.renderer.notice(&format!(
            "No POI set is assigned to participant {} of profile {}. Join through /join/{} first.",
            participant, profile, profile
        ))?;
        return Ok((StatusCode::NOT_FOUND, Html(notice)).into_response());
    };
    let page = state.renderer.viewer(&state.config, &profile, &participant, &assignment.set_path)?;
    Ok(Html(page).into_response())
}

async fn scene_handler(
    State(state): State<Arc<AppState>>,
    Path((profile, participant)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    check_ids(&profile, Some(&participant))?;
    let assignment = state
        .store
        .get(&profile, &participant)
        .await?
        .ok_or_else(|| ApiError::not_found("No assignment"))?;

    let locations = DataLocations {
        pois: assignment.set_path,
        area: state.config.data.area_path.clone(),
    };
    let mut scene = MapScene::new(state.config.viewer.toggle);
    if let Ok(report) = load_map_data(&state.source, &mut scene, &locations).await {
        info!(profile = %profile, participant = %participant, pois = report.poi_count, area = report.area_loaded, "scene loaded");
    }

    let body = json!({ "scene": &scene, "controls": scene.controls() });
    let session = Session::new(scene.into_view_state(), &state.config.viewer.survey.origin);
    state.sessions.lock().await.insert((profile, participant), session);
    Ok(Json(body))
}

#[derive(Deserialize)]
struct PopupParams {
    click_lng: Option<f64>,
}

async fn popup_handler(
    State(state): State<Arc<AppState>>,
    Path((profile, participant, index)): Path<(String, String, usize)>,
    Query(params): Query<PopupParams>,
) -> ApiResult<Json<Popup>> {
    check_ids(&profile, Some(&participant))?;
    let assignment = state
        .store
        .get(&profile, &participant)
        .await?
        .ok_or_else(|| ApiError::not_found("No assignment"))?;

    let pois = state
        .source
        .fetch_collection(&assignment.set_path)
        .await
        .map_err(|e| ApiError::from(anyhow::Error::new(e)))?;
    let feature = pois.features.get(index).ok_or_else(|| ApiError::not_found("No such POI"))?;
    let point = to_geo(feature)
        .as_ref()
        .and_then(representative_point)
        .ok_or_else(|| ApiError::not_found("POI has no location"))?;

    let coords = [point.x(), point.y()];
    let properties = feature.properties.clone().unwrap_or_default();
    Ok(Json(build_popup(&properties, coords, params.click_lng.unwrap_or(coords[0]))))
}

async fn toggle_handler(
    State(state): State<Arc<AppState>>,
    Path((profile, participant, layer)): Path<(String, String, String)>,
) -> ApiResult<Json<Value>> {
    let mut sessions = state.sessions.lock().await;
    let session = sessions
        .get_mut(&(profile, participant))
        .ok_or_else(|| ApiError::not_found("Session not found, reload the page"))?;

    let view = &mut session.view;
    let (changes, button) = match layer.as_str() {
        "area" => (view.toggle_area(), view.area_button()),
        "pois" => (view.toggle_pois(), view.pois_button()),
        _ => return Err(ApiError::new(StatusCode::BAD_REQUEST, format!("Unknown layer '{}'", layer))),
    };
    Ok(Json(json!({ "changes": changes.unwrap_or_default(), "button": button })))
}

async fn survey_handler(
    State(state): State<Arc<AppState>>,
    Path((profile, participant)): Path<(String, String)>,
    Json(event): Json<SurveyEvent>,
) -> ApiResult<Json<Value>> {
    if !state.config.viewer.survey.enabled {
        return Err(ApiError::not_found("Survey is disabled"));
    }
    check_ids(&profile, Some(&participant))?;

    // Sessions are only created by a scene load, which needs an assignment.
    let mut sessions = state.sessions.lock().await;
    let session = sessions
        .get_mut(&(profile, participant))
        .ok_or_else(|| ApiError::not_found("Session not found, reload the page"))?;
    let effects = session.survey.handle(event);
    Ok(Json(json!({ "effects": effects, "state": session.survey.state() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use std::fs;
    use tower::ServiceExt;

    const POIS: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"name":"Café <Sur>","category":"cafe"},
         "geometry":{"type":"Point","coordinates":[-73.05,-36.82]}},
        {"type":"Feature","properties":{"name":"Parque","category":"park"},
         "geometry":{"type":"Point","coordinates":[-73.04,-36.81]}}]}"#;

    const AREA: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{},
         "geometry":{"type":"Polygon","coordinates":[[[-74,-37],[-72,-37],[-72,-36],[-74,-36],[-74,-37]]]}}]}"#;

    fn write_sets(dir: &std::path::Path, count: usize) {
        let places = dir.join("places/student");
        fs::create_dir_all(&places).unwrap();
        fs::create_dir_all(dir.join("geometries")).unwrap();
        fs::create_dir_all(dir.join("places/empty")).unwrap();
        for i in 1..=count {
            fs::write(places.join(format!("{i}.geojson")), POIS).unwrap();
        }
        fs::write(dir.join("geometries/area.geojson"), AREA).unwrap();
    }

    fn test_config(dir: &std::path::Path, survey: bool, api_key: &str) -> AppConfig {
        toml::from_str(&format!(
            r#"
            [server]
            port = 0
            [map]
            api_key = "{}"
            center = [-73.05, -36.82]
            zoom = 13.0
            [data]
            static_dir = "{}"
            area_path = "geometries/area.geojson"
            db_path = "unused.db"
            [viewer]
            toggle = "all"
            [viewer.survey]
            enabled = {}
            item_id = "abc"
            portal_url = "https://www.arcgis.com"
            origin = "https://survey123.arcgis.com"
            [[profiles]]
            name = "student"
            picks = [{{ category = "cafe" }}]
            "#,
            api_key,
            dir.display(),
            survey
        ))
        .unwrap()
    }

    fn app_with(config: AppConfig, store: AssignmentStore) -> Router {
        let source = data_source(&config);
        router(Arc::new(AppState::new(config, store, source).unwrap()))
    }

    async fn app(dir: &std::path::Path, survey: bool) -> Router {
        write_sets(dir, 2);
        app_with(test_config(dir, survey, "pk.test"), AssignmentStore::in_memory().await.unwrap())
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Response) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        (resp.status(), resp)
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn location(resp: &Response) -> String {
        resp.headers()[header::LOCATION].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_reports_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), false).await;
        let (status, resp) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["map_configured"], true);
        assert_eq!(body["profiles"], json!(["student"]));
    }

    #[tokio::test]
    async fn join_allocates_ids_and_sets_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), false).await;

        let (status, resp) = send(&app, "GET", "/join/student", None).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/viewer/student/1");

        let (_, resp) = send(&app, "GET", "/join/student?uuid=alice", None).await;
        assert_eq!(location(&resp), "/viewer/student/alice");

        // Returning participants keep their set.
        let (_, resp) = send(&app, "GET", "/join/student?uuid=1", None).await;
        assert_eq!(location(&resp), "/viewer/student/1");

        let (status, _) = send(&app, "GET", "/join/student", None).await;
        assert_eq!(status, StatusCode::GONE);
    }

    #[tokio::test]
    async fn join_rejects_unknown_or_empty_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), false).await;
        for uri in ["/join/tourist", "/join/empty", "/join/..%2Fplaces"] {
            let (status, _) = send(&app, "GET", uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn viewer_without_assignment_shows_notice() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), false).await;
        let (status, _) = send(&app, "GET", "/viewer/student/9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(&app, "GET", "/join/student?uuid=9", None).await;
        let (status, resp) = send(&app, "GET", "/viewer/student/9", None).await;
        assert_eq!(status, StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("places/student/1.geojson"));
    }

    #[tokio::test]
    async fn scene_popup_and_toggles() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), false).await;
        send(&app, "GET", "/join/student?uuid=1", None).await;

        let (status, resp) = send(&app, "GET", "/api/scene/student/1", None).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["scene"]["layers"].as_array().unwrap().len(), 3);
        assert_eq!(body["scene"]["fit"]["padding"], 50);
        assert_eq!(body["controls"]["area"]["label"], "Hide area");
        assert_eq!(body["controls"]["pois"]["label"], "Hide POIs");

        let (_, resp) = send(&app, "GET", "/api/popup/student/1/0?click_lng=287.0", None).await;
        let popup = json_body(resp).await;
        assert!((popup["lng_lat"][0].as_f64().unwrap() - 286.95).abs() < 1e-9);
        let html = popup["html"].as_str().unwrap();
        assert!(html.contains("Café &lt;Sur&gt;"));
        assert!(html.contains("query=-36.82,-73.05"));

        let (status, _) = send(&app, "GET", "/api/popup/student/1/7", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, resp) = send(&app, "POST", "/api/session/student/1/toggle/area", None).await;
        let toggled = json_body(resp).await;
        assert_eq!(toggled["changes"][0], json!({"layer": "area-fill", "visibility": "none"}));
        assert_eq!(toggled["button"]["label"], "Show area");

        let (status, _) = send(&app, "POST", "/api/session/student/1/toggle/roads", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn toggle_without_scene_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), false).await;
        let (status, _) = send(&app, "POST", "/api/session/student/1/toggle/area", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn survey_events_drive_the_modal() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), true).await;
        let uri = "/api/session/student/1/survey";
        let open = json!({"type": "open_clicked", "library_loaded": true});

        // No session until the participant's scene has loaded.
        let (status, _) = send(&app, "POST", uri, Some(open.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        send(&app, "GET", "/join/student?uuid=1", None).await;
        let (status, _) = send(&app, "POST", uri, Some(open.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        send(&app, "GET", "/api/scene/student/1", None).await;

        let (_, resp) = send(&app, "POST", uri, Some(open)).await;
        let body = json_body(resp).await;
        assert_eq!(body["state"], "opening");
        assert_eq!(body["effects"][0]["effect"], "show_modal");

        send(&app, "POST", uri, Some(json!({"type": "widget_ready"}))).await;
        let message = json!({"type": "message", "origin": "https://survey123.arcgis.com",
                             "data": r#"{"event":"survey123:webform:submit"}"#});
        let (_, resp) = send(&app, "POST", uri, Some(message)).await;
        let body = json_body(resp).await;
        assert_eq!(body["state"], "submitting");
        assert_eq!(body["effects"][0], json!({"effect": "schedule_close", "after_ms": 1000}));
    }

    #[tokio::test]
    async fn unassigned_participants_get_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), true).await;
        let (status, _) = send(&app, "GET", "/api/scene/student/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "POST", "/api/session/student/ghost/survey", Some(json!({"type": "reset"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "POST", "/api/session/student/ghost/toggle/area", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_api_key_still_serves_the_viewer() {
        let dir = tempfile::tempdir().unwrap();
        write_sets(dir.path(), 1);
        let app = app_with(test_config(dir.path(), false, ""), AssignmentStore::in_memory().await.unwrap());
        send(&app, "GET", "/join/student?uuid=a", None).await;

        let (status, resp) = send(&app, "GET", "/viewer/student/a", None).await;
        assert_eq!(status, StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let page = String::from_utf8_lossy(&bytes);
        assert!(page.contains(r#"window.mapError = "map API key is not configured";"#));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_never_share_sets() {
        let dir = tempfile::tempdir().unwrap();
        write_sets(dir.path(), 16);
        let store = AssignmentStore::open(&dir.path().join("assignments.db")).await.unwrap();
        let app = app_with(test_config(dir.path(), false, "pk.test"), store.clone());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let app = app.clone();
                let uri = if i % 2 == 0 { format!("/join/student?uuid=u{i}") } else { "/join/student".to_string() };
                tokio::spawn(async move {
                    let resp = app.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
                    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
                    location(&resp)
                })
            })
            .collect();

        let mut viewers = std::collections::HashSet::new();
        for handle in handles {
            viewers.insert(handle.await.unwrap());
        }
        assert_eq!(viewers.len(), 16);
        assert_eq!(store.used_sets("student").await.unwrap().len(), 16);

        let (status, _) = send(&app, "GET", "/join/student?uuid=late", None).await;
        assert_eq!(status, StatusCode::GONE);
    }

    #[tokio::test]
    async fn survey_disabled_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), false).await;
        let (status, _) = send(&app, "POST", "/api/session/student/1/survey", Some(json!({"type": "reset"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
