use crate::config::{AppConfig, SurveyConfig};
use crate::viewer::bootstrap::{MapOptions, RuntimeMapConfig};
use crate::viewer::style::{DEFAULT_STYLE, POI_STYLES};
use crate::viewer::survey::{CLOSE_DELAY, RESET_DELAY, SUBMIT_EVENTS};
use anyhow::{Result, anyhow};
use serde::Serialize;
use tera::{Context, Tera};
use tracing::warn;

const HOME: &str = include_str!("../templates/home.html");
const VIEWER: &str = include_str!("../templates/viewer.html");
const NOTICE: &str = include_str!("../templates/notice.html");

pub struct PageRenderer {
    tera: Tera,
}

#[derive(Serialize)]
struct LegendEntry {
    category: &'static str,
    color: &'static str,
    icon: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SurveyPageConfig<'a> {
    enabled: bool,
    item_id: &'a str,
    portal_url: &'a str,
    origin: &'a str,
    submit_events: [&'static str; 2],
    close_delay_ms: u64,
    reset_delay_ms: u64,
}

impl<'a> From<&'a SurveyConfig> for SurveyPageConfig<'a> {
    fn from(survey: &'a SurveyConfig) -> Self {
        Self {
            enabled: survey.enabled,
            item_id: &survey.item_id,
            portal_url: &survey.portal_url,
            origin: &survey.origin,
            submit_events: SUBMIT_EVENTS,
            close_delay_ms: CLOSE_DELAY.as_millis() as u64,
            reset_delay_ms: RESET_DELAY.as_millis() as u64,
        }
    }
}

impl PageRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("home.html", HOME),
            ("viewer.html", VIEWER),
            ("notice.html", NOTICE),
        ])?;
        Ok(Self { tera })
    }

    fn render(&self, template: &str, context: &Context) -> Result<String> {
        self.tera
            .render(template, context)
            .map_err(|e| anyhow!("Failed to render {}: {:?}", template, e))
    }

    pub fn home(&self, config: &AppConfig) -> Result<String> {
        let mut context = Context::new();
        context.insert("location", &config.location);
        let profiles: Vec<_> = config
            .profiles
            .iter()
            .map(|p| serde_json::json!({ "name": p.name, "description": p.description }))
            .collect();
        context.insert("profiles", &profiles);
        self.render("home.html", &context)
    }

    pub fn notice(&self, message: &str) -> Result<String> {
        let mut context = Context::new();
        context.insert("message", message);
        self.render("notice.html", &context)
    }

    pub fn viewer(&self, config: &AppConfig, profile: &str, participant: &str, set_path: &str) -> Result<String> {
        let runtime = RuntimeMapConfig {
            api_key: config.map.api_key.clone(),
            center: config.map.center,
            zoom: config.map.zoom,
            rel_path: set_path.to_string(),
        };
        // A missing key still renders the page; the script shows the error in place of the map.
        let (options, map_error) = match MapOptions::from_runtime(&runtime, &config.map.style) {
            Ok(options) => (Some(options), None),
            Err(e) => {
                warn!(profile, participant, "viewer served without a map: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let mut legend: Vec<LegendEntry> = POI_STYLES
            .iter()
            .map(|(category, style)| LegendEntry { category: *category, color: style.color, icon: style.icon })
            .collect();
        legend.push(LegendEntry { category: "other", color: DEFAULT_STYLE.color, icon: DEFAULT_STYLE.icon });

        let mut context = Context::new();
        context.insert("profile", profile);
        context.insert("participant", participant);
        context.insert("map_config", &serde_json::to_string(&runtime)?);
        context.insert("map_options", &serde_json::to_string(&options)?);
        context.insert("map_error", &serde_json::to_string(&map_error)?);
        context.insert("survey", &serde_json::to_string(&SurveyPageConfig::from(&config.viewer.survey))?);
        context.insert("survey_enabled", &config.viewer.survey.enabled);
        context.insert("toggle", &config.viewer.toggle);
        context.insert("legend", &legend);
        self.render("viewer.html", &context)
    }
}
