//! Map viewer logic: everything the page decides, expressed as plain values.

pub mod bootstrap;
pub mod loader;
pub mod popup;
pub mod scene;
pub mod style;
pub mod survey;
pub mod view_state;
pub mod viewport;

use survey::SurveyModal;
use view_state::ViewState;

/// Per-participant UI state kept between page events.
#[derive(Debug, Clone)]
pub struct Session {
    pub view: ViewState,
    pub survey: SurveyModal,
}

impl Session {
    pub fn new(view: ViewState, survey_origin: &str) -> Self {
        Self {
            view,
            survey: SurveyModal::new(survey_origin),
        }
    }
}
