//! Survey modal lifecycle.
//!
//! The embedded survey widget reports completion either through its own
//! `formSubmitted` callback or through a `postMessage` from the survey origin.
//! Both paths feed [`SurveyModal::handle`], and a latch makes sure the
//! completion runs once per widget.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const SURVEY_ORIGIN: &str = "https://survey123.arcgis.com";
pub const SUBMIT_EVENTS: [&str; 2] = ["survey123:webform:formSubmitted", "survey123:webform:submit"];
pub const CLOSE_DELAY: Duration = Duration::from_millis(1000);
pub const RESET_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyState {
    Closed,
    Opening,
    Ready,
    Submitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissReason {
    Overlay,
    Escape,
    CloseButton,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurveyEvent {
    OpenClicked { library_loaded: bool },
    WidgetReady,
    NativeSubmitted,
    Message { origin: String, data: Value },
    CloseTimerFired,
    ResetTimerFired,
    Dismissed { reason: DismissReason },
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SurveyEffect {
    ShowModal,
    HideModal,
    ConstructWidget,
    ShowUnavailable,
    MarkLoaded,
    ScheduleClose { after_ms: u64 },
    ScheduleReset { after_ms: u64 },
    DestroyWidget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Widget {
    Absent,
    Pending,
    Ready,
}

#[derive(Debug, Clone)]
pub struct SurveyModal {
    origin: String,
    state: SurveyState,
    widget: Widget,
    submitted: bool,
    reset_scheduled: bool,
    constructions: usize,
}

impl Default for SurveyModal {
    fn default() -> Self {
        Self::new(SURVEY_ORIGIN)
    }
}

impl SurveyModal {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            state: SurveyState::Closed,
            widget: Widget::Absent,
            submitted: false,
            reset_scheduled: false,
            constructions: 0,
        }
    }

    pub fn state(&self) -> SurveyState {
        self.state
    }

    /// Number of widget instances built so far.
    pub fn constructions(&self) -> usize {
        self.constructions
    }

    pub fn handle(&mut self, event: SurveyEvent) -> Vec<SurveyEffect> {
        let effects = match event {
            SurveyEvent::OpenClicked { library_loaded } => self.open(library_loaded),
            SurveyEvent::WidgetReady => self.widget_ready(),
            SurveyEvent::NativeSubmitted => self.complete(),
            SurveyEvent::Message { origin, data } => {
                if self.is_submit_message(&origin, &data) {
                    self.complete()
                } else {
                    Vec::new()
                }
            }
            SurveyEvent::CloseTimerFired => self.auto_close(),
            SurveyEvent::ResetTimerFired => self.teardown(),
            SurveyEvent::Dismissed { reason } => {
                debug!(?reason, "survey dismissed");
                self.dismiss()
            }
            SurveyEvent::Reset => {
                let mut effects = self.dismiss();
                effects.extend(self.teardown());
                effects
            }
        };
        debug!(state = ?self.state, ?effects, "survey transition");
        effects
    }

    fn open(&mut self, library_loaded: bool) -> Vec<SurveyEffect> {
        if self.state != SurveyState::Closed {
            return Vec::new();
        }
        let mut effects = vec![SurveyEffect::ShowModal];
        self.state = SurveyState::Opening;
        match self.widget {
            Widget::Absent if !library_loaded => effects.push(SurveyEffect::ShowUnavailable),
            Widget::Absent => {
                self.widget = Widget::Pending;
                self.constructions += 1;
                effects.push(SurveyEffect::ConstructWidget);
            }
            Widget::Pending => {}
            Widget::Ready => self.state = SurveyState::Ready,
        }
        effects
    }

    fn widget_ready(&mut self) -> Vec<SurveyEffect> {
        if self.widget != Widget::Pending {
            return Vec::new();
        }
        self.widget = Widget::Ready;
        if self.state == SurveyState::Opening {
            self.state = SurveyState::Ready;
        }
        vec![SurveyEffect::MarkLoaded]
    }

    fn complete(&mut self) -> Vec<SurveyEffect> {
        if self.submitted || self.state != SurveyState::Ready {
            return Vec::new();
        }
        self.submitted = true;
        self.state = SurveyState::Submitting;
        vec![SurveyEffect::ScheduleClose { after_ms: CLOSE_DELAY.as_millis() as u64 }]
    }

    fn auto_close(&mut self) -> Vec<SurveyEffect> {
        if !self.submitted || self.reset_scheduled {
            return Vec::new();
        }
        let mut effects = self.dismiss();
        self.reset_scheduled = true;
        effects.push(SurveyEffect::ScheduleReset { after_ms: RESET_DELAY.as_millis() as u64 });
        effects
    }

    fn dismiss(&mut self) -> Vec<SurveyEffect> {
        if self.state == SurveyState::Closed {
            return Vec::new();
        }
        self.state = SurveyState::Closed;
        vec![SurveyEffect::HideModal]
    }

    fn teardown(&mut self) -> Vec<SurveyEffect> {
        let had_widget = self.widget != Widget::Absent;
        self.widget = Widget::Absent;
        self.submitted = false;
        self.reset_scheduled = false;
        if !had_widget {
            return Vec::new();
        }
        let mut effects = vec![SurveyEffect::DestroyWidget];
        // Reopened before the reset landed: the modal is showing, so build a fresh widget.
        if self.state != SurveyState::Closed {
            self.state = SurveyState::Opening;
            self.widget = Widget::Pending;
            self.constructions += 1;
            effects.push(SurveyEffect::ConstructWidget);
        }
        effects
    }

    fn is_submit_message(&self, origin: &str, data: &Value) -> bool {
        if origin != self.origin {
            return false;
        }
        let Some(raw) = data.as_str() else {
            return false;
        };
        // Anything that is not a JSON object with a known event name is noise.
        serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(|msg| msg.get("event").and_then(Value::as_str).map(str::to_owned))
            .is_some_and(|event| SUBMIT_EVENTS.contains(&event.as_str()))
    }
}
