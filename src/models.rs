use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a raw tracking event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FormView,
    StepView,
    StepCompletion,
    StepExit,
    FormSubmission,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::FormView,
        EventType::StepView,
        EventType::StepCompletion,
        EventType::StepExit,
        EventType::FormSubmission,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::FormView => "form_view",
            EventType::StepView => "step_view",
            EventType::StepCompletion => "step_completion",
            EventType::StepExit => "step_exit",
            EventType::FormSubmission => "form_submission",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Step-scoped events must carry a step id.
    pub fn is_step_scoped(&self) -> bool {
        matches!(
            self,
            EventType::StepView | EventType::StepCompletion | EventType::StepExit
        )
    }
}

/// Event structure (immutable once appended to the log)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub id: String,
    pub form_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
}

/// One step of a form, in funnel order
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FormStep {
    pub id: String,
    pub title: String,
}

/// The slice of a form definition analytics cares about
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FormDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub steps: Vec<FormStep>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DropOffSeverity {
    Low,
    Medium,
    High,
}

impl DropOffSeverity {
    pub fn classify(drop_off_rate: f64) -> Self {
        if drop_off_rate > 40.0 {
            DropOffSeverity::High
        } else if drop_off_rate > 20.0 {
            DropOffSeverity::Medium
        } else {
            DropOffSeverity::Low
        }
    }
}

/// Per-step funnel statistics (derived)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepAnalytics {
    pub step_id: String,
    pub step_name: String,
    pub views: usize,
    pub completions: usize,
    pub exits: usize,
    pub drop_off_rate: f64,
    pub severity: DropOffSeverity,
}

/// Per-form funnel statistics (derived, never hand-edited)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormAnalytics {
    pub form_id: String,
    pub total_views: usize,
    pub total_submissions: usize,
    pub conversion_rate: f64,
    pub step_analytics: Vec<StepAnalytics>,
}

/// Step with the worst drop-off on a form
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DropOffHighlight {
    pub step_name: String,
    pub drop_off_rate: f64,
}

/// Dashboard row for one form
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormSummary {
    pub form_id: String,
    pub total_views: usize,
    pub total_submissions: usize,
    pub conversion_rate: f64,
    pub highest_drop_off: Option<DropOffHighlight>,
}

/// Roll-up across every form with analytics
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub total_views: usize,
    pub total_submissions: usize,
    pub overall_conversion_rate: f64,
    pub forms: Vec<FormSummary>,
}

/// Raw event tallies, not deduplicated by session
#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventCounts {
    pub total_events: usize,
    pub form_views: usize,
    pub step_views: usize,
    pub step_completions: usize,
    pub step_exits: usize,
    pub form_submissions: usize,
    pub forms_with_analytics: usize,
}

/// Tracking input from API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInput {
    pub form_id: String,
    #[serde(default)]
    pub step_id: Option<String>,
    pub event_type: EventType,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// API Response
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data,
        }
    }
}
