use std::collections::{HashMap, HashSet};

use crate::models::{
    AnalyticsEvent, AnalyticsOverview, DropOffHighlight, DropOffSeverity, EventCounts, EventType,
    FormAnalytics, FormDefinition, FormSummary, StepAnalytics,
};


/// Sessions seen on one step
#[derive(Debug, Default, Clone, PartialEq)]
struct StepSessions {
    views: HashSet<String>,
    completions: HashSet<String>,
    exits: HashSet<String>,
}

/// Running per-session funnel state for one form.
/// Built by replaying the form's events; `apply` folds in one more.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FunnelState {
    form_views: HashSet<String>,
    submissions: HashSet<String>,
    steps: HashMap<String, StepSessions>,
    event_count: usize,
}

impl FunnelState {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a AnalyticsEvent>) -> Self {
        let mut state = Self::default();
        for event in events {
            state.apply(event);
        }
        state
    }

    pub fn apply(&mut self, event: &AnalyticsEvent) {
        self.event_count += 1;
        let session = event.session_id.clone();

        match event.event_type {
            EventType::FormView => {
                self.form_views.insert(session);
            }
            EventType::FormSubmission => {
                self.submissions.insert(session);
            }
            EventType::StepView | EventType::StepCompletion | EventType::StepExit => {
                let Some(step_id) = event.step_id.as_ref() else {
                    return;
                };
                let step = self.steps.entry(step_id.clone()).or_default();
                let sessions = match event.event_type {
                    EventType::StepView => &mut step.views,
                    EventType::StepCompletion => &mut step.completions,
                    _ => &mut step.exits,
                };
                sessions.insert(session);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.event_count == 0
    }

    pub fn event_count(&self) -> usize {
        self.event_count
    }

    /// Distinct sessions that fired an explicit `step_exit` on this step.
    /// Diagnostic only; drop-off is inferred from the next step instead.
    pub fn explicit_exits(&self, step_id: &str) -> usize {
        self.steps.get(step_id).map_or(0, |s| s.exits.len())
    }

    fn step_views(&self, step_id: &str) -> usize {
        self.steps.get(step_id).map_or(0, |s| s.views.len())
    }

    fn step_completions(&self, step_id: &str) -> usize {
        self.steps.get(step_id).map_or(0, |s| s.completions.len())
    }

    /// Derive the funnel for `form`. `None` when no event was seen.
    pub fn project(&self, form: &FormDefinition) -> Option<FormAnalytics> {
        if self.is_empty() {
            return None;
        }

        let total_views = self.form_views.len();
        let total_submissions = self.submissions.len();

        let step_analytics = form
            .steps
            .iter()
            .enumerate()
            .map(|(idx, step)| {
                let views = self.step_views(&step.id);
                let reached_next = match form.steps.get(idx + 1) {
                    Some(next) => self.step_views(&next.id),
                    None => total_submissions,
                };
                let exits = views.saturating_sub(reached_next);
                let drop_off_rate = rate(exits, views);

                StepAnalytics {
                    step_id: step.id.clone(),
                    step_name: step.title.clone(),
                    views,
                    completions: self.step_completions(&step.id),
                    exits,
                    drop_off_rate,
                    severity: DropOffSeverity::classify(drop_off_rate),
                }
            })
            .collect();

        Some(FormAnalytics {
            form_id: form.id.clone(),
            total_views,
            total_submissions,
            conversion_rate: rate(total_submissions, total_views),
            step_analytics,
        })
    }
}

/// Full rescan: funnel for `form_id` from the raw log.
pub fn compute_form_analytics(
    form_id: &str,
    events: &[AnalyticsEvent],
    form: Option<&FormDefinition>,
) -> Option<FormAnalytics> {
    let form = form?;
    let state = FunnelState::from_events(events.iter().filter(|e| e.form_id == form_id));
    state.project(form)
}

/// `part / whole * 100` to two decimals, 0 when `whole` is 0.
fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Dashboard roll-up, best converting forms first.
pub fn build_overview<'a>(analytics: impl IntoIterator<Item = &'a FormAnalytics>) -> AnalyticsOverview {
    let mut forms: Vec<FormSummary> = analytics
        .into_iter()
        .map(|a| FormSummary {
            form_id: a.form_id.clone(),
            total_views: a.total_views,
            total_submissions: a.total_submissions,
            conversion_rate: a.conversion_rate,
            highest_drop_off: a
                .step_analytics
                .iter()
                .filter(|s| s.drop_off_rate > 0.0)
                .fold(None::<&StepAnalytics>, |worst, s| match worst {
                    Some(w) if w.drop_off_rate >= s.drop_off_rate => Some(w),
                    _ => Some(s),
                })
                .map(|s| DropOffHighlight {
                    step_name: s.step_name.clone(),
                    drop_off_rate: s.drop_off_rate,
                }),
        })
        .collect();

    forms.sort_by(|a, b| {
        b.conversion_rate
            .total_cmp(&a.conversion_rate)
            .then_with(|| a.form_id.cmp(&b.form_id))
    });

    let total_views: usize = forms.iter().map(|f| f.total_views).sum();
    let total_submissions: usize = forms.iter().map(|f| f.total_submissions).sum();

    AnalyticsOverview {
        total_views,
        total_submissions,
        overall_conversion_rate: rate(total_submissions, total_views),
        forms,
    }
}

pub fn count_events(events: &[AnalyticsEvent], forms_with_analytics: usize) -> EventCounts {
    let mut counts = EventCounts {
        total_events: events.len(),
        forms_with_analytics,
        ..Default::default()
    };
    for event in events {
        match event.event_type {
            EventType::FormView => counts.form_views += 1,
            EventType::StepView => counts.step_views += 1,
            EventType::StepCompletion => counts.step_completions += 1,
            EventType::StepExit => counts.step_exits += 1,
            EventType::FormSubmission => counts.form_submissions += 1,
        }
    }
    counts
}
