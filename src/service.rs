//! Analytics facade: tracking calls append to the event log and keep the
//! derived per-form funnels current; query calls read the derived cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{AnalyticsError, Result};
use crate::forms::FormDefinitionProvider;
use crate::models::{AnalyticsEvent, AnalyticsOverview, EventCounts, EventType, FormAnalytics};
use crate::projections::{build_overview, count_events, FunnelState};
use crate::session::{generate_event_id, SessionIdentity, SessionStore};
use crate::store::EventStore;

#[derive(Default)]
struct DerivedState {
    funnels: HashMap<String, FunnelState>,
    cache: HashMap<String, FormAnalytics>,
}

pub struct AnalyticsService {
    store: Arc<dyn EventStore>,
    forms: Arc<dyn FormDefinitionProvider>,
    session: SessionIdentity,
    // guards appends too, so log order and derived state never diverge
    derived: Mutex<DerivedState>,
}

impl AnalyticsService {
    /// Builds the service and replays the persisted log. A log that cannot
    /// be read is treated as empty.
    pub fn new(
        store: Arc<dyn EventStore>,
        forms: Arc<dyn FormDefinitionProvider>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let service = Self {
            store,
            forms,
            session: SessionIdentity::new(sessions),
            derived: Mutex::new(DerivedState::default()),
        };
        service.refresh_all_analytics();
        service
    }

    // Derived state can always be rebuilt from the log, so a poisoned lock
    // is recovered rather than propagated.
    fn derived(&self) -> MutexGuard<'_, DerivedState> {
        self.derived.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn session_id(&self) -> String {
        self.session.get_or_create_session_id()
    }

    pub fn track_form_view(&self, form_id: &str) {
        self.track(EventType::FormView, form_id, None);
    }

    pub fn track_step_view(&self, form_id: &str, step_id: &str) {
        self.track(EventType::StepView, form_id, Some(step_id));
    }

    pub fn track_step_completion(&self, form_id: &str, step_id: &str) {
        self.track(EventType::StepCompletion, form_id, Some(step_id));
    }

    pub fn track_step_exit(&self, form_id: &str, step_id: &str) {
        self.track(EventType::StepExit, form_id, Some(step_id));
    }

    pub fn track_form_submission(&self, form_id: &str) {
        self.track(EventType::FormSubmission, form_id, None);
    }

    /// Fire-and-forget: a failed append is logged and dropped.
    fn track(&self, kind: EventType, form_id: &str, step_id: Option<&str>) {
        if let Err(e) = self.record(kind, form_id, step_id, None) {
            warn!(
                form_id = %form_id,
                event_type = kind.as_str(),
                error = %e,
                "analytics event not recorded"
            );
        }
    }

    /// Append one event and recompute its form. Uses the service's own
    /// session when `session_id` is `None`.
    pub fn record(
        &self,
        kind: EventType,
        form_id: &str,
        step_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<AnalyticsEvent> {
        if form_id.trim().is_empty() {
            return Err(AnalyticsError::Validation("formId must not be empty".into()));
        }
        if kind.is_step_scoped() && step_id.map_or(true, |s| s.trim().is_empty()) {
            return Err(AnalyticsError::Validation(format!(
                "{} requires a stepId",
                kind.as_str()
            )));
        }

        let session_id = match session_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => self.session_id(),
        };

        let event = AnalyticsEvent {
            id: generate_event_id(),
            form_id: form_id.to_string(),
            step_id: step_id.map(str::to_string),
            event_type: kind,
            timestamp: Utc::now(),
            session_id,
        };

        let mut derived = self.derived();
        self.store.append(&event)?;
        derived
            .funnels
            .entry(event.form_id.clone())
            .or_default()
            .apply(&event);
        self.recompute(&mut derived, &event.form_id);

        debug!(
            event_id = %event.id,
            form_id = %event.form_id,
            event_type = kind.as_str(),
            session_id = %event.session_id,
            "analytics event recorded"
        );
        Ok(event)
    }

    fn recompute(&self, derived: &mut DerivedState, form_id: &str) -> Option<FormAnalytics> {
        let analytics = match (self.forms.get_form(form_id), derived.funnels.get(form_id)) {
            (Some(form), Some(funnel)) => funnel.project(&form),
            _ => None,
        };
        match &analytics {
            Some(a) => {
                derived.cache.insert(form_id.to_string(), a.clone());
            }
            None => {
                derived.cache.remove(form_id);
            }
        }
        analytics
    }

    /// Cached analytics, computed on demand when absent.
    /// `None` for unknown forms and forms without traffic.
    pub fn get_form_analytics(&self, form_id: &str) -> Option<FormAnalytics> {
        let mut derived = self.derived();
        if let Some(cached) = derived.cache.get(form_id) {
            return Some(cached.clone());
        }
        self.recompute(&mut derived, form_id)
    }

    /// Rebuild every form's funnel from the persisted log.
    pub fn refresh_all_analytics(&self) {
        let mut derived = self.derived();

        // one pass over the log, grouped by form
        let events = match self.store.all_events() {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "event log unreadable, treating as empty");
                Vec::new()
            }
        };

        let mut funnels: HashMap<String, FunnelState> = HashMap::new();
        for event in &events {
            funnels
                .entry(event.form_id.clone())
                .or_default()
                .apply(event);
        }

        derived.funnels = funnels;
        derived.cache.clear();
        let form_ids: Vec<String> = derived.funnels.keys().cloned().collect();
        for form_id in &form_ids {
            self.recompute(&mut derived, form_id);
        }

        info!(
            forms = form_ids.len(),
            events = derived.funnels.values().map(FunnelState::event_count).sum::<usize>(),
            forms_with_analytics = derived.cache.len(),
            "analytics refreshed"
        );
    }

    pub fn overview(&self) -> AnalyticsOverview {
        let derived = self.derived();
        build_overview(derived.cache.values())
    }

    pub fn event_counts(&self) -> Result<EventCounts> {
        let events = self.store.all_events()?;
        let forms_with_analytics = self.derived().cache.len();
        Ok(count_events(&events, forms_with_analytics))
    }

    /// Newest first, optionally limited to one form.
    pub fn recent_events(&self, form_id: Option<&str>, limit: usize) -> Result<Vec<AnalyticsEvent>> {
        let events = match form_id {
            Some(id) => self.store.events_for_form(id)?,
            None => self.store.all_events()?,
        };
        Ok(events.into_iter().rev().take(limit).collect())
    }

    /// Administrative reset: drops the log and everything derived from it.
    pub fn reset(&self) -> Result<()> {
        let mut derived = self.derived();
        self.store.clear()?;
        *derived = DerivedState::default();
        info!("analytics data cleared");
        Ok(())
    }

    pub fn forms(&self) -> &dyn FormDefinitionProvider {
        self.forms.as_ref()
    }
}
