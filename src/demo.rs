//! Sample traffic for dashboards: replays a realistic lead-form funnel.

use tracing::info;

use crate::error::Result;
use crate::models::{EventType, FormDefinition};
use crate::service::AnalyticsService;

/// (visitors reaching the step, visitors continuing past it)
pub const SAMPLE_FUNNEL: [(usize, usize); 9] = [
    (584, 253),
    (253, 225),
    (225, 207),
    (207, 148),
    (148, 148),
    (148, 114),
    (114, 98),
    (98, 52),
    (52, 0),
];

/// Replays `SAMPLE_FUNNEL` over the first steps of `form`, one session per
/// visitor. Visitor `i` on a step is the same session as visitor `i` on the
/// previous step, so continuing visitors line up across steps. Only a form
/// whose last step is covered gets submissions. Returns the number of events
/// recorded.
pub fn seed_sample_funnel(service: &AnalyticsService, form: &FormDefinition) -> Result<usize> {
    let run = uuid::Uuid::new_v4().simple().to_string();
    let covered = form.steps.len().min(SAMPLE_FUNNEL.len());
    let mut recorded = 0;

    for (idx, step) in form.steps.iter().take(covered).enumerate() {
        let (views, continues) = SAMPLE_FUNNEL[idx];
        let is_last = idx + 1 == form.steps.len();

        for visitor in 0..views {
            let session = format!("sample_{run}_{visitor}");
            let session = Some(session.as_str());

            if idx == 0 {
                service.record(EventType::FormView, &form.id, None, session)?;
                recorded += 1;
            }
            service.record(EventType::StepView, &form.id, Some(&step.id), session)?;
            recorded += 1;

            if visitor < continues {
                service.record(EventType::StepCompletion, &form.id, Some(&step.id), session)?;
                recorded += 1;
                if is_last {
                    service.record(EventType::FormSubmission, &form.id, None, session)?;
                    recorded += 1;
                }
            }
        }
    }

    info!(form_id = %form.id, steps = covered, events = recorded, "sample funnel seeded");
    Ok(recorded)
}
