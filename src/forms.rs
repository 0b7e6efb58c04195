//! Read-only access to form definitions owned by the form builder.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::Deserialize;
use tracing::warn;

use crate::models::FormDefinition;

pub trait FormDefinitionProvider: Send + Sync {
    fn get_form(&self, form_id: &str) -> Option<FormDefinition>;

    fn form_ids(&self) -> Vec<String>;
}

#[derive(Default)]
pub struct InMemoryFormProvider {
    forms: RwLock<HashMap<String, FormDefinition>>,
}

impl InMemoryFormProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forms(forms: impl IntoIterator<Item = FormDefinition>) -> Self {
        let provider = Self::new();
        for form in forms {
            provider.upsert(form);
        }
        provider
    }

    pub fn upsert(&self, form: FormDefinition) {
        let mut forms = self.forms.write().unwrap_or_else(|e| e.into_inner());
        forms.insert(form.id.clone(), form);
    }
}

impl FormDefinitionProvider for InMemoryFormProvider {
    fn get_form(&self, form_id: &str) -> Option<FormDefinition> {
        let forms = self.forms.read().unwrap_or_else(|e| e.into_inner());
        forms.get(form_id).cloned()
    }

    fn form_ids(&self) -> Vec<String> {
        let forms = self.forms.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<_> = forms.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FormsDocument {
    Wrapped { forms: Vec<FormDefinition> },
    Bare(Vec<FormDefinition>),
}

/// Forms exported by the builder as JSON. Re-read on every lookup so edits
/// made by the builder show up without a restart.
pub struct JsonFileFormProvider {
    path: PathBuf,
}

impl JsonFileFormProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Vec<FormDefinition> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "forms file unreadable");
                return Vec::new();
            }
        };
        match serde_json::from_str::<FormsDocument>(&raw) {
            Ok(FormsDocument::Wrapped { forms }) | Ok(FormsDocument::Bare(forms)) => forms,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "error parsing forms file");
                Vec::new()
            }
        }
    }
}

impl FormDefinitionProvider for JsonFileFormProvider {
    fn get_form(&self, form_id: &str) -> Option<FormDefinition> {
        self.load().into_iter().find(|f| f.id == form_id)
    }

    fn form_ids(&self) -> Vec<String> {
        self.load().into_iter().map(|f| f.id).collect()
    }
}

/// Closest known form id to `unknown`, if any is similar enough.
pub fn suggest_form_id(provider: &dyn FormDefinitionProvider, unknown: &str) -> Option<String> {
    provider
        .form_ids()
        .into_iter()
        .map(|id| (strsim::jaro_winkler(unknown, &id), id))
        .filter(|(score, _)| *score >= 0.8)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, id)| id)
}
