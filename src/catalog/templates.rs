use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};

use crate::db::KeyValueStore;
use crate::models::GestureTemplate;

/// Storage key of the template catalog.
pub const TEMPLATES_KEY: &str = "signs";

/// In-memory template catalog mirrored to the persistence backend.
///
/// Names are unique. Saving a template under an existing name replaces the
/// stored one in place (last write wins).
pub struct TemplateStore {
    templates: Vec<GestureTemplate>,
    backend: Arc<dyn KeyValueStore>,
}

impl TemplateStore {
    pub fn load(backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let templates = match backend.load(TEMPLATES_KEY)? {
            Some(bytes) => {
                let stored: Vec<GestureTemplate> = serde_json::from_slice(&bytes)
                    .with_context(|| format!("failed to decode '{TEMPLATES_KEY}'"))?;
                dedupe_by_name(stored)
            }
            None => Vec::new(),
        };

        info!("Loaded {} gesture templates", templates.len());
        Ok(Self { templates, backend })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GestureTemplate> {
        self.templates.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(|t| t.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&GestureTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Stores `template`, returning the one it replaced, if any.
    pub fn insert(&mut self, template: GestureTemplate) -> Option<GestureTemplate> {
        let replaced = match self.templates.iter_mut().find(|t| t.name == template.name) {
            Some(slot) => Some(std::mem::replace(slot, template)),
            None => {
                self.templates.push(template);
                None
            }
        };
        self.persist();
        replaced
    }

    pub fn remove(&mut self, name: &str) -> Option<GestureTemplate> {
        let position = self.templates.iter().position(|t| t.name == name)?;
        let removed = self.templates.remove(position);
        self.persist();
        Some(removed)
    }

    /// Removes every template and returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.templates.len();
        self.templates.clear();
        self.persist();
        count
    }

    fn persist(&self) {
        let result = serde_json::to_vec(&self.templates)
            .context("failed to encode templates")
            .and_then(|bytes| self.backend.save(TEMPLATES_KEY, bytes));
        if let Err(err) = result {
            error!("Failed to persist template catalog: {err:#}");
        }
    }
}

/// Older catalogs could hold several entries per name. Keep the latest one
/// at the position of the first.
fn dedupe_by_name(stored: Vec<GestureTemplate>) -> Vec<GestureTemplate> {
    let mut unique: Vec<GestureTemplate> = Vec::with_capacity(stored.len());
    for template in stored {
        match unique.iter_mut().find(|t| t.name == template.name) {
            Some(slot) => {
                warn!("Duplicate template '{}' in storage; keeping the latest", template.name);
                *slot = template;
            }
            None => unique.push(template),
        }
    }
    unique
}
