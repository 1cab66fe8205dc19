use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::ai::pipeline::PipelineRequest;

pub const EXPLANATION_DATA: &str = "explanationData";
pub const IMAGE: &str = "image";
pub const VISION_TEXT: &str = "visionText";
pub const EXPLANATION_TEXT: &str = "explanationText";
pub const FOLLOW_UP_ANSWERS: &str = "followUpAnswers";
pub const FOLLOW_UP_ERRORS: &str = "followUpErrors";

/// Separator placed before each follow-up answer in the running explanation.
pub const FOLLOW_UP_SEPARATOR: &str = "\n\nFollow-up: ";

/// What export collaborators may read. Nothing flows back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportSnapshot {
    pub image: Option<String>,
    pub explanation_text: Option<String>,
    pub follow_up_answers: Vec<String>,
}

/// Key-value area scoped to one session.
///
/// Clones share the same storage. Values are plain strings; the two follow-up
/// sequences are stored as JSON arrays.
#[derive(Debug, Clone)]
pub struct SessionContext {
    id: String,
    started_at: DateTime<Utc>,
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let ctx = Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            entries: Arc::new(Mutex::new(HashMap::new())),
        };
        log::debug!("Session {} started", ctx.id);
        ctx
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.entries.lock().insert(key.to_string(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Session end.
    pub fn clear(&self) {
        self.entries.lock().clear();
        log::debug!("Session {} cleared", self.id);
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Discarding unreadable session entry {}: {}", key, e);
                None
            }
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, raw),
            Err(e) => log::warn!("Failed to store session entry {}: {}", key, e),
        }
    }

    pub fn request(&self) -> Option<PipelineRequest> {
        self.get_json(EXPLANATION_DATA)
    }

    pub fn set_request(&self, request: &PipelineRequest) {
        self.set_json(EXPLANATION_DATA, request);
        self.set(IMAGE, request.image.clone());
    }

    pub fn image(&self) -> Option<String> {
        self.get(IMAGE)
    }

    pub fn vision_text(&self) -> Option<String> {
        self.get(VISION_TEXT).filter(|v| !v.trim().is_empty())
    }

    pub fn set_vision_text(&self, text: &str) {
        self.set(VISION_TEXT, text);
    }

    pub fn explanation_text(&self) -> Option<String> {
        self.get(EXPLANATION_TEXT)
    }

    pub fn set_explanation_text(&self, text: &str) {
        self.set(EXPLANATION_TEXT, text);
    }

    pub fn follow_up_answers(&self) -> Vec<String> {
        self.get_json(FOLLOW_UP_ANSWERS).unwrap_or_default()
    }

    pub fn follow_up_errors(&self) -> Vec<String> {
        self.get_json(FOLLOW_UP_ERRORS).unwrap_or_default()
    }

    /// Appends to the answer log and to the running explanation so later
    /// follow-ups see it as prior context.
    pub fn append_follow_up_answer(&self, answer: &str) {
        let mut answers = self.follow_up_answers();
        answers.push(answer.to_string());
        self.set_json(FOLLOW_UP_ANSWERS, &answers);

        let mut explanation = self.explanation_text().unwrap_or_default();
        explanation.push_str(FOLLOW_UP_SEPARATOR);
        explanation.push_str(answer);
        self.set_explanation_text(&explanation);
    }

    pub fn append_follow_up_error(&self, message: &str) {
        let mut errors = self.follow_up_errors();
        errors.push(message.to_string());
        self.set_json(FOLLOW_UP_ERRORS, &errors);
    }

    /// Removes one recorded follow-up error, as when the user dismisses it.
    pub fn dismiss_follow_up_error(&self, index: usize) -> Option<String> {
        let mut errors = self.follow_up_errors();
        if index >= errors.len() {
            return None;
        }
        let removed = errors.remove(index);
        self.set_json(FOLLOW_UP_ERRORS, &errors);
        Some(removed)
    }

    /// Drops everything a previous run produced before a new run starts.
    pub fn reset_run(&self) {
        let mut entries = self.entries.lock();
        for key in [VISION_TEXT, EXPLANATION_TEXT, FOLLOW_UP_ANSWERS, FOLLOW_UP_ERRORS] {
            entries.remove(key);
        }
    }

    pub fn export_snapshot(&self) -> ExportSnapshot {
        ExportSnapshot {
            image: self.image(),
            explanation_text: self.explanation_text(),
            follow_up_answers: self.follow_up_answers(),
        }
    }
}
