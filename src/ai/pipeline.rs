//! Two-stage explanation: a fixed vision model describes the image, then the
//! user's model turns that description into an explanation.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::classify::ProviderFailure;
use super::llm::{self, VISION_MODEL};
use super::openrouter::CompletionClient;
use super::sanitize::sanitize;
use super::{ChatMessage, ExplanationMode};
use crate::error::{CompletionError, ExplainError};
use crate::session::{CredentialStore, SessionContext};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    /// Image as a `data:` URI.
    pub image: String,
    pub subject: Option<String>,
    pub user_prompt: Option<String>,
    pub explanation_mode: ExplanationMode,
    pub reasoning_model: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Vision,
    Reasoning,
    Done,
    Failed,
}

/// One explanation attempt. Never reused across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub state: RunState,
    pub vision_text: Option<String>,
    pub explanation_text: Option<String>,
    pub error_message: Option<String>,
    /// Names the vision model when it is not provisioned for the account.
    pub model_unavailable: Option<String>,
    pub error: Option<ExplainError>,
    /// Every state entered, starting with `Idle`.
    pub history: Vec<RunState>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            vision_text: None,
            explanation_text: None,
            error_message: None,
            model_unavailable: None,
            error: None,
            history: vec![RunState::Idle],
        }
    }
}

impl PipelineRun {
    fn enter(&mut self, state: RunState) {
        log::info!("Pipeline {:?} -> {:?}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    fn fail(&mut self, error: ExplainError) {
        log::warn!("Pipeline failed: {}", error);
        self.error_message = Some(error.to_string());
        if let ExplainError::ModelUnavailable { model } = &error {
            self.model_unavailable = Some(model.clone());
        }
        self.error = Some(error);
        self.enter(RunState::Failed);
    }
}

/// Lifetime of the view that started a run. Once closed, results arriving
/// for that run are dropped without touching the run or the session.
#[derive(Debug, Clone)]
pub struct ViewScope {
    open: Arc<AtomicBool>,
}

impl Default for ViewScope {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewScope {
    pub fn new() -> Self {
        Self {
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

pub struct ExplainPipeline {
    client: CompletionClient,
    credentials: Arc<CredentialStore>,
    session: SessionContext,
}

impl ExplainPipeline {
    pub fn new(
        client: CompletionClient,
        credentials: Arc<CredentialStore>,
        session: SessionContext,
    ) -> Self {
        Self {
            client,
            credentials,
            session,
        }
    }

    /// Runs vision then reasoning. Always returns the run record; failures
    /// end in `RunState::Failed` with `error` set.
    ///
    /// If `scope` is closed when a call returns, the run is handed back as it
    /// stood before that call and nothing is written to the session.
    pub async fn run(&self, request: &PipelineRequest, scope: &ViewScope) -> PipelineRun {
        let mut run = PipelineRun::default();

        if request.image.trim().is_empty() {
            run.fail(ExplainError::no_image());
            return run;
        }

        // Re-read on every run so a key saved mid-session takes effect.
        let api_key = match self.credentials.api_key() {
            Ok(Some(key)) => key,
            Ok(None) => {
                run.fail(ExplainError::key_missing());
                return run;
            }
            Err(e) => {
                log::error!("Failed to read API key: {}", e);
                run.fail(ExplainError::key_missing());
                return run;
            }
        };

        self.session.reset_run();
        self.session.set_request(request);

        run.enter(RunState::Vision);
        let vision_result = self
            .client
            .complete(VISION_MODEL, &llm::build_vision_messages(&request.image), &api_key)
            .await;
        if !scope.is_open() {
            log::debug!("View closed during vision stage; discarding result");
            return run;
        }

        let vision_text = match vision_result {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                run.fail(ExplainError::VisionUnintelligible);
                return run;
            }
            Err(e) => {
                run.fail(vision_error(e));
                return run;
            }
        };
        self.session.set_vision_text(&vision_text);
        let prompt = llm::build_reasoning_prompt(
            &vision_text,
            request.subject.as_deref(),
            request.user_prompt.as_deref(),
            request.explanation_mode,
        );
        run.vision_text = Some(vision_text);

        run.enter(RunState::Reasoning);
        let reasoning_result = self
            .client
            .complete(
                &request.reasoning_model,
                &[ChatMessage::user_text(prompt)],
                &api_key,
            )
            .await;
        if !scope.is_open() {
            log::debug!("View closed during reasoning stage; discarding result");
            return run;
        }

        match reasoning_result {
            Ok(raw) => {
                let clean = sanitize(&raw);
                if clean.is_empty() {
                    run.fail(ExplainError::ReasoningFailure(
                        "The reasoning model returned an empty explanation.".to_string(),
                    ));
                } else {
                    self.session.set_explanation_text(&clean);
                    run.explanation_text = Some(clean);
                    run.enter(RunState::Done);
                }
            }
            Err(e) => run.fail(reasoning_error(e)),
        }

        run
    }
}

fn vision_error(error: CompletionError) -> ExplainError {
    match error {
        CompletionError::Network(_) => ExplainError::Network,
        CompletionError::Api { status, body } => {
            let failure = ProviderFailure::classify(status, &body);
            if failure.is_model_unavailable() {
                ExplainError::ModelUnavailable {
                    model: VISION_MODEL.to_string(),
                }
            } else {
                ExplainError::VisionUnintelligible
            }
        }
    }
}

fn reasoning_error(error: CompletionError) -> ExplainError {
    match error {
        CompletionError::Network(_) => ExplainError::Network,
        CompletionError::Api { status, body } => {
            ExplainError::ReasoningFailure(ProviderFailure::classify(status, &body).verbatim())
        }
    }
}
