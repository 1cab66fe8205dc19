//! Follow-up questions answered against the context a run left in the session.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::classify::ProviderFailure;
use super::llm::{self, DEFAULT_REASONING_MODEL};
use super::openrouter::CompletionClient;
use super::pipeline::ViewScope;
use super::sanitize::sanitize;
use super::ChatMessage;
use crate::error::{CompletionError, ExplainError, CONTEXT_MISSING_MESSAGE};
use crate::session::{CredentialStore, SessionContext};

pub const RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_ATTEMPTS: u32 = 2;
const FOLLOW_UP_KEY_MISSING: &str = "OpenRouter API key not found";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUpOutcome {
    /// Blank question; nothing was sent.
    Skipped,
    /// Sanitized answer, already appended to the session.
    Answered(String),
    /// Transient failure outlived its retry; the message was appended to the
    /// session's error log instead of being raised.
    Recorded(String),
    /// The owning view closed before the answer arrived.
    Discarded,
}

/// One submission. At most one of `answer` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpExchange {
    pub question: String,
    pub answer: Option<String>,
    pub error: Option<String>,
}

/// Read-only view of an engine's backoff state, usable while the engine
/// itself is borrowed by an in-flight call.
#[derive(Debug, Clone)]
pub struct RetryIndicator {
    retrying: Arc<AtomicBool>,
}

impl RetryIndicator {
    pub fn is_retrying(&self) -> bool {
        self.retrying.load(Ordering::SeqCst)
    }
}

/// Raises the retrying flag for its lifetime. Dropping the call mid-backoff
/// still lowers it.
struct RetryingGuard<'a>(&'a AtomicBool);

impl<'a> RetryingGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RetryingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct FollowUpEngine {
    client: CompletionClient,
    retry_delay: Duration,
    retrying: Arc<AtomicBool>,
}

impl FollowUpEngine {
    pub fn new(client: CompletionClient) -> Self {
        Self {
            client,
            retry_delay: RETRY_DELAY,
            retrying: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// True while waiting out the backoff before the retry.
    pub fn is_retrying(&self) -> bool {
        self.retrying.load(Ordering::SeqCst)
    }

    pub fn retry_indicator(&self) -> RetryIndicator {
        RetryIndicator {
            retrying: self.retrying.clone(),
        }
    }

    pub async fn ask(
        &self,
        question: &str,
        session: &SessionContext,
        model: &str,
        api_key: &str,
    ) -> Result<FollowUpOutcome, ExplainError> {
        self.ask_in_scope(question, session, model, api_key, &ViewScope::new())
            .await
    }

    /// Asks one question. Only a 502 is retried, once, after the backoff.
    /// Other failures are returned to the caller and never logged to the
    /// session.
    pub async fn ask_in_scope(
        &self,
        question: &str,
        session: &SessionContext,
        model: &str,
        api_key: &str,
        scope: &ViewScope,
    ) -> Result<FollowUpOutcome, ExplainError> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(FollowUpOutcome::Skipped);
        }

        let vision_text = session
            .vision_text()
            .ok_or_else(|| ExplainError::FollowUpFailure(CONTEXT_MISSING_MESSAGE.to_string()))?;
        let explanation = session.explanation_text().unwrap_or_default();
        let messages = [ChatMessage::user_text(llm::build_follow_up_prompt(
            &vision_text,
            &explanation,
            question,
        ))];

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.client.complete(model, &messages, api_key).await;
            if !scope.is_open() {
                log::debug!("View closed during follow-up; discarding result");
                return Ok(FollowUpOutcome::Discarded);
            }

            let failure = match result {
                Ok(raw) => {
                    let answer = sanitize(&raw);
                    if answer.is_empty() {
                        return Err(ExplainError::FollowUpFailure(
                            "The model returned an empty answer.".to_string(),
                        ));
                    }
                    session.append_follow_up_answer(&answer);
                    log::info!("Follow-up answered on attempt {}", attempt);
                    return Ok(FollowUpOutcome::Answered(answer));
                }
                Err(CompletionError::Network(_)) => return Err(ExplainError::Network),
                Err(CompletionError::Api { status, body }) => {
                    ProviderFailure::classify(status, &body)
                }
            };

            if !failure.is_transient() {
                log::warn!("Follow-up failed with code {}", failure.code);
                return Err(ExplainError::FollowUpFailure(failure.message));
            }

            if attempt < MAX_ATTEMPTS {
                log::warn!(
                    "Follow-up hit transient code {}; retrying in {:?}",
                    failure.code,
                    self.retry_delay
                );
                let _retrying = RetryingGuard::raise(&self.retrying);
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            log::warn!("Follow-up still failing after {} attempts; recording", attempt);
            let message = ExplainError::FollowUpTransient.to_string();
            session.append_follow_up_error(&message);
            return Ok(FollowUpOutcome::Recorded(message));
        }
    }
}

/// The follow-up input box: holds the pending question and resolves the key
/// and model for each submission.
pub struct FollowUpComposer {
    engine: FollowUpEngine,
    credentials: Arc<CredentialStore>,
    session: SessionContext,
    scope: ViewScope,
    pending_question: String,
}

impl FollowUpComposer {
    pub fn new(
        engine: FollowUpEngine,
        credentials: Arc<CredentialStore>,
        session: SessionContext,
        scope: ViewScope,
    ) -> Self {
        Self {
            engine,
            credentials,
            session,
            scope,
            pending_question: String::new(),
        }
    }

    pub fn engine(&self) -> &FollowUpEngine {
        &self.engine
    }

    pub fn set_question(&mut self, question: impl Into<String>) {
        self.pending_question = question.into();
    }

    pub fn pending_question(&self) -> &str {
        &self.pending_question
    }

    /// Model of the run that produced the context, else the saved default.
    fn model(&self) -> String {
        if let Some(request) = self.session.request() {
            return request.reasoning_model;
        }
        match self.credentials.default_model() {
            Ok(Some(model)) => model,
            Ok(None) => DEFAULT_REASONING_MODEL.to_string(),
            Err(e) => {
                log::warn!("Failed to read default model: {}", e);
                DEFAULT_REASONING_MODEL.to_string()
            }
        }
    }

    /// Submits the pending question. Returns `Ok(None)` when there was
    /// nothing to send or the view closed first. The pending question is
    /// cleared on an answer or a recorded transient failure and kept on any
    /// other error.
    pub async fn submit(&mut self) -> Result<Option<FollowUpExchange>, ExplainError> {
        let question = self.pending_question.trim().to_string();
        if question.is_empty() {
            return Ok(None);
        }

        let api_key = match self.credentials.api_key() {
            Ok(Some(key)) => key,
            Ok(None) => return Err(ExplainError::MissingInput(FOLLOW_UP_KEY_MISSING.to_string())),
            Err(e) => {
                log::error!("Failed to read API key: {}", e);
                return Err(ExplainError::MissingInput(FOLLOW_UP_KEY_MISSING.to_string()));
            }
        };

        let outcome = self
            .engine
            .ask_in_scope(&question, &self.session, &self.model(), &api_key, &self.scope)
            .await?;

        let exchange = match outcome {
            FollowUpOutcome::Skipped | FollowUpOutcome::Discarded => return Ok(None),
            FollowUpOutcome::Answered(answer) => FollowUpExchange {
                question,
                answer: Some(answer),
                error: None,
            },
            FollowUpOutcome::Recorded(message) => FollowUpExchange {
                question,
                answer: None,
                error: Some(message),
            },
        };
        self.pending_question.clear();
        Ok(Some(exchange))
    }
}
