mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{closed_port_url, credentials_with_key, MockUpstream, TEST_IMAGE, TEST_KEY};
use visual_explain_lib::ai::llm::{DEFAULT_REASONING_MODEL, VISION_MODEL};
use visual_explain_lib::ai::openrouter::CompletionClient;
use visual_explain_lib::ai::pipeline::{ExplainPipeline, PipelineRequest, RunState, ViewScope};
use visual_explain_lib::ai::ExplanationMode;
use visual_explain_lib::config::AppConfig;
use visual_explain_lib::error::{ExplainError, NETWORK_ERROR_MESSAGE, VISION_UNINTELLIGIBLE_MESSAGE};
use visual_explain_lib::session::storage::API_KEY;
use visual_explain_lib::session::{CredentialStore, SessionContext};

const FLOWCHART: &str = "A flowchart showing query execution steps: parse, optimize, execute, fetch.";

fn dbms_request() -> PipelineRequest {
    PipelineRequest {
        image: TEST_IMAGE.to_string(),
        subject: Some("DBMS".to_string()),
        user_prompt: None,
        explanation_mode: ExplanationMode::Beginner,
        reasoning_model: DEFAULT_REASONING_MODEL.to_string(),
    }
}

fn pipeline_for(
    upstream: &MockUpstream,
    credentials: Arc<CredentialStore>,
    session: &SessionContext,
) -> ExplainPipeline {
    ExplainPipeline::new(upstream.client(), credentials, session.clone())
}

#[tokio::test]
async fn successful_run_walks_every_stage() {
    let upstream = MockUpstream::start().await;
    upstream
        .reply_text(FLOWCHART)
        .reply_text("# Query Execution\n\n**Parse**: the `SQL` text is checked.\n- Optimize picks a plan\n* Execute runs it");
    let session = SessionContext::new();

    let run = pipeline_for(&upstream, credentials_with_key(TEST_KEY), &session)
        .run(&dbms_request(), &ViewScope::new())
        .await;

    assert_eq!(
        run.history,
        vec![RunState::Idle, RunState::Vision, RunState::Reasoning, RunState::Done]
    );
    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.error, None);

    let explanation = run.explanation_text.clone().expect("explanation");
    assert!(!explanation.is_empty());
    for marker in ['#', '*', '`'] {
        assert!(!explanation.contains(marker), "{:?} left in {:?}", marker, explanation);
    }
    assert!(explanation.lines().all(|line| !line.starts_with('-')));
    assert!(explanation.contains("Parse: the SQL text is checked."));

    assert_eq!(run.vision_text.as_deref(), Some(FLOWCHART));
    assert_eq!(session.vision_text().as_deref(), Some(FLOWCHART));
    assert_eq!(session.explanation_text(), Some(explanation));
    assert_eq!(session.image().as_deref(), Some(TEST_IMAGE));
    assert_eq!(session.request(), Some(dbms_request()));
}

#[tokio::test]
async fn stages_send_the_expected_requests() {
    let upstream = MockUpstream::start().await;
    upstream.reply_text(FLOWCHART).reply_text("Step 1. Parse.");
    let session = SessionContext::new();

    pipeline_for(&upstream, credentials_with_key(TEST_KEY), &session)
        .run(&dbms_request(), &ViewScope::new())
        .await;

    let requests = upstream.requests();
    assert_eq!(requests.len(), 2);

    let vision = &requests[0];
    assert_eq!(vision.model(), VISION_MODEL);
    assert_eq!(vision.body["messages"][0]["role"], "user");
    assert_eq!(vision.body["messages"][0]["content"][0]["type"], "text");
    assert_eq!(vision.body["messages"][0]["content"][1]["type"], "image_url");
    assert_eq!(vision.body["messages"][0]["content"][1]["image_url"]["url"], TEST_IMAGE);
    assert_eq!(vision.authorization.as_deref(), Some("Bearer sk-or-test-key"));
    assert_eq!(vision.title.as_deref(), Some("VisualExplain"));
    assert_eq!(vision.referer.as_deref(), Some("VisualExplain"));

    let reasoning = &requests[1];
    assert_eq!(reasoning.model(), DEFAULT_REASONING_MODEL);
    assert!(reasoning.body["messages"][0]["content"].is_string());
    let prompt = reasoning.prompt_text();
    assert!(prompt.contains(FLOWCHART));
    assert!(prompt.contains("DBMS"));
    assert!(prompt.contains("beginner"));
}

#[tokio::test]
async fn missing_key_fails_without_network() {
    let upstream = MockUpstream::start().await;
    let session = SessionContext::new();

    let run = pipeline_for(
        &upstream,
        Arc::new(CredentialStore::open_in_memory().unwrap()),
        &session,
    )
    .run(&dbms_request(), &ViewScope::new())
    .await;

    assert_eq!(run.history, vec![RunState::Idle, RunState::Failed]);
    assert_eq!(run.error, Some(ExplainError::key_missing()));
    assert!(upstream.requests().is_empty());
}

#[tokio::test]
async fn unrouted_vision_model_is_reported_and_reasoning_skipped() {
    let upstream = MockUpstream::start().await;
    upstream.reply(
        404,
        r#"{"error":{"message":"No endpoints found","metadata":{"detail":"No matching route for model"}}}"#,
    );
    let session = SessionContext::new();

    let run = pipeline_for(&upstream, credentials_with_key(TEST_KEY), &session)
        .run(&dbms_request(), &ViewScope::new())
        .await;

    assert_eq!(run.state, RunState::Failed);
    assert_eq!(run.history, vec![RunState::Idle, RunState::Vision, RunState::Failed]);
    assert_eq!(run.model_unavailable.as_deref(), Some(VISION_MODEL));
    assert!(run.error_message.unwrap().contains(VISION_MODEL));
    assert_eq!(upstream.requests().len(), 1);
    assert_eq!(run.vision_text, None);
    assert_eq!(session.vision_text(), None);
    assert_eq!(session.explanation_text(), None);
}

#[tokio::test]
async fn other_vision_failures_get_a_generic_message() {
    let upstream = MockUpstream::start().await;
    upstream.reply(500, r#"{"error":{"message":"upstream exploded at node 7"}}"#);
    let session = SessionContext::new();

    let run = pipeline_for(&upstream, credentials_with_key(TEST_KEY), &session)
        .run(&dbms_request(), &ViewScope::new())
        .await;

    assert_eq!(run.error, Some(ExplainError::VisionUnintelligible));
    assert_eq!(run.error_message.as_deref(), Some(VISION_UNINTELLIGIBLE_MESSAGE));
    assert_eq!(run.model_unavailable, None);
    assert_eq!(upstream.requests().len(), 1);
}

#[tokio::test]
async fn reasoning_failure_surfaces_provider_text() {
    let upstream = MockUpstream::start().await;
    let provider_body = r#"{"error":{"message":"This model's context window was exceeded","code":400}}"#;
    upstream.reply_text(FLOWCHART).reply(400, provider_body);
    let session = SessionContext::new();

    let run = pipeline_for(&upstream, credentials_with_key(TEST_KEY), &session)
        .run(&dbms_request(), &ViewScope::new())
        .await;

    assert_eq!(
        run.history,
        vec![RunState::Idle, RunState::Vision, RunState::Reasoning, RunState::Failed]
    );
    assert_eq!(run.error_message.as_deref(), Some(provider_body));
    assert_eq!(run.explanation_text, None);
    assert_eq!(session.explanation_text(), None);
    assert_eq!(session.vision_text().as_deref(), Some(FLOWCHART));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_network_error() {
    let config = AppConfig {
        api_url: closed_port_url().await,
        ..AppConfig::default()
    };
    let session = SessionContext::new();
    let pipeline = ExplainPipeline::new(
        CompletionClient::new(&config),
        credentials_with_key(TEST_KEY),
        session.clone(),
    );

    let run = pipeline.run(&dbms_request(), &ViewScope::new()).await;

    assert_eq!(run.error, Some(ExplainError::Network));
    assert_eq!(run.error_message.as_deref(), Some(NETWORK_ERROR_MESSAGE));
    assert_eq!(session.vision_text(), None);
}

#[tokio::test]
async fn key_saved_mid_session_is_used_by_the_next_run() {
    let upstream = MockUpstream::start().await;
    upstream
        .reply_text(FLOWCHART)
        .reply_text("first")
        .reply_text(FLOWCHART)
        .reply_text("second");
    let credentials = credentials_with_key("sk-or-old");
    let session = SessionContext::new();
    let pipeline = pipeline_for(&upstream, credentials.clone(), &session);

    pipeline.run(&dbms_request(), &ViewScope::new()).await;
    credentials.set(API_KEY, "sk-or-new").unwrap();
    let run = pipeline.run(&dbms_request(), &ViewScope::new()).await;

    assert_eq!(run.explanation_text.as_deref(), Some("second"));
    let auth: Vec<_> = upstream
        .requests()
        .into_iter()
        .map(|r| r.authorization.unwrap_or_default())
        .collect();
    assert_eq!(
        auth,
        vec![
            "Bearer sk-or-old",
            "Bearer sk-or-old",
            "Bearer sk-or-new",
            "Bearer sk-or-new"
        ]
    );
}

#[tokio::test]
async fn results_for_a_closed_view_are_discarded() {
    let upstream = MockUpstream::start().await;
    upstream.reply_text(FLOWCHART);
    let session = SessionContext::new();
    let scope = ViewScope::new();
    scope.close();

    let run = pipeline_for(&upstream, credentials_with_key(TEST_KEY), &session)
        .run(&dbms_request(), &scope)
        .await;

    assert_eq!(upstream.requests().len(), 1);
    assert_eq!(run.state, RunState::Vision);
    assert_eq!(run.vision_text, None);
    assert_eq!(session.vision_text(), None);
}

#[tokio::test]
async fn closing_the_view_during_reasoning_discards_the_explanation() {
    let upstream = MockUpstream::start().await;
    upstream
        .reply_text(FLOWCHART)
        .reply_after(Duration::from_millis(300), 200, common::completion_body("Too late."));
    let session = SessionContext::new();
    let scope = ViewScope::new();
    let pipeline = pipeline_for(&upstream, credentials_with_key(TEST_KEY), &session);

    let close_when_reasoning_starts = async {
        upstream.wait_for_requests(2).await;
        scope.close();
    };
    let request = dbms_request();
    let (run, ()) = tokio::join!(
        pipeline.run(&request, &scope),
        close_when_reasoning_starts
    );

    assert_eq!(upstream.requests().len(), 2);
    assert_eq!(run.state, RunState::Reasoning);
    assert_eq!(
        run.history,
        vec![RunState::Idle, RunState::Vision, RunState::Reasoning]
    );
    assert_eq!(run.explanation_text, None);
    assert_eq!(run.error, None);
    assert_eq!(session.explanation_text(), None);
}

#[tokio::test]
async fn a_new_run_drops_the_previous_context() {
    let upstream = MockUpstream::start().await;
    upstream
        .reply_text(FLOWCHART)
        .reply_text("Explained.")
        .reply(500, "vision down");
    let session = SessionContext::new();
    let pipeline = pipeline_for(&upstream, credentials_with_key(TEST_KEY), &session);

    let first = pipeline.run(&dbms_request(), &ViewScope::new()).await;
    assert_eq!(first.state, RunState::Done);
    session.append_follow_up_answer("Earlier answer.");

    let second = pipeline.run(&dbms_request(), &ViewScope::new()).await;
    assert_eq!(second.state, RunState::Failed);
    assert_eq!(second.history[0], RunState::Idle);
    assert_eq!(session.vision_text(), None);
    assert_eq!(session.explanation_text(), None);
    assert!(session.follow_up_answers().is_empty());
}
