//! Integration tests for the session controller
//!
//! These tests drive a full Conductor against a scripted backend whose
//! response bodies are fed chunk by chunk from the test. Tests cover:
//! - Prompt assembly from page context and the history window
//! - Commit-on-success and untouched history on failure
//! - Cancellation, timeout and interrupt
//! - Paint coalescing while streaming
//! - Fragment decoding across chunk boundaries

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use samaan_conductor::backend::ByteStream;
use samaan_conductor::{
    CompletionBackend, CompletionRequest, Conductor, ConductorConfig, ConductorMessage,
    ConductorState, NotifyLevel, PageContext, Progress, Role, SurfaceEvent, TransportError,
    TurnOutcome, ValidationError, CANCELLED_NOTICE, NO_RESPONSE,
};

type Chunk = Result<Bytes, TransportError>;

// =============================================================================
// Scripted backend
// =============================================================================

/// Backend that hands out pre-registered body streams in order and records
/// every request it receives
#[derive(Default)]
struct ScriptedBackend {
    streams: Mutex<VecDeque<Result<mpsc::UnboundedReceiver<Chunk>, TransportError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    /// Register the next response body; the returned sender feeds it
    fn script(&self) -> mpsc::UnboundedSender<Chunk> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().push_back(Ok(rx));
        tx
    }

    /// Register a complete response body
    fn script_body(&self, body: &str) {
        let tx = self.script();
        tx.send(Ok(Bytes::from(body.to_string()))).unwrap();
    }

    /// Register a request that fails before any body arrives
    fn script_error(&self, error: TransportError) {
        self.streams.lock().unwrap().push_back(Err(error));
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn open_stream(&self, request: &CompletionRequest) -> Result<ByteStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no scripted response".into())))?;
        Ok(UnboundedReceiverStream::new(next).boxed())
    }
}

fn delta(text: &str) -> String {
    let payload = serde_json::json!({ "choices": [{ "delta": { "content": text } }] });
    format!("data: {payload}\n\n")
}

fn reply(parts: &[&str]) -> String {
    let mut body: String = parts.iter().map(|p| delta(p)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

fn setup() -> (
    Conductor<ScriptedBackend>,
    Arc<ScriptedBackend>,
    mpsc::Receiver<ConductorMessage>,
) {
    setup_with_capacity(1024)
}

/// Like [`setup`], with a surface channel that only holds `capacity` messages
fn setup_with_capacity(
    capacity: usize,
) -> (
    Conductor<ScriptedBackend>,
    Arc<ScriptedBackend>,
    mpsc::Receiver<ConductorMessage>,
) {
    let backend = Arc::new(ScriptedBackend::default());
    let (tx, rx) = mpsc::channel(capacity);
    let conductor = Conductor::with_backend(Arc::clone(&backend), ConductorConfig::default(), tx);
    (conductor, backend, rx)
}

fn drain(rx: &mut mpsc::Receiver<ConductorMessage>) -> Vec<ConductorMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

async fn finish(conductor: &mut Conductor<ScriptedBackend>) -> TurnOutcome {
    conductor.finish().await.unwrap()
}

// =============================================================================
// Completion
// =============================================================================

#[tokio::test]
async fn test_turn_streams_and_commits() {
    let (mut conductor, backend, mut rx) = setup();
    backend.script_body(&reply(&["## Title\n", "Some **bold** text"]));

    let outcome = conductor.run_turn("Summarise this").await.unwrap();
    let TurnOutcome::Completed { content, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(content, "## Title\nSome **bold** text");

    let turns = conductor.history().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].content, "Summarise this");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].content, content);

    let messages = drain(&mut rx);
    let final_render = messages
        .iter()
        .rev()
        .find_map(|m| match m {
            ConductorMessage::Render {
                document,
                complete: true,
                ..
            } => Some(document.clone()),
            _ => None,
        })
        .expect("final render");
    assert_eq!(
        final_render.to_html(),
        r#"<h3>Title</h3><span class="md-line">Some <strong>bold</strong> text</span><br>"#
    );
    assert!(matches!(
        messages.last(),
        Some(ConductorMessage::State {
            state: ConductorState::Idle
        })
    ));
}

#[tokio::test]
async fn test_request_carries_page_and_sampling_settings() {
    let (mut conductor, backend, _rx) = setup();
    conductor
        .load_page(PageContext {
            url: "https://example.com/pricing".into(),
            title: "Pricing".into(),
            body_text: "Plans start at $5.".into(),
            headings: vec!["H1: Pricing".into()],
            ..Default::default()
        })
        .await;
    backend.script_body(&reply(&["ok"]));

    conductor.run_turn("How much?").await.unwrap();

    let request = &backend.requests()[0];
    assert!(request.stream);
    assert_eq!(request.max_tokens, 800);
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].role, "system");
    assert!(request.messages[0]
        .content
        .contains("--- PAGE: Pricing (https://example.com/pricing) ---"));
    assert!(request.messages[0].content.contains("HEADINGS:\nH1: Pricing"));
    assert!(request.messages[0].content.contains("CONTENT:\nPlans start at $5."));
    assert_eq!(request.messages[1].role, "user");
    assert_eq!(request.messages[1].content, "How much?");
}

#[tokio::test]
async fn test_history_window_is_bounded() {
    let (mut conductor, backend, _rx) = setup();
    for i in 0..10 {
        backend.script_body(&reply(&[&format!("answer {i}")]));
        conductor.run_turn(&format!("question {i}")).await.unwrap();
    }
    assert_eq!(conductor.history().len(), 20);

    backend.script_body(&reply(&["last"]));
    conductor.run_turn("question 10").await.unwrap();

    let request = backend.requests().pop().unwrap();
    // system + 8 history turns + new user turn
    assert_eq!(request.messages.len(), 10);
    assert_eq!(request.messages[1].content, "question 6");
    assert_eq!(request.messages[8].content, "answer 9");
    assert_eq!(request.messages[9].content, "question 10");
}

#[tokio::test]
async fn test_empty_response_commits_placeholder() {
    let (mut conductor, backend, mut rx) = setup();
    backend.script_body("data: [DONE]\n\n");

    let outcome = conductor.run_turn("hello?").await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Completed { ref content, .. } if content == NO_RESPONSE));
    assert_eq!(conductor.history().turns()[1].content, NO_RESPONSE);

    let messages = drain(&mut rx);
    let hides = messages
        .iter()
        .filter(|m| matches!(m, ConductorMessage::Loading { visible: false }))
        .count();
    assert_eq!(hides, 1);
}

#[tokio::test]
async fn test_fragment_split_inside_multibyte_char() {
    let (mut conductor, backend, _rx) = setup();
    let body = reply(&["naïve café"]);
    let bytes = body.as_bytes();
    let split = body.find('ï').unwrap() + 1;

    let tx = backend.script();
    tx.send(Ok(Bytes::copy_from_slice(&bytes[..split]))).unwrap();
    tx.send(Ok(Bytes::copy_from_slice(&bytes[split..]))).unwrap();
    drop(tx);

    let outcome = conductor.run_turn("spell it").await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Completed { ref content, .. } if content == "naïve café"));
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_submit_rejections_touch_nothing() {
    let (mut conductor, backend, mut rx) = setup();

    assert_eq!(
        conductor.submit(" \n\t ").await,
        Err(ValidationError::EmptyMessage)
    );
    assert!(drain(&mut rx).is_empty());

    let _tx = backend.script();
    conductor.submit("first").await.unwrap();
    assert_eq!(
        conductor.submit("second").await,
        Err(ValidationError::TurnInFlight)
    );
    assert!(conductor.history().is_empty());
    assert_eq!(conductor.state(), ConductorState::Sending);
}

// =============================================================================
// Failure paths
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting() {
    let (mut conductor, backend, mut rx) = setup();
    let tx = backend.script();
    tx.send(Ok(Bytes::from(delta("partial ")))).unwrap();

    conductor.submit("explain").await.unwrap();
    assert_eq!(conductor.step().await, Progress::Fragment);

    let token = conductor.cancel_handle().unwrap();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel();
    });

    let outcome = finish(&mut conductor).await;
    assert!(matches!(
        outcome,
        TurnOutcome::Failed {
            error: TransportError::Cancelled,
            ..
        }
    ));
    assert!(conductor.history().is_empty());
    assert!(!conductor.is_busy());
    assert_eq!(conductor.state(), ConductorState::Idle);

    let messages = drain(&mut rx);
    assert!(messages.iter().any(|m| matches!(
        m,
        ConductorMessage::Notice { level: NotifyLevel::Warning, content, .. } if content == CANCELLED_NOTICE
    )));
    assert!(messages.iter().any(|m| matches!(
        m,
        ConductorMessage::State {
            state: ConductorState::Error
        }
    )));
    drop(tx);
}

#[tokio::test]
async fn test_cancel_before_first_fragment_hides_loading() {
    let (mut conductor, backend, mut rx) = setup();
    let _tx = backend.script();

    conductor.submit("explain").await.unwrap();
    let outcome = conductor.cancel_active().await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Failed { .. }));
    assert!(conductor.cancel_active().await.is_none());

    let messages = drain(&mut rx);
    assert!(messages
        .iter()
        .any(|m| matches!(m, ConductorMessage::Loading { visible: false })));
    assert_eq!(conductor.step().await, Progress::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_silent_endpoint_times_out() {
    let (mut conductor, backend, mut rx) = setup();
    let _tx = backend.script();

    conductor.submit("anyone there?").await.unwrap();
    let started = tokio::time::Instant::now();
    let outcome = finish(&mut conductor).await;

    assert!(matches!(
        outcome,
        TurnOutcome::Failed {
            error: TransportError::Timeout,
            ..
        }
    ));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(conductor.history().is_empty());

    let notice = drain(&mut rx).into_iter().find_map(|m| match m {
        ConductorMessage::Notice { content, .. } => Some(content),
        _ => None,
    });
    assert_eq!(notice.as_deref(), Some(CANCELLED_NOTICE));
}

#[tokio::test(start_paused = true)]
async fn test_slow_answer_outlives_timeout() {
    let (mut conductor, backend, _rx) = setup();
    let tx = backend.script();
    tokio::spawn(async move {
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = tx.send(Ok(Bytes::from(delta("x"))));
        }
        let _ = tx.send(Ok(Bytes::from_static(b"data: [DONE]\n\n")));
    });

    let started = tokio::time::Instant::now();
    let outcome = conductor.run_turn("take your time").await.unwrap();

    let TurnOutcome::Completed { content, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(content, "x".repeat(40));
    assert!(started.elapsed() >= Duration::from_secs(40));
    assert_eq!(conductor.history().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_step_still_commits() {
    let (mut conductor, backend, mut rx) = setup_with_capacity(3);
    backend.script_body("data: [DONE]\n\n");

    conductor.submit("hello").await.unwrap();
    let blocked = tokio::time::timeout(Duration::from_millis(50), conductor.step()).await;
    assert!(blocked.is_err());

    assert_eq!(conductor.history().len(), 2);
    assert_eq!(conductor.history().turns()[1].content, NO_RESPONSE);
    assert_eq!(conductor.state(), ConductorState::Idle);
    assert!(!conductor.is_busy());
    assert_eq!(conductor.step().await, Progress::Idle);
    assert_eq!(drain(&mut rx).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_step_still_ends_failed_turn() {
    let (mut conductor, backend, _rx) = setup_with_capacity(3);
    backend.script_error(TransportError::Network("connection refused".into()));

    conductor.submit("hello").await.unwrap();
    let blocked = tokio::time::timeout(Duration::from_millis(50), conductor.step()).await;
    assert!(blocked.is_err());

    assert!(conductor.history().is_empty());
    assert_eq!(conductor.state(), ConductorState::Idle);
    assert!(!conductor.is_busy());
    assert_eq!(
        conductor.finish().await,
        Err(ValidationError::NoActiveTurn)
    );
}

#[tokio::test]
async fn test_http_error_surfaces_detail() {
    let (mut conductor, backend, mut rx) = setup();
    backend.script_error(TransportError::from_http_body(
        401,
        r#"{"error":{"message":"Invalid API key"}}"#,
    ));

    let outcome = conductor.run_turn("hi").await.unwrap();
    assert!(matches!(
        outcome,
        TurnOutcome::Failed {
            error: TransportError::Http { status: 401, .. },
            ..
        }
    ));
    assert!(conductor.history().is_empty());

    let notice = drain(&mut rx).into_iter().find_map(|m| match m {
        ConductorMessage::Notice { level, content, .. } => Some((level, content)),
        _ => None,
    });
    assert_eq!(
        notice,
        Some((NotifyLevel::Error, "⚠️ **Error:** Invalid API key".to_string()))
    );
}

#[tokio::test]
async fn test_failed_turn_keeps_previous_history() {
    let (mut conductor, backend, _rx) = setup();
    backend.script_body(&reply(&["first answer"]));
    conductor.run_turn("first").await.unwrap();

    let tx = backend.script();
    tx.send(Ok(Bytes::from(delta("half an ans")))).unwrap();
    tx.send(Err(TransportError::Network("connection reset".into())))
        .unwrap();

    let outcome = conductor.run_turn("second").await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Failed { .. }));
    assert_eq!(conductor.history().len(), 2);
    assert_eq!(conductor.history().turns()[1].content, "first answer");
}

// =============================================================================
// Interrupt
// =============================================================================

#[tokio::test]
async fn test_interrupt_replaces_active_turn() {
    let (mut conductor, backend, mut rx) = setup();
    let old = backend.script();
    old.send(Ok(Bytes::from(delta("old ")))).unwrap();

    let old_id = conductor.submit("first question").await.unwrap();
    assert_eq!(conductor.step().await, Progress::Fragment);

    backend.script_body(&reply(&["new answer"]));
    let new_id = conductor.interrupt("second question").await.unwrap();
    assert_ne!(old_id, new_id);

    // Late output for the old turn goes nowhere
    let _ = old.send(Ok(Bytes::from(delta("late"))));

    let outcome = finish(&mut conductor).await;
    assert!(matches!(outcome, TurnOutcome::Completed { ref content, .. } if content == "new answer"));

    let turns = conductor.history().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].content, "second question");
    assert_eq!(turns[1].content, "new answer");

    let messages = drain(&mut rx);
    let old_tokens: Vec<_> = messages
        .iter()
        .filter_map(|m| match m {
            ConductorMessage::Token { turn_id, text } if *turn_id == old_id => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(old_tokens, vec!["old "]);
}

#[tokio::test]
async fn test_interrupt_with_empty_text_keeps_turn() {
    let (mut conductor, backend, _rx) = setup();
    let _tx = backend.script();
    conductor.submit("first").await.unwrap();

    assert_eq!(
        conductor.interrupt("   ").await,
        Err(ValidationError::EmptyMessage)
    );
    assert!(conductor.is_busy());
}

// =============================================================================
// Paint coalescing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_burst_of_fragments_paints_once() {
    let (mut conductor, backend, mut rx) = setup();
    backend.script_body(&reply(&["a", "b", "c", "d", "e"]));

    conductor.run_turn("letters").await.unwrap();

    let renders: Vec<bool> = drain(&mut rx)
        .into_iter()
        .filter_map(|m| match m {
            ConductorMessage::Render { complete, .. } => Some(complete),
            _ => None,
        })
        .collect();
    assert_eq!(renders, vec![true]);
}

#[tokio::test(start_paused = true)]
async fn test_paint_at_frame_tick_sees_latest_text() {
    let (mut conductor, backend, mut rx) = setup();
    let tx = backend.script();
    tx.send(Ok(Bytes::from(format!("{}{}", delta("Hello "), delta("**wor"))))).unwrap();

    conductor.submit("greet").await.unwrap();
    assert_eq!(conductor.step().await, Progress::Fragment);
    assert_eq!(conductor.step().await, Progress::Fragment);
    assert_eq!(conductor.step().await, Progress::Painted);

    let document = drain(&mut rx)
        .into_iter()
        .find_map(|m| match m {
            ConductorMessage::Render {
                document,
                complete: false,
                ..
            } => Some(document),
            _ => None,
        })
        .expect("mid-stream paint");
    assert_eq!(document.plain_text(), "Hello **wor");

    tx.send(Ok(Bytes::from(reply(&["ld**"])))).unwrap();
    let outcome = finish(&mut conductor).await;
    assert!(matches!(outcome, TurnOutcome::Completed { ref content, .. } if content == "Hello **world**"));
}

#[tokio::test(start_paused = true)]
async fn test_no_paint_after_cancel() {
    let (mut conductor, backend, mut rx) = setup();
    let tx = backend.script();
    tx.send(Ok(Bytes::from(delta("partial")))).unwrap();

    conductor.submit("explain").await.unwrap();
    assert_eq!(conductor.step().await, Progress::Fragment);
    drain(&mut rx);

    tokio::time::advance(Duration::from_millis(40)).await;
    conductor.cancel_handle().unwrap().cancel();

    let progress = conductor.step().await;
    assert!(matches!(
        progress,
        Progress::Finished(TurnOutcome::Failed {
            error: TransportError::Cancelled,
            ..
        })
    ));
    assert!(!drain(&mut rx)
        .iter()
        .any(|m| matches!(m, ConductorMessage::Render { .. })));
    drop(tx);
}

// =============================================================================
// Context transitions
// =============================================================================

#[tokio::test]
async fn test_refresh_context_clears_history() {
    let (mut conductor, backend, mut rx) = setup();
    backend.script_body(&reply(&["answer"]));
    conductor.run_turn("question").await.unwrap();
    drain(&mut rx);

    let event: SurfaceEvent = serde_json::from_str(
        r#"{"RefreshContext":{"response":{"success":true,"data":{
            "url":"https://example.com/a","title":"Example","bodyText":"Some text"
        }}}}"#,
    )
    .unwrap();
    conductor.handle_event(event).await.unwrap();

    assert!(conductor.history().is_empty());
    assert_eq!(conductor.page().unwrap().title, "Example");

    let messages = drain(&mut rx);
    assert!(matches!(messages[0], ConductorMessage::Cleared));
    assert!(messages.iter().any(|m| matches!(
        m,
        ConductorMessage::ContextStatus { loaded: true, text } if text == "Example · 9 chars"
    )));
    assert!(messages.iter().any(|m| matches!(
        m,
        ConductorMessage::Welcome { content } if content.starts_with("**Page loaded:** \"Example\"")
    )));
}

#[tokio::test]
async fn test_refresh_failure_drops_page() {
    let (mut conductor, _backend, mut rx) = setup();
    conductor
        .load_page(PageContext {
            url: "https://example.com".into(),
            ..Default::default()
        })
        .await;
    drain(&mut rx);

    let loaded = conductor
        .refresh_context(samaan_conductor::ExtractionResponse {
            success: false,
            data: None,
            error: None,
        })
        .await;
    assert!(!loaded);
    assert!(conductor.page().is_none());

    let status = drain(&mut rx).into_iter().find_map(|m| match m {
        ConductorMessage::ContextStatus { loaded, text } => Some((loaded, text)),
        _ => None,
    });
    assert_eq!(status, Some((false, "Unknown error".to_string())));
}

#[tokio::test]
async fn test_clear_cancels_active_turn_silently() {
    let (mut conductor, backend, mut rx) = setup();
    let _tx = backend.script();
    conductor.submit("question").await.unwrap();
    drain(&mut rx);

    conductor.handle_event(SurfaceEvent::ClearChat).await.unwrap();
    assert!(!conductor.is_busy());
    assert_eq!(conductor.state(), ConductorState::Idle);

    let messages = drain(&mut rx);
    assert!(!messages
        .iter()
        .any(|m| matches!(m, ConductorMessage::Notice { .. })));
    assert!(messages
        .iter()
        .any(|m| matches!(m, ConductorMessage::Welcome { .. })));
}

#[tokio::test]
async fn test_clarify_selection_prefills_input() {
    let (mut conductor, _backend, mut rx) = setup();

    conductor
        .handle_event(SurfaceEvent::ClarifySelection {
            text: "short".into(),
        })
        .await
        .unwrap();
    assert!(drain(&mut rx).is_empty());

    conductor
        .handle_event(SurfaceEvent::ClarifySelection {
            text: "the mitochondria is the powerhouse".into(),
        })
        .await
        .unwrap();
    let messages = drain(&mut rx);
    assert!(matches!(
        messages.as_slice(),
        [ConductorMessage::PrefillInput { text }] if text == "Please explain: the mitochondria is the powerhouse"
    ));
}
