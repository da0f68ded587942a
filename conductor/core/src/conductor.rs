//! Conductor - The Session Controller
//!
//! The Conductor owns everything that outlives a single request: the page
//! context, the committed history, and the current state. For each turn it
//! builds the prompt, starts a stream session, feeds fragments through the
//! render scheduler, and finally commits the exchange or surfaces the
//! failure.
//!
//! # Design Philosophy
//!
//! The Conductor is UI-agnostic. It communicates through:
//! - `ConductorMessage`: what the surface should show, sent over an mpsc channel
//! - `SurfaceEvent`: what the user did, passed to [`Conductor::handle_event`]
//!
//! It is driven from a single task: call [`Conductor::step`] in a loop while
//! a turn is active. Each step waits on exactly two things, the next network
//! fragment and (when a paint is pending) the next frame tick, and both waits
//! end promptly on cancellation.
//!
//! At most one turn is ever active. [`Conductor::submit`] refuses to start a
//! second one; [`Conductor::interrupt`] tears the current one down first.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{CompletionBackend, CompletionRequest};
use crate::config::{ConductorConfig, MIN_SELECTION_LENGTH};
use crate::context::ContextBuilder;
use crate::error::{TransportError, ValidationError};
use crate::events::SurfaceEvent;
use crate::messages::{ConductorMessage, ConductorState, NotifyLevel, TurnId};
use crate::page::{ExtractionResponse, PageContext};
use crate::render::render;
use crate::scheduler::{FrameClock, RenderScheduler};
use crate::session::History;
use crate::streaming::StreamSession;

/// Committed in place of an empty response
pub const NO_RESPONSE: &str = "(No response received)";

/// How a turn ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The response completed and the exchange is in history
    Completed {
        /// Turn that completed
        turn_id: TurnId,
        /// Assistant text as committed
        content: String,
    },
    /// The turn was cancelled, timed out, or failed; history is untouched
    Failed {
        /// Turn that failed
        turn_id: TurnId,
        /// Why
        error: TransportError,
    },
}

/// What one call to [`Conductor::step`] did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Progress {
    /// No turn is active
    Idle,
    /// A fragment was appended
    Fragment,
    /// A coalesced paint was sent
    Painted,
    /// The active turn ended
    Finished(TurnOutcome),
}

/// The turn currently in flight
struct ActiveTurn {
    id: TurnId,
    user_text: String,
    stream: StreamSession,
    scheduler: RenderScheduler,
    clock: FrameClock,
}

/// The Conductor - headless conversation engine
pub struct Conductor<B: CompletionBackend> {
    /// Configuration
    config: ConductorConfig,
    /// Completion backend
    backend: Arc<B>,
    /// Prompt assembly
    context: ContextBuilder,
    /// Committed turns
    history: History,
    /// Current page, if one could be read
    page: Option<PageContext>,
    /// Current operational state
    state: ConductorState,
    /// Channel to send messages to UI surface
    tx: mpsc::Sender<ConductorMessage>,
    /// Turn in flight
    active: Option<ActiveTurn>,
}

impl<B: CompletionBackend> Conductor<B> {
    /// Create a new Conductor with the given backend
    pub fn new(backend: B, config: ConductorConfig, tx: mpsc::Sender<ConductorMessage>) -> Self {
        Self::with_backend(Arc::new(backend), config, tx)
    }

    /// Create a Conductor sharing an existing backend
    pub fn with_backend(
        backend: Arc<B>,
        config: ConductorConfig,
        tx: mpsc::Sender<ConductorMessage>,
    ) -> Self {
        tracing::debug!(backend = backend.name(), model = %config.model, "Creating conductor");
        Self {
            context: ContextBuilder::from_config(&config),
            config,
            backend,
            history: History::new(),
            page: None,
            state: ConductorState::Idle,
            tx,
            active: None,
        }
    }

    /// Current state
    pub fn state(&self) -> ConductorState {
        self.state
    }

    /// Committed history
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Current page context
    pub fn page(&self) -> Option<&PageContext> {
        self.page.as_ref()
    }

    /// Whether a turn is in flight
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// ID of the turn in flight
    pub fn active_turn(&self) -> Option<&TurnId> {
        self.active.as_ref().map(|a| &a.id)
    }

    /// Text accumulated so far by the turn in flight
    pub fn partial_text(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.stream.text())
    }

    /// Token that cancels the turn in flight.
    ///
    /// Lets another task request cancellation while this one is parked in
    /// [`Self::step`]; the step then finishes the turn as cancelled.
    pub fn cancel_handle(&self) -> Option<CancellationToken> {
        self.active.as_ref().map(|a| a.stream.cancel_token())
    }

    // ========================================================================
    // Surface events
    // ========================================================================

    /// Handle an event from the UI surface
    pub async fn handle_event(&mut self, event: SurfaceEvent) -> Result<(), ValidationError> {
        tracing::trace!(event = ?event.kind(), "Surface event");
        match event {
            SurfaceEvent::UserMessage { content } => {
                self.submit(&content).await?;
            }
            SurfaceEvent::Interrupt { content } => {
                self.interrupt(&content).await?;
            }
            SurfaceEvent::Cancel => {
                self.cancel_active().await;
            }
            SurfaceEvent::ClearChat => self.reset().await,
            SurfaceEvent::RefreshContext { response } => {
                self.refresh_context(response).await;
            }
            SurfaceEvent::ClarifySelection { text } => {
                self.clarify(&text).await;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Turn lifecycle
    // ========================================================================

    /// Start a new turn.
    ///
    /// Rejects empty text and submissions while another turn is in flight,
    /// without touching the network.
    pub async fn submit(&mut self, text: &str) -> Result<TurnId, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        if self.active.is_some() {
            return Err(ValidationError::TurnInFlight);
        }

        let prompt = self
            .context
            .build(self.page.as_ref(), &self.history, text);
        let request = CompletionRequest::from_config(&self.config, prompt.to_messages());
        let stream = StreamSession::start(
            Arc::clone(&self.backend),
            request,
            self.config.request_timeout,
        );

        let id = TurnId::new();
        tracing::debug!(
            turn = %id,
            history = prompt.history_window.len(),
            system_chars = prompt.system_message.len(),
            "Dispatching turn"
        );

        self.active = Some(ActiveTurn {
            id: id.clone(),
            user_text: text.to_string(),
            stream,
            scheduler: RenderScheduler::new(),
            clock: FrameClock::new(self.config.frame_interval),
        });

        self.send(ConductorMessage::UserTurn {
            turn_id: id.clone(),
            content: text.to_string(),
        })
        .await;
        self.send(ConductorMessage::Loading { visible: true }).await;
        self.set_state(ConductorState::Sending).await;

        Ok(id)
    }

    /// Cancel the turn in flight (if any) and start a new one
    pub async fn interrupt(&mut self, text: &str) -> Result<TurnId, ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        self.cancel_active().await;
        self.submit(text).await
    }

    /// Cancel the turn in flight, surfacing the cancellation notice
    pub async fn cancel_active(&mut self) -> Option<TurnOutcome> {
        if self.active.is_none() {
            return None;
        }
        Some(self.fail(TransportError::Cancelled).await)
    }

    /// Advance the active turn by one event.
    ///
    /// Waits for the next fragment, or for the next frame tick when a paint
    /// is pending. Returns [`Progress::Idle`] immediately when no turn is
    /// active. Once the turn's cancel token fires, no further paint is sent
    /// and the step resolves with the cancellation.
    ///
    /// Dropping the future part way is allowed: a finished turn is committed
    /// (or discarded) and the state reset before any surface message is
    /// sent, so only those messages can be lost.
    pub async fn step(&mut self) -> Progress {
        enum Wake {
            Tick,
            Fragment(Option<Result<String, TransportError>>),
        }

        let Some(active) = self.active.as_mut() else {
            return Progress::Idle;
        };
        if active.stream.cancel_token().is_cancelled() {
            active.scheduler.cancel();
        }

        let wake = if active.scheduler.is_pending() {
            tokio::select! {
                biased;
                () = active.clock.tick() => Wake::Tick,
                item = active.stream.next_fragment() => Wake::Fragment(item),
            }
        } else {
            Wake::Fragment(active.stream.next_fragment().await)
        };

        match wake {
            Wake::Tick => {
                self.paint().await;
                Progress::Painted
            }
            Wake::Fragment(Some(Ok(fragment))) => {
                self.on_fragment(fragment).await;
                Progress::Fragment
            }
            Wake::Fragment(Some(Err(error))) => Progress::Finished(self.fail(error).await),
            Wake::Fragment(None) => Progress::Finished(self.complete().await),
        }
    }

    /// Submit and drive the turn to completion
    pub async fn run_turn(&mut self, text: &str) -> Result<TurnOutcome, ValidationError> {
        self.submit(text).await?;
        self.finish().await
    }

    /// Drive the active turn until it ends
    pub async fn finish(&mut self) -> Result<TurnOutcome, ValidationError> {
        loop {
            match self.step().await {
                Progress::Finished(outcome) => return Ok(outcome),
                Progress::Idle => return Err(ValidationError::NoActiveTurn),
                Progress::Fragment | Progress::Painted => {}
            }
        }
    }

    async fn on_fragment(&mut self, fragment: String) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let turn_id = active.id.clone();
        let first = active.stream.stats().fragments == 1;
        active.scheduler.schedule();

        if first {
            tracing::debug!(
                turn = %turn_id,
                first_fragment_ms = active.stream.stats().elapsed.as_millis() as u64,
                "First fragment"
            );
            self.set_state(ConductorState::Streaming).await;
            self.send(ConductorMessage::Loading { visible: false }).await;
            self.send(ConductorMessage::StreamStart {
                turn_id: turn_id.clone(),
            })
            .await;
        }

        self.send(ConductorMessage::Token {
            turn_id,
            text: fragment,
        })
        .await;
    }

    /// Coalesced paint at a frame tick
    async fn paint(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.stream.cancel_token().is_cancelled() {
            active.scheduler.cancel();
            return;
        }
        let text = active.stream.text();
        let Some(document) = active.scheduler.fire(|| render(text)) else {
            return;
        };
        let turn_id = active.id.clone();

        self.send(ConductorMessage::Render {
            turn_id,
            document,
            complete: false,
        })
        .await;
    }

    async fn complete(&mut self) -> TurnOutcome {
        let Some(mut active) = self.active.take() else {
            return Self::orphan_outcome();
        };

        let started = active.stream.has_started();
        let stats = active.stream.stats();
        let mut content = active.stream.into_text();
        if content.is_empty() {
            content = NO_RESPONSE.to_string();
        }

        let document = active.scheduler.flush(|| render(&content));
        self.history
            .commit_exchange(active.user_text, content.clone());
        self.state = ConductorState::Idle;
        tracing::debug!(
            turn = %active.id,
            fragments = stats.fragments,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            renders = active.scheduler.stats().rendered,
            coalesced = active.scheduler.stats().coalesced,
            "Turn committed"
        );

        if !started {
            self.send(ConductorMessage::Loading { visible: false }).await;
        }
        self.send(ConductorMessage::Render {
            turn_id: active.id.clone(),
            document,
            complete: true,
        })
        .await;
        self.send(ConductorMessage::TurnCommitted {
            turn_id: active.id.clone(),
            content: content.clone(),
        })
        .await;
        self.announce_state(ConductorState::Idle).await;

        TurnOutcome::Completed {
            turn_id: active.id,
            content,
        }
    }

    async fn fail(&mut self, error: TransportError) -> TurnOutcome {
        let Some(mut active) = self.active.take() else {
            return Self::orphan_outcome();
        };

        active.stream.cancel();
        active.scheduler.cancel();
        self.state = ConductorState::Idle;
        let stats = active.stream.stats();

        if error.is_cancellation() {
            tracing::info!(turn = %active.id, error = %error, fragments = stats.fragments, "Turn cancelled");
        } else {
            tracing::warn!(turn = %active.id, error = %error, fragments = stats.fragments, "Turn failed");
        }

        if !active.stream.has_started() {
            self.send(ConductorMessage::Loading { visible: false }).await;
        }
        let level = if error.is_cancellation() {
            NotifyLevel::Warning
        } else {
            NotifyLevel::Error
        };
        self.send(ConductorMessage::Notice {
            turn_id: Some(active.id.clone()),
            level,
            content: error.user_message(),
        })
        .await;

        self.announce_state(ConductorState::Error).await;
        self.announce_state(ConductorState::Idle).await;

        TurnOutcome::Failed {
            turn_id: active.id,
            error,
        }
    }

    fn orphan_outcome() -> TurnOutcome {
        TurnOutcome::Failed {
            turn_id: TurnId::new(),
            error: TransportError::Cancelled,
        }
    }

    /// Drop the active turn without any notice
    fn abort_silently(&mut self) {
        if let Some(active) = self.active.take() {
            active.stream.cancel();
            tracing::debug!(turn = %active.id, "Discarded active turn");
        }
    }

    // ========================================================================
    // Global transitions
    // ========================================================================

    /// Clear the chat: cancel any turn, drop history, greet again
    pub async fn reset(&mut self) {
        self.abort_silently();
        self.history.clear();
        self.send(ConductorMessage::Cleared).await;
        self.send(ConductorMessage::Welcome {
            content: self.welcome_message(),
        })
        .await;
        self.set_state(ConductorState::Idle).await;
    }

    /// Replace the page context with a fresh extraction.
    ///
    /// Cancels any turn and clears history, since the old answers refer to
    /// the old page. Returns whether a page is now loaded.
    pub async fn refresh_context(&mut self, response: ExtractionResponse) -> bool {
        self.abort_silently();
        self.history.clear();
        self.send(ConductorMessage::Cleared).await;

        let (loaded, status) = match PageContext::from_response(response) {
            Ok(page) => {
                let status = page.status_line();
                tracing::debug!(url = %page.url, chars = page.char_count(), "Page context loaded");
                self.page = Some(page);
                (true, status)
            }
            Err(e) => {
                tracing::info!(error = %e, "No page context");
                self.page = None;
                (false, e.to_string())
            }
        };

        self.send(ConductorMessage::ContextStatus {
            loaded,
            text: status,
        })
        .await;
        self.send(ConductorMessage::Welcome {
            content: self.welcome_message(),
        })
        .await;
        self.set_state(ConductorState::Idle).await;
        loaded
    }

    /// Use `page` as the new context
    pub async fn load_page(&mut self, page: PageContext) -> bool {
        self.refresh_context(ExtractionResponse {
            success: true,
            data: Some(page),
            error: None,
        })
        .await
    }

    /// Offer a clarify prompt for a text selection.
    ///
    /// Selections shorter than the minimum are ignored.
    pub async fn clarify(&mut self, selection: &str) -> Option<String> {
        let prompt = clarify_prompt(selection)?;
        self.send(ConductorMessage::PrefillInput {
            text: prompt.clone(),
        })
        .await;
        Some(prompt)
    }

    /// Greeting for the current context
    pub fn welcome_message(&self) -> String {
        match self.page {
            Some(ref page) => {
                let name = if page.title.trim().is_empty() {
                    &page.url
                } else {
                    &page.title
                };
                format!(
                    "**Page loaded:** \"{name}\"\n\n\
                     I've read this page. Ask me anything about it:\n\n\
                     - Summarise the main points\n\
                     - Explain any section\n\
                     - Find specific information\n\
                     - Compare or analyse content"
                )
            }
            None => "**No page context**: I couldn't read the current page \
                     (you may be on a browser internal page).\n\n\
                     You can still ask me general questions, or navigate to a \
                     website and click **Re-read**."
                .to_string(),
        }
    }

    /// Tear down the engine, cancelling any turn in flight
    pub fn dispose(mut self) {
        self.abort_silently();
        tracing::debug!(turns = self.history.len(), "Conductor disposed");
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Set state and notify UI
    async fn set_state(&mut self, state: ConductorState) {
        self.state = state;
        self.announce_state(state).await;
    }

    /// Notify UI of a state without changing it
    async fn announce_state(&self, state: ConductorState) {
        self.send(ConductorMessage::State { state }).await;
    }

    /// Send a message to the UI surface
    async fn send(&self, msg: ConductorMessage) {
        if let Err(e) = self.tx.send(msg).await {
            tracing::warn!("Failed to send message to surface: {}", e);
        }
    }
}

/// `Please explain: <selection>` for long enough selections
pub fn clarify_prompt(selection: &str) -> Option<String> {
    let selection = selection.trim();
    if selection.chars().count() < MIN_SELECTION_LENGTH {
        return None;
    }
    Some(format!("Please explain: {selection}"))
}
