//! Completion tracking for one submitted prompt.
//!
//! A session reads push messages in arrival order, keeps only those that
//! belong to its prompt, and stops at the first terminal event:
//!
//! | Event                                   | Outcome                         |
//! |-----------------------------------------|---------------------------------|
//! | `progress`                              | progress callback               |
//! | `executed`                              | node output buffered            |
//! | `progress_state` with sentinel finished | history merged, succeeded       |
//! | `execution_success`                     | history merged, succeeded       |
//! | `execution_cached`                      | history merged, succeeded       |
//! | `execution_error`                       | failed with the engine's text   |
//! | anything else                           | ignored                         |
//!
//! A single deadline covers the whole wait, history fetch included.

use std::fmt;
use std::time::Duration;

use futures::{Stream, StreamExt};
use poser_core::error::CoreError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::api::ComfyUIApiError;
use crate::messages::{parse_message, unrecognized_type, ComfyUIMessage, ProgressData};
use crate::output::OutputLedger;

/// Callback invoked for every progress update of the tracked prompt.
pub type ProgressFn = dyn Fn(&ProgressData) + Send + Sync;

/// Lifecycle of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Submitted,
    Awaiting,
    Succeeded,
    Failed,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed | SessionState::TimedOut
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Submitted => "submitted",
            SessionState::Awaiting => "awaiting",
            SessionState::Succeeded => "succeeded",
            SessionState::Failed => "failed",
            SessionState::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// Which terminal event completed the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    SentinelFinished,
    ExecutionSucceeded,
    ServedFromCache,
}

/// Result of feeding one message to a [`CompletionTracker`].
#[derive(Debug, Clone)]
pub enum Transition {
    Ignored,
    Progress(ProgressData),
    Buffered,
    Complete(CompletionReason),
    Failed(String),
}

/// Errors ending a session without an output ledger.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The engine reported that the prompt failed.
    #[error("{0}")]
    Engine(String),

    #[error("no terminal event within {}s", .0.as_secs())]
    Timeout(Duration),

    /// The push channel ended before a terminal event arrived.
    #[error("push channel closed before the prompt finished")]
    ChannelClosed,

    #[error("push channel receive error: {0}")]
    Receive(String),

    #[error("history fetch failed: {0}")]
    History(#[source] ComfyUIApiError),
}

impl From<SessionError> for CoreError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Engine(msg) => CoreError::EngineExecution(msg),
            SessionError::Timeout(deadline) => CoreError::Timeout {
                secs: deadline.as_secs(),
            },
            other => CoreError::Transport(other.to_string()),
        }
    }
}

/// Source of the engine's per-prompt history document.
#[async_trait::async_trait]
pub trait HistorySource: Send + Sync {
    async fn history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError>;
}

/// Pure state machine behind [`await_completion`].
#[derive(Debug)]
pub struct CompletionTracker {
    prompt_id: String,
    sentinel: Option<String>,
    outputs: OutputLedger,
    state: SessionState,
}

impl CompletionTracker {
    pub fn new(prompt_id: impl Into<String>, sentinel: Option<&str>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            sentinel: sentinel.map(str::to_string),
            outputs: OutputLedger::new(),
            state: SessionState::Awaiting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Outputs buffered from `executed` messages so far.
    pub fn buffered(&self) -> &OutputLedger {
        &self.outputs
    }

    /// Feed one message. Once terminal, every further message is ignored.
    pub fn handle(&mut self, message: ComfyUIMessage) -> Transition {
        if self.state.is_terminal() || message.prompt_id() != Some(self.prompt_id.as_str()) {
            return Transition::Ignored;
        }

        match message {
            ComfyUIMessage::Progress(data) => Transition::Progress(data),
            ComfyUIMessage::Executed(data) => {
                tracing::debug!(prompt_id = %self.prompt_id, node = %data.node, "Buffered node output");
                self.outputs.insert(data.node, data.output);
                Transition::Buffered
            }
            ComfyUIMessage::ProgressState(data) => match self.sentinel.as_deref() {
                Some(sentinel) if data.is_finished(sentinel) => {
                    self.complete(CompletionReason::SentinelFinished)
                }
                _ => Transition::Ignored,
            },
            ComfyUIMessage::ExecutionSuccess(_) => {
                self.complete(CompletionReason::ExecutionSucceeded)
            }
            ComfyUIMessage::ExecutionCached(_) => self.complete(CompletionReason::ServedFromCache),
            ComfyUIMessage::ExecutionError(data) => {
                self.state = SessionState::Failed;
                let text = if !data.exception_message.is_empty() {
                    data.exception_message
                } else if !data.exception_type.is_empty() {
                    data.exception_type
                } else {
                    format!("node {} failed", data.node_id)
                };
                Transition::Failed(text)
            }
            ComfyUIMessage::Status(_)
            | ComfyUIMessage::ExecutionStart(_)
            | ComfyUIMessage::Executing(_) => Transition::Ignored,
        }
    }

    /// Merge the fetched history into the buffered outputs.
    pub fn finish(self, history: &serde_json::Value) -> OutputLedger {
        let mut outputs = self.outputs;
        let merged = outputs.merge_history(history, &self.prompt_id);
        tracing::debug!(prompt_id = %self.prompt_id, merged, total = outputs.len(), "Merged history outputs");
        outputs
    }

    fn complete(&mut self, reason: CompletionReason) -> Transition {
        self.state = SessionState::Succeeded;
        Transition::Complete(reason)
    }
}

/// Drive `events` until the prompt reaches a terminal state or `deadline`
/// elapses.
///
/// On success returns the buffered outputs merged with the history
/// document. The stream is left open; closing it is the caller's job.
pub async fn await_completion<S>(
    events: &mut S,
    history: &dyn HistorySource,
    prompt_id: &str,
    sentinel: Option<&str>,
    deadline: Duration,
    on_progress: Option<&ProgressFn>,
) -> Result<OutputLedger, SessionError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut tracker = CompletionTracker::new(prompt_id, sentinel);

    let outcome = tokio::time::timeout(deadline, async {
        while let Some(frame) = events.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(frame)) => {
                    tracing::debug!(prompt_id, ?frame, "Push channel closed by engine");
                    break;
                }
                // Binary frames carry previews; pings are answered by tungstenite.
                Ok(_) => continue,
                Err(e) => return Err(SessionError::Receive(e.to_string())),
            };

            let message = match parse_message(&text) {
                Ok(message) => message,
                Err(e) => {
                    match unrecognized_type(&text) {
                        Some(kind) => {
                            tracing::debug!(prompt_id, kind = %kind, "Ignoring unrecognized ComfyUI message");
                        }
                        None => {
                            tracing::warn!(prompt_id, error = %e, raw_message = %text, "Failed to parse ComfyUI message");
                        }
                    }
                    continue;
                }
            };

            match tracker.handle(message) {
                Transition::Ignored | Transition::Buffered => {}
                Transition::Progress(data) => {
                    tracing::trace!(prompt_id, value = data.value, max = data.max, "Progress update");
                    if let Some(callback) = on_progress {
                        callback(&data);
                    }
                }
                Transition::Complete(reason) => {
                    tracing::info!(prompt_id, ?reason, "Prompt finished");
                    let document = history
                        .history(prompt_id)
                        .await
                        .map_err(SessionError::History)?;
                    return Ok(document);
                }
                Transition::Failed(text) => {
                    tracing::error!(prompt_id, error = %text, "Execution error");
                    return Err(SessionError::Engine(text));
                }
            }
        }
        Err(SessionError::ChannelClosed)
    })
    .await;

    match outcome {
        Ok(Ok(document)) => Ok(tracker.finish(&document)),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            tracing::warn!(prompt_id, deadline_secs = deadline.as_secs(), state = %SessionState::TimedOut, "Gave up waiting for prompt");
            Err(SessionError::Timeout(deadline))
        }
    }
}
