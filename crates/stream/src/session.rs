use plotline_chart::ChartSpec;

use crate::event::QueryEvent;

/// Final status appended when the backend signals `done`.
pub const STATUS_COMPLETED: &str = "Completed";
/// Final status for user-initiated cancellation.
pub const STATUS_STOPPED: &str = "Stopped";
/// Final status for an unclassified mid-stream failure.
pub const STATUS_STREAM_ERROR: &str = "Error occurred during streaming.";
/// Final status when the endpoint rejects the credentials outright.
pub const STATUS_AUTH_FAILED: &str = "Authentication failed";
/// Final status for HTTP 403. Deliberately starts with an access-denial
/// prefix so transport-level denials flow through the same classifier as
/// backend-emitted denial statuses.
pub const STATUS_PERMISSION_DENIED: &str = "You don't have permission to access this resource.";

/// Lifecycle phase of one query session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Streaming,
    Done,
    Stopped,
    Failed,
}

/// Why a session ended abnormally.
///
/// Lives on the session rather than in any process-wide flag, so multiple
/// concurrently mounted chat surfaces cannot leak state into each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFailure {
    AuthFailed,
    PermissionDenied,
    HttpStatus(u16),
    Transport,
}

/// How the transport worker closed the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClose {
    /// Body ended without a `done` frame; finalize with accumulated state.
    EndOfInput,
    /// The abort signal fired; a deliberate stop, not an error.
    Cancelled,
    /// HTTP 401.
    AuthFailed,
    /// HTTP 403.
    PermissionDenied,
    /// Any other non-2xx response.
    HttpStatus(u16),
    /// Network or read failure with the abort signal clear.
    Failed,
}

/// Mutable state of one answer stream, exclusively owned by the reducer.
///
/// Consumers only ever see cloned snapshots; every mutation goes through
/// `apply`/`close` so events can never be reordered or coalesced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamSession {
    phase: SessionPhase,
    answer: String,
    current_status: String,
    status_log: Vec<String>,
    suggestions: Vec<String>,
    chart_specs: Option<Vec<ChartSpec>>,
    failure: Option<StreamFailure>,
}

impl StreamSession {
    /// Fresh idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every field and enters the streaming phase.
    pub fn begin(&mut self) {
        *self = Self {
            phase: SessionPhase::Streaming,
            ..Self::default()
        };
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == SessionPhase::Streaming
    }

    /// Accumulated (or corrected) answer text, preserved across failures.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Latest status string; last write wins.
    pub fn current_status(&self) -> &str {
        &self.current_status
    }

    /// Append-only audit trail of every non-empty status, in receipt order.
    pub fn status_log(&self) -> &[String] {
        &self.status_log
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// `None` means "no chart section to render", distinct from an empty list.
    pub fn chart_specs(&self) -> Option<&[ChartSpec]> {
        self.chart_specs.as_deref()
    }

    pub fn failure(&self) -> Option<StreamFailure> {
        self.failure
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Done | SessionPhase::Stopped | SessionPhase::Failed
        )
    }

    /// Applies one stream event in arrival order.
    ///
    /// Events arriving after a terminal phase are ignored, which keeps `done`
    /// idempotent even when the transport flushes trailing frames.
    pub fn apply(&mut self, event: QueryEvent) {
        if self.is_terminal() {
            return;
        }

        match event {
            QueryEvent::Status(status) => self.set_status(status),
            // Token is the only incremental mutation; everything else replaces.
            QueryEvent::Token(delta) => self.answer.push_str(&delta),
            QueryEvent::Correction(text) => self.answer = text,
            QueryEvent::Suggestions(suggestions) => self.suggestions = suggestions,
            QueryEvent::Chart(specs) => self.chart_specs = specs,
            QueryEvent::Done => {
                self.set_status(STATUS_COMPLETED.to_string());
                self.phase = SessionPhase::Done;
            }
        }
    }

    /// Applies the transport's close reason.
    ///
    /// Partial answer text accumulated before a failure is preserved, and
    /// every branch leaves the session out of the streaming phase with a
    /// human-readable final status (end-of-input excepted, per contract).
    pub fn close(&mut self, close: StreamClose) {
        if self.is_terminal() {
            return;
        }

        match close {
            StreamClose::EndOfInput => self.phase = SessionPhase::Done,
            StreamClose::Cancelled => {
                self.set_status(STATUS_STOPPED.to_string());
                self.phase = SessionPhase::Stopped;
            }
            StreamClose::AuthFailed => {
                self.fail(STATUS_AUTH_FAILED.to_string(), StreamFailure::AuthFailed);
            }
            StreamClose::PermissionDenied => {
                self.fail(
                    STATUS_PERMISSION_DENIED.to_string(),
                    StreamFailure::PermissionDenied,
                );
            }
            StreamClose::HttpStatus(code) => {
                self.fail(
                    format!("Error: stream failed with status {code}"),
                    StreamFailure::HttpStatus(code),
                );
            }
            StreamClose::Failed => {
                self.fail(STATUS_STREAM_ERROR.to_string(), StreamFailure::Transport);
            }
        }
    }

    /// Last-write-wins status; non-empty statuses also append to the log.
    fn set_status(&mut self, status: String) {
        if !status.is_empty() {
            self.status_log.push(status.clone());
        }
        self.current_status = status;
    }

    fn fail(&mut self, status: String, failure: StreamFailure) {
        self.set_status(status);
        self.failure = Some(failure);
        self.phase = SessionPhase::Failed;
    }
}
