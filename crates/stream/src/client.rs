use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use snafu::ensure;

use crate::error::{EmptyQuestionSnafu, StreamResult};
use crate::session::{StreamClose, StreamSession};
use crate::transport::{
    CancelHandle, QueryRequest, QueryTransport, SessionSignal, SignalStream, TransportHandle,
};

/// Identifier for one streaming generation session.
///
/// Bumped on every `start`/`reset` so readers belonging to a superseded
/// session can reject their remaining signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

/// Drives one query stream at a time and owns the observable session state.
///
/// The transport worker and the reducer-side reader run as spawned tasks;
/// callers read immutable snapshots via [`QuerySession::snapshot`] and issue
/// commands (`start`/`stop`/`reset`). Starting a new stream deterministically
/// aborts any prior one before the new session's state exists, so frames
/// from two sessions can never interleave.
///
/// `start` must be called within a tokio runtime.
pub struct QuerySession {
    transport: Arc<dyn QueryTransport>,
    shared: Arc<SessionShared>,
    active: Option<ActiveStream>,
}

struct ActiveStream {
    session_id: SessionId,
    cancel: CancelHandle,
}

struct SessionShared {
    state: Mutex<StreamSession>,
    published: ArcSwap<StreamSession>,
    current: AtomicU64,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(StreamSession::new()),
            published: ArcSwap::from_pointee(StreamSession::new()),
            current: AtomicU64::new(0),
        }
    }

    /// Locks the session state, recovering from a poisoned lock; the state
    /// itself stays internally consistent because mutations never panic
    /// mid-update.
    fn lock_state(&self) -> MutexGuard<'_, StreamSession> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &StreamSession) {
        self.published.store(Arc::new(state.clone()));
    }
}

impl QuerySession {
    pub fn new(transport: Arc<dyn QueryTransport>) -> Self {
        Self {
            transport,
            shared: Arc::new(SessionShared::new()),
            active: None,
        }
    }

    /// Latest immutable snapshot of the session state.
    pub fn snapshot(&self) -> Arc<StreamSession> {
        self.shared.published.load_full()
    }

    /// Identifier of the stream currently in flight, if any.
    ///
    /// A stream that finished on its own no longer counts as in flight,
    /// even though its handle is only reclaimed by the next command.
    pub fn active_session_id(&self) -> Option<SessionId> {
        let active = self.active.as_ref()?;
        if self.shared.published.load().is_streaming() {
            Some(active.session_id)
        } else {
            None
        }
    }

    /// Starts a new stream, superseding (never merging with) any prior one.
    pub fn start(&mut self, request: QueryRequest) -> StreamResult<SessionId> {
        ensure!(
            !request.question.trim().is_empty(),
            EmptyQuestionSnafu {
                stage: "start-session",
            }
        );

        // Abort the in-flight transport before the new session state exists.
        if let Some(mut active) = self.active.take() {
            tracing::debug!(superseded = active.session_id.0, "aborting prior stream");
            active.cancel.cancel();
        }

        let session_id = SessionId(self.shared.current.fetch_add(1, Ordering::SeqCst) + 1);
        {
            let mut state = self.shared.lock_state();
            state.begin();
            self.shared.publish(&state);
        }

        let TransportHandle {
            signals,
            cancel,
            worker,
        } = self.transport.open(request);

        tokio::spawn(worker);
        tokio::spawn(run_reader(Arc::clone(&self.shared), session_id, signals));

        self.active = Some(ActiveStream { session_id, cancel });
        Ok(session_id)
    }

    /// Cancels the in-flight stream, if any; safe to call when idle.
    ///
    /// The terminal `Stopped` state is applied synchronously so callers see
    /// it on the very next snapshot rather than after a task round-trip.
    pub fn stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        tracing::debug!(session = active.session_id.0, "stopping stream");
        active.cancel.cancel();

        let mut state = self.shared.lock_state();
        state.close(StreamClose::Cancelled);
        self.shared.publish(&state);
    }

    /// Aborts any in-flight stream and clears all session fields to their
    /// initial empty values without starting a new stream. Used when the
    /// consumer switches conversations.
    pub fn reset(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.cancel.cancel();
        }
        // Bump the session id so any straggler signals are rejected.
        self.shared.current.fetch_add(1, Ordering::SeqCst);

        let mut state = self.shared.lock_state();
        *state = StreamSession::new();
        self.shared.publish(&state);
    }
}

/// Applies signals to the session state in arrival order.
///
/// Returns as soon as the session is superseded or goes terminal; dropping
/// the signal stream is what tears the transport down after `done`.
async fn run_reader(shared: Arc<SessionShared>, session_id: SessionId, mut signals: SignalStream) {
    while let Some(signal) = signals.recv().await {
        match apply_signal(&shared, session_id, signal) {
            SignalOutcome::Applied => {}
            SignalOutcome::Stale | SignalOutcome::Terminal => return,
        }
    }
}

enum SignalOutcome {
    Applied,
    Stale,
    Terminal,
}

/// Applies one signal to the session state.
///
/// The supersession check happens under the same lock that mutates the
/// state: a `start` that bumps `current` between signal dequeue and lock
/// acquisition must not have its fresh state mutated by the straggler.
fn apply_signal(
    shared: &SessionShared,
    session_id: SessionId,
    signal: SessionSignal,
) -> SignalOutcome {
    let mut state = shared.lock_state();
    if shared.current.load(Ordering::SeqCst) != session_id.0 {
        tracing::debug!(stale = session_id.0, "dropping signal for superseded session");
        return SignalOutcome::Stale;
    }

    match signal {
        SessionSignal::Event(event) => state.apply(event),
        SessionSignal::Closed(close) => state.close(close),
    }
    shared.publish(&state);

    if state.is_streaming() {
        SignalOutcome::Applied
    } else {
        SignalOutcome::Terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::QueryEvent;
    use crate::session::SessionPhase;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::{mpsc, oneshot};

    /// Scripted transport: each `open` hands the test a sender to feed
    /// signals through, plus a flag that records cancellation.
    #[derive(Default)]
    struct FakeTransport {
        opened: Mutex<Vec<FakeStream>>,
    }

    struct FakeStream {
        tx: mpsc::UnboundedSender<SessionSignal>,
        cancelled: Arc<AtomicBool>,
    }

    impl FakeTransport {
        fn stream(&self, index: usize) -> (mpsc::UnboundedSender<SessionSignal>, Arc<AtomicBool>) {
            let opened = self.opened.lock().expect("no poisoned lock in tests");
            let stream = &opened[index];
            (stream.tx.clone(), Arc::clone(&stream.cancelled))
        }

        fn open_count(&self) -> usize {
            self.opened.lock().expect("no poisoned lock in tests").len()
        }
    }

    impl QueryTransport for FakeTransport {
        fn open(&self, _request: QueryRequest) -> TransportHandle {
            let (tx, rx) = mpsc::unbounded_channel();
            let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
            let cancelled = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&cancelled);
            let worker = Box::pin(async move {
                let _ = cancel_rx.await;
                flag.store(true, Ordering::SeqCst);
            });

            self.opened
                .lock()
                .expect("no poisoned lock in tests")
                .push(FakeStream { tx, cancelled });

            TransportHandle {
                signals: SignalStream::new(rx),
                cancel: CancelHandle::new(cancel_tx),
                worker,
            }
        }
    }

    fn token(text: &str) -> SessionSignal {
        SessionSignal::Event(QueryEvent::Token(text.to_string()))
    }

    /// Lets the current-thread test runtime run the spawned reader/worker.
    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn session_over(transport: &Arc<FakeTransport>) -> QuerySession {
        QuerySession::new(Arc::clone(transport) as Arc<dyn QueryTransport>)
    }

    #[tokio::test]
    async fn streamed_tokens_appear_in_snapshots() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session_over(&transport);

        let id = session.start(QueryRequest::new("q", "c")).expect("start");
        let (tx, _) = transport.stream(0);
        tx.send(token("Hello ")).expect("send");
        tx.send(token("world")).expect("send");
        settle().await;

        let snapshot = session.snapshot();
        assert!(snapshot.is_streaming());
        assert_eq!(snapshot.answer(), "Hello world");
        assert_eq!(session.active_session_id(), Some(id));

        tx.send(SessionSignal::Event(QueryEvent::Done)).expect("send");
        settle().await;

        let snapshot = session.snapshot();
        assert!(!snapshot.is_streaming());
        assert_eq!(
            snapshot.status_log().last().map(String::as_str),
            Some("Completed")
        );
        // Natural completion ends the in-flight stream.
        assert_eq!(session.active_session_id(), None);
    }

    // A reader can dequeue a signal, then lose the CPU while a new start
    // supersedes it; the signal must be rejected once the lock is held.
    #[test]
    fn dequeued_signal_is_rejected_when_superseded_before_the_lock() {
        let shared = Arc::new(SessionShared::new());

        let first = SessionId(shared.current.fetch_add(1, Ordering::SeqCst) + 1);
        {
            let mut state = shared.lock_state();
            state.begin();
            shared.publish(&state);
        }

        // Second start: bump then reset, as `start` does.
        shared.current.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = shared.lock_state();
            state.begin();
            shared.publish(&state);
        }

        let outcome = apply_signal(&shared, first, token("stale"));
        assert!(matches!(outcome, SignalOutcome::Stale));
        assert_eq!(shared.published.load_full().answer(), "");
    }

    #[tokio::test]
    async fn starting_a_new_stream_aborts_the_prior_one() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session_over(&transport);

        session.start(QueryRequest::new("first", "c")).expect("start");
        let (old_tx, old_cancelled) = transport.stream(0);
        old_tx.send(token("old ")).expect("send");
        settle().await;
        assert_eq!(session.snapshot().answer(), "old ");

        session.start(QueryRequest::new("second", "c")).expect("start");
        settle().await;
        assert_eq!(transport.open_count(), 2);
        assert!(old_cancelled.load(Ordering::SeqCst));

        // Stale frames from the superseded stream must not leak into the
        // new session's answer.
        let _ = old_tx.send(token("stale"));
        let (new_tx, _) = transport.stream(1);
        new_tx.send(token("fresh")).expect("send");
        settle().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.answer(), "fresh");
    }

    #[tokio::test]
    async fn stop_is_synchronous_and_safe_when_idle() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session_over(&transport);

        // No active stream: must be a no-op.
        session.stop();
        assert_eq!(session.snapshot().phase(), SessionPhase::Idle);

        session.start(QueryRequest::new("q", "c")).expect("start");
        let (tx, cancelled) = transport.stream(0);
        tx.send(token("partial")).expect("send");
        settle().await;

        session.stop();
        let snapshot = session.snapshot();
        assert!(!snapshot.is_streaming());
        assert_eq!(snapshot.phase(), SessionPhase::Stopped);
        assert_eq!(snapshot.current_status(), "Stopped");
        assert_eq!(snapshot.answer(), "partial");

        settle().await;
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn reset_returns_to_pristine_idle() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session_over(&transport);

        session.start(QueryRequest::new("q", "c")).expect("start");
        let (tx, cancelled) = transport.stream(0);
        tx.send(token("text")).expect("send");
        settle().await;

        session.reset();
        settle().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase(), SessionPhase::Idle);
        assert_eq!(snapshot.answer(), "");
        assert!(snapshot.status_log().is_empty());
        assert!(cancelled.load(Ordering::SeqCst));

        // Stragglers from the cancelled stream are rejected.
        let _ = tx.send(token("ghost"));
        settle().await;
        assert_eq!(session.snapshot().answer(), "");
    }

    #[tokio::test]
    async fn transport_closure_reasons_reach_the_snapshot() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session_over(&transport);

        session.start(QueryRequest::new("q", "c")).expect("start");
        let (tx, _) = transport.stream(0);
        tx.send(SessionSignal::Closed(StreamClose::PermissionDenied))
            .expect("send");
        settle().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase(), SessionPhase::Failed);
        assert!(snapshot.current_status().starts_with("You don't have permission"));
    }

    #[tokio::test]
    async fn empty_question_is_rejected_before_any_transport_opens() {
        let transport = Arc::new(FakeTransport::default());
        let mut session = session_over(&transport);

        assert!(session.start(QueryRequest::new("   ", "c")).is_err());
        assert_eq!(transport.open_count(), 0);
    }
}
