use std::future::Future;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use snafu::ensure;
use tokio::sync::{mpsc, oneshot};

use crate::decode::Utf8Decoder;
use crate::error::{EmptyBaseUrlSnafu, StreamResult};
use crate::event::QueryEvent;
use crate::frame::FrameParser;
use crate::session::StreamClose;

/// Default number of passages the backend retrieves per question.
pub const DEFAULT_TOP_K: u32 = 20;

/// Parameters for one query stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub question: String,
    pub conversation_id: String,
    pub top_k: Option<u32>,
    pub collection_name: Option<String>,
    pub token: Option<String>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            conversation_id: conversation_id.into(),
            top_k: None,
            collection_name: None,
            token: None,
        }
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_collection(mut self, collection_name: impl Into<String>) -> Self {
        self.collection_name = Some(collection_name.into());
        self
    }

    /// The bearer token travels as a query parameter: the event stream is a
    /// plain GET and browser EventSource-style clients cannot set headers.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Signal forwarded from the transport worker to the session reader.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    Event(QueryEvent),
    Closed(StreamClose),
}

pub type TransportWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Receiving side of one open stream.
pub struct SignalStream {
    signals: mpsc::UnboundedReceiver<SessionSignal>,
}

impl SignalStream {
    pub(crate) fn new(signals: mpsc::UnboundedReceiver<SessionSignal>) -> Self {
        Self { signals }
    }

    pub async fn recv(&mut self) -> Option<SessionSignal> {
        self.signals.recv().await
    }
}

/// Cooperative abort token for one in-flight connection.
///
/// Cancelling is idempotent; the worker treats a fired (or dropped) token as
/// a deliberate stop, never as an error.
pub struct CancelHandle {
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl CancelHandle {
    pub(crate) fn new(cancel_tx: oneshot::Sender<()>) -> Self {
        Self {
            cancel_tx: Some(cancel_tx),
        }
    }

    /// Signals the worker to stop; returns false when already cancelled.
    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|cancel_tx| cancel_tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

/// One open connection: signals, abort token, and the worker future that
/// must be spawned for the stream to make progress.
pub struct TransportHandle {
    pub signals: SignalStream,
    pub cancel: CancelHandle,
    pub worker: TransportWorker,
}

/// Seam between the session driver and the network, so the driver can be
/// exercised with scripted transports in tests.
pub trait QueryTransport: Send + Sync {
    /// Opens one stream. At-most-one-in-flight is the caller's invariant.
    fn open(&self, request: QueryRequest) -> TransportHandle;
}

/// Opens cancellable SSE connections against the query endpoint.
#[derive(Debug, Clone)]
pub struct SseTransport {
    base_url: String,
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new(base_url: impl Into<String>) -> StreamResult<Self> {
        let base_url = base_url.into();
        ensure!(
            !base_url.trim().is_empty(),
            EmptyBaseUrlSnafu {
                stage: "transport-new",
            }
        );

        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl QueryTransport for SseTransport {
    fn open(&self, request: QueryRequest) -> TransportHandle {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let worker = Box::pin(run_stream_worker(
            self.client.clone(),
            self.base_url.clone(),
            request,
            signal_tx,
            cancel_rx,
        ));

        TransportHandle {
            signals: SignalStream::new(signal_rx),
            cancel: CancelHandle::new(cancel_tx),
            worker,
        }
    }
}

/// Query-string pairs for one request, with the top-K default applied.
fn query_pairs(request: &QueryRequest) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("question", request.question.clone()),
        ("conversation_id", request.conversation_id.clone()),
        ("top_k", request.top_k.unwrap_or(DEFAULT_TOP_K).to_string()),
    ];
    if let Some(collection_name) = &request.collection_name {
        pairs.push(("collection_name", collection_name.clone()));
    }
    if let Some(token) = &request.token {
        pairs.push(("token", token.clone()));
    }
    pairs
}

/// Maps a response status to a close reason; `None` means proceed.
fn close_for_status(status: reqwest::StatusCode) -> Option<StreamClose> {
    if status == reqwest::StatusCode::UNAUTHORIZED {
        Some(StreamClose::AuthFailed)
    } else if status == reqwest::StatusCode::FORBIDDEN {
        Some(StreamClose::PermissionDenied)
    } else if !status.is_success() {
        Some(StreamClose::HttpStatus(status.as_u16()))
    } else {
        None
    }
}

async fn run_stream_worker(
    client: reqwest::Client,
    base_url: String,
    request: QueryRequest,
    signal_tx: mpsc::UnboundedSender<SessionSignal>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let send = client.get(&base_url).query(&query_pairs(&request)).send();
    let response = tokio::select! {
        _ = &mut cancel_rx => {
            tracing::debug!("query stream cancelled before the connection opened");
            let _ = signal_tx.send(SessionSignal::Closed(StreamClose::Cancelled));
            return;
        }
        response = send => response,
    };

    let response = match response {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(error = %error, "failed to open query stream");
            let _ = signal_tx.send(SessionSignal::Closed(StreamClose::Failed));
            return;
        }
    };

    if let Some(close) = close_for_status(response.status()) {
        tracing::warn!(status = response.status().as_u16(), "query stream rejected");
        let _ = signal_tx.send(SessionSignal::Closed(close));
        return;
    }

    let body = Box::pin(response.bytes_stream());
    if let Some(close) = pump_stream(body, &signal_tx, &mut cancel_rx).await {
        let _ = signal_tx.send(SessionSignal::Closed(close));
    }
}

/// Decodes and forwards frames until the body ends, the abort signal fires,
/// or the signal receiver is dropped.
///
/// Returns the close reason to report, or `None` when the receiver is gone
/// and nobody is listening. The reader drops its receiver once the session
/// goes terminal, so a `done` frame tears the connection down here instead
/// of leaving the worker parked on the next read.
async fn pump_stream<S, B, E>(
    mut body: S,
    signal_tx: &mpsc::UnboundedSender<SessionSignal>,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> Option<StreamClose>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut decoder = Utf8Decoder::new();
    let mut parser = FrameParser::new();

    loop {
        let chunk = tokio::select! {
            _ = &mut *cancel_rx => {
                tracing::debug!("query stream cancelled");
                return Some(StreamClose::Cancelled);
            }
            _ = signal_tx.closed() => {
                tracing::debug!("signal receiver dropped, closing query stream");
                return None;
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                let text = decoder.decode(bytes.as_ref());
                for frame in parser.feed(&text) {
                    let Some(event) = QueryEvent::from_frame(&frame) else {
                        continue;
                    };
                    if signal_tx.send(SessionSignal::Event(event)).is_err() {
                        return None;
                    }
                }
            }
            Some(Err(error)) => {
                tracing::warn!(error = %error, "query stream read failed");
                return Some(StreamClose::Failed);
            }
            None => return Some(StreamClose::EndOfInput),
        }
    }
}
