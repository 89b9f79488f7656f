pub mod client;
pub mod decode;
pub mod error;
pub mod event;
pub mod frame;
pub mod session;
pub mod transport;

pub use client::{QuerySession, SessionId};
pub use decode::Utf8Decoder;
pub use error::{StreamError, StreamResult};
pub use event::{NEWLINE_MARKER, QueryEvent, decode_newlines};
pub use frame::{FrameParser, RawFrame};
pub use session::{SessionPhase, StreamClose, StreamFailure, StreamSession};
pub use transport::{
    CancelHandle, DEFAULT_TOP_K, QueryRequest, QueryTransport, SessionSignal, SignalStream,
    SseTransport, TransportHandle, TransportWorker,
};
