//! Real-time delivery: server-sent event frames and the stream relay.
//!
//! The pieces, from the wire inwards:
//!
//! - [`Frame`]: one SSE event, encoded as `data: <json>\n\n`.
//! - [`EventSink`]: where frames are written; [`ChannelSink`] feeds a
//!   streamed HTTP response body.
//! - [`StreamRelay`]: drains an upstream `Stream` of text fragments into a
//!   sink, guaranteeing exactly one terminal signal and exactly one close.

pub mod frame;
pub mod relay;
pub mod sink;

pub use frame::{DONE_SENTINEL, Frame, FrameError, UiChunk, split_events};
pub use relay::{
    GENERIC_STREAM_ERROR, RelayOutcome, RelayProtocol, RelaySession, SessionState, StreamRelay,
    Terminal,
};
pub use sink::{ChannelSink, EventSink, SinkError};
