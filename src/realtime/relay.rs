//! The stream relay: drains an upstream fragment stream into an [`EventSink`].
//!
//! A relay session moves through three states:
//!
//! ```text
//! Open ──► Streaming ──► Closed(Completed | Errored | Aborted)
//!   └────────────────────────▲
//! ```
//!
//! `Closed` is reached exactly once. On the way in, the session writes either
//! the `[DONE]` sentinel (completed) or a single error frame (errored), never
//! both, and then closes the sink. `Aborted` covers the paths where the sink
//! itself failed or the client went away, so neither terminal frame could be
//! delivered; the sink is still closed.

use std::fmt::Display;
use std::pin::pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::frame::{Frame, UiChunk};
use super::sink::{EventSink, SinkError};

/// Message carried by in-band error frames. Upstream detail is logged, not sent.
pub const GENERIC_STREAM_ERROR: &str = "Stream error";

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// Upstream finished; the sentinel was written.
    Completed,
    /// Upstream failed or stalled; one error frame was written.
    Errored,
    /// The sink failed or its consumer disconnected.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Streaming,
    Closed(Terminal),
}

/// Which event vocabulary the relay speaks on the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayProtocol {
    /// `{"text"}` / `{"error"}` / `[DONE]`.
    #[default]
    Text,
    /// UI message stream parts followed by `[DONE]`.
    UiMessage,
}

/// Transient state for one streaming request. Owns its sink until closed.
#[derive(Debug)]
pub struct RelaySession<S> {
    sink: S,
    state: SessionState,
    frames_written: usize,
}

impl<S: EventSink> RelaySession<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: SessionState::Open,
            frames_written: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    /// Writes one non-terminal frame.
    ///
    /// # Errors
    ///
    /// [`SinkError::AlreadyClosed`] once the session has finished, or whatever
    /// the sink reports.
    pub async fn emit(&mut self, frame: Frame) -> Result<(), SinkError> {
        if matches!(self.state, SessionState::Closed(_)) {
            return Err(SinkError::AlreadyClosed);
        }
        self.state = SessionState::Streaming;
        self.sink.write(frame).await?;
        self.frames_written += 1;
        Ok(())
    }

    /// Writes the closing frames and closes the sink.
    ///
    /// Only the first call has any effect; later calls return the terminal
    /// state already recorded. A write or close failure downgrades the
    /// outcome to [`Terminal::Aborted`], but the sink is closed regardless.
    pub async fn finish(&mut self, frames: Vec<Frame>, terminal: Terminal) -> Terminal {
        if let SessionState::Closed(done) = self.state {
            return done;
        }

        let mut terminal = terminal;
        for frame in frames {
            if let Err(e) = self.emit(frame).await {
                warn!(error = %e, "failed to write closing frame");
                terminal = Terminal::Aborted;
                break;
            }
        }

        if let Err(e) = self.sink.close().await {
            warn!(error = %e, "failed to close sink");
            terminal = Terminal::Aborted;
        }

        self.state = SessionState::Closed(terminal);
        terminal
    }

    async fn consumer_gone(&self) {
        self.sink.closed().await;
    }

    /// Gives the sink back, e.g. for inspection in tests.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// Summary of a finished relay run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    pub terminal: Terminal,
    /// Upstream fragments consumed.
    pub fragments: usize,
    /// Frames successfully written, terminal frames included.
    pub frames: usize,
}

/// Translates each step of the upstream into frames for one protocol.
#[derive(Debug)]
enum Framer {
    Text,
    UiMessage {
        message_id: String,
        text_id: String,
        text_open: bool,
    },
}

impl Framer {
    fn new(protocol: RelayProtocol) -> Self {
        match protocol {
            RelayProtocol::Text => Self::Text,
            RelayProtocol::UiMessage => Self::UiMessage {
                message_id: format!("msg-{}", Uuid::new_v4().simple()),
                text_id: format!("txt-{}", Uuid::new_v4().simple()),
                text_open: false,
            },
        }
    }

    fn opening(&self) -> Vec<Frame> {
        match self {
            Self::Text => Vec::new(),
            Self::UiMessage { message_id, .. } => vec![Frame::Chunk(UiChunk::Start {
                message_id: message_id.clone(),
            })],
        }
    }

    fn fragment(&mut self, text: String) -> Vec<Frame> {
        match self {
            Self::Text => vec![Frame::Text(text)],
            Self::UiMessage {
                text_id, text_open, ..
            } => {
                let mut frames = Vec::with_capacity(2);
                if !*text_open {
                    *text_open = true;
                    frames.push(Frame::Chunk(UiChunk::TextStart {
                        id: text_id.clone(),
                    }));
                }
                frames.push(Frame::Chunk(UiChunk::TextDelta {
                    id: text_id.clone(),
                    delta: text,
                }));
                frames
            }
        }
    }

    fn completion(&self) -> Vec<Frame> {
        match self {
            Self::Text => vec![Frame::Done],
            Self::UiMessage {
                text_id, text_open, ..
            } => {
                let mut frames = Vec::with_capacity(3);
                if *text_open {
                    frames.push(Frame::Chunk(UiChunk::TextEnd {
                        id: text_id.clone(),
                    }));
                }
                frames.push(Frame::Chunk(UiChunk::Finish));
                frames.push(Frame::Done);
                frames
            }
        }
    }

    fn failure(&self, message: &str) -> Frame {
        match self {
            Self::Text => Frame::Error(message.to_owned()),
            Self::UiMessage { .. } => Frame::Chunk(UiChunk::Error {
                error_text: message.to_owned(),
            }),
        }
    }
}

enum Step {
    Fragment(String),
    End,
    Failed(String),
    Disconnected,
}

/// Drains an upstream text stream into a sink.
///
/// The relay itself is stateless configuration; every call to
/// [`run`](Self::run) creates and consumes its own [`RelaySession`], so one
/// relay can be shared by any number of concurrent requests.
///
/// # Examples
///
/// ```
/// use ai_relay::realtime::{ChannelSink, RelayProtocol, StreamRelay, Terminal};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (sink, mut rx) = ChannelSink::channel(8);
/// let upstream = futures::stream::iter(vec![Ok::<_, String>("Paris".to_owned())]);
///
/// let outcome = StreamRelay::new(RelayProtocol::Text).run(upstream, sink).await;
/// assert_eq!(outcome.terminal, Terminal::Completed);
/// assert_eq!(&rx.recv().await.unwrap()[..], b"data: {\"text\":\"Paris\"}\n\n");
/// assert_eq!(&rx.recv().await.unwrap()[..], b"data: [DONE]\n\n");
/// assert!(rx.recv().await.is_none());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StreamRelay {
    protocol: RelayProtocol,
    idle_timeout: Option<Duration>,
}

impl StreamRelay {
    pub fn new(protocol: RelayProtocol) -> Self {
        Self {
            protocol,
            idle_timeout: None,
        }
    }

    /// Ends the session on the error path if no fragment arrives within `timeout`.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn protocol(&self) -> RelayProtocol {
        self.protocol
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Runs one session to completion.
    ///
    /// Each upstream item is pulled only after the previous frame has been
    /// written. If the sink's consumer disconnects while the relay is waiting
    /// on upstream, iteration stops and `upstream` is dropped, which cancels
    /// whatever request is feeding it.
    pub async fn run<U, E, S>(&self, upstream: U, sink: S) -> RelayOutcome
    where
        U: Stream<Item = Result<String, E>> + Send,
        E: Display,
        S: EventSink,
    {
        let mut session = RelaySession::new(sink);
        let mut framer = Framer::new(self.protocol);
        let mut upstream = pin!(upstream);
        let mut fragments = 0usize;

        let terminal = 'relay: {
            for frame in framer.opening() {
                if let Err(e) = session.emit(frame).await {
                    warn!(error = %e, "sink rejected opening frame");
                    break 'relay session.finish(Vec::new(), Terminal::Aborted).await;
                }
            }

            loop {
                let step = tokio::select! {
                    biased;
                    () = session.consumer_gone() => Step::Disconnected,
                    step = self.next_step(&mut upstream) => step,
                };

                match step {
                    Step::Fragment(text) => {
                        fragments += 1;
                        for frame in framer.fragment(text) {
                            if let Err(e) = session.emit(frame).await {
                                warn!(error = %e, fragments, "sink write failed, ending session");
                                break 'relay session.finish(Vec::new(), Terminal::Aborted).await;
                            }
                        }
                    }
                    Step::End => {
                        break 'relay session
                            .finish(framer.completion(), Terminal::Completed)
                            .await;
                    }
                    Step::Failed(reason) => {
                        error!(error = %reason, fragments, "upstream stream error");
                        let frame = framer.failure(GENERIC_STREAM_ERROR);
                        break 'relay session.finish(vec![frame], Terminal::Errored).await;
                    }
                    Step::Disconnected => {
                        debug!(fragments, "client disconnected, dropping upstream");
                        break 'relay session.finish(Vec::new(), Terminal::Aborted).await;
                    }
                }
            }
        };

        let outcome = RelayOutcome {
            terminal,
            fragments,
            frames: session.frames_written(),
        };
        debug!(
            terminal = ?outcome.terminal,
            fragments = outcome.fragments,
            frames = outcome.frames,
            "relay session closed"
        );
        outcome
    }

    async fn next_step<U, E>(&self, upstream: &mut std::pin::Pin<&mut U>) -> Step
    where
        U: Stream<Item = Result<String, E>>,
        E: Display,
    {
        let next = match self.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, upstream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    return Step::Failed(format!("no fragment within {}ms", limit.as_millis()));
                }
            },
            None => upstream.next().await,
        };

        match next {
            Some(Ok(text)) => Step::Fragment(text),
            Some(Err(e)) => Step::Failed(e.to_string()),
            None => Step::End,
        }
    }
}
