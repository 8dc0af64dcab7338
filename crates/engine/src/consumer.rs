//! Consumers: output sinks driven by a connected producer.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use clipframe_common::error::ClipframeResult;

use crate::producer::Producer;
use crate::properties::Properties;

/// Where a file consumer writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerTarget {
    /// A single encoded image.
    ImageFile(PathBuf),
    /// An image sequence; the file name carries a printf-style counter
    /// such as `%04d`.
    ImageSequence(PathBuf),
}

impl ConsumerTarget {
    pub fn path(&self) -> &Path {
        match self {
            ConsumerTarget::ImageFile(path) | ConsumerTarget::ImageSequence(path) => path,
        }
    }
}

/// How a consumer run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerExit {
    pub success: bool,
    /// The run was ended by `stop()` rather than by reaching the end.
    pub stopped: bool,
    pub frames_written: i64,
    /// Diagnostic text from the engine (stderr on failure).
    pub detail: String,
}

/// Notifications a consumer pushes to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerEvent {
    /// The engine finished writing and released its outputs.
    Finished(ConsumerExit),
    /// Interrupts a subscriber blocked on the channel. Sent by the
    /// subscriber's own control handles, never by a consumer.
    Wake,
}

/// An output sink connected to at most one producer at a time.
pub trait Consumer: Send {
    /// Engine driver name for logging.
    fn driver(&self) -> &str;

    fn properties(&self) -> &Properties;

    /// Attach a producer. Fails with `ConsumerBusy` while a previous
    /// connection is still live; `purge()` or `stop()` releases it.
    fn connect(&mut self, producer: &Producer) -> ClipframeResult<()>;

    /// Drop pending output and release the current connection.
    fn purge(&mut self);

    fn start(&mut self) -> ClipframeResult<()>;

    fn stop(&mut self) -> ClipframeResult<()>;

    fn is_stopped(&self) -> bool;

    /// Start and block until the engine has written everything.
    fn run(&mut self) -> ClipframeResult<ConsumerExit>;

    /// Receive [`ConsumerEvent`]s for subsequent runs.
    fn subscribe(&mut self, events: Sender<ConsumerEvent>);

    /// Whether this consumer emits [`ConsumerEvent::Finished`] once its
    /// output is flushed.
    fn signals_completion(&self) -> bool {
        false
    }
}
