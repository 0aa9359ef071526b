//! FSEvents change-notification streams.
//!
//! An [`EventStream`] asks the operating system to watch a set of directory
//! trees (or a whole device) and publishes each batch of changes the native
//! mechanism reports onto a bounded channel. Every record carries an event
//! id; the stream remembers the highest one it delivered so that
//! [`EventStream::restart`] resumes exactly after it.
//!
//! ```no_run
//! # #[cfg(target_os = "macos")]
//! # async fn run() -> fsevents::Result<()> {
//! use fsevents::{CreateFlags, EventStream, StreamConfig};
//!
//! let config = StreamConfig::new(["/tmp"]).with_flags(CreateFlags::FILE_EVENTS);
//! let mut stream = EventStream::new(config);
//! stream.start().await?;
//!
//! let mut events = stream.take_events().expect("channel is taken once");
//! while let Some(batch) = events.recv().await {
//!     for record in batch.records() {
//!         println!("[{}] {:?} {:?}", record.id, record.kind(), record.path);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod bridge;
mod config;
mod event;
mod flags;
mod history;
pub mod platforms;
mod stream;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use config::StreamConfig;
pub use event::{batches, records, EventBatch, EventKind, EventRecord, TargetKind};
pub use flags::{CreateFlags, DeviceId, EventFlags, EventId, SINCE_NOW};
pub use history::absolute_time;
#[cfg(unix)]
pub use history::device_for_path;
#[cfg(target_os = "macos")]
pub use history::{current_event_id, last_event_id_for_device_before_time};
pub use platforms::FlushMode;
pub use stream::EventStream;

#[derive(Error, Debug, Clone)]
pub enum EventStreamError {
    #[error("invalid stream configuration: {0}")]
    InvalidConfig(String),

    #[error("unable to resolve watch root {path:?}: {reason}")]
    PathResolution { path: PathBuf, reason: String },

    #[error("native stream could not be created: {0}")]
    StreamCreateFailed(String),

    #[error("native stream could not be started: {0}")]
    StreamStartFailed(String),

    #[error("stream has already started")]
    StreamStarted,

    #[error("stream is not running")]
    StreamNotRunning,

    #[error("the dispatch loop exited unexpectedly")]
    StreamClosed,

    #[error("file system error {0}")]
    FileSystemError(String),
}

impl From<io::Error> for EventStreamError {
    fn from(value: io::Error) -> Self {
        EventStreamError::FileSystemError(value.to_string())
    }
}

#[cfg(unix)]
impl From<nix::errno::Errno> for EventStreamError {
    fn from(value: nix::errno::Errno) -> Self {
        EventStreamError::FileSystemError(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EventStreamError>;
