//! The seam between [`EventStream`](crate::EventStream) and the operating
//! system's change-notification service.
//!
//! A [`Backend`] creates native streams. A [`NativeStream`] is moved onto the
//! dispatch thread, where it is scheduled on that thread's loop and driven
//! until the session's stop token fires. Dropping it stops delivery and
//! releases the native handle. The [`LoopRemote`] it hands back is the only
//! way other threads talk to the running stream.

use std::os::raw::c_void;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use crate::flags::{CreateFlags, DeviceId, EventId};
use crate::EventStreamError;

#[cfg(target_os = "macos")]
pub mod darwin;

#[cfg(target_os = "macos")]
pub use darwin::FSEventsBackend;

#[cfg(test)]
pub(crate) mod fake;

/// C entry point the native mechanism invokes with each batch:
/// `(stream, info, num_events, event_paths, event_flags, event_ids)`.
pub type NativeCallback = extern "C" fn(
    *const c_void, // ConstFSEventStreamRef the batch came from
    *mut c_void,   // info, the opaque context supplied at creation
    usize,         // numEvents
    *mut c_void,   // eventPaths, an array of C strings
    *const u32,    // eventFlags
    *const u64,    // eventIds
);

/// Identifies one session to the callback bridge.
#[derive(Clone, Copy, Debug)]
pub struct CallbackContext {
    pub token: usize,
    pub callback: NativeCallback,
}

impl CallbackContext {
    /// The token in the pointer-sized slot native contexts carry. It is
    /// never dereferenced.
    pub fn info(&self) -> *mut c_void {
        self.token as *mut c_void
    }
}

/// Parameters for one native stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamRequest {
    /// Absolute watch roots.
    pub paths: Vec<PathBuf>,
    pub device: Option<DeviceId>,
    pub since: EventId,
    pub latency: Duration,
    pub flags: CreateFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushMode {
    /// Block until every buffered event has been delivered.
    Sync,
    /// Request delivery and return immediately.
    Async,
}

pub trait Backend: Send + Sync + 'static {
    type Stream: NativeStream;

    /// Creates (but does not start) a native stream.
    fn create_stream(
        &self,
        request: &StreamRequest,
        context: CallbackContext,
    ) -> Result<Self::Stream, EventStreamError>;

    /// The current value of the global event counter.
    fn current_event_id(&self) -> EventId;

    /// Newest event id recorded for `device` before `time`.
    fn last_event_id_before(&self, device: DeviceId, time: SystemTime) -> EventId;
}

pub trait NativeStream: Send + 'static {
    type Remote: LoopRemote;

    /// Schedules the stream on the calling thread's dispatch loop and starts
    /// delivery.
    fn schedule_and_start(&mut self) -> Result<Self::Remote, EventStreamError>;

    /// Runs the calling thread's dispatch loop until `stop` is cancelled.
    fn run(&mut self, stop: &CancellationToken);
}

pub trait LoopRemote: Send + Sync + 'static {
    fn flush(&self, mode: FlushMode);

    /// Interrupts the dispatch loop so the runner notices its stop token.
    fn wake(&self);
}
