use std::time::SystemTime;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::core_foundation::types::{
    Boolean, CFRunLoopRef, CFTimeInterval, FSEventStreamContext, FSEventStreamRef,
    kCFAllocatorDefault, kCFRunLoopRunFinished,
};
use super::core_foundation::{self as CoreFoundation, path_array};
use crate::flags::{DeviceId, EventId};
use crate::history::absolute_time;
use crate::platforms::{
    Backend, CallbackContext, FlushMode, LoopRemote, NativeStream, StreamRequest,
};
use crate::EventStreamError;

/// Upper bound on one pass of the run loop. The loop re-checks its stop
/// token between passes, so a `CFRunLoopStop` that lands before the loop is
/// entered costs at most this long.
const RUN_LOOP_SLICE: CFTimeInterval = 0.5;

/// CoreServices FSEvents.
#[derive(Clone, Copy, Debug, Default)]
pub struct FSEventsBackend;

pub struct WrappedEventStreamRef(FSEventStreamRef);
unsafe impl Send for WrappedEventStreamRef {}
unsafe impl Sync for WrappedEventStreamRef {}

pub struct WrappedRunLoopRef(CFRunLoopRef);
unsafe impl Send for WrappedRunLoopRef {}
unsafe impl Sync for WrappedRunLoopRef {}

/// A created FSEventStreamRef. Dropping it stops, invalidates and releases it.
pub struct DarwinStream {
    stream: WrappedEventStreamRef,
    started: bool,
}

/// Retained references to a running stream and the run loop it is
/// scheduled on.
pub struct DarwinRemote {
    stream: WrappedEventStreamRef,
    run_loop: WrappedRunLoopRef,
}

impl Backend for FSEventsBackend {
    type Stream = DarwinStream;

    fn create_stream(
        &self,
        request: &StreamRequest,
        context: CallbackContext,
    ) -> Result<DarwinStream, EventStreamError> {
        let paths = path_array(&request.paths)?;

        // FSEventStreamCreate copies the context.
        let stream_context = FSEventStreamContext {
            version: 0,
            info: context.info(),
            retain: None,
            release: None,
            copy_description: None,
        };
        let latency = request.latency.as_secs_f64();
        let flags = request.flags.native().bits();

        let stream = unsafe {
            match request.device {
                Some(device) => CoreFoundation::FSEventStreamCreateRelativeToDevice(
                    kCFAllocatorDefault,
                    context.callback,
                    &stream_context,
                    device as libc::dev_t,
                    paths.as_ptr(),
                    request.since,
                    latency,
                    flags,
                ),
                None => CoreFoundation::FSEventStreamCreate(
                    kCFAllocatorDefault,
                    context.callback,
                    &stream_context,
                    paths.as_ptr(),
                    request.since,
                    latency,
                    flags,
                ),
            }
        };

        if stream.is_null() {
            return Err(EventStreamError::StreamCreateFailed(format!(
                "FSEventStreamCreate returned null for {} root(s)",
                request.paths.len()
            )));
        }

        debug!(token = context.token, since = request.since, "created FSEventStream");

        Ok(DarwinStream {
            stream: WrappedEventStreamRef(stream),
            started: false,
        })
    }

    fn current_event_id(&self) -> EventId {
        unsafe { CoreFoundation::FSEventsGetCurrentEventId() }
    }

    fn last_event_id_before(&self, device: DeviceId, time: SystemTime) -> EventId {
        unsafe {
            CoreFoundation::FSEventsGetLastEventIdForDeviceBeforeTime(
                device as libc::dev_t,
                absolute_time(time),
            )
        }
    }
}

impl NativeStream for DarwinStream {
    type Remote = DarwinRemote;

    fn schedule_and_start(&mut self) -> Result<DarwinRemote, EventStreamError> {
        unsafe {
            let run_loop = CoreFoundation::CFRunLoopGetCurrent();
            CoreFoundation::FSEventStreamScheduleWithRunLoop(
                self.stream.0,
                run_loop,
                CoreFoundation::kCFRunLoopDefaultMode,
            );

            if CoreFoundation::FSEventStreamStart(self.stream.0) == 0 {
                return Err(EventStreamError::StreamStartFailed(
                    "FSEventStreamStart refused the stream".to_owned(),
                ));
            }
            self.started = true;

            CoreFoundation::FSEventStreamRetain(self.stream.0);
            CoreFoundation::CFRetain(run_loop);

            Ok(DarwinRemote {
                stream: WrappedEventStreamRef(self.stream.0),
                run_loop: WrappedRunLoopRef(run_loop),
            })
        }
    }

    fn run(&mut self, stop: &CancellationToken) {
        while !stop.is_cancelled() {
            let result = unsafe {
                CoreFoundation::CFRunLoopRunInMode(
                    CoreFoundation::kCFRunLoopDefaultMode,
                    RUN_LOOP_SLICE,
                    false as Boolean,
                )
            };
            if result == kCFRunLoopRunFinished {
                warn!("run loop has no sources left, leaving dispatch loop");
                break;
            }
        }
    }
}

impl Drop for DarwinStream {
    fn drop(&mut self) {
        unsafe {
            if self.started {
                CoreFoundation::FSEventStreamStop(self.stream.0);
            }
            CoreFoundation::FSEventStreamInvalidate(self.stream.0);
            CoreFoundation::FSEventStreamRelease(self.stream.0);
        }
    }
}

impl LoopRemote for DarwinRemote {
    fn flush(&self, mode: FlushMode) {
        unsafe {
            match mode {
                FlushMode::Sync => CoreFoundation::FSEventStreamFlushSync(self.stream.0),
                FlushMode::Async => {
                    CoreFoundation::FSEventStreamFlushAsync(self.stream.0);
                }
            }
        }
    }

    fn wake(&self) {
        unsafe { CoreFoundation::CFRunLoopStop(self.run_loop.0) };
    }
}

impl Drop for DarwinRemote {
    fn drop(&mut self) {
        unsafe {
            CoreFoundation::FSEventStreamRelease(self.stream.0);
            CoreFoundation::CFRelease(self.run_loop.0);
        }
    }
}
