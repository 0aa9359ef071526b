//! The native callback and the registry it uses to find its session.
//!
//! Native contexts only carry a pointer-sized value. Instead of handing the
//! OS a pointer to the stream, each session registers a [`SessionContext`]
//! under a fresh integer token and passes the token. A callback whose token
//! is no longer registered (the session was stopped while the batch was in
//! flight) is dropped.

use std::collections::HashMap;
use std::os::raw::{c_char, c_void};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::event::{EventBatch, EventRecord};
use crate::flags::{EventFlags, EventId};
use crate::platforms::CallbackContext;

static SESSIONS: Lazy<Mutex<HashMap<usize, Arc<SessionContext>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

// Zero is never handed out so a null info pointer can't match a session.
static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(1);

fn sessions() -> MutexGuard<'static, HashMap<usize, Arc<SessionContext>>> {
    SESSIONS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State the callback needs for one running session.
pub(crate) struct SessionContext {
    cursor: Arc<AtomicU64>,
    sender: Sender<EventBatch>,
    stop: CancellationToken,
}

#[derive(Debug, PartialEq, Eq)]
enum Publish {
    Sent,
    /// The session was stopped while the consumer was not receiving.
    Abandoned,
    /// The receiving half is gone.
    Closed,
}

impl SessionContext {
    pub(crate) fn new(
        cursor: Arc<AtomicU64>,
        sender: Sender<EventBatch>,
        stop: CancellationToken,
    ) -> SessionContext {
        SessionContext {
            cursor,
            sender,
            stop,
        }
    }

    /// Moves the cursor past `records`, then publishes them as one batch.
    /// If the batch never reaches the channel the cursor is put back, so a
    /// restart replays it.
    fn deliver(&self, token: usize, records: Vec<EventRecord>) {
        let Some(batch) = EventBatch::new(records) else {
            warn!(token, "native callback delivered an empty batch, skipping");
            return;
        };

        let previous = self.cursor.load(Ordering::Acquire);
        let cursor = advance_cursor(previous, &batch);
        self.cursor.store(cursor, Ordering::Release);

        let len = batch.len();
        match futures::executor::block_on(self.publish(batch)) {
            Publish::Sent => debug!(token, len, cursor, "published batch"),
            Publish::Abandoned => {
                self.cursor.store(previous, Ordering::Release);
                warn!(token, len, "stream stopped before the batch was received");
            }
            Publish::Closed => {
                self.cursor.store(previous, Ordering::Release);
                warn!(token, len, "event receiver dropped, discarding batch");
            }
        }
    }

    async fn publish(&self, batch: EventBatch) -> Publish {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => Publish::Abandoned,
            sent = self.sender.send(batch) => match sent {
                Ok(()) => Publish::Sent,
                Err(_) => Publish::Closed,
            },
        }
    }
}

/// The cursor after `records`: the highest id seen, except that a record
/// flagged `EVENT_IDS_WRAPPED` starts counting again from its own id.
pub(crate) fn advance_cursor(current: EventId, records: &[EventRecord]) -> EventId {
    records.iter().fold(current, |cursor, record| {
        if record.flags.contains(EventFlags::EVENT_IDS_WRAPPED) {
            record.id
        } else {
            cursor.max(record.id)
        }
    })
}

/// Keeps a session reachable from the callback. Unregisters on drop.
pub(crate) struct Registration {
    token: usize,
}

impl Registration {
    pub(crate) fn register(session: SessionContext) -> Registration {
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        sessions().insert(token, Arc::new(session));
        Registration { token }
    }

    pub(crate) fn token(&self) -> usize {
        self.token
    }

    pub(crate) fn context(&self) -> CallbackContext {
        CallbackContext {
            token: self.token,
            callback: fsevents_callback,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        sessions().remove(&self.token);
    }
}

fn lookup(token: usize) -> Option<Arc<SessionContext>> {
    sessions().get(&token).cloned()
}

/// Decodes the three parallel native arrays.
///
/// # Safety
/// Each pointer must reference at least `len` initialized elements and every
/// path must be a valid C string.
unsafe fn decode(
    len: usize,
    paths: *const *const c_char,
    flags: *const u32,
    ids: *const u64,
) -> Vec<EventRecord> {
    (0..len)
        .map(|idx| {
            let record = EventRecord::from_raw(*paths.add(idx), *flags.add(idx), *ids.add(idx));
            trace!(id = record.id, flags = ?record.flags, path = %record.path.display(), "event");
            record
        })
        .collect()
}

pub(crate) extern "C" fn fsevents_callback(
    _stream_ref: *const c_void, // ConstFSEventStreamRef, unused
    info: *mut c_void,          // FSEventStreamContext->info, the session token
    num_events: usize,          // numEvents
    event_paths: *mut c_void,   // eventPaths, char** since CF types are never requested
    event_flags: *const u32,    // eventFlags
    event_ids: *const u64,      // eventIds
) {
    let token = info as usize;
    let Some(session) = lookup(token) else {
        warn!(token, num_events, "callback for an unregistered stream, dropping");
        return;
    };

    if num_events == 0 || event_paths.is_null() || event_flags.is_null() || event_ids.is_null() {
        warn!(token, num_events, "native callback delivered no events, skipping");
        return;
    }

    let records = unsafe {
        decode(
            num_events,
            event_paths as *const *const c_char,
            event_flags,
            event_ids,
        )
    };
    session.deliver(token, records);
}
