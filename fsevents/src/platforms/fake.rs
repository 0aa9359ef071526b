//! In-process stand-in for the native mechanism.
//!
//! It keeps a journal of every emitted event, replays the journal past
//! `since` when a resuming stream starts, holds events back for the latency
//! window unless `NO_DEFER` is set, and delivers through the same C entry
//! point the real service calls.

use std::collections::VecDeque;
use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tokio_util::sync::CancellationToken;

use super::{Backend, CallbackContext, FlushMode, LoopRemote, NativeStream, StreamRequest};
use crate::flags::{CreateFlags, DeviceId, EventFlags, EventId, SINCE_NOW};
use crate::EventStreamError;

const POLL: Duration = Duration::from_millis(5);

#[derive(Clone, Debug)]
pub(crate) struct RawEvent {
    pub path: String,
    pub flags: EventFlags,
    pub id: EventId,
    pub at: SystemTime,
}

enum Command {
    Deliver(Vec<RawEvent>),
    Flush(Option<Sender<()>>),
    Wake,
}

#[derive(Default)]
struct Inner {
    journal: Vec<RawEvent>,
    live: Option<Sender<Command>>,
    requests: Vec<StreamRequest>,
}

#[derive(Default)]
struct FakeState {
    inner: Mutex<Inner>,
    fail_create: AtomicBool,
    fail_start: AtomicBool,
    scheduled: AtomicUsize,
    released: AtomicUsize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    state: Arc<FakeState>,
}

impl FakeBackend {
    /// Records `events` as one native batch and hands it to the running
    /// stream, if any.
    pub fn emit(&self, events: &[(&str, EventFlags, EventId)]) {
        let now = SystemTime::now();
        let batch: Vec<RawEvent> = events
            .iter()
            .map(|(path, flags, id)| RawEvent {
                path: (*path).to_owned(),
                flags: *flags,
                id: *id,
                at: now,
            })
            .collect();

        let mut inner = self.state.inner.lock().unwrap();
        inner.journal.extend(batch.iter().cloned());
        if let Some(live) = &inner.live {
            let _ = live.send(Command::Deliver(batch));
        }
    }

    pub fn emit_ids(&self, ids: impl IntoIterator<Item = EventId>) {
        for id in ids {
            self.emit(&[("/fake/file", EventFlags::ITEM_MODIFIED, id)]);
        }
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.state.inner.lock().unwrap().requests.clone()
    }

    pub fn fail_create(&self) {
        self.state.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_start(&self) {
        self.state.fail_start.store(true, Ordering::SeqCst);
    }

    pub fn scheduled(&self) -> usize {
        self.state.scheduled.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }
}

pub(crate) struct FakeStream {
    state: Arc<FakeState>,
    context: CallbackContext,
    since: EventId,
    hold: bool,
    commands: Option<Receiver<Command>>,
    pending: VecDeque<RawEvent>,
}

pub(crate) struct FakeRemote {
    commands: Sender<Command>,
}

impl Backend for FakeBackend {
    type Stream = FakeStream;

    fn create_stream(
        &self,
        request: &StreamRequest,
        context: CallbackContext,
    ) -> Result<FakeStream, EventStreamError> {
        self.state.inner.lock().unwrap().requests.push(request.clone());
        if self.state.fail_create.swap(false, Ordering::SeqCst) {
            return Err(EventStreamError::StreamCreateFailed(
                "fake backend refused".to_owned(),
            ));
        }

        Ok(FakeStream {
            state: self.state.clone(),
            context,
            since: request.since,
            hold: !request.latency.is_zero() && !request.flags.contains(CreateFlags::NO_DEFER),
            commands: None,
            pending: VecDeque::new(),
        })
    }

    fn current_event_id(&self) -> EventId {
        let inner = self.state.inner.lock().unwrap();
        inner.journal.iter().map(|e| e.id).max().unwrap_or(0)
    }

    fn last_event_id_before(&self, _device: DeviceId, time: SystemTime) -> EventId {
        let inner = self.state.inner.lock().unwrap();
        inner
            .journal
            .iter()
            .filter(|e| e.at < time)
            .map(|e| e.id)
            .max()
            .unwrap_or(0)
    }
}

impl FakeStream {
    fn invoke(&self, events: &[RawEvent]) {
        let strings: Vec<CString> = events
            .iter()
            .map(|e| CString::new(e.path.as_str()).unwrap())
            .collect();
        let paths: Vec<*const c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        let flags: Vec<u32> = events.iter().map(|e| e.flags.bits()).collect();
        let ids: Vec<u64> = events.iter().map(|e| e.id).collect();

        (self.context.callback)(
            ptr::null(),
            self.context.info(),
            events.len(),
            paths.as_ptr() as *mut c_void,
            flags.as_ptr(),
            ids.as_ptr(),
        );
    }

    fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let events: Vec<RawEvent> = self.pending.drain(..).collect();
        self.invoke(&events);
    }
}

impl NativeStream for FakeStream {
    type Remote = FakeRemote;

    fn schedule_and_start(&mut self) -> Result<FakeRemote, EventStreamError> {
        self.state.scheduled.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_start.swap(false, Ordering::SeqCst) {
            return Err(EventStreamError::StreamStartFailed(
                "fake backend refused to start".to_owned(),
            ));
        }

        let (tx, rx) = unbounded();
        let mut inner = self.state.inner.lock().unwrap();
        if self.since != SINCE_NOW {
            let history: Vec<RawEvent> = inner
                .journal
                .iter()
                .filter(|e| e.id > self.since)
                .cloned()
                .collect();
            if !history.is_empty() {
                let _ = tx.send(Command::Deliver(history));
            }
        }
        inner.live = Some(tx.clone());
        self.commands = Some(rx);

        Ok(FakeRemote { commands: tx })
    }

    fn run(&mut self, stop: &CancellationToken) {
        let Some(commands) = self.commands.take() else {
            return;
        };

        while !stop.is_cancelled() {
            match commands.recv_timeout(POLL) {
                Ok(Command::Deliver(events)) => {
                    if self.hold {
                        self.pending.extend(events);
                    } else {
                        self.invoke(&events);
                    }
                }
                Ok(Command::Flush(ack)) => {
                    self.flush_pending();
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
                Ok(Command::Wake) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.state.inner.lock() {
            inner.live = None;
        }
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl LoopRemote for FakeRemote {
    fn flush(&self, mode: FlushMode) {
        match mode {
            FlushMode::Sync => {
                let (ack_tx, ack_rx) = unbounded();
                if self.commands.send(Command::Flush(Some(ack_tx))).is_ok() {
                    let _ = ack_rx.recv();
                }
            }
            FlushMode::Async => {
                let _ = self.commands.send(Command::Flush(None));
            }
        }
    }

    fn wake(&self) {
        let _ = self.commands.send(Command::Wake);
    }
}
