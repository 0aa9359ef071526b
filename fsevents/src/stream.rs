use std::path::{self, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bridge::{Registration, SessionContext};
use crate::config::StreamConfig;
use crate::event::EventBatch;
use crate::flags::{EventId, SINCE_NOW};
#[cfg(target_os = "macos")]
use crate::platforms::FSEventsBackend;
use crate::platforms::{Backend, FlushMode, LoopRemote, NativeStream, StreamRequest};
use crate::{EventStreamError, Result};

/// A restartable change-notification stream.
///
/// Construction only records configuration. [`start`](Self::start) creates
/// the native stream and a dedicated dispatch thread;
/// [`stop`](Self::stop) tears both down again. Batches go to one bounded
/// channel that outlives every start/stop cycle.
pub struct EventStream<B: Backend> {
    config: StreamConfig,
    backend: B,
    last_event_id: Arc<AtomicU64>,
    sender: Option<Sender<EventBatch>>,
    receiver: Option<Receiver<EventBatch>>,
    session: Option<Session<B>>,
}

/// Native resources of one start/stop cycle.
struct Session<B: Backend> {
    registration: Registration,
    stop: CancellationToken,
    remote: <B::Stream as NativeStream>::Remote,
    exited: oneshot::Receiver<()>,
}

#[cfg(target_os = "macos")]
impl EventStream<FSEventsBackend> {
    pub fn new(config: StreamConfig) -> Self {
        EventStream::with_backend(config, FSEventsBackend)
    }
}

impl<B: Backend> EventStream<B> {
    /// Without a resume point the cursor starts at the backend's current
    /// event id, so a restart before the first start does not replay the
    /// device's history.
    pub fn with_backend(config: StreamConfig, backend: B) -> Self {
        let cursor = if config.resume {
            config.event_id
        } else {
            backend.current_event_id()
        };
        EventStream {
            config,
            backend,
            last_event_id: Arc::new(AtomicU64::new(cursor)),
            sender: None,
            receiver: None,
            session: None,
        }
    }

    /// Publish onto `sender` instead of a channel allocated by the stream.
    pub fn with_sender(mut self, sender: Sender<EventBatch>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Changes take effect on the next start.
    pub fn config_mut(&mut self) -> &mut StreamConfig {
        &mut self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// The resume cursor: the highest event id delivered so far.
    ///
    /// While running this races the dispatch thread; read it after
    /// [`stop`](Self::stop) for a settled value.
    pub fn last_event_id(&self) -> EventId {
        self.last_event_id.load(Ordering::Acquire)
    }

    /// Hands out the receiving half of the stream's own channel, allocating
    /// it if needed. Returns `None` once taken, or when a sender was supplied.
    pub fn take_events(&mut self) -> Option<Receiver<EventBatch>> {
        if self.sender.is_none() {
            self.sender();
        }
        self.receiver.take()
    }

    fn sender(&mut self) -> Sender<EventBatch> {
        let capacity = self.config.channel_capacity;
        let receiver = &mut self.receiver;
        self.sender
            .get_or_insert_with(|| {
                let (tx, rx) = mpsc::channel(capacity);
                *receiver = Some(rx);
                tx
            })
            .clone()
    }

    fn resolve_paths(&self) -> Result<Vec<PathBuf>> {
        self.config
            .paths
            .iter()
            .map(|p| {
                path::absolute(p).map_err(|e| EventStreamError::PathResolution {
                    path: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Creates the native stream and starts its dispatch thread.
    ///
    /// Returns once the stream is scheduled and delivering. Events then flow
    /// until [`stop`](Self::stop).
    pub async fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(EventStreamError::StreamStarted);
        }
        self.config.validate()?;

        let paths = self.resolve_paths()?;
        let since = self.config.since();
        let cursor = if since != SINCE_NOW {
            since
        } else {
            self.backend.current_event_id()
        };

        // The runner may advance the cursor before the handshake completes,
        // so it is seeded up front and put back if the launch fails.
        let previous = self.last_event_id.swap(cursor, Ordering::AcqRel);
        match self.launch(paths, since).await {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                self.last_event_id.store(previous, Ordering::Release);
                Err(e)
            }
        }
    }

    async fn launch(&mut self, paths: Vec<PathBuf>, since: EventId) -> Result<Session<B>> {
        let stop = CancellationToken::new();
        let registration = Registration::register(SessionContext::new(
            self.last_event_id.clone(),
            self.sender(),
            stop.clone(),
        ));
        let token = registration.token();

        let request = StreamRequest {
            paths,
            device: self.config.device,
            since,
            latency: self.config.latency,
            flags: self.config.flags.native(),
        };
        let mut native = self
            .backend
            .create_stream(&request, registration.context())?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let runner_stop = stop.clone();

        thread::Builder::new()
            .name(format!("fsevents-{token}"))
            .spawn(move || {
                let remote = match native.schedule_and_start() {
                    Ok(remote) => remote,
                    Err(e) => {
                        drop(native);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if ready_tx.send(Ok(remote)).is_err() {
                    return;
                }

                native.run(&runner_stop);
                drop(native);
                let _ = exit_tx.send(());
            })?;

        let remote = ready_rx
            .await
            .map_err(|_| EventStreamError::StreamClosed)??;

        info!(
            token,
            roots = request.paths.len(),
            device = ?request.device,
            since,
            "event stream started"
        );

        Ok(Session {
            registration,
            stop,
            remote,
            exited: exit_rx,
        })
    }

    /// Stops delivery, releases the native stream and waits for the
    /// dispatch thread to exit. A no-op when not running.
    ///
    /// A batch blocked on a full channel is abandoned and not counted in
    /// the cursor. The channel stays open and the cursor is kept.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let token = session.registration.token();

        session.stop.cancel();
        session.remote.wake();
        let exited = session.exited.await;
        drop(session.registration);

        if exited.is_err() {
            error!(token, "dispatch thread ended without reporting");
            return Err(EventStreamError::StreamClosed);
        }

        info!(token, last_event_id = self.last_event_id(), "event stream stopped");
        Ok(())
    }

    /// Stops, then starts again right after the last delivered event.
    pub async fn restart(&mut self) -> Result<()> {
        self.stop().await?;
        self.config.event_id = self.last_event_id();
        self.config.resume = true;
        self.start().await
    }

    /// Asks the native mechanism to deliver what it is holding back for the
    /// latency window.
    ///
    /// [`FlushMode::Sync`] blocks the calling thread until the batches have
    /// been published. Call it outside the async executor, and never from
    /// the task that drains the channel.
    pub fn flush(&self, mode: FlushMode) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .ok_or(EventStreamError::StreamNotRunning)?;
        session.remote.flush(mode);
        Ok(())
    }
}

impl<B: Backend> Drop for EventStream<B> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop.cancel();
            session.remote.wake();
        }
    }
}
