use std::path::PathBuf;
use std::time::Duration;

use crate::flags::{CreateFlags, DeviceId, EventId, SINCE_NOW};
use crate::EventStreamError;

/// Everything needed to create a native stream.
///
/// The stream reads this on every start. Restart writes the resume cursor
/// back into `event_id` and turns `resume` on.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Watch roots. Relative paths are made absolute on start.
    pub paths: Vec<PathBuf>,
    /// Restrict monitoring to one device. Paths are made absolute the same
    /// way as without a device.
    pub device: Option<DeviceId>,
    pub flags: CreateFlags,
    /// How long the native mechanism coalesces changes before delivering.
    pub latency: Duration,
    /// Where to resume from when `resume` is set.
    pub event_id: EventId,
    pub resume: bool,
    /// Capacity of the output channel, if the stream allocates it itself.
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            paths: Vec::new(),
            device: None,
            flags: CreateFlags::empty(),
            latency: Duration::ZERO,
            event_id: SINCE_NOW,
            resume: false,
            channel_capacity: 1,
        }
    }
}

impl StreamConfig {
    pub fn new<I, P>(paths: I) -> StreamConfig
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        StreamConfig {
            paths: paths.into_iter().map(Into::into).collect(),
            ..StreamConfig::default()
        }
    }

    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_flags(mut self, flags: CreateFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Resume from `event_id` instead of starting from now.
    pub fn resume_from(mut self, event_id: EventId) -> Self {
        self.event_id = event_id;
        self.resume = true;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// The id handed to the native stream as its starting point.
    pub fn since(&self) -> EventId {
        if self.resume {
            self.event_id
        } else {
            SINCE_NOW
        }
    }

    pub fn validate(&self) -> Result<(), EventStreamError> {
        if self.paths.is_empty() && self.device.is_none() {
            return Err(EventStreamError::InvalidConfig(
                "at least one watch path or a device is required".to_owned(),
            ));
        }
        if self.device == Some(0) {
            return Err(EventStreamError::InvalidConfig(
                "device id 0 does not name a device".to_owned(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(EventStreamError::InvalidConfig(
                "channel capacity must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}
