use std::ffi::{CStr, OsStr};
use std::ops::Deref;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use async_stream::stream;
use futures::Stream;
use tokio::sync::mpsc::Receiver;
use tokio_stream::wrappers::ReceiverStream;

use crate::flags::{EventFlags, EventId};

/// A single change reported by the native mechanism.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    pub path: PathBuf,
    pub flags: EventFlags,
    pub id: EventId,
}

/// What happened to the item, derived from the record's flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Remove,
    Modify,
    Rename,
    Metadata,
    /// Events were coalesced or dropped, the subtree has to be rescanned.
    Rescan,
    /// End of the historical replay. The path carries no meaning.
    HistoryDone,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

impl EventRecord {
    pub fn new(path: impl Into<PathBuf>, flags: EventFlags, id: EventId) -> EventRecord {
        EventRecord {
            path: path.into(),
            flags,
            id,
        }
    }

    /// Builds a record from one slot of the native callback arrays.
    ///
    /// # Safety
    /// `path` must point to a valid NUL terminated string.
    pub(crate) unsafe fn from_raw(
        path: *const std::os::raw::c_char,
        flags: u32,
        id: EventId,
    ) -> EventRecord {
        let path = OsStr::from_bytes(CStr::from_ptr(path).to_bytes());
        EventRecord {
            path: PathBuf::from(path),
            flags: EventFlags::from_bits_retain(flags),
            id,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> EventKind {
        let flags = self.flags;
        match flags {
            x if x.contains(EventFlags::HISTORY_DONE) => EventKind::HistoryDone,
            x if x.contains(EventFlags::MUST_SCAN_SUB_DIRS) => EventKind::Rescan,
            x if x.contains(EventFlags::ITEM_CREATED) => {
                if x.contains(EventFlags::ITEM_REMOVED) {
                    EventKind::Remove
                } else if x.contains(EventFlags::ITEM_RENAMED) {
                    EventKind::Rename
                } else {
                    EventKind::Create
                }
            }
            x if x.intersects(EventFlags::ITEM_REMOVED | EventFlags::UNMOUNT) => EventKind::Remove,
            x if x.intersects(EventFlags::ITEM_RENAMED | EventFlags::ROOT_CHANGED) => {
                EventKind::Rename
            }
            x if x.contains(EventFlags::ITEM_MODIFIED) => EventKind::Modify,
            x if x.contains(EventFlags::MOUNT) => EventKind::Create,
            x if x.intersects(
                EventFlags::ITEM_INODE_META_MOD
                    | EventFlags::ITEM_FINDER_INFO_MOD
                    | EventFlags::ITEM_CHANGE_OWNER
                    | EventFlags::ITEM_XATTR_MOD,
            ) =>
            {
                EventKind::Metadata
            }
            _ => EventKind::Unknown,
        }
    }

    pub fn target(&self) -> TargetKind {
        if self.flags.contains(EventFlags::ITEM_IS_DIR) {
            TargetKind::Directory
        } else if self.flags.contains(EventFlags::ITEM_IS_SYMLINK) {
            TargetKind::Symlink
        } else if self.flags.contains(EventFlags::ITEM_IS_FILE) {
            TargetKind::File
        } else {
            TargetKind::Unknown
        }
    }
}

/// Records delivered together by one callback invocation, in native order.
/// Never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventBatch(Vec<EventRecord>);

impl EventBatch {
    /// Returns `None` for an empty record list.
    pub fn new(records: Vec<EventRecord>) -> Option<EventBatch> {
        if records.is_empty() {
            None
        } else {
            Some(EventBatch(records))
        }
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.0
    }

    pub fn max_id(&self) -> EventId {
        self.0.iter().map(|r| r.id).max().unwrap_or_default()
    }

    pub fn into_records(self) -> Vec<EventRecord> {
        self.0
    }
}

impl Deref for EventBatch {
    type Target = [EventRecord];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for EventBatch {
    type Item = EventRecord;
    type IntoIter = std::vec::IntoIter<EventRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Adapts the batch channel into a `Stream` of batches.
pub fn batches(receiver: Receiver<EventBatch>) -> ReceiverStream<EventBatch> {
    ReceiverStream::new(receiver)
}

/// Flattens the batch channel into a `Stream` of individual records, keeping
/// batch and record order.
pub fn records(mut receiver: Receiver<EventBatch>) -> impl Stream<Item = EventRecord> + Send {
    stream! {
        while let Some(batch) = receiver.recv().await {
            for record in batch {
                yield record;
            }
        }
    }
}
