use bitflags::bitflags;

use crate::EventStreamError;

/// Position in the global change history. Ids only grow within one watch
/// session, which is what makes them usable as a resume cursor.
pub type EventId = u64;

/// Storage device (volume) identifier, as reported in `st_dev`.
pub type DeviceId = u64;

/// Reserved id asking the native mechanism to ignore history and begin from
/// the present moment.
pub const SINCE_NOW: EventId = u64::MAX;

bitflags! {
    /// Behaviour requested when a native stream is created.
    ///
    /// Bit positions follow the `kFSEventStreamCreateFlag*` ABI.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CreateFlags: u32 {
        /// Deliver paths as CoreFoundation objects. Never forwarded to the
        /// native stream, the bridge only understands raw C strings.
        #[doc(hidden)]
        const USE_CF_TYPES = 1 << 0;
        /// Deliver on the leading edge instead of after the latency window.
        const NO_DEFER = 1 << 1;
        /// Also report changes to the path leading up to a watch root.
        const WATCH_ROOT = 1 << 2;
        /// Drop events caused by the current process.
        const IGNORE_SELF = 1 << 3;
        /// Report individual files instead of coalesced directories.
        const FILE_EVENTS = 1 << 4;
        /// Tag events caused by the current process with `OWN_EVENT`.
        const MARK_SELF = 1 << 5;
        /// Replaces the path array with dictionaries. Stripped like `USE_CF_TYPES`.
        #[doc(hidden)]
        const USE_EXTENDED_DATA = 1 << 6;
        /// Replay every historical event, not only the latest per path.
        const FULL_HISTORY = 1 << 7;
    }
}

impl CreateFlags {
    /// Flags that change the layout of the callback payload.
    pub(crate) const PAYLOAD_LAYOUT: CreateFlags =
        CreateFlags::USE_CF_TYPES.union(CreateFlags::USE_EXTENDED_DATA);

    /// Parses the bitflags text form, e.g. `"NO_DEFER | FILE_EVENTS"`.
    pub fn parse(text: &str) -> Result<CreateFlags, EventStreamError> {
        bitflags::parser::from_str(text)
            .map_err(|e| EventStreamError::InvalidConfig(format!("create flags {text:?}: {e}")))
    }

    /// The flags actually handed to the native stream.
    pub(crate) fn native(self) -> CreateFlags {
        self.difference(Self::PAYLOAD_LAYOUT)
    }
}

bitflags! {
    /// Change-kind and diagnostic bits attached to every record.
    ///
    /// Bit positions follow the `kFSEventStreamEventFlag*` ABI. The `ITEM_*`
    /// bits are only produced by streams created with `FILE_EVENTS`.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EventFlags: u32 {
        const MUST_SCAN_SUB_DIRS = 1 << 0;
        const USER_DROPPED = 1 << 1;
        const KERNEL_DROPPED = 1 << 2;
        const EVENT_IDS_WRAPPED = 1 << 3;
        const HISTORY_DONE = 1 << 4;
        const ROOT_CHANGED = 1 << 5;
        const MOUNT = 1 << 6;
        const UNMOUNT = 1 << 7;
        const ITEM_CREATED = 1 << 8;
        const ITEM_REMOVED = 1 << 9;
        const ITEM_INODE_META_MOD = 1 << 10;
        const ITEM_RENAMED = 1 << 11;
        const ITEM_MODIFIED = 1 << 12;
        const ITEM_FINDER_INFO_MOD = 1 << 13;
        const ITEM_CHANGE_OWNER = 1 << 14;
        const ITEM_XATTR_MOD = 1 << 15;
        const ITEM_IS_FILE = 1 << 16;
        const ITEM_IS_DIR = 1 << 17;
        const ITEM_IS_SYMLINK = 1 << 18;
        const OWN_EVENT = 1 << 19;
        const ITEM_IS_HARDLINK = 1 << 20;
        const ITEM_IS_LAST_HARDLINK = 1 << 21;
        const ITEM_CLONED = 1 << 22;
    }
}
