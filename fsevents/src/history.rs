//! Queries for choosing where a stream should start.

#[cfg(unix)]
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(unix)]
use crate::flags::DeviceId;
#[cfg(target_os = "macos")]
use crate::flags::EventId;
#[cfg(target_os = "macos")]
use crate::platforms::{Backend, FSEventsBackend};
#[cfg(unix)]
use crate::EventStreamError;

/// Seconds between the Unix epoch and the CoreFoundation reference date,
/// 2001-01-01 00:00:00 UTC.
const CF_ABSOLUTE_TIME_OFFSET: f64 = 978_307_200.0;

/// Converts a wall-clock time into `CFAbsoluteTime`.
pub fn absolute_time(time: SystemTime) -> f64 {
    let unix_seconds = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    };
    unix_seconds - CF_ABSOLUTE_TIME_OFFSET
}

/// The device `path` lives on. Symlinks are not followed.
#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
pub fn device_for_path(path: impl AsRef<Path>) -> Result<DeviceId, EventStreamError> {
    let stat = nix::sys::stat::lstat(path.as_ref())?;
    Ok(stat.st_dev as DeviceId)
}

/// The present value of the global FSEvents counter. Resuming from it is a
/// precise "since now".
#[cfg(target_os = "macos")]
pub fn current_event_id() -> EventId {
    FSEventsBackend.current_event_id()
}

/// The newest event id recorded for `device` before `time`, for resuming by
/// wall-clock time instead of a saved cursor.
#[cfg(target_os = "macos")]
pub fn last_event_id_for_device_before_time(device: DeviceId, time: SystemTime) -> EventId {
    FSEventsBackend.last_event_id_before(device, time)
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::MetadataExt;
    use std::time::Duration;

    use super::*;

    #[test]
    fn absolute_time_is_relative_to_2001() {
        let reference = UNIX_EPOCH + Duration::from_secs(978_307_200);
        assert_eq!(absolute_time(reference), 0.0);
        assert_eq!(absolute_time(reference + Duration::from_secs(60)), 60.0);
        assert_eq!(absolute_time(UNIX_EPOCH), -978_307_200.0);
    }

    #[test]
    fn device_matches_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let expected = std::fs::symlink_metadata(dir.path()).unwrap().dev();
        assert_eq!(device_for_path(dir.path()).unwrap(), expected);
    }

    #[test]
    fn missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = device_for_path(dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, EventStreamError::FileSystemError(_)));
    }
}
