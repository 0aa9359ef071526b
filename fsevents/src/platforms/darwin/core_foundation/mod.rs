pub mod types;

use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use types::*;

use crate::EventStreamError;

#[link(name = "CoreServices", kind = "framework")]
extern "C" {
    /// https://developer.apple.com/documentation/coreservices/1443980-fseventstreamcreate
    pub fn FSEventStreamCreate(
        allocator: CFAllocatorRef,
        callback: FSEventStreamCallback,
        context: *const FSEventStreamContext,
        pathsToWatch: CFArrayRef,
        sinceWhen: FSEventStreamEventId,
        latency: CFTimeInterval,
        flags: FSEventStreamCreateFlags,
    ) -> FSEventStreamRef;

    /// https://developer.apple.com/documentation/coreservices/1446012-fseventstreamcreaterelativetodev
    pub fn FSEventStreamCreateRelativeToDevice(
        allocator: CFAllocatorRef,
        callback: FSEventStreamCallback,
        context: *const FSEventStreamContext,
        deviceToWatch: libc::dev_t,
        pathsToWatchRelativeToDevice: CFArrayRef,
        sinceWhen: FSEventStreamEventId,
        latency: CFTimeInterval,
        flags: FSEventStreamCreateFlags,
    ) -> FSEventStreamRef;

    pub fn FSEventStreamScheduleWithRunLoop(
        streamRef: FSEventStreamRef,
        runLoop: CFRunLoopRef,
        runLoopMode: CFRunLoopMode,
    );

    pub fn FSEventStreamStart(streamRef: FSEventStreamRef) -> Boolean;

    pub fn FSEventStreamFlushSync(streamRef: FSEventStreamRef);

    pub fn FSEventStreamFlushAsync(streamRef: FSEventStreamRef) -> FSEventStreamEventId;

    pub fn FSEventStreamStop(streamRef: FSEventStreamRef);

    pub fn FSEventStreamInvalidate(streamRef: FSEventStreamRef);

    pub fn FSEventStreamRetain(streamRef: FSEventStreamRef);

    pub fn FSEventStreamRelease(streamRef: FSEventStreamRef);

    pub fn FSEventsGetCurrentEventId() -> FSEventStreamEventId;

    pub fn FSEventsGetLastEventIdForDeviceBeforeTime(
        dev: libc::dev_t,
        time: CFAbsoluteTime,
    ) -> FSEventStreamEventId;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    pub static kCFTypeArrayCallBacks: CFArrayCallBacks;

    pub static kCFRunLoopDefaultMode: CFRunLoopMode;

    pub fn CFRetain(cf: CFTypeRef) -> CFTypeRef;

    pub fn CFRelease(cf: CFTypeRef);

    pub fn CFArrayCreateMutable(
        allocator: CFAllocatorRef,
        capacity: CFIndex,
        callbacks: *const CFArrayCallBacks,
    ) -> CFMutableArrayRef;

    pub fn CFArrayAppendValue(theArray: CFMutableArrayRef, value: CFTypeRef);

    pub fn CFStringCreateWithBytes(
        allocator: CFAllocatorRef,
        bytes: *const u8,
        numBytes: CFIndex,
        encoding: CFStringEncoding,
        isExternalRepresentation: Boolean,
    ) -> CFStringRef;

    pub fn CFRunLoopGetCurrent() -> CFRunLoopRef;

    pub fn CFRunLoopRunInMode(
        mode: CFRunLoopMode,
        seconds: CFTimeInterval,
        returnAfterSourceHandled: Boolean,
    ) -> CFRunLoopRunResult;

    pub fn CFRunLoopStop(rl: CFRunLoopRef);
}

/// Owned CoreFoundation reference, released on drop.
pub struct CFOwned(CFRef);

impl CFOwned {
    /// Takes ownership of a +1 reference. Returns `None` for null.
    ///
    /// # Safety
    /// `raw` must be a CoreFoundation object the caller owns.
    pub unsafe fn from_create(raw: CFRef) -> Option<CFOwned> {
        if raw.is_null() {
            None
        } else {
            Some(CFOwned(raw))
        }
    }

    pub fn as_ptr(&self) -> CFRef {
        self.0
    }
}

impl Drop for CFOwned {
    fn drop(&mut self) {
        unsafe { CFRelease(self.0) };
    }
}

/// Builds the `CFArray<CFString>` of watch roots.
pub fn path_array(paths: &[PathBuf]) -> Result<CFOwned, EventStreamError> {
    unsafe {
        let array = CFOwned::from_create(CFArrayCreateMutable(
            kCFAllocatorDefault,
            0,
            &kCFTypeArrayCallBacks,
        ))
        .ok_or_else(|| {
            EventStreamError::StreamCreateFailed("unable to allocate watch root array".to_owned())
        })?;

        for path in paths {
            let bytes = path.as_os_str().as_bytes();
            let string = CFOwned::from_create(CFStringCreateWithBytes(
                kCFAllocatorDefault,
                bytes.as_ptr(),
                bytes.len() as CFIndex,
                kCFStringEncodingUTF8,
                false as Boolean,
            ))
            .ok_or_else(|| EventStreamError::PathResolution {
                path: path.clone(),
                reason: "not representable as a UTF-8 CFString".to_owned(),
            })?;
            // The array retains its own reference.
            CFArrayAppendValue(array.as_ptr(), string.as_ptr());
        }

        Ok(array)
    }
}
