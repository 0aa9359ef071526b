#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]

use std::os::raw::{c_uchar, c_void};

use crate::platforms::NativeCallback;

//
// MacOS CoreFoundation types
//
pub type Boolean = c_uchar;

pub type CFRef = *mut c_void;
pub type CFTypeRef = *const c_void;
pub type CFStringRef = CFRef;
pub type CFArrayRef = CFRef;
pub type CFMutableArrayRef = CFRef;
pub type CFAllocatorRef = CFRef;
pub type CFRunLoopRef = CFRef;
pub type CFRunLoopMode = CFStringRef;
pub type CFIndex = isize;
pub type CFStringEncoding = u32;
pub type CFTimeInterval = f64;
pub type CFAbsoluteTime = CFTimeInterval;
pub type CFRunLoopRunResult = i32;

pub type CFAllocatorRetainCallBack = extern "C" fn(*const c_void) -> *const c_void;
pub type CFAllocatorReleaseCallBack = extern "C" fn(*const c_void);
pub type CFAllocatorCopyDescriptionCallBack = extern "C" fn(*const c_void) -> CFStringRef;

/// Opaque, only ever used through `kCFTypeArrayCallBacks`.
#[repr(C)]
pub struct CFArrayCallBacks {
    _private: [u8; 0],
}

pub const NULL: CFRef = 0 as CFRef;
pub const kCFAllocatorDefault: CFAllocatorRef = NULL;
pub const kCFStringEncodingUTF8: CFStringEncoding = 0x0800_0100;

pub const kCFRunLoopRunFinished: CFRunLoopRunResult = 1;

//
// MacOS FSEvents types
//
pub type FSEventStreamRef = CFRef;
pub type FSEventStreamEventId = u64;
pub type FSEventStreamCreateFlags = u32;
pub type FSEventStreamCallback = NativeCallback;

#[repr(C)]
pub struct FSEventStreamContext {
    pub version: CFIndex,
    pub info: *mut c_void,
    pub retain: Option<CFAllocatorRetainCallBack>,
    pub release: Option<CFAllocatorReleaseCallBack>,
    pub copy_description: Option<CFAllocatorCopyDescriptionCallBack>,
}
