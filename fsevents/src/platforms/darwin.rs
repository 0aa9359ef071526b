mod core_foundation;
mod fsevents;

pub use fsevents::{DarwinRemote, DarwinStream, FSEventsBackend};
