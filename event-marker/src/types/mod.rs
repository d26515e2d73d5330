//! Value types shared across the crate.

mod event_code;

pub use event_code::EventCode;
