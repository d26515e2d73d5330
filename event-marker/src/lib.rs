//! Discover a USB Event Marker and stream event codes to it.
//!
//! The event marker is a microcontroller that shows up as a USB serial
//! device and pulses its eight output pins with the bit pattern of every
//! byte it receives. Experiment software uses it to mark moments on external
//! recording hardware.
//!
//! Two pieces do the work:
//!
//! - [`locator::PortLocator`] enumerates serial devices, picks the one whose
//!   USB product string is `USBEventMarker`, puts its line in raw mode at the
//!   firmware's baud rate, and returns its path.
//! - [`streamer::EventStreamer`] opens that path and writes one byte per
//!   event, reconnecting whenever the device goes away.

pub mod config;
pub mod error;
pub mod locator;
pub mod streamer;
pub mod tracing;
pub mod types;
