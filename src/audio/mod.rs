//! Audio module - hands mixed audio from the engine thread to the device
//!
//! This module provides:
//! - Frame ring with a single atomic ready-frame counter
//! - Producer side: interleave with gain ramp, per-tick silence substitution
//! - Consumer side: drain on demand with underrun padding and a starvation flag
//! - Output sink session tying the ring to a device adapter
//! - Device adapters for cpal and for manual (callback-free) rendering

mod consumer;
pub mod device;
mod error;
mod producer;
mod ring;
mod sink;

// Re-export public types
pub use consumer::{DeviceDrain, WakeFn};
pub use device::{DeviceAdapter, StreamFormat};
pub use error::{SinkError, SinkResult};
pub use producer::{interleave_with_ramp, AudioBlock, GainRamp, MixProducer};
pub use ring::{FrameRing, RingConsumer, RingProducer};
pub use sink::OutputSink;
