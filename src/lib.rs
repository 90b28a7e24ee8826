//! ringsink - real-time audio hand-off between a mixer and an output device
//!
//! A frame-clocked mixing engine pushes planar blocks once per tick; the
//! output device pulls interleaved samples from its own callback thread.
//! The two sides meet in a fixed-size frame ring synchronized by a single
//! atomic counter, so neither side ever locks, allocates or waits.

pub mod audio;
pub mod settings;

pub use audio::{
    AudioBlock, DeviceAdapter, GainRamp, OutputSink, SinkError, SinkResult, StreamFormat,
};
pub use settings::{Backend, SinkSettings};
