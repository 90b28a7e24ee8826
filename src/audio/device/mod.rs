//! Output device adapters
//!
//! A [`DeviceAdapter`] is the only place that differs between deployment
//! targets. It negotiates a format, takes ownership of the [`DeviceDrain`]
//! and invokes it from whatever callback the platform provides, at the
//! platform's own cadence and granularity.
//!
//! - [`CpalDevice`]: the cpal callback drains straight into the device buffer
//! - [`CpalQueuedDevice`]: drained audio is pushed into a stream queue that
//!   the callback then pulls from
//! - [`ManualDevice`]: no thread at all; the caller pulls buffers explicitly

mod cpal_backend;
mod manual;
mod queue;

pub use cpal_backend::{CpalDevice, CpalQueuedDevice};
pub use manual::ManualDevice;
pub use queue::QueuedStream;

use super::consumer::DeviceDrain;
use super::error::SinkResult;

/// Interleaved 32-bit float stream format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count; `0` in a request means "device default"
    pub channels: u16,
    /// Preferred callback size in frames (a hint, devices may ignore it)
    pub buffer_frames: u32,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channels: u16, buffer_frames: u32) -> Self {
        Self {
            sample_rate,
            channels,
            buffer_frames,
        }
    }
}

/// A platform output device driven by its own callback
///
/// Lifecycle: `open` → `attach` → (`start` / `stop`)* → `close`.
pub trait DeviceAdapter {
    /// Negotiate a format with the device
    ///
    /// Returns the accepted format, which may differ from `desired`
    /// (e.g. a concrete channel count when `desired.channels` is 0).
    fn open(&mut self, desired: &StreamFormat) -> SinkResult<StreamFormat>;

    /// Register the drain as the device callback; the stream starts paused
    fn attach(&mut self, drain: DeviceDrain) -> SinkResult<()>;

    /// Resume callbacks
    fn start(&mut self) -> SinkResult<()>;

    /// Pause callbacks
    fn stop(&mut self) -> SinkResult<()>;

    /// Tear down the stream; no callback runs after this returns
    fn close(&mut self);

    /// Human-readable device name
    fn name(&self) -> &str;
}

impl DeviceAdapter for Box<dyn DeviceAdapter> {
    fn open(&mut self, desired: &StreamFormat) -> SinkResult<StreamFormat> {
        (**self).open(desired)
    }

    fn attach(&mut self, drain: DeviceDrain) -> SinkResult<()> {
        (**self).attach(drain)
    }

    fn start(&mut self) -> SinkResult<()> {
        (**self).start()
    }

    fn stop(&mut self) -> SinkResult<()> {
        (**self).stop()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
