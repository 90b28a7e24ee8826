//! Callback-free adapter
//!
//! Nothing runs on its own: the owner calls [`ManualDevice::render`] with
//! whatever buffer size it likes, standing in for the platform callback.
//! Useful for offline rendering and for exercising a sink without hardware.

use super::{DeviceAdapter, StreamFormat};
use crate::audio::consumer::DeviceDrain;
use crate::audio::error::{SinkError, SinkResult};

/// Channel counts accepted when none are specified
const DEFAULT_CHANNELS: &[u16] = &[1, 2, 4, 6, 8];

pub struct ManualDevice {
    supported_channels: Vec<u16>,
    format: Option<StreamFormat>,
    drain: Option<DeviceDrain>,
    playing: bool,
}

impl ManualDevice {
    pub fn new() -> Self {
        Self::with_channels(DEFAULT_CHANNELS)
    }

    /// Accept only the given channel counts; the first is the default
    pub fn with_channels(channels: &[u16]) -> Self {
        Self {
            supported_channels: channels.to_vec(),
            format: None,
            drain: None,
            playing: false,
        }
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_attached(&self) -> bool {
        self.drain.is_some()
    }

    /// Run one "callback" into `out`
    ///
    /// Outputs silence when paused or closed. Returns the frames taken from
    /// the ring.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        match (&mut self.drain, self.playing) {
            (Some(drain), true) => drain.drain(out),
            _ => {
                out.fill(0.0);
                0
            }
        }
    }
}

impl Default for ManualDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceAdapter for ManualDevice {
    fn open(&mut self, desired: &StreamFormat) -> SinkResult<StreamFormat> {
        let channels = if desired.channels == 0 {
            if self.supported_channels.contains(&2) {
                2
            } else {
                *self
                    .supported_channels
                    .first()
                    .ok_or(SinkError::UnsupportedChannels(0))?
            }
        } else {
            desired.channels
        };

        if !self.supported_channels.contains(&channels) {
            return Err(SinkError::UnsupportedChannels(channels));
        }

        let format = StreamFormat::new(desired.sample_rate, channels, desired.buffer_frames);
        self.format = Some(format);
        Ok(format)
    }

    fn attach(&mut self, drain: DeviceDrain) -> SinkResult<()> {
        if self.format.is_none() {
            return Err(SinkError::NotOpen);
        }
        self.drain = Some(drain);
        Ok(())
    }

    fn start(&mut self) -> SinkResult<()> {
        if self.drain.is_none() {
            return Err(SinkError::NotOpen);
        }
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) -> SinkResult<()> {
        if self.drain.is_none() {
            return Err(SinkError::NotOpen);
        }
        self.playing = false;
        Ok(())
    }

    fn close(&mut self) {
        self.playing = false;
        self.drain = None;
        self.format = None;
    }

    fn name(&self) -> &str {
        "Manual"
    }
}
