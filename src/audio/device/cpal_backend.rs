//! cpal output adapters
//!
//! Both adapters share device selection and format negotiation. They only
//! differ in what the cpal data callback does:
//!
//! - [`CpalDevice`] drains the ring straight into the buffer cpal hands us
//! - [`CpalQueuedDevice`] drains into a [`QueuedStream`] and lets the
//!   callback pull from it
//!
//! Only 32-bit float output is accepted; there is no sample conversion.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, Stream, StreamConfig, SupportedBufferSize};

use super::queue::QueuedStream;
use super::{DeviceAdapter, StreamFormat};
use crate::audio::consumer::DeviceDrain;
use crate::audio::error::{SinkError, SinkResult};

/// Find an output device on the default host by name
fn find_device(host: &cpal::Host, name: &str) -> SinkResult<cpal::Device> {
    let devices = host
        .output_devices()
        .map_err(|e| SinkError::DeviceOpen(e.to_string()))?;

    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(SinkError::DeviceNotFound(name.to_string()))
}

/// Device and stream state common to both cpal adapters
struct CpalOutput {
    /// Device requested by name, or the host default when `None`
    requested: Option<String>,
    /// Name of the opened device
    name: String,
    device: Option<cpal::Device>,
    config: Option<StreamConfig>,
    format: Option<StreamFormat>,
    /// Kept alive for as long as callbacks should run
    stream: Option<Stream>,
}

impl CpalOutput {
    fn new(requested: Option<String>) -> Self {
        Self {
            requested,
            name: "Unknown".to_string(),
            device: None,
            config: None,
            format: None,
            stream: None,
        }
    }

    fn open(&mut self, desired: &StreamFormat) -> SinkResult<StreamFormat> {
        let host = cpal::default_host();

        let device = match &self.requested {
            Some(name) => find_device(&host, name)?,
            None => host.default_output_device().ok_or(SinkError::NoDevice)?,
        };
        self.name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using output device: {}", self.name);

        let default = device
            .default_output_config()
            .map_err(|e| SinkError::DeviceOpen(e.to_string()))?;
        let channels = if desired.channels == 0 {
            default.channels()
        } else {
            desired.channels
        };
        let rate = desired.sample_rate;

        let ranges = device
            .supported_output_configs()
            .map_err(|e| SinkError::DeviceOpen(e.to_string()))?;

        let mut channels_supported = false;
        let mut chosen = None;
        for range in ranges {
            if range.channels() != channels {
                continue;
            }
            channels_supported = true;
            if range.sample_format() == SampleFormat::F32
                && range.min_sample_rate().0 <= rate
                && rate <= range.max_sample_rate().0
            {
                chosen = Some(range);
                break;
            }
        }

        let range = match chosen {
            Some(range) => range,
            None if channels_supported => {
                return Err(SinkError::UnsupportedFormat(format!(
                    "no f32 output with {} channels at {}Hz",
                    channels, rate
                )))
            }
            None => return Err(SinkError::UnsupportedChannels(channels)),
        };

        let buffer_size = match range.buffer_size() {
            SupportedBufferSize::Range { min, max }
                if (*min..=*max).contains(&desired.buffer_frames) =>
            {
                BufferSize::Fixed(desired.buffer_frames)
            }
            _ => BufferSize::Default,
        };

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(rate),
            buffer_size,
        };
        let format = StreamFormat::new(rate, channels, desired.buffer_frames);

        log::info!("Audio config: {:?}", config);

        self.device = Some(device);
        self.config = Some(config);
        self.format = Some(format);
        Ok(format)
    }

    /// Build a paused output stream running `render` on every callback
    fn build<F>(&mut self, mut render: F) -> SinkResult<()>
    where
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        let (device, config) = match (&self.device, &self.config) {
            (Some(device), Some(config)) => (device, config),
            _ => return Err(SinkError::NotOpen),
        };

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render(data),
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| SinkError::StreamBuild(e.to_string()))?;

        // Some hosts start streams as soon as they are built.
        if let Err(e) = stream.pause() {
            log::debug!("Could not pause new stream: {}", e);
        }

        self.stream = Some(stream);
        Ok(())
    }

    fn start(&mut self) -> SinkResult<()> {
        let stream = self.stream.as_ref().ok_or(SinkError::NotOpen)?;
        stream
            .play()
            .map_err(|e| SinkError::StreamPlay(e.to_string()))
    }

    fn stop(&mut self) -> SinkResult<()> {
        let stream = self.stream.as_ref().ok_or(SinkError::NotOpen)?;
        stream
            .pause()
            .map_err(|e| SinkError::StreamPlay(e.to_string()))
    }

    fn close(&mut self) {
        // Dropping the stream joins the callback; the drain goes with it.
        self.stream = None;
        self.config = None;
        self.format = None;
        self.device = None;
    }
}

/// cpal adapter whose callback drains the ring directly
pub struct CpalDevice {
    output: CpalOutput,
}

impl CpalDevice {
    /// Use the named device, or the host default when `None`
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            output: CpalOutput::new(device_name),
        }
    }
}

impl DeviceAdapter for CpalDevice {
    fn open(&mut self, desired: &StreamFormat) -> SinkResult<StreamFormat> {
        self.output.open(desired)
    }

    fn attach(&mut self, mut drain: DeviceDrain) -> SinkResult<()> {
        self.output.build(move |data| {
            drain.drain(data);
        })
    }

    fn start(&mut self) -> SinkResult<()> {
        self.output.start()
    }

    fn stop(&mut self) -> SinkResult<()> {
        self.output.stop()
    }

    fn close(&mut self) {
        self.output.close()
    }

    fn name(&self) -> &str {
        &self.output.name
    }
}

/// cpal adapter that pushes drained audio into a stream queue first
pub struct CpalQueuedDevice {
    output: CpalOutput,
    /// Queue capacity in callback-sized chunks
    queue_chunks: usize,
}

impl CpalQueuedDevice {
    /// Use the named device, or the host default when `None`
    ///
    /// # Arguments
    /// * `device_name` - Output device name
    /// * `queue_chunks` - Queue capacity as a multiple of the preferred callback size;
    ///   bounds a single refill, never held ahead of the callback
    pub fn new(device_name: Option<String>, queue_chunks: usize) -> Self {
        Self {
            output: CpalOutput::new(device_name),
            queue_chunks: queue_chunks.max(1),
        }
    }
}

impl DeviceAdapter for CpalQueuedDevice {
    fn open(&mut self, desired: &StreamFormat) -> SinkResult<StreamFormat> {
        self.output.open(desired)
    }

    fn attach(&mut self, drain: DeviceDrain) -> SinkResult<()> {
        let format = self.output.format.ok_or(SinkError::NotOpen)?;
        let capacity =
            format.buffer_frames as usize * format.channels as usize * self.queue_chunks;
        let mut stream = QueuedStream::new(drain, capacity);

        self.output.build(move |data| stream.pull(data))
    }

    fn start(&mut self) -> SinkResult<()> {
        self.output.start()
    }

    fn stop(&mut self) -> SinkResult<()> {
        self.output.stop()
    }

    fn close(&mut self) {
        self.output.close()
    }

    fn name(&self) -> &str {
        &self.output.name
    }
}
