//! Output sink session
//!
//! Ties a [`FrameRing`] to a [`DeviceAdapter`] for the lifetime of one
//! device session and exposes the interface the mixing engine drives:
//!
//! ```text
//! engine tick:  frames_needed() ──► consume(block, ramp)? ──► on_frame_end()
//!                                          │
//!                                   ┌──────▼──────┐
//!                                   │  FrameRing  │  ready-frame counter
//!                                   └──────┬──────┘
//!                                          │
//! device callback:                   DeviceDrain::drain(out)
//! ```
//!
//! Teardown order matters: the device is stopped and closed (so no callback
//! can touch the ring) before the ring is released.

use super::consumer::{DeviceDrain, WakeFn};
use super::device::{DeviceAdapter, StreamFormat};
use super::error::{SinkError, SinkResult};
use super::producer::{AudioBlock, GainRamp, MixProducer};
use super::ring::FrameRing;
use crate::settings::SinkSettings;

/// A running hand-off between the mixing engine and an output device
pub struct OutputSink<D: DeviceAdapter> {
    device: D,
    producer: MixProducer,
    format: StreamFormat,
    closed: bool,
}

impl<D: DeviceAdapter> OutputSink<D> {
    /// Open `device`, allocate the ring and register the drain callback
    ///
    /// The sink starts stopped; call [`OutputSink::start`] to begin playback.
    /// On failure the device is closed again and nothing keeps running.
    ///
    /// # Arguments
    /// * `device` - Adapter for the output device
    /// * `settings` - Engine clock and device preferences
    /// * `wake` - Called from the device callback after each drain while running
    pub fn init(mut device: D, settings: &SinkSettings, wake: Option<WakeFn>) -> SinkResult<Self> {
        settings.validate()?;

        let desired = settings.desired_format();
        let format = device.open(&desired)?;
        if format.channels == 0 {
            device.close();
            return Err(SinkError::UnsupportedChannels(0));
        }

        let capacity = settings.capacity_frames();
        let quantum = settings.quantum_frames as usize;
        let ring = match FrameRing::new(format.channels as usize, capacity, quantum) {
            Ok(ring) => ring,
            Err(e) => {
                log::error!("Failed to allocate ring: {}", e);
                device.close();
                return Err(e);
            }
        };

        let (mut producer, consumer) = ring.split();
        if settings.prime_with_silence {
            producer.prime_silence();
        }

        let mut drain = DeviceDrain::new(consumer);
        if let Some(wake) = wake {
            drain = drain.with_wake(wake);
        }
        if let Err(e) = device.attach(drain) {
            log::error!("Failed to attach drain to {}: {}", device.name(), e);
            device.close();
            return Err(e);
        }

        log::info!(
            "Sink ready on {}: {} channels, {}Hz, {} frames ({} x {})",
            device.name(),
            format.channels,
            format.sample_rate,
            capacity,
            settings.refills,
            quantum
        );

        Ok(Self {
            device,
            producer: MixProducer::new(producer),
            format,
            closed: false,
        })
    }

    /// Format accepted by the device
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.format.channels as usize
    }

    pub fn quantum_frames(&self) -> usize {
        self.producer.ring().quantum_frames()
    }

    pub fn capacity_frames(&self) -> usize {
        self.producer.ring().capacity_frames()
    }

    pub fn ready_frames(&self) -> usize {
        self.producer.ring().ready_frames()
    }

    /// Whole quanta of headroom; the engine should run this many ticks
    pub fn frames_needed(&self) -> usize {
        self.producer.frames_needed()
    }

    /// Hand over this tick's block
    pub fn consume(&mut self, block: &AudioBlock<'_>, ramp: GainRamp) {
        self.producer.consume(block, ramp);
    }

    /// Close the tick, substituting silence if nothing was consumed
    pub fn on_frame_end(&mut self) {
        self.producer.on_frame_end();
    }

    pub fn dropped_blocks(&self) -> u64 {
        self.producer.dropped_blocks()
    }

    /// Whether the device ran dry since the last [`OutputSink::reset_starved`]
    pub fn is_starved(&self) -> bool {
        self.producer.ring().is_starved()
    }

    pub fn reset_starved(&self) {
        self.producer.ring().reset_starved();
    }

    pub fn is_running(&self) -> bool {
        self.producer.ring().is_running()
    }

    /// Begin playback
    pub fn start(&mut self) -> SinkResult<()> {
        if self.closed {
            return Err(SinkError::NotOpen);
        }
        self.producer.ring().set_running(true);
        if let Err(e) = self.device.start() {
            self.producer.ring().set_running(false);
            return Err(e);
        }
        log::info!("Sink started on {}", self.device.name());
        Ok(())
    }

    /// Pause playback; buffered frames stay in the ring
    pub fn stop(&mut self) -> SinkResult<()> {
        if self.closed {
            return Err(SinkError::NotOpen);
        }
        self.producer.ring().set_running(false);
        self.device.stop()?;
        log::info!("Sink stopped on {}", self.device.name());
        Ok(())
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// End the session; equivalent to dropping the sink
    pub fn term(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.producer.ring().set_running(false);
        if let Err(e) = self.device.stop() {
            log::warn!("Failed to stop {}: {}", self.device.name(), e);
        }
        self.device.close();
        self.closed = true;
        log::info!("Sink closed on {}", self.device.name());
    }
}

impl<D: DeviceAdapter> Drop for OutputSink<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
