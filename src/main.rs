//! ringsink - play a test tone through the output sink
//!
//! Runs a small mixing engine on the main thread. Each tick renders one
//! quantum of a sine tone and hands it to the sink with a gain ramp; when
//! the ring has no headroom the engine parks until the device callback
//! wakes it.
//!
//! Usage: `ringsink [seconds]`

use std::f32::consts::TAU;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ringsink::audio::device::{CpalDevice, CpalQueuedDevice};
use ringsink::audio::WakeFn;
use ringsink::{
    AudioBlock, Backend, DeviceAdapter, GainRamp, OutputSink, SinkResult, SinkSettings,
};

const DEFAULT_SECONDS: f32 = 3.0;
const TONE_HZ: f32 = 440.0;
const TONE_GAIN: f32 = 0.2;
/// Up to 7.1
const MAX_CHANNELS: usize = 8;

fn main() {
    env_logger::init();
    log::info!("Starting ringsink");

    let seconds = std::env::args()
        .nth(1)
        .and_then(|s| s.parse::<f32>().ok())
        .unwrap_or(DEFAULT_SECONDS);

    let settings = SinkSettings::load();
    if let Err(e) = run(&settings, seconds) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

/// Sine oscillator writing the same signal to every channel
struct Tone {
    phase: f32,
    step: f32,
}

impl Tone {
    fn new(frequency: f32, sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            step: frequency / sample_rate,
        }
    }

    fn render(&mut self, planar: &mut [Vec<f32>]) {
        let frames = planar.first().map_or(0, Vec::len);
        for i in 0..frames {
            let sample = (self.phase * TAU).sin();
            for channel in planar.iter_mut() {
                channel[i] = sample;
            }
            self.phase = (self.phase + self.step).fract();
        }
    }
}

fn run(settings: &SinkSettings, seconds: f32) -> SinkResult<()> {
    let device: Box<dyn DeviceAdapter> = match settings.backend {
        Backend::Pull => Box::new(CpalDevice::new(settings.device_name.clone())),
        Backend::Queued => Box::new(CpalQueuedDevice::new(
            settings.device_name.clone(),
            settings.queue_quanta as usize,
        )),
    };

    let engine = thread::current();
    let wake: WakeFn = Arc::new(move || engine.unpark());

    let mut sink = OutputSink::init(device, settings, Some(wake))?;
    sink.start()?;

    let quantum = sink.quantum_frames();
    let channels = sink.channels().min(MAX_CHANNELS);
    let rate = sink.sample_rate() as f32;
    let tick = Duration::from_secs_f32(quantum as f32 / rate);
    let total_ticks = (seconds * rate / quantum as f32).ceil() as usize;

    let mut tone = Tone::new(TONE_HZ, rate);
    let mut planar = vec![vec![0.0f32; quantum]; channels];
    let mut gain = 0.0;
    let mut produced = 0;
    let mut starvations = 0;

    while produced < total_ticks {
        let needed = sink.frames_needed();
        if needed == 0 {
            thread::park_timeout(tick);
            continue;
        }

        for _ in 0..needed.min(total_ticks - produced) {
            tone.render(&mut planar);

            let mut channel_refs: [&[f32]; MAX_CHANNELS] = [&[]; MAX_CHANNELS];
            for (slot, channel) in channel_refs.iter_mut().zip(&planar) {
                *slot = channel.as_slice();
            }

            // Fade in on the first tick, out on the last.
            let target = if produced + 1 == total_ticks { 0.0 } else { TONE_GAIN };
            sink.consume(
                &AudioBlock::new(&channel_refs[..channels]),
                GainRamp::new(gain, target),
            );
            sink.on_frame_end();

            gain = target;
            produced += 1;
        }

        if sink.is_starved() {
            starvations += 1;
            log::warn!("Device starved ({} so far)", starvations);
            sink.reset_starved();
        }
    }

    // Let the ring play out before closing the device.
    thread::sleep(Duration::from_secs_f32(sink.capacity_frames() as f32 / rate));

    log::info!(
        "Played {} ticks, {} starvation episodes, {} dropped blocks",
        produced,
        starvations,
        sink.dropped_blocks()
    );
    sink.term();
    Ok(())
}
