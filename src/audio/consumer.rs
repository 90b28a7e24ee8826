//! Device-side half of the sink
//!
//! [`DeviceDrain::drain`] is what a device callback calls. It never blocks,
//! locks or allocates: it copies whatever is ready, pads the rest with
//! silence, and flags starvation when it had to pad.

use std::sync::Arc;

use super::ring::RingConsumer;

/// Advisory signal to the mixing thread that headroom was freed
pub type WakeFn = Arc<dyn Fn() + Send + Sync>;

/// Drains the ring into device buffers
pub struct DeviceDrain {
    ring: RingConsumer,
    wake: Option<WakeFn>,
}

impl DeviceDrain {
    pub fn new(ring: RingConsumer) -> Self {
        Self { ring, wake: None }
    }

    /// Call `wake` after every drain while playback is running
    pub fn with_wake(mut self, wake: WakeFn) -> Self {
        self.wake = Some(wake);
        self
    }

    pub fn channels(&self) -> usize {
        self.ring.channels()
    }

    pub fn ready_frames(&self) -> usize {
        self.ring.ready_frames()
    }

    /// Fill `out` (interleaved samples, any length) from the ring
    ///
    /// While stopped the output is silence and nothing is consumed. While
    /// running, ready frames are copied first; if the ring runs dry before
    /// every whole frame of `out` is filled, the remainder is zeroed and the
    /// starvation flag is raised. A trailing partial frame is always zeroed.
    ///
    /// Returns the number of frames taken from the ring.
    pub fn drain(&mut self, out: &mut [f32]) -> usize {
        let channels = self.ring.channels();
        let running = self.ring.is_running();

        let copied = if running { self.ring.read_into(out) } else { 0 };
        let filled = copied * channels;

        if running {
            if copied < out.len() / channels {
                self.ring.mark_starved();
            }
            if let Some(wake) = &self.wake {
                wake();
            }
        }

        out[filled..].fill(0.0);
        copied
    }
}
