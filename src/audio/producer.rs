//! Mixer-side half of the sink
//!
//! Converts planar blocks from the mixing engine into interleaved frames,
//! applying a linear gain ramp on the way, and keeps the ring advancing by
//! one quantum per tick even when the engine produced nothing.

use super::ring::RingProducer;

/// Linear gain applied across one block
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainRamp {
    /// Gain at the first frame
    pub start: f32,
    /// Gain the ramp is heading towards at frame `N`
    pub end: f32,
}

impl GainRamp {
    pub const UNITY: GainRamp = GainRamp { start: 1.0, end: 1.0 };

    pub fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// Constant gain across the block
    pub fn flat(gain: f32) -> Self {
        Self { start: gain, end: gain }
    }

    /// Gain of frame `index` in a block of `frames` frames:
    /// `start + index * (end - start) / frames`
    pub fn gain_at(&self, index: usize, frames: usize) -> f32 {
        if frames == 0 {
            return self.start;
        }
        self.start + index as f32 * (self.end - self.start) / frames as f32
    }
}

impl Default for GainRamp {
    fn default() -> Self {
        Self::UNITY
    }
}

/// A planar block handed over by the mixing engine
///
/// One slice per channel. The valid frame count is the length of the
/// shortest channel, so a ragged block never reads out of bounds.
#[derive(Clone, Copy, Debug)]
pub struct AudioBlock<'a> {
    channels: &'a [&'a [f32]],
    valid_frames: usize,
}

impl<'a> AudioBlock<'a> {
    pub fn new(channels: &'a [&'a [f32]]) -> Self {
        let valid_frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        Self {
            channels,
            valid_frames,
        }
    }

    /// Limit the block to its first `frames` frames
    pub fn with_valid_frames(mut self, frames: usize) -> Self {
        self.valid_frames = self.valid_frames.min(frames);
        self
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn valid_frames(&self) -> usize {
        self.valid_frames
    }

    pub fn channel(&self, index: usize) -> Option<&'a [f32]> {
        self.channels.get(index).copied()
    }
}

/// Interleave part of a planar block into `dst`, scaling by a gain ramp
///
/// `dst` holds `dst.len() / channels` interleaved frames which receive
/// block frames `first_frame..`. The ramp is evaluated against the whole
/// block's valid length, so splitting a block across a wrap does not bend
/// it. Destination channels the block lacks are written as silence.
pub fn interleave_with_ramp(
    dst: &mut [f32],
    channels: usize,
    block: &AudioBlock<'_>,
    first_frame: usize,
    ramp: GainRamp,
) {
    let frames = dst.len() / channels;
    let total = block.valid_frames();

    for ch in 0..channels {
        match block.channel(ch) {
            Some(src) => {
                let end = (first_frame + frames).min(src.len());
                let src = src.get(first_frame..end).unwrap_or(&[]);
                for (i, (out, &sample)) in dst[ch..]
                    .iter_mut()
                    .step_by(channels)
                    .zip(src)
                    .enumerate()
                {
                    *out = sample * ramp.gain_at(first_frame + i, total);
                }
            }
            None => {
                for out in dst[ch..].iter_mut().step_by(channels) {
                    *out = 0.0;
                }
            }
        }
    }
}

/// Producer state driven once per mix tick
///
/// Call [`MixProducer::consume`] zero or one time per tick and
/// [`MixProducer::on_frame_end`] exactly once at the end of it.
pub struct MixProducer {
    ring: RingProducer,
    /// Set when a block was written during the current tick
    data_ready: bool,
    /// Set when the current tick already lost a block to overflow
    overflowed: bool,
    /// Blocks dropped because the ring had no room for them, at most one per tick
    dropped_blocks: u64,
}

impl MixProducer {
    pub fn new(ring: RingProducer) -> Self {
        Self {
            ring,
            data_ready: false,
            overflowed: false,
            dropped_blocks: 0,
        }
    }

    pub fn ring(&self) -> &RingProducer {
        &self.ring
    }

    pub fn ring_mut(&mut self) -> &mut RingProducer {
        &mut self.ring
    }

    /// Whole quanta the engine may produce right now
    pub fn frames_needed(&self) -> usize {
        self.ring.headroom_quanta()
    }

    /// Interleave `block` into the ring with `ramp` applied and publish it
    ///
    /// A block with no valid frames is ignored and does not count as this
    /// tick's data.
    pub fn consume(&mut self, block: &AudioBlock<'_>, ramp: GainRamp) {
        let frames = block.valid_frames();
        if frames == 0 {
            return;
        }

        let channels = self.ring.channels();
        let written = self.ring.write_with(frames, |dst, offset| {
            interleave_with_ramp(dst, channels, block, offset, ramp);
        });

        if written {
            self.data_ready = true;
        } else if !self.overflowed {
            self.overflowed = true;
            self.dropped_blocks += 1;
        }
    }

    /// Close the current tick
    ///
    /// When nothing was consumed this tick, one quantum of silence is
    /// published in its place so the device keeps receiving a quantum per
    /// tick. A silence fill that does not fit is counted as a dropped block
    /// only if the tick has not lost one already.
    pub fn on_frame_end(&mut self) {
        if !self.data_ready {
            let quantum = self.ring.quantum_frames();
            if !self.ring.write_with(quantum, |dst, _| dst.fill(0.0)) && !self.overflowed {
                self.dropped_blocks += 1;
            }
        }
        self.data_ready = false;
        self.overflowed = false;
    }

    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ring::FrameRing;

    #[test]
    fn test_gain_ramp_interpolation() {
        let ramp = GainRamp::new(0.0, 1.0);
        assert!((ramp.gain_at(0, 4) - 0.0).abs() < 1e-6);
        assert!((ramp.gain_at(1, 4) - 0.25).abs() < 1e-6);
        assert!((ramp.gain_at(3, 4) - 0.75).abs() < 1e-6);
        assert_eq!(GainRamp::flat(0.5).gain_at(7, 8), 0.5);
    }

    #[test]
    fn test_interleave_order_and_gain() {
        let left = [1.0, 1.0, 1.0, 1.0];
        let right = [-1.0, -1.0, -1.0, -1.0];
        let planar: [&[f32]; 2] = [&left, &right];
        let block = AudioBlock::new(&planar);

        let mut dst = [0.0; 8];
        interleave_with_ramp(&mut dst, 2, &block, 0, GainRamp::new(1.0, 0.0));

        let expected = [1.0, -1.0, 0.75, -0.75, 0.5, -0.5, 0.25, -0.25];
        for (got, want) in dst.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "{} != {}", got, want);
        }
    }

    #[test]
    fn test_interleave_split_keeps_ramp() {
        let mono = [2.0; 4];
        let planar: [&[f32]; 1] = [&mono];
        let block = AudioBlock::new(&planar);
        let ramp = GainRamp::new(0.0, 1.0);

        let mut head = [0.0; 1];
        let mut tail = [0.0; 3];
        interleave_with_ramp(&mut head, 1, &block, 0, ramp);
        interleave_with_ramp(&mut tail, 1, &block, 1, ramp);

        assert!((head[0] - 0.0).abs() < 1e-6);
        assert!((tail[0] - 0.5).abs() < 1e-6);
        assert!((tail[2] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_missing_channels_are_silent() {
        let mono = [0.5; 2];
        let planar: [&[f32]; 1] = [&mono];
        let block = AudioBlock::new(&planar);

        let mut dst = [9.0; 4];
        interleave_with_ramp(&mut dst, 2, &block, 0, GainRamp::UNITY);
        assert_eq!(dst, [0.5, 0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_ragged_block_uses_shortest_channel() {
        let a = [1.0; 5];
        let b = [1.0; 3];
        let planar: [&[f32]; 2] = [&a, &b];
        assert_eq!(AudioBlock::new(&planar).valid_frames(), 3);
        assert_eq!(AudioBlock::new(&planar).with_valid_frames(2).valid_frames(), 2);
        assert_eq!(AudioBlock::new(&[]).valid_frames(), 0);
    }

    #[test]
    fn test_consume_publishes_frames() {
        let (ring, _consumer) = FrameRing::new(2, 1024, 256).unwrap().split();
        let mut producer = MixProducer::new(ring);

        let data = vec![0.5; 256];
        let planar: [&[f32]; 2] = [&data, &data];
        producer.consume(&AudioBlock::new(&planar), GainRamp::UNITY);

        assert_eq!(producer.ring().ready_frames(), 256);
        assert_eq!(producer.frames_needed(), 3);
    }

    #[test]
    fn test_empty_block_is_noop() {
        let (ring, _consumer) = FrameRing::new(2, 1024, 256).unwrap().split();
        let mut producer = MixProducer::new(ring);

        let data = vec![0.5; 256];
        let planar: [&[f32]; 2] = [&data, &data];
        producer.consume(
            &AudioBlock::new(&planar).with_valid_frames(0),
            GainRamp::UNITY,
        );
        assert_eq!(producer.ring().ready_frames(), 0);

        // The empty block did not count as data, so the tick gets silence.
        producer.on_frame_end();
        assert_eq!(producer.ring().ready_frames(), 256);
    }

    #[test]
    fn test_frame_end_fills_silence_when_idle() {
        let (ring, mut consumer) = FrameRing::new(2, 1024, 256).unwrap().split();
        let mut producer = MixProducer::new(ring);

        producer.on_frame_end();
        assert_eq!(producer.ring().ready_frames(), 256);

        let mut out = vec![1.0; 512];
        assert_eq!(consumer.read_into(&mut out), 256);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_frame_end_after_consume_adds_nothing() {
        let (ring, _consumer) = FrameRing::new(1, 512, 256).unwrap().split();
        let mut producer = MixProducer::new(ring);

        let data = vec![0.1; 256];
        let planar: [&[f32]; 1] = [&data];
        producer.consume(&AudioBlock::new(&planar), GainRamp::UNITY);
        producer.on_frame_end();
        assert_eq!(producer.ring().ready_frames(), 256);

        // Next tick has no data again.
        producer.on_frame_end();
        assert_eq!(producer.ring().ready_frames(), 512);
    }

    #[test]
    fn test_overflow_is_dropped_and_counted() {
        let (ring, _consumer) = FrameRing::new(1, 512, 256).unwrap().split();
        let mut producer = MixProducer::new(ring);

        let data = vec![0.1; 256];
        let planar: [&[f32]; 1] = [&data];
        for _ in 0..3 {
            producer.consume(&AudioBlock::new(&planar), GainRamp::UNITY);
            producer.on_frame_end();
        }

        assert_eq!(producer.ring().ready_frames(), 512);
        assert_eq!(producer.dropped_blocks(), 1);
        assert_eq!(producer.frames_needed(), 0);
    }

    #[test]
    fn test_overflow_counted_once_per_tick() {
        let (ring, _consumer) = FrameRing::new(1, 256, 256).unwrap().split();
        let mut producer = MixProducer::new(ring);

        let data = vec![0.1; 256];
        let planar: [&[f32]; 1] = [&data];
        producer.consume(&AudioBlock::new(&planar), GainRamp::UNITY);
        producer.on_frame_end();
        assert_eq!(producer.dropped_blocks(), 0);

        // Full ring: the block and the silence fill both fail in one tick.
        producer.consume(&AudioBlock::new(&planar), GainRamp::UNITY);
        producer.consume(&AudioBlock::new(&planar), GainRamp::UNITY);
        producer.on_frame_end();
        assert_eq!(producer.dropped_blocks(), 1);

        // An idle tick whose silence does not fit still counts.
        producer.on_frame_end();
        assert_eq!(producer.dropped_blocks(), 2);
    }
}
